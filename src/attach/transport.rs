//! Network boundary for uploads.
//!
//! The orchestrator only sees [`Transport`]; byte-level multipart framing is
//! left to the implementation. [`ServerReply`] is the one place the loosely
//! typed response body gets interpreted.

use super::error::TransportError;
use super::schema::{FileContent, UploadReceipt};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::fs;

/// Whether ambient credentials travel with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CredentialsPolicy {
    #[default]
    Include,
    Omit,
}

/// One field of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    File {
        field: String,
        filename: String,
        media_type: String,
        content: FileContent,
    },
    Text {
        field: String,
        value: String,
    },
}

impl FormPart {
    pub fn field(&self) -> &str {
        match self {
            Self::File { field, .. } | Self::Text { field, .. } => field,
        }
    }
}

/// A fully assembled upload, owned by value.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub endpoint: String,
    pub method: Method,
    pub parts: Vec<FormPart>,
    pub credentials: CredentialsPolicy,
}

impl UploadRequest {
    pub fn files(&self) -> impl Iterator<Item = &FormPart> {
        self.parts
            .iter()
            .filter(|p| matches!(p, FormPart::File { .. }))
    }

    pub fn text_value(&self, field: &str) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            FormPart::Text { field: f, value } if f == field => Some(value.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub ok: bool,
    pub body: Value,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform_request(
        &self,
        request: UploadRequest,
    ) -> Result<TransportResponse, TransportError>;
}

/// Typed view of a transport response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    Accepted { receipt: UploadReceipt },
    Rejected { status: u16, reason: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ServerReply {
    pub fn parse(response: &TransportResponse) -> Self {
        if response.ok {
            // An ok response with an unexpected shape still counts as accepted.
            let receipt =
                UploadReceipt::deserialize(&response.body).unwrap_or_default();
            return Self::Accepted { receipt };
        }
        let reason = ErrorBody::deserialize(&response.body)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("HTTP {}", response.status));
        Self::Rejected {
            status: response.status,
            reason,
        }
    }
}

/// [`Transport`] over HTTP with a multipart body.
pub struct HttpTransport {
    client: Client,
    session_cookie: Option<String>,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            session_cookie: None,
        })
    }

    /// Cookie sent when a request's policy is [`CredentialsPolicy::Include`].
    pub fn with_session_cookie(mut self, cookie: Option<String>) -> Self {
        self.session_cookie = cookie;
        self
    }

    /// Build the multipart body. This is the one place file bytes are copied.
    async fn build_form(parts: Vec<FormPart>) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for part in parts {
            form = match part {
                FormPart::File {
                    field,
                    filename,
                    media_type,
                    content,
                } => {
                    let data = match content {
                        FileContent::Memory(bytes) => bytes.to_vec(),
                        FileContent::Disk(path) => match fs::read(&path).await {
                            Ok(data) => data,
                            Err(source) => return Err(TransportError::Read { path, source }),
                        },
                    };
                    let part = Part::bytes(data)
                        .file_name(filename)
                        .mime_str(&media_type)
                        .map_err(|e| TransportError::Encode(e.to_string()))?;
                    form.part(field, part)
                }
                FormPart::Text { field, value } => form.text(field, value),
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform_request(
        &self,
        request: UploadRequest,
    ) -> Result<TransportResponse, TransportError> {
        let form = Self::build_form(request.parts).await?;
        let mut builder = self
            .client
            .request(request.method, &request.endpoint)
            .multipart(form);
        if request.credentials == CredentialsPolicy::Include {
            if let Some(cookie) = &self.session_cookie {
                builder = builder.header(reqwest::header::COOKIE, cookie);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(TransportResponse {
            status: status.as_u16(),
            ok: status.is_success(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(endpoint: String, credentials: CredentialsPolicy) -> UploadRequest {
        UploadRequest {
            endpoint,
            method: Method::POST,
            parts: vec![
                FormPart::File {
                    field: "file".into(),
                    filename: "notes.txt".into(),
                    media_type: "text/plain".into(),
                    content: FileContent::Memory(Arc::from(&b"hello world"[..])),
                },
                FormPart::Text {
                    field: "chat_id".into(),
                    value: "abc".into(),
                },
            ],
            credentials,
        }
    }

    #[test]
    fn ok_reply_parses_receipt() {
        let response = TransportResponse {
            status: 200,
            ok: true,
            body: json!({"message": "File uploaded and processed", "processed_text": "hi"}),
        };
        let ServerReply::Accepted { receipt } = ServerReply::parse(&response) else {
            panic!("expected accepted");
        };
        assert_eq!(receipt.processed_text.as_deref(), Some("hi"));
    }

    #[test]
    fn ok_reply_with_odd_body_is_still_accepted() {
        let response = TransportResponse {
            status: 200,
            ok: true,
            body: json!([1, 2, 3]),
        };
        assert_eq!(
            ServerReply::parse(&response),
            ServerReply::Accepted {
                receipt: UploadReceipt::default()
            }
        );
    }

    #[test]
    fn error_reply_uses_error_field_or_status() {
        let with_field = TransportResponse {
            status: 400,
            ok: false,
            body: json!({"error": "No file part"}),
        };
        assert_eq!(
            ServerReply::parse(&with_field),
            ServerReply::Rejected {
                status: 400,
                reason: "No file part".into()
            }
        );

        let bare = TransportResponse {
            status: 502,
            ok: false,
            body: Value::Null,
        };
        assert_eq!(
            ServerReply::parse(&bare),
            ServerReply::Rejected {
                status: 502,
                reason: "HTTP 502".into()
            }
        );
    }

    #[test]
    fn request_helpers_find_parts() {
        let req = request("http://localhost".into(), CredentialsPolicy::Omit);
        assert_eq!(req.files().count(), 1);
        assert_eq!(req.text_value("chat_id"), Some("abc"));
        assert_eq!(req.text_value("missing"), None);
    }

    #[tokio::test]
    async fn http_transport_sends_multipart_with_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/upload-file"))
            .and(header("cookie", "session=xyz"))
            .and(body_string_contains("name=\"chat_id\""))
            .and(body_string_contains("filename=\"notes.txt\""))
            .and(body_string_contains("hello world"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5))
            .unwrap()
            .with_session_cookie(Some("session=xyz".into()));
        let response = transport
            .perform_request(request(
                format!("{}/upload/upload-file", server.uri()),
                CredentialsPolicy::Include,
            ))
            .await
            .unwrap();

        assert!(response.ok);
        assert_eq!(response.body, json!({"message": "ok"}));
    }

    #[tokio::test]
    async fn http_transport_maps_non_json_error_body_to_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .perform_request(request(server.uri(), CredentialsPolicy::Omit))
            .await
            .unwrap();

        assert!(!response.ok);
        assert_eq!(response.status, 500);
        assert_eq!(response.body, Value::Null);
    }

    #[tokio::test]
    async fn http_transport_reports_timeouts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_millis(100)).unwrap();
        let err = transport
            .perform_request(request(server.uri(), CredentialsPolicy::Omit))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn http_transport_reads_disk_content_when_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("filename=\"scan.txt\""))
            .and(body_string_contains("from disk"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.txt");
        std::fs::write(&path, "from disk").unwrap();

        let mut req = request(server.uri(), CredentialsPolicy::Omit);
        req.parts[0] = FormPart::File {
            field: "file".into(),
            filename: "scan.txt".into(),
            media_type: "text/plain".into(),
            content: FileContent::Disk(path),
        };
        let response = HttpTransport::new(Duration::from_secs(5))
            .unwrap()
            .perform_request(req)
            .await
            .unwrap();
        assert!(response.ok);
    }

    #[tokio::test]
    async fn unreadable_file_fails_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut req = request(server.uri(), CredentialsPolicy::Omit);
        req.parts[0] = FormPart::File {
            field: "file".into(),
            filename: "gone.txt".into(),
            media_type: "text/plain".into(),
            content: FileContent::Disk(dir.path().join("gone.txt")),
        };
        let err = HttpTransport::new(Duration::from_secs(5))
            .unwrap()
            .perform_request(req)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Read { .. }));
    }
}
