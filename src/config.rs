use crate::attach::engine::DEFAULT_LINES_PER_PAGE;
use crate::attach::orchestrator::UploadTarget;
use crate::attach::selection::AcceptList;
use crate::attach::transport::{CredentialsPolicy, HttpTransport};
use crate::attach::validate::{ValidationRules, DEFAULT_MAX_FILE_SIZE};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/upload/upload-file";
const DEFAULT_ACCEPT: &str =
    ".pdf, .docx, .doc, .txt, .csv, .jpg, .jpeg, .png, .mp4, .avi, .mov, .wav, .mp3, .m4a";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub upload: UploadConfig,
    pub validation: ValidationConfig,
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct UploadConfig {
    /// Multipart endpoint every batch is posted to.
    pub endpoint: String,
    /// Form field shared by every file of a batch.
    pub file_field: String,
    /// Form field carrying the conversation id.
    pub context_field: String,
    pub timeout_secs: u64,
    pub credentials: CredentialsPolicy,
    /// Sent as the `Cookie` header when credentials are included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            file_field: "file".into(),
            context_field: "chat_id".into(),
            timeout_secs: 120,
            credentials: CredentialsPolicy::Include,
            session_cookie: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ValidationConfig {
    /// Per-file ceiling in bytes.
    pub max_file_size_bytes: u64,
    /// Picker allow-list, e.g. ".pdf, .txt, image/*".
    pub accepted_media_types: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            accepted_media_types: DEFAULT_ACCEPT.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PreviewConfig {
    pub lines_per_page: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            lines_per_page: DEFAULT_LINES_PER_PAGE,
        }
    }
}

impl Config {
    /// `<config_dir>/docdrop/config.toml`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "docdrop").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path` (tilde-expanded) or the default location, then apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(PathBuf::from(shellexpand::tilde(p).into_owned())),
            None => Self::default_path(),
        };
        let mut config = match path {
            Some(p) if p.exists() => Self::load_file(&p)?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config {}", path.display()))
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(endpoint) = var("DOCDROP_ENDPOINT") {
            self.upload.endpoint = endpoint;
        }
        if let Some(size) = var("DOCDROP_MAX_FILE_SIZE") {
            self.validation.max_file_size_bytes = size
                .trim()
                .parse()
                .context("DOCDROP_MAX_FILE_SIZE must be a byte count")?;
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn json_schema() -> Result<String> {
        serde_json::to_string_pretty(&schemars::schema_for!(Config))
            .context("Failed to serialize config schema")
    }

    pub fn accept_list(&self) -> AcceptList {
        AcceptList::parse(&self.validation.accepted_media_types)
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            max_file_size_bytes: self.validation.max_file_size_bytes,
            accepted_media_types: self.accept_list(),
        }
    }

    pub fn upload_target(&self) -> UploadTarget {
        UploadTarget {
            endpoint: self.upload.endpoint.clone(),
            file_field: self.upload.file_field.clone(),
            context_field: self.upload.context_field.clone(),
            credentials: self.upload.credentials,
        }
    }

    pub fn http_transport(&self) -> Result<HttpTransport> {
        Ok(
            HttpTransport::new(Duration::from_secs(self.upload.timeout_secs))
                .context("Failed to build HTTP client")?
                .with_session_cookie(self.upload.session_cookie.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_upload_form() {
        let config = Config::default();
        assert_eq!(config.validation.max_file_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.upload.file_field, "file");
        assert_eq!(config.upload.context_field, "chat_id");
        assert!(config.accept_list().permits("a.m4a", "audio/mp4"));
        assert!(!config.accept_list().permits("a.exe", "application/octet-stream"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[upload]\nendpoint = \"https://example.test/up\"\ncredentials = \"omit\"\n\n[validation]\nmax_file_size_bytes = 1024\n",
        )
        .unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.upload.endpoint, "https://example.test/up");
        assert_eq!(config.upload.credentials, CredentialsPolicy::Omit);
        assert_eq!(config.upload.timeout_secs, 120);
        assert_eq!(config.validation_rules().max_file_size_bytes, 1024);
        assert_eq!(config.preview.lines_per_page, DEFAULT_LINES_PER_PAGE);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upload\nendpoint = 3").unwrap();
        assert!(Config::load_file(&path).is_err());
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("DOCDROP_ENDPOINT", "http://localhost:9/x"),
            ("DOCDROP_MAX_FILE_SIZE", " 2048 "),
        ]
        .into();
        let mut config = Config::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.upload.endpoint, "http://localhost:9/x");
        assert_eq!(config.validation.max_file_size_bytes, 2048);

        let bad: HashMap<&str, &str> = [("DOCDROP_MAX_FILE_SIZE", "lots")].into();
        assert!(config
            .apply_env_overrides(|k| bad.get(k).map(|v| v.to_string()))
            .is_err());
    }

    #[test]
    fn toml_round_trips_and_schema_renders() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(toml::from_str::<Config>(&rendered).unwrap(), config);
        assert!(Config::json_schema().unwrap().contains("max_file_size_bytes"));
    }

    #[test]
    fn upload_target_follows_config() {
        let mut config = Config::default();
        config.upload.file_field = "attachment".into();
        let target = config.upload_target();
        assert_eq!(target.file_field, "attachment");
        assert_eq!(target.endpoint, DEFAULT_ENDPOINT);
    }
}
