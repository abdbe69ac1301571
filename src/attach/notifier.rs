use tracing::info;

/// Callback fired once per successful upload so dependent views can refresh.
pub trait UploadNotifier: Send + Sync {
    fn upload_succeeded(&self);
}

impl<F> UploadNotifier for F
where
    F: Fn() + Send + Sync,
{
    fn upload_succeeded(&self) {
        self()
    }
}

/// Notifier that only logs. Used when nothing needs refreshing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl UploadNotifier for LogNotifier {
    fn upload_succeeded(&self) {
        info!("upload finished, conversation view should refresh");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn closures_are_notifiers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let notifier = move || {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        notifier.upload_succeeded();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
