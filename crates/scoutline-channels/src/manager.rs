use crate::channel::Notifier;
use async_trait::async_trait;
use scoutline_core::{ScoutlineError, ScoutlineResult};
use std::sync::Arc;

/// Delivers each report to every registered notifier.
///
/// Succeeds if at least one notifier delivered; with no notifiers it is a no-op.
#[derive(Default)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notifier.
    pub fn add(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Names of all registered notifiers.
    pub fn names(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    /// Number of registered notifiers.
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Whether no notifier is registered.
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for NotifierSet {
    fn name(&self) -> &str {
        "all"
    }

    async fn send_report(&self, owner_id: &str, title: &str, body: &str) -> ScoutlineResult<()> {
        if self.notifiers.is_empty() {
            return Ok(());
        }
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.send_report(owner_id, title, body).await {
                tracing::warn!(notifier = %notifier.name(), error = %e, "Report delivery failed");
                errors.push(format!("{}: {e}", notifier.name()));
            }
        }
        if errors.len() == self.notifiers.len() {
            return Err(ScoutlineError::Channel(errors.join("; ")));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock notifier that counts sends.
    struct MockNotifier {
        name: String,
        fail: bool,
        send_count: Arc<AtomicUsize>,
    }

    impl MockNotifier {
        fn new(name: &str, fail: bool) -> Self {
            Self {
                name: name.to_string(),
                fail,
                send_count: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send_report(&self, _owner: &str, _title: &str, _body: &str) -> ScoutlineResult<()> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ScoutlineError::Channel("offline".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_empty_set_is_noop() {
        let set = NotifierSet::new();
        assert!(set.is_empty());
        set.send_report("u", "t", "b").await.unwrap();
    }

    #[tokio::test]
    async fn test_fans_out_to_all() {
        let a = MockNotifier::new("a", false);
        let b = MockNotifier::new("b", true);
        let (ca, cb) = (a.send_count.clone(), b.send_count.clone());

        let mut set = NotifierSet::new();
        set.add(Arc::new(a));
        set.add(Arc::new(b));

        // One success is enough.
        set.send_report("u", "t", "b").await.unwrap();
        assert_eq!(ca.load(Ordering::SeqCst), 1);
        assert_eq!(cb.load(Ordering::SeqCst), 1);
        assert_eq!(set.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_all_failed_is_error() {
        let mut set = NotifierSet::new();
        set.add(Arc::new(MockNotifier::new("x", true)));
        set.add(Arc::new(MockNotifier::new("y", true)));
        let err = set.send_report("u", "t", "b").await.unwrap_err();
        assert!(err.to_string().contains("x: "));
        assert!(err.to_string().contains("y: "));
    }
}
