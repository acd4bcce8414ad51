use crate::executor::Executor;
use parking_lot::RwLock;
use scoutline_core::{Category, ScoutlineError, ScoutlineResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Maps a category to the executor that handles it.
///
/// Registration normally happens once at startup; lookups take a read lock
/// and clone the `Arc`, so they never block each other.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `executor` under `category`. A later registration for the same
    /// category replaces the earlier one.
    pub fn register(&self, category: impl Into<Category>, executor: Arc<dyn Executor>) {
        let category = category.into();
        let replaced = self
            .executors
            .write()
            .insert(category.as_str().to_string(), executor)
            .is_some();
        if replaced {
            warn!(category = %category, "Replaced registered executor");
        } else {
            info!(category = %category, "Registered executor");
        }
    }

    /// Executor for `category`, or [`ScoutlineError::NoExecutor`] listing what is registered.
    pub fn lookup(&self, category: &Category) -> ScoutlineResult<Arc<dyn Executor>> {
        self.get(category)
            .ok_or_else(|| ScoutlineError::NoExecutor {
                category: category.as_str().to_string(),
                available: self.categories(),
            })
    }

    pub fn get(&self, category: &Category) -> Option<Arc<dyn Executor>> {
        self.executors.read().get(category.as_str()).cloned()
    }

    /// Registered categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.read().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::executor::ExecutionContext;
    use async_trait::async_trait;
    use scoutline_core::ExecutorError;

    struct Tagged(&'static str);

    #[async_trait]
    impl Executor for Tagged {
        async fn execute(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
            ctx.run.set_summary(self.0);
            Ok(())
        }
    }

    #[test]
    fn test_lookup_registered() {
        let registry = ExecutorRegistry::new();
        registry.register("news", Arc::new(Tagged("news")));
        assert!(registry.lookup(&Category::News).is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_missing_lists_available() {
        let registry = ExecutorRegistry::new();
        registry.register("social", Arc::new(Tagged("s")));
        registry.register("news", Arc::new(Tagged("n")));

        let err = registry.lookup(&Category::from("weather")).err().unwrap();
        match err {
            ScoutlineError::NoExecutor { category, available } => {
                assert_eq!(category, "weather");
                assert_eq!(available, vec!["news", "social"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = ExecutorRegistry::new();
        let first: Arc<dyn Executor> = Arc::new(Tagged("first"));
        let second: Arc<dyn Executor> = Arc::new(Tagged("second"));
        registry.register("news", first);
        registry.register("news", second.clone());

        assert_eq!(registry.len(), 1);
        let found = registry.get(&Category::News).unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ExecutorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.categories().is_empty());
        assert!(registry.get(&Category::Social).is_none());
    }
}
