use async_trait::async_trait;

use crate::observer::error::ObserverError;
use crate::observer::traits::{View, ViewObserver};

/// Records every invalidation in the service log
pub struct LogObserver;

#[async_trait]
impl ViewObserver for LogObserver {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn invalidate(&self, views: &[View]) -> Result<(), ObserverError> {
        let paths: Vec<String> = views.iter().map(View::path).collect();
        tracing::info!(paths = ?paths, "Views invalidated");
        Ok(())
    }
}
