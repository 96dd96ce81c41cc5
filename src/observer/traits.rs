use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::observer::error::ObserverError;

/// Cached presentation views a mutation can make stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    /// The global session list
    SessionList,
    /// One patient's detail page
    PatientDetail(i32),
    /// The payments overview
    Payments,
}

impl View {
    /// Path token understood by the presentation layer's cache
    pub fn path(&self) -> String {
        match self {
            View::SessionList => "/sessoes".to_string(),
            View::PatientDetail(id) => format!("/pacientes/{}", id),
            View::Payments => "/pagamentos".to_string(),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Receives post-commit invalidation hints.
///
/// Delivery is best effort: an error or timeout is logged by the pipeline and
/// never reaches the operation that triggered it.
#[async_trait]
pub trait ViewObserver: Send + Sync {
    /// Observer name for logging and debugging
    fn name(&self) -> &'static str;

    /// Execution timeout (default 2 seconds)
    fn timeout(&self) -> Duration {
        Duration::from_secs(2)
    }

    async fn invalidate(&self, views: &[View]) -> Result<(), ObserverError>;
}
