use futures::future::join_all;
use std::time::Instant;
use tokio::time::timeout;

use crate::config::RevalidationConfig;
use crate::observer::error::ObserverError;
use crate::observer::implementations::{LogObserver, RevalidateWebhook};
use crate::observer::traits::{View, ViewObserver};

/// Fans invalidation hints out to every registered observer after a
/// successful mutation
#[derive(Default)]
pub struct InvalidationPipeline {
    observers: Vec<Box<dyn ViewObserver>>,
}

impl InvalidationPipeline {
    /// Create a pipeline with an empty observer registry
    pub fn new() -> Self {
        Self { observers: Vec::new() }
    }

    /// Standard pipeline: always logs, and posts to the revalidation webhook
    /// when one is configured
    pub fn from_config(config: &RevalidationConfig) -> Result<Self, ObserverError> {
        let mut pipeline = Self::new();
        pipeline.register_observer(Box::new(LogObserver));

        if let Some(url) = &config.webhook_url {
            let webhook = RevalidateWebhook::new(url, config.webhook_secret.clone(), config.timeout_ms)?;
            pipeline.register_observer(Box::new(webhook));
        }

        Ok(pipeline)
    }

    pub fn register_observer(&mut self, observer: Box<dyn ViewObserver>) {
        tracing::debug!("Registered view observer '{}'", observer.name());
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `views` to every observer and wait for them, each bounded by
    /// its own timeout. Failures are logged and dropped. Returns how many
    /// observers acknowledged the hint.
    pub async fn notify(&self, views: &[View]) -> usize {
        let mut unique: Vec<View> = Vec::with_capacity(views.len());
        for view in views {
            if !unique.contains(view) {
                unique.push(*view);
            }
        }
        if unique.is_empty() || self.observers.is_empty() {
            return 0;
        }

        let start = Instant::now();
        let deliveries = self.observers.iter().map(|observer| {
            let views = unique.as_slice();
            async move {
                let outcome = match timeout(observer.timeout(), observer.invalidate(views)).await {
                    Ok(result) => result,
                    Err(_) => Err(ObserverError::TimeoutError(format!(
                        "observer '{}' exceeded {:?}",
                        observer.name(),
                        observer.timeout()
                    ))),
                };
                (observer.name(), outcome)
            }
        });

        let mut delivered = 0;
        for (name, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!("View invalidation via '{}' failed: {}", name, e),
            }
        }

        tracing::debug!(
            "Invalidated {:?} via {}/{} observers in {:?}",
            unique,
            delivered,
            self.observers.len(),
            start.elapsed()
        );
        delivered
    }
}
