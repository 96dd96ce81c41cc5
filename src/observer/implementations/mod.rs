// View observers: where invalidation hints end up

pub mod log_observer;
pub mod revalidate_webhook;

pub use log_observer::*;
pub use revalidate_webhook::*;
