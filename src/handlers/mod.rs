// HTTP handlers. Public: service info and health check. Everything under
// /api resolves the caller from the bearer token and goes through the ledger.

pub mod health;
pub mod sessions;

pub use health::{health, root};
