pub mod manager;
pub mod models;
pub mod repository;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use repository::PgSessionStore;
pub use store::{NewSession, PaymentChange, SessionChanges, SessionQuery, SessionStore, SortDirection, UserId};
