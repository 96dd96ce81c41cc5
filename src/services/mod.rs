// Business operations sitting between handlers and the store

pub mod session_service;

pub use session_service::*;
