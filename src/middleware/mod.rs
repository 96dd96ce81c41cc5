pub mod auth;
pub mod response;

pub use auth::{extract_jwt_from_headers, BearerIdentity};
pub use response::{ApiResponse, ApiResult};
