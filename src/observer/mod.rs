// Post-commit view invalidation: mutations announce which cached
// presentation views went stale, observers deliver the hint

pub mod error;
pub mod implementations;
pub mod pipeline;
pub mod traits;

// Re-export core types
pub use error::*;
pub use implementations::*;
pub use pipeline::*;
pub use traits::*;
