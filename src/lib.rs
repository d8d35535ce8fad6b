pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod extract;
pub mod filter;
pub mod normalize;
pub mod pipeline;

pub use error::{PageError, PipelineError};
