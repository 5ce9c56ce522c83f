pub mod config;
pub mod error;
pub mod types;

pub use config::KaiConfig;
pub use error::{KaiError, Result};
pub use types::*;
