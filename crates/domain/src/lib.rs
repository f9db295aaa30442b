pub mod canonical_json;
pub mod config;
pub mod error;
pub mod model;
pub mod redaction;

pub use config::Config;
pub use error::{Error, Result};
