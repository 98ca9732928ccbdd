pub mod cli;
pub mod error;
pub mod metadata;

pub use cli::{Cli, Commands};
pub use error::{Error, Result};
pub use metadata::{on_gce, Client, Config, MetadataValue};
