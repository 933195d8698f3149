// m3-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;

// Re-export key types
pub use config::Config;
pub use error::{M3Error, ResolutionError, Result};
pub use model::{ConfigSource, ModpackSpec, RawInstaller, RawMod, RawModSet};
