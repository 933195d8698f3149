// m3-common/src/model/mod.rs
pub mod spec;

pub use spec::{ConfigSource, ModpackSpec, RawInstaller, RawMod, RawModSet};
