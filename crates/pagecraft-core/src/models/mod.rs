//! Data models.

pub mod config;

pub use config::{OutputConfig, PagecraftConfig, RenderConfig, SplitConfig};
