//! Per-vendor static configuration and presets.

pub mod config;

pub use config::{bitbucket_config, github_config, google_config, ProviderConfig};
