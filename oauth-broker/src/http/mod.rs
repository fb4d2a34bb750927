//! HTTP client building for vendor endpoints.

mod client;

pub use client::{ClientBuilder, HttpClientConfig};
