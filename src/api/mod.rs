//! HTTP access to the market analysis backend.

pub mod client;

pub use client::{ApiError, BackendClient, ClientConfig};
