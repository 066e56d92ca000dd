//! Earth Search, the public STAC API run by Element 84 over the AWS open data
//! Sentinel buckets.
mod provider;
pub mod sentinel2collection1level2a;

pub use provider::Provider;

pub const API_ROOT: &str = "https://earth-search.aws.element84.com/v1";

/// Region of the buckets behind Earth Search assets.
pub const REGION: &str = "us-west-2";
