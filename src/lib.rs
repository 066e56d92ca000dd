#![allow(async_fn_in_trait)]
pub mod composite;
pub mod dataset;
pub mod download_plan;
pub mod element84;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod indices;
pub mod logging;
pub mod projection;
pub mod raster;
pub mod render;
pub mod s3;
pub mod search;
pub mod selection;
pub mod study;
pub mod summary;
#[cfg(test)]
mod test_server;
