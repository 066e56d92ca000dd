use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Band not found in dataset: {0}")]
    MissingBand(String),

    #[error("Asset not found on item {item}: {key}")]
    MissingAsset { item: String, key: String },

    #[error("Item {item} has no numeric property: {property}")]
    MissingProperty { item: String, property: String },

    #[error("Arrays have different shapes: {left:?} and {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid geotransform: {0}")]
    InvalidTransform(String),

    #[error("Invalid geometry on item {0}")]
    InvalidGeometry(String),

    #[error("Search returned no items")]
    EmptySearch,

    #[error("Item {0} does not overlap the area of interest")]
    NoOverlap(String),

    #[error("Unsupported TIFF sample format in {0}")]
    UnsupportedSampleFormat(String),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
