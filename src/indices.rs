//! Normalized difference spectral indices over Sentinel-2 L2A bands.
//!
//! All indices follow `(a - b) / (a + b)` on float reflectances, so pixels
//! where both bands are zero or missing come out as NaN.
use crate::dataset::Dataset;
use crate::element84::sentinel2collection1level2a::{GREEN, NIR, RED, SWIR22};
use crate::error::{Error, Result};
use crate::render::Colormap;
use clap::ValueEnum;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpectralIndex {
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Normalized Difference Built-up Index
    Ndbi,
    /// Modified Normalized Difference Water Index
    Ndwi,
    /// Normalized Built-up Area Index
    Nbai,
    /// Normalized Burn Ratio
    Nbr,
}

impl SpectralIndex {
    /// Band pair `(a, b)` of the normalized difference `(a - b) / (a + b)`.
    pub fn bands(&self) -> [&'static str; 2] {
        match self {
            Self::Ndvi => [NIR, RED],
            Self::Ndbi => [SWIR22, NIR],
            Self::Ndwi => [GREEN, SWIR22],
            Self::Nbai => [SWIR22, GREEN],
            Self::Nbr => [NIR, SWIR22],
        }
    }

    pub fn compute(&self, data: &Dataset) -> Result<Array2<f64>> {
        let [a, b] = self.bands();
        normalized_difference(data.band(a)?, data.band(b)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::Ndbi => "NDBI",
            Self::Ndwi => "NDWI",
            Self::Nbai => "NBAI",
            Self::Nbr => "NBR",
        }
    }

    pub fn default_colormap(&self) -> Colormap {
        match self {
            Self::Ndvi => Colormap::Greens,
            Self::Ndwi => Colormap::Blues,
            Self::Ndbi | Self::Nbai => Colormap::Greys,
            Self::Nbr => Colormap::RdYlGn,
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn normalized_difference(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    ensure_same_shape(a, b)?;
    Ok(Zip::from(a)
        .and(b)
        .map_collect(|&a, &b| (a - b) / (a + b)))
}

pub fn ndvi(data: &Dataset) -> Result<Array2<f64>> {
    SpectralIndex::Ndvi.compute(data)
}

pub fn ndbi(data: &Dataset) -> Result<Array2<f64>> {
    SpectralIndex::Ndbi.compute(data)
}

pub fn ndwi(data: &Dataset) -> Result<Array2<f64>> {
    SpectralIndex::Ndwi.compute(data)
}

pub fn nbai(data: &Dataset) -> Result<Array2<f64>> {
    SpectralIndex::Nbai.compute(data)
}

pub fn nbr(data: &Dataset) -> Result<Array2<f64>> {
    SpectralIndex::Nbr.compute(data)
}

/// Differenced NBR between a pre-fire and a post-fire dataset on the same grid.
pub fn dnbr(pre: &Dataset, post: &Dataset) -> Result<Array2<f64>> {
    let pre = nbr(pre)?;
    let post = nbr(post)?;
    ensure_same_shape(&pre, &post)?;
    Ok(pre - post)
}

pub(crate) fn ensure_same_shape(a: &Array2<f64>, b: &Array2<f64>) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(Error::ShapeMismatch {
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }
    Ok(())
}
