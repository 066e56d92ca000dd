use crate::download_plan::local_asset_path;
use crate::error::{Error, Result};
use crate::geometry::{self, Bbox};
use crate::grid::{GeoBox, GeoTransform};
use crate::projection::{project_bbox, reproject, Crs};
use crate::raster::{self, PixelWindow};
use ndarray::Array2;
use stac::{Asset, Item};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Sentinel-2 L2A assets mark missing pixels with 0.
const DEFAULT_NODATA: f64 = 0.0;

/// Bands of a single item resampled onto a shared grid. Missing pixels are NaN.
#[derive(Debug, Clone)]
pub struct Dataset {
    item_id: String,
    geobox: GeoBox,
    bands: BTreeMap<String, Array2<f64>>,
}

impl Dataset {
    pub fn new(item_id: &str, geobox: GeoBox) -> Self {
        Self {
            item_id: item_id.to_string(),
            geobox,
            bands: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, data: Array2<f64>) -> Result<()> {
        let expected = self.geobox.shape();
        if data.dim() != expected {
            return Err(Error::ShapeMismatch {
                left: vec![expected.0, expected.1],
                right: data.shape().to_vec(),
            });
        }
        self.bands.insert(name.to_string(), data);
        Ok(())
    }

    pub fn band(&self, name: &str) -> Result<&Array2<f64>> {
        self.bands
            .get(name)
            .ok_or_else(|| Error::MissingBand(name.to_string()))
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.keys().map(String::as_str).collect()
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }
}

/// Loads item bands from the local asset cache onto a common grid, cropped to
/// the part of each item's footprint inside the area of interest.
#[derive(Debug, Clone)]
pub struct Loader {
    pub geobox: GeoBox,
    pub aoi: Bbox,
    pub cache_dir: PathBuf,
}

struct BandSource {
    inverse: GeoTransform,
    window: PixelWindow,
    data: Array2<f64>,
}

impl Loader {
    pub fn new(geobox: GeoBox, aoi: Bbox, cache_dir: PathBuf) -> Self {
        Self { geobox, aoi, cache_dir }
    }

    pub fn load(&self, item: &Item, bands: &[String]) -> Result<Dataset> {
        let clipped = geometry::intersection(item, &self.aoi)?;
        let clip = geometry::bounds(&clipped).ok_or_else(|| Error::NoOverlap(item.id.clone()))?;
        let crs = Crs::from_item(item)?;

        let sources = bands
            .iter()
            .map(|band| self.open_band(item, band, &crs, &clip))
            .collect::<Result<Vec<_>>>()?;

        let shape = self.geobox.shape();
        let mut arrays = vec![Array2::from_elem(shape, f64::NAN); sources.len()];
        for row in 0..shape.0 {
            for col in 0..shape.1 {
                let (x, y) = self.geobox.pixel_center(row, col);
                let (sx, sy) = reproject(&self.geobox.crs, &crs, x, y);
                for (source, array) in sources.iter().zip(arrays.iter_mut()) {
                    if let Some(value) = source.sample(sx, sy) {
                        array[[row, col]] = value;
                    }
                }
            }
        }

        let mut dataset = Dataset::new(&item.id, self.geobox.clone());
        for (band, array) in bands.iter().zip(arrays) {
            dataset.insert(band, array)?;
        }
        Ok(dataset)
    }

    fn open_band(&self, item: &Item, band: &str, crs: &Crs, clip: &Bbox) -> Result<BandSource> {
        let asset = item.assets.get(band).ok_or_else(|| Error::MissingAsset {
            item: item.id.clone(),
            key: band.to_string(),
        })?;
        let transform = asset_transform(asset)?;
        let inverse = transform
            .invert()
            .ok_or_else(|| Error::InvalidTransform(format!("{band} on {}", item.id)))?;

        let (min_x, min_y, max_x, max_y) = project_bbox(clip, crs);
        let corners = [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)]
            .map(|(x, y)| inverse.apply(x, y));
        let col_min = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let col_max = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let row_min = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let row_max = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
        let window = PixelWindow::from_bounds(col_min, row_min, col_max, row_max);

        let path = local_asset_path(&self.cache_dir, &item.id, &asset.href).ok_or_else(|| {
            Error::MissingAsset {
                item: item.id.clone(),
                key: asset.href.clone(),
            }
        })?;
        debug!("Loading {} of {} from {}", band, item.id, path.display());

        let nodata = asset_nodata(asset).unwrap_or(DEFAULT_NODATA);
        let (window, data) = raster::read_window(&path, window, Some(nodata))?;
        Ok(BandSource { inverse, window, data })
    }
}

impl BandSource {
    fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (col, row) = self.inverse.apply(x, y);
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        if !self.window.contains(col, row) {
            return None;
        }
        self.data
            .get([row - self.window.row_off, col - self.window.col_off])
            .copied()
    }
}

fn asset_transform(asset: &Asset) -> Result<GeoTransform> {
    let values = asset
        .additional_fields
        .get("proj:transform")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::InvalidTransform(format!("no proj:transform on {}", asset.href)))?
        .iter()
        .map(|v| v.as_f64())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::InvalidTransform(format!("non-numeric proj:transform on {}", asset.href)))?;
    GeoTransform::from_stac(&values)
}

fn asset_nodata(asset: &Asset) -> Option<f64> {
    asset
        .additional_fields
        .get("raster:bands")?
        .as_array()?
        .first()?
        .get("nodata")?
        .as_f64()
}
