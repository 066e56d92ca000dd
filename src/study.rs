use crate::element84::sentinel2collection1level2a;
use crate::error::Error;
use crate::geometry::Bbox;
use crate::indices::SpectralIndex;
use crate::projection::{utm_zone_for, Crs};
use crate::render::Colormap;
use crate::search::SearchRequest;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use stac::Item;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything needed to go from a STAC search to index images.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Study {
    pub id: String,
    pub name: String,
    pub description: String,
    pub catalog: Catalog,
    pub search: SearchSettings,
    pub processing: Processing,
    pub output: Output,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Catalog {
    pub api: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SearchSettings {
    pub bbox: Vec<f64>,
    pub datetime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cloud_cover: Option<f64>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Processing {
    pub index: SpectralIndex,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    /// Output grid CRS; the first item's CRS when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsg: Option<u32>,
    #[serde(default = "default_select_by")]
    pub select_by: String,
    #[serde(default)]
    pub extra_bands: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Output {
    pub dir: PathBuf,
    pub cache_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap: Option<Colormap>,
}

fn default_max_items() -> usize {
    20
}

fn default_page_size() -> usize {
    50
}

fn default_resolution() -> f64 {
    10.0
}

fn default_select_by() -> String {
    "eo:cloud_cover".to_string()
}

/// The default study: low cloud summer Sentinel-2 scenes over northern
/// British Columbia on Earth Search, mapped with NDVI.
pub fn template() -> Result<Study> {
    Study::from_template(&sentinel2collection1level2a::study_toml()?)
}

impl Study {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Unable to read study {}: {}", path.display(), e))?;
        let study: Self = toml::from_str(&content)?;
        study.validate()?;
        Ok(study)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        let study: Self = toml::from_str(&table.to_string())?;
        study.validate()?;
        Ok(study)
    }

    pub fn validate(&self) -> Result<()> {
        self.bbox()?;
        if !(self.processing.resolution > 0.0) {
            return Err(anyhow!(
                "Resolution must be positive, got {}",
                self.processing.resolution
            ));
        }
        if self.search.max_items == 0 || self.search.page_size == 0 {
            return Err(anyhow!("max_items and page_size must be at least 1"));
        }
        if let Some(epsg) = self.processing.epsg {
            Crs::from_epsg(epsg)?;
        }
        Ok(())
    }

    pub fn bbox(&self) -> Result<Bbox, Error> {
        Bbox::from_slice(&self.search.bbox)
    }

    pub fn search_request(&self) -> Result<SearchRequest> {
        let mut request = SearchRequest::new(&self.catalog.collection)
            .bbox(self.bbox()?)
            .datetime(&self.search.datetime)
            .limit(self.search.page_size);
        if let Some(max_cloud_cover) = self.search.max_cloud_cover {
            request = request.max_cloud_cover(max_cloud_cover);
        }
        Ok(request)
    }

    /// Bands needed for the configured index followed by any extra bands,
    /// without duplicates.
    pub fn bands(&self) -> Vec<String> {
        let mut bands: Vec<String> = vec![];
        let required = self.processing.index.bands().map(str::to_string);
        for band in required.into_iter().chain(self.processing.extra_bands.iter().cloned()) {
            if !bands.contains(&band) {
                bands.push(band);
            }
        }
        bands
    }

    /// CRS of the output grid: the configured EPSG code, else the CRS of the
    /// first item, else the UTM zone at the centre of the bbox.
    pub fn output_crs(&self, items: &[Item]) -> Result<Crs> {
        if let Some(epsg) = self.processing.epsg {
            return Ok(Crs::from_epsg(epsg)?);
        }
        if let Some(crs) = items.first().and_then(|item| Crs::from_item(item).ok()) {
            return Ok(crs);
        }
        let bbox = self.bbox()?;
        Ok(utm_zone_for(
            bbox.west + bbox.width() / 2.0,
            bbox.south + bbox.height() / 2.0,
        ))
    }

    pub fn colormap(&self) -> Colormap {
        self.output
            .colormap
            .unwrap_or_else(|| self.processing.index.default_colormap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Study {
        super::template().unwrap()
    }

    #[test]
    fn test_template() {
        let study = template();
        assert_eq!(study.id, "element84.sentinel2collection1level2a.ndvi");
        assert_eq!(study.catalog.collection, "sentinel-2-c1-l2a");
        assert_eq!(study.processing.index, SpectralIndex::Ndvi);
        assert_eq!(study.bands(), vec!["nir", "red"]);
        assert_eq!(study.colormap(), Colormap::Greens);
    }

    #[test]
    fn test_write_and_read_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inputs").join("study.toml");
        template().write(&path).unwrap();

        let study = Study::read(&path).unwrap();
        assert_eq!(study.id, "element84.sentinel2collection1level2a.ndvi");
        assert_eq!(study.search.max_cloud_cover, Some(10.0));
        assert_eq!(study.search.bbox.len(), 4);
    }

    #[test]
    fn test_extra_bands_are_deduplicated() {
        let mut study = template();
        study.processing.extra_bands = vec!["red".into(), "green".into(), "blue".into()];
        assert_eq!(study.bands(), vec!["nir", "red", "green", "blue"]);
    }

    #[test]
    fn test_invalid_bbox_rejected() {
        let mut table = sentinel2collection1level2a::study_toml().unwrap();
        let search = table
            .get_mut("search")
            .and_then(|s| s.as_table_mut())
            .unwrap();
        search.insert(
            "bbox".into(),
            toml::Value::Array(vec![1.0.into(), 1.0.into(), 0.0.into(), 0.0.into()]),
        );
        assert!(Study::from_template(&table).is_err());
    }

    #[test]
    fn test_output_crs_falls_back_to_utm_zone() {
        let study = template();
        assert_eq!(study.output_crs(&[]).unwrap(), Crs::Utm { zone: 9, north: true });
    }
}
