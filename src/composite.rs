use crate::dataset::{Dataset, Loader};
use crate::error::{Error, Result};
use crate::indices::ensure_same_shape;
use ndarray::Array2;
use stac::Item;
use std::fmt;
use tracing::{info, warn};

/// Load every item and apply `index` to it. Items that do not overlap the
/// area of interest are skipped.
pub fn index_over_items<F>(
    loader: &Loader,
    items: &[Item],
    bands: &[String],
    index: F,
) -> Result<Vec<Array2<f64>>>
where
    F: Fn(&Dataset) -> Result<Array2<f64>>,
{
    let n_items = items.len();
    let mut results = Vec::with_capacity(n_items);
    for (idx, item) in items.iter().enumerate() {
        info!("Processing item {} out of {}", idx + 1, n_items);
        let data = match loader.load(item, bands) {
            Ok(data) => data,
            Err(Error::NoOverlap(id)) => {
                warn!("Skipping {}, it does not overlap the area of interest", id);
                continue;
            }
            Err(e) => return Err(e),
        };
        results.push(index(&data)?);
    }
    Ok(results)
}

/// Per-pixel median across a stack of rasters, ignoring NaN. Pixels with no
/// valid value in any layer stay NaN.
pub fn median_composite(stack: &[Array2<f64>]) -> Result<Array2<f64>> {
    let first = stack.first().ok_or(Error::EmptySearch)?;
    for layer in &stack[1..] {
        ensure_same_shape(first, layer)?;
    }

    info!("Calculating the medians of {} images", stack.len());
    let mut values: Vec<f64> = Vec::with_capacity(stack.len());
    Ok(Array2::from_shape_fn(first.dim(), |(row, col)| {
        values.clear();
        values.extend(
            stack
                .iter()
                .map(|layer| layer[[row, col]])
                .filter(|v| !v.is_nan()),
        );
        median(&mut values)
    }))
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid: usize,
    pub total: usize,
}

impl IndexStats {
    /// Statistics over finite values; `None` when there are none.
    pub fn from_array(data: &Array2<f64>) -> Option<Self> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut valid = 0;
        for &value in data.iter().filter(|v| v.is_finite()) {
            min = min.min(value);
            max = max.max(value);
            sum += value;
            valid += 1;
        }
        if valid == 0 {
            return None;
        }
        Some(Self {
            min,
            max,
            mean: sum / valid as f64,
            valid,
            total: data.len(),
        })
    }
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {:.4}, max {:.4}, mean {:.4} over {} of {} pixels",
            self.min, self.max, self.mean, self.valid, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::gradient_item;
    use crate::geometry::Bbox;
    use crate::grid::GeoBox;
    use crate::indices::SpectralIndex;
    use crate::projection::Crs;
    use ndarray::array;

    #[test]
    fn test_median_skips_nan() {
        let nan = f64::NAN;
        let stack = vec![
            array![[1.0, nan], [4.0, nan]],
            array![[3.0, 2.0], [1.0, nan]],
            array![[2.0, nan], [nan, nan]],
        ];
        let median = median_composite(&stack).unwrap();
        assert_eq!(median[[0, 0]], 2.0);
        assert_eq!(median[[0, 1]], 2.0);
        assert_eq!(median[[1, 0]], 2.5);
        assert!(median[[1, 1]].is_nan());
    }

    #[test]
    fn test_median_errors() {
        assert!(matches!(median_composite(&[]), Err(Error::EmptySearch)));
        let stack = vec![Array2::zeros((2, 2)), Array2::zeros((2, 3))];
        assert!(matches!(
            median_composite(&stack),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_stats() {
        let stats = IndexStats::from_array(&array![[0.5, f64::NAN], [-0.5, 1.0]]).unwrap();
        assert_eq!(stats.min, -0.5);
        assert_eq!(stats.max, 1.0);
        assert!((stats.mean - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!((stats.valid, stats.total), (3, 4));
        assert!(IndexStats::from_array(&array![[f64::NAN]]).is_none());
    }

    #[test]
    fn test_index_over_items_skips_disjoint_items() {
        let dir = tempfile::tempdir().unwrap();
        let inside = gradient_item(dir.path(), "inside", &["red", "nir"]);
        let outside: Item = serde_json::from_value(serde_json::json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "stac_extensions": [],
            "id": "outside",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[50.0, 50.0], [51.0, 50.0], [51.0, 51.0], [50.0, 50.0]]]
            },
            "bbox": [50.0, 50.0, 51.0, 51.0],
            "properties": {"datetime": "2023-07-15T19:20:00Z"},
            "links": [],
            "assets": {}
        }))
        .unwrap();

        let aoi = Bbox::new(10.0, 20.0, 10.6, 20.5).unwrap();
        let geobox = GeoBox::from_bbox(&aoi, Crs::Wgs84, 0.1).unwrap();
        let loader = Loader::new(geobox, aoi, dir.path().to_path_buf());
        let bands = vec!["nir".to_string(), "red".to_string()];

        let results = index_over_items(&loader, &[inside, outside], &bands, |data| {
            SpectralIndex::Ndvi.compute(data)
        })
        .unwrap();
        assert_eq!(results.len(), 1);
        // Both bands read the same file, so NDVI is 0 wherever data exists
        assert_eq!(results[0][[2, 2]], 0.0);
        assert!(results[0][[0, 0]].is_nan());
    }
}
