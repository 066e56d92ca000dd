use crate::error::{Error, Result};
use crate::geometry::Bbox;
use crate::projection::{project_bbox, Crs};

/// Affine pixel-to-world transform in the order used by the STAC projection
/// extension: `x = a * col + b * row + c`, `y = d * col + e * row + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub fn from_stac(values: &[f64]) -> Result<Self> {
        match values {
            [a, b, c, d, e, f, ..] => {
                let transform = Self { a: *a, b: *b, c: *c, d: *d, e: *e, f: *f };
                if transform.determinant() == 0.0 {
                    return Err(Error::InvalidTransform(format!("{values:?} is singular")));
                }
                Ok(transform)
            }
            _ => Err(Error::InvalidTransform(format!(
                "expected at least 6 values, got {}",
                values.len()
            ))),
        }
    }

    /// North-up transform with square pixels.
    pub fn north_up(origin_x: f64, origin_y: f64, resolution: f64) -> Self {
        Self { a: resolution, b: 0.0, c: origin_x, d: 0.0, e: -resolution, f: origin_y }
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    pub fn invert(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Self {
            a,
            b,
            c: -(a * self.c + b * self.f),
            d,
            e,
            f: -(d * self.c + e * self.f),
        })
    }

    pub fn resolution(&self) -> (f64, f64) {
        (self.a.hypot(self.d), self.b.hypot(self.e))
    }

    fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }
}

/// The raster grid every band of every item is resampled onto.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoBox {
    pub crs: Crs,
    pub transform: GeoTransform,
    pub height: usize,
    pub width: usize,
}

impl GeoBox {
    pub fn from_bbox(bbox: &Bbox, crs: Crs, resolution: f64) -> Result<Self> {
        if !(resolution > 0.0) {
            return Err(Error::InvalidTransform(format!(
                "resolution must be positive, got {resolution}"
            )));
        }
        let (min_x, min_y, max_x, max_y) = project_bbox(bbox, &crs);

        // Snap outward so pixel edges fall on multiples of the resolution
        let min_x = (min_x / resolution).floor() * resolution;
        let min_y = (min_y / resolution).floor() * resolution;
        let max_x = (max_x / resolution).ceil() * resolution;
        let max_y = (max_y / resolution).ceil() * resolution;

        let width = ((max_x - min_x) / resolution).round().max(1.0) as usize;
        let height = ((max_y - min_y) / resolution).round().max(1.0) as usize;

        Ok(Self {
            crs,
            transform: GeoTransform::north_up(min_x, max_y, resolution),
            height,
            width,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.apply(col as f64 + 0.5, row as f64 + 0.5)
    }
}
