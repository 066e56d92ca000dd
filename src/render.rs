//! Turning rasters into pictures (true colour composites, colour mapped
//! indices and overlays) plus plain float TIFF dumps of index values.
use crate::dataset::Dataset;
use crate::element84::sentinel2collection1level2a::TRUE_COLOR;
use crate::error::{Error, Result};
use anyhow::Context;
use clap::ValueEnum;
use image::{Rgba, RgbaImage};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};

/// Sentinel-2 L2A digital numbers are reflectance scaled by this factor.
const REFLECTANCE_SCALE: f64 = 10_000.0;
const DISPLAY_MIN: f64 = 0.0;
const DISPLAY_MAX: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Greens,
    Blues,
    #[value(name = "rdylgn")]
    RdYlGn,
    Viridis,
    Greys,
}

const GREENS: &[[u8; 3]] = &[
    [247, 252, 245], [229, 245, 224], [199, 233, 192], [161, 217, 155], [116, 196, 118],
    [65, 171, 93], [35, 139, 69], [0, 109, 44], [0, 68, 27],
];

const BLUES: &[[u8; 3]] = &[
    [247, 251, 255], [222, 235, 247], [198, 219, 239], [158, 202, 225], [107, 174, 214],
    [66, 146, 198], [33, 113, 181], [8, 81, 156], [8, 48, 107],
];

const RDYLGN: &[[u8; 3]] = &[
    [165, 0, 38], [215, 48, 39], [244, 109, 67], [253, 174, 97], [254, 224, 139],
    [255, 255, 191], [217, 239, 139], [166, 217, 106], [102, 189, 99], [26, 152, 80],
    [0, 104, 55],
];

const VIRIDIS: &[[u8; 3]] = &[
    [68, 1, 84], [72, 40, 120], [62, 73, 137], [49, 104, 142], [38, 130, 142],
    [31, 158, 137], [53, 183, 121], [110, 206, 88], [181, 222, 43], [253, 231, 37],
];

const GREYS: &[[u8; 3]] = &[
    [255, 255, 255], [240, 240, 240], [217, 217, 217], [189, 189, 189], [150, 150, 150],
    [115, 115, 115], [82, 82, 82], [37, 37, 37], [0, 0, 0],
];

impl Colormap {
    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            Self::Greens => GREENS,
            Self::Blues => BLUES,
            Self::RdYlGn => RDYLGN,
            Self::Viridis => VIRIDIS,
            Self::Greys => GREYS,
        }
    }

    /// Colour at `t` in [0, 1], linearly interpolated between stops.
    pub fn sample(&self, t: f64) -> [u8; 3] {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let position = t * (stops.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = (lower + 1).min(stops.len() - 1);
        let frac = position - lower as f64;
        let mut rgb = [0u8; 3];
        for (channel, out) in rgb.iter_mut().enumerate() {
            let a = stops[lower][channel] as f64;
            let b = stops[upper][channel] as f64;
            *out = (a + (b - a) * frac).round() as u8;
        }
        rgb
    }
}

pub fn s2_reflectance_to_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    ((value / REFLECTANCE_SCALE - DISPLAY_MIN) / (DISPLAY_MAX - DISPLAY_MIN)).clamp(0.0, 1.0)
}

/// Red, green and blue bands stacked as `(rows, cols, 3)` in [0, 1].
pub fn true_color(data: &Dataset) -> Result<Array3<f64>> {
    let (rows, cols) = data.geobox().shape();
    let mut rgb = Array3::zeros((rows, cols, 3));
    for (channel, band) in TRUE_COLOR.iter().enumerate() {
        let values = data.band(band)?;
        for ((row, col), value) in values.indexed_iter() {
            rgb[[row, col, channel]] = s2_reflectance_to_unit(*value);
        }
    }
    Ok(rgb)
}

pub fn rgb_image(rgb: &Array3<f64>) -> RgbaImage {
    let (rows, cols, _) = rgb.dim();
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let (row, col) = (y as usize, x as usize);
        let channel = |c: usize| (rgb[[row, col, c]].clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([channel(0), channel(1), channel(2), 255])
    })
}

/// Min and max over finite values.
pub fn value_range(data: &Array2<f64>) -> Option<(f64, f64)> {
    data.iter()
        .filter(|v| v.is_finite())
        .fold(None, |range, &v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Colour map an index raster. Without an explicit range the finite min/max
/// of the data is used. Non-finite pixels are transparent.
pub fn colorize(data: &Array2<f64>, colormap: Colormap, range: Option<(f64, f64)>) -> RgbaImage {
    let (lo, hi) = range.or_else(|| value_range(data)).unwrap_or((0.0, 1.0));
    let span = if hi > lo { hi - lo } else { 1.0 };
    let (rows, cols) = data.dim();
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = data[[y as usize, x as usize]];
        if !value.is_finite() {
            return Rgba([0, 0, 0, 0]);
        }
        let [r, g, b] = colormap.sample((value - lo) / span);
        Rgba([r, g, b, 255])
    })
}

/// Blend `layer` over `base` with the given opacity, honouring the layer's
/// own transparency.
pub fn overlay(base: &RgbaImage, layer: &RgbaImage, alpha: f64) -> Result<RgbaImage> {
    if base.dimensions() != layer.dimensions() {
        let (bw, bh) = base.dimensions();
        let (lw, lh) = layer.dimensions();
        return Err(Error::ShapeMismatch {
            left: vec![bh as usize, bw as usize],
            right: vec![lh as usize, lw as usize],
        });
    }
    let alpha = alpha.clamp(0.0, 1.0);
    Ok(RgbaImage::from_fn(base.width(), base.height(), |x, y| {
        let under = base.get_pixel(x, y);
        let over = layer.get_pixel(x, y);
        let weight = alpha * over[3] as f64 / 255.0;
        let mix = |c: usize| (over[c] as f64 * weight + under[c] as f64 * (1.0 - weight)).round() as u8;
        Rgba([mix(0), mix(1), mix(2), under[3]])
    }))
}

pub fn write_png<P: AsRef<Path>>(image: &RgbaImage, path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save(path)
        .with_context(|| format!("Unable to write {}", path.display()))?;
    Ok(())
}

/// Dump index values as a single band float32 TIFF.
pub fn write_tiff_f32<P: AsRef<Path>>(data: &Array2<f64>, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let (rows, cols) = data.dim();
    let values: Vec<f32> = data.iter().map(|&v| v as f32).collect();
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    encoder.write_image::<colortype::Gray32Float>(cols as u32, rows as u32, &values)?;
    Ok(())
}
