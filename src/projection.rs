//! Coordinate reference systems used by Sentinel-2 products: geographic
//! EPSG:4326 and the WGS84 UTM zones (EPSG:326zz north, EPSG:327zz south).
use crate::error::{Error, Result};
use crate::geometry::Bbox;
use stac::Item;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Points sampled along each edge when projecting a bounding box.
const DENSIFY_POINTS: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    Wgs84,
    Utm { zone: u8, north: bool },
}

impl Crs {
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 => Ok(Self::Wgs84),
            32601..=32660 => Ok(Self::Utm { zone: (code - 32600) as u8, north: true }),
            32701..=32760 => Ok(Self::Utm { zone: (code - 32700) as u8, north: false }),
            _ => Err(Error::UnsupportedCrs(format!("EPSG:{code}"))),
        }
    }

    /// Parse codes of the form `EPSG:32609`.
    pub fn from_code(code: &str) -> Result<Self> {
        let epsg = code
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| Error::UnsupportedCrs(code.to_string()))?;
        Self::from_epsg(epsg)
    }

    /// Read the CRS from the projection extension, `proj:epsg` or `proj:code`.
    pub fn from_item(item: &Item) -> Result<Self> {
        let fields = &item.properties.additional_fields;
        if let Some(epsg) = fields.get("proj:epsg").and_then(|v| v.as_u64()) {
            return Self::from_epsg(epsg as u32);
        }
        if let Some(code) = fields.get("proj:code").and_then(|v| v.as_str()) {
            return Self::from_code(code);
        }
        Err(Error::UnsupportedCrs(format!("no projection on item {}", item.id)))
    }

    pub fn epsg(&self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::Utm { zone, north: true } => 32600 + *zone as u32,
            Self::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }

    pub fn from_lonlat(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::Wgs84 => (lon, lat),
            Self::Utm { zone, north } => utm_forward(*zone, *north, lon, lat),
        }
    }

    pub fn to_lonlat(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Wgs84 => (x, y),
            Self::Utm { zone, north } => utm_inverse(*zone, *north, x, y),
        }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

pub fn reproject(from: &Crs, to: &Crs, x: f64, y: f64) -> (f64, f64) {
    if from == to {
        return (x, y);
    }
    let (lon, lat) = from.to_lonlat(x, y);
    to.from_lonlat(lon, lat)
}

/// UTM zone covering a point, ignoring the Norway/Svalbard exceptions.
pub fn utm_zone_for(lon: f64, lat: f64) -> Crs {
    let zone = (((lon + 180.0) / 6.0).floor() as i32).clamp(0, 59) + 1;
    Crs::Utm { zone: zone as u8, north: lat >= 0.0 }
}

/// Envelope of a lon/lat box once projected, as (min_x, min_y, max_x, max_y).
/// Edges are densified since straight lines in degrees curve in UTM.
pub fn project_bbox(bbox: &Bbox, crs: &Crs) -> (f64, f64, f64, f64) {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    let steps = (DENSIFY_POINTS - 1) as f64;
    for i in 0..DENSIFY_POINTS {
        let t = i as f64 / steps;
        let lon = bbox.west + t * bbox.width();
        let lat = bbox.south + t * bbox.height();
        for (px, py) in [
            (lon, bbox.south),
            (lon, bbox.north),
            (bbox.west, lat),
            (bbox.east, lat),
        ] {
            let (x, y) = crs.from_lonlat(px, py);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    (min_x, min_y, max_x, max_y)
}

fn central_meridian(zone: u8) -> f64 {
    ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
}

fn utm_forward(zone: u8, north: bool, lon: f64, lat: f64) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let phi = lat.to_radians();
    let lambda = lon.to_radians();

    let (sin_phi, cos_phi) = phi.sin_cos();
    let tan_phi = phi.tan();
    let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lambda - central_meridian(zone));
    let m = meridian_arc(phi, e2);

    let x = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + UTM_FALSE_EASTING;
    let mut y = UTM_K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if !north {
        y += UTM_FALSE_NORTHING_SOUTH;
    }
    (x, y)
}

fn utm_inverse(zone: u8, north: bool, x: f64, y: f64) -> (f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let northing = if north { y } else { y - UTM_FALSE_NORTHING_SOUTH };
    let m = northing / UTM_K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sq = (1.0 - e2).sqrt();
    let e1 = (1.0 - sq) / (1.0 + sq);
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin_phi1, cos_phi1) = phi1.sin_cos();
    let tan_phi1 = phi1.tan();
    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let denom = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = WGS84_A / denom.sqrt();
    let r1 = WGS84_A * (1.0 - e2) / denom.powf(1.5);
    let d = (x - UTM_FALSE_EASTING) / (n1 * UTM_K0);

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d * d / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lambda = central_meridian(zone)
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    (lambda.to_degrees(), phi.to_degrees())
}

fn meridian_arc(phi: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}
