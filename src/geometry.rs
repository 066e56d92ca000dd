//! Footprints, bounding boxes and their intersections, all in EPSG:4326 degrees.
use crate::error::{Error, Result};
use geo::{BooleanOps, BoundingRect, Coord, GeodesicArea, LineString, MultiPolygon, Polygon, Rect};
use serde_json::Value;
use stac::Item;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bbox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        let values = [west, south, east, north];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidBbox(format!("{values:?} contains non-finite values")));
        }
        if west >= east || south >= north {
            return Err(Error::InvalidBbox(format!(
                "{values:?} must be ordered as [west, south, east, north]"
            )));
        }
        if west < -180.0 || east > 180.0 || south < -90.0 || north > 90.0 {
            return Err(Error::InvalidBbox(format!("{values:?} is outside lon/lat range")));
        }
        Ok(Self { west, south, east, north })
    }

    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [west, south, east, north] => Self::new(*west, *south, *east, *north),
            _ => Err(Error::InvalidBbox(format!(
                "expected 4 values, got {}",
                values.len()
            ))),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.west, self.south, self.east, self.north]
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            Coord { x: self.west, y: self.south },
            Coord { x: self.east, y: self.north },
        )
        .to_polygon()
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }
}

/// Build the footprint of an item from its GeoJSON geometry. Only exterior
/// rings are kept.
pub fn footprint(item: &Item) -> Result<MultiPolygon<f64>> {
    let geometry = serde_json::to_value(&item.geometry)
        .map_err(|_| Error::InvalidGeometry(item.id.clone()))?;
    parse_geometry(&geometry).ok_or_else(|| Error::InvalidGeometry(item.id.clone()))
}

fn parse_geometry(geometry: &Value) -> Option<MultiPolygon<f64>> {
    let coordinates = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => Some(MultiPolygon::new(vec![parse_polygon(coordinates)?])),
        "MultiPolygon" => {
            let polygons = coordinates
                .as_array()?
                .iter()
                .map(parse_polygon)
                .collect::<Option<Vec<_>>>()?;
            Some(MultiPolygon::new(polygons))
        }
        _ => None,
    }
}

fn parse_polygon(rings: &Value) -> Option<Polygon<f64>> {
    let exterior = rings.as_array()?.first()?.as_array()?;
    let coords = exterior
        .iter()
        .map(|position| {
            let position = position.as_array()?;
            Some(Coord {
                x: position.first()?.as_f64()?,
                y: position.get(1)?.as_f64()?,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    if coords.len() < 3 {
        return None;
    }
    Some(Polygon::new(LineString::new(coords), vec![]))
}

/// The part of an item's footprint that falls inside the area of interest.
pub fn intersection(item: &Item, bbox: &Bbox) -> Result<MultiPolygon<f64>> {
    let footprint = footprint(item)?;
    let aoi = MultiPolygon::new(vec![bbox.to_polygon()]);
    let clipped = footprint.intersection(&aoi);
    if clipped.0.is_empty() {
        return Err(Error::NoOverlap(item.id.clone()));
    }
    Ok(clipped)
}

pub fn bounds(shape: &MultiPolygon<f64>) -> Option<Bbox> {
    let rect = shape.bounding_rect()?;
    Bbox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y).ok()
}

pub fn area_km2(shape: &MultiPolygon<f64>) -> f64 {
    shape.geodesic_area_unsigned() / 1.0e6
}
