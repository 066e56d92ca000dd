use crate::error::{Error, Result};
use stac::Item;

pub const DEFAULT_PROPERTY: &str = "eo:cloud_cover";

pub fn numeric_property(item: &Item, property: &str) -> Option<f64> {
    item.properties.additional_fields.get(property)?.as_f64()
}

/// The item with the smallest value of a numeric property, e.g. the least
/// cloudy scene. Ties keep the earliest item.
pub fn item_with_min_property<'a>(items: &'a [Item], property: &str) -> Result<&'a Item> {
    let mut best: Option<(&Item, f64)> = None;
    for item in items {
        let value = numeric_property(item, property).ok_or_else(|| Error::MissingProperty {
            item: item.id.clone(),
            property: property.to_string(),
        })?;
        if best.map_or(true, |(_, min)| value < min) {
            best = Some((item, value));
        }
    }
    best.map(|(item, _)| item).ok_or(Error::EmptySearch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::item_with_geometry;
    use serde_json::json;

    fn item(id: &str, cloud_cover: Option<f64>) -> Item {
        let mut item = item_with_geometry(id, json!({"type": "Point", "coordinates": [0.0, 0.0]}));
        if let Some(cc) = cloud_cover {
            item.properties
                .additional_fields
                .insert(DEFAULT_PROPERTY.to_string(), json!(cc));
        }
        item
    }

    #[test]
    fn test_min_cloud_cover() {
        let items = vec![item("a", Some(12.5)), item("b", Some(0.4)), item("c", Some(3.0))];
        assert_eq!(item_with_min_property(&items, DEFAULT_PROPERTY).unwrap().id, "b");
    }

    #[test]
    fn test_ties_keep_first() {
        let items = vec![item("a", Some(1.0)), item("b", Some(1.0))];
        assert_eq!(item_with_min_property(&items, DEFAULT_PROPERTY).unwrap().id, "a");
    }

    #[test]
    fn test_missing_property_and_empty_input() {
        let items = vec![item("a", Some(1.0)), item("b", None)];
        assert!(matches!(
            item_with_min_property(&items, DEFAULT_PROPERTY),
            Err(Error::MissingProperty { .. })
        ));
        assert!(matches!(
            item_with_min_property(&[], DEFAULT_PROPERTY),
            Err(Error::EmptySearch)
        ));
    }
}
