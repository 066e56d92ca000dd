use crate::geometry::{area_km2, footprint};
use crate::search::SearchResults;
use crate::selection::numeric_property;
use stac::Item;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub id: String,
    pub datetime: Option<String>,
    pub cloud_cover: Option<f64>,
    pub nodata_pixels: Option<f64>,
    pub degraded_data: Option<f64>,
    pub area_km2: Option<f64>,
}

impl ItemSummary {
    pub fn from_item(item: &Item) -> Self {
        let datetime = serde_json::to_value(&item.properties)
            .ok()
            .and_then(|p| p.get("datetime")?.as_str().map(str::to_string));
        Self {
            id: item.id.clone(),
            datetime,
            cloud_cover: numeric_property(item, "eo:cloud_cover"),
            nodata_pixels: numeric_property(item, "s2:nodata_pixel_percentage"),
            degraded_data: numeric_property(item, "s2:degraded_msi_data_percentage"),
            area_km2: footprint(item).ok().map(|f| area_km2(&f)),
        }
    }
}

struct Rounded(Option<f64>);

impl fmt::Display for Rounded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value:.2}"),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for ItemSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, " Date: {}", self.datetime.as_deref().unwrap_or("n/a"))?;
        writeln!(f, " Cloud cover (%): {}", Rounded(self.cloud_cover))?;
        writeln!(f, " Missing pixels (%): {}", Rounded(self.nodata_pixels))?;
        writeln!(f, " Missing band data (%): {}", Rounded(self.degraded_data))?;
        writeln!(f, " Image area (km^2): {}", Rounded(self.area_km2))
    }
}

pub fn print_search_summary(results: &SearchResults) {
    println!("{} items found:\n", results.matched);
    for item in &results.items {
        println!("{}", ItemSummary::from_item(item));
    }
}

/// Asset keys and titles; assets without a title get an empty one.
pub fn asset_listing(item: &Item) -> Vec<(String, String)> {
    item.assets
        .iter()
        .map(|(key, asset)| (key.clone(), asset.title.clone().unwrap_or_default()))
        .collect()
}

pub fn print_assets(item: &Item) {
    for (key, title) in asset_listing(item) {
        println!("{} | {}", key, title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::tests::item_with_geometry;
    use serde_json::json;

    fn scene() -> Item {
        let mut item = item_with_geometry(
            "S2B_T09UWA_20230715_L2A",
            json!({
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]]]
            }),
        );
        let fields = &mut item.properties.additional_fields;
        fields.insert("eo:cloud_cover".into(), json!(7.256));
        fields.insert("s2:nodata_pixel_percentage".into(), json!(0.0));
        item
    }

    #[test]
    fn test_summary_fields() {
        let summary = ItemSummary::from_item(&scene());
        assert_eq!(summary.cloud_cover, Some(7.256));
        assert_eq!(summary.degraded_data, None);
        assert_eq!(summary.datetime.as_deref(), Some("2023-07-15T19:20:00Z"));
        assert!(summary.area_km2.unwrap() > 12_000.0);
    }

    #[test]
    fn test_summary_display() {
        let text = ItemSummary::from_item(&scene()).to_string();
        assert!(text.starts_with("ID: S2B_T09UWA_20230715_L2A\n"));
        assert!(text.contains(" Cloud cover (%): 7.26\n"));
        assert!(text.contains(" Missing band data (%): n/a\n"));
    }

    #[test]
    fn test_asset_listing() {
        let mut item = scene();
        let mut red = stac::Asset::new("https://example.com/B04.tif");
        red.title = Some("Red - 10m".to_string());
        item.assets.insert("red".to_string(), red);
        item.assets
            .insert("thumbnail".to_string(), stac::Asset::new("https://example.com/thumb.jpg"));
        let mut listing = asset_listing(&item);
        listing.sort();
        assert_eq!(
            listing,
            vec![
                ("red".to_string(), "Red - 10m".to_string()),
                ("thumbnail".to_string(), String::new())
            ]
        );
    }
}
