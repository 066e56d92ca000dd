use anyhow::Result;

pub const COLLECTION_ID: &str = "sentinel-2-c1-l2a";

pub const RED: &str = "red";
pub const GREEN: &str = "green";
pub const BLUE: &str = "blue";
pub const NIR: &str = "nir";
pub const SWIR22: &str = "swir22";

pub const TRUE_COLOR: [&str; 3] = [RED, GREEN, BLUE];

const STUDY_TEMPLATE: &str = r#"
id = "element84.sentinel2collection1level2a.ndvi"

name = "Summer vegetation over the Bulkley valley"

description = """
Level 2A product provides atmospherically corrected Surface Reflectance (SR) images,
derived from the associated Level-1C products. This study looks for low cloud
summer scenes over part of the Wet'suwet'en territory in northern British Columbia
and summarises vegetation vigour with NDVI."""

[catalog]
api = "https://earth-search.aws.element84.com/v1"
collection = "sentinel-2-c1-l2a"
docs = "https://sentinels.copernicus.eu/web/sentinel/sentinel-data-access/sentinel-products/sentinel-2-data-products/collection-1-level-2a"

[search]
bbox = [-127.20, 54.35, -126.80, 54.55]
datetime = "2023-06-01/2023-08-31"
max_cloud_cover = 10.0
max_items = 20
page_size = 50

[processing]
index = "ndvi"
resolution = 10.0
select_by = "eo:cloud_cover"
extra_bands = []

[output]
dir = "./img"
cache_dir = "./data"
"#;

/// The default study, parsed from the bundled template.
pub fn study_toml() -> Result<toml::Table> {
    let table: toml::Table = toml::from_str(STUDY_TEMPLATE)?;
    Ok(table)
}
