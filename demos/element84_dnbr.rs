use anyhow::Result;
use std::path::PathBuf;

extern crate spectral_stac;
use spectral_stac::dataset::Loader;
use spectral_stac::download_plan::DownloadPlan;
use spectral_stac::element84::sentinel2collection1level2a::{NIR, SWIR22};
use spectral_stac::element84::Provider;
use spectral_stac::grid::GeoBox;
use spectral_stac::indices::dnbr;
use spectral_stac::render::{colorize, write_png, write_tiff_f32, Colormap};
use spectral_stac::search::search;
use spectral_stac::selection::item_with_min_property;
use spectral_stac::study::{self, Study};
use stac::Item;

const PRE_FIRE: &str = "2023-06-01/2023-06-30";
const POST_FIRE: &str = "2023-09-01/2023-09-30";

async fn best_item(study: &Study, http: &reqwest::Client, datetime: &str) -> Result<Item> {
    let request = study.search_request()?.datetime(datetime);
    let results = search(http, &study.catalog.api, &request, study.search.max_items).await?;
    let item = item_with_min_property(&results.items, &study.processing.select_by)?;
    Ok(item.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    let output_dir = PathBuf::from("./outputs/element84");
    let cache_dir = output_dir.join("data");

    let study = study::template()?;
    let http = reqwest::Client::new();
    let pair = [
        best_item(&study, &http, PRE_FIRE).await?,
        best_item(&study, &http, POST_FIRE).await?,
    ];

    let bands = vec![NIR.to_string(), SWIR22.to_string()];
    let plan = DownloadPlan::for_items("element84.dnbr", &pair, &bands, &cache_dir)?;
    let provider = Provider::as_anon().await;
    plan.execute(&provider, &http).await?;

    let aoi = study.bbox()?;
    let geobox = GeoBox::from_bbox(&aoi, study.output_crs(&pair)?, study.processing.resolution)?;
    let loader = Loader::new(geobox, aoi, cache_dir);
    let values = dnbr(&loader.load(&pair[0], &bands)?, &loader.load(&pair[1], &bands)?)?;

    write_tiff_f32(&values, output_dir.join("dnbr.tif"))?;
    write_png(
        &colorize(&values, Colormap::RdYlGn, None),
        output_dir.join("dnbr.png"),
    )?;

    Ok(())
}
