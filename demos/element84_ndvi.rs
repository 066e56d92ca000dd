use anyhow::Result;
use std::path::PathBuf;

extern crate spectral_stac;
use spectral_stac::dataset::Loader;
use spectral_stac::download_plan::DownloadPlan;
use spectral_stac::element84::Provider;
use spectral_stac::grid::GeoBox;
use spectral_stac::indices::ndvi;
use spectral_stac::render::{colorize, write_png, Colormap};
use spectral_stac::search::search;
use spectral_stac::selection::item_with_min_property;
use spectral_stac::study::{self, Study};
use spectral_stac::summary::print_search_summary;

#[tokio::main]
async fn main() -> Result<()> {
    let output_dir = PathBuf::from("./outputs/element84");

    let study = study::template()?;
    let http = reqwest::Client::new();
    let results = search(
        &http,
        &study.catalog.api,
        &study.search_request()?,
        study.search.max_items,
    )
    .await?;
    print_search_summary(&results);

    let item = item_with_min_property(&results.items, &study.processing.select_by)?;
    let items = std::slice::from_ref(item);
    let bands = study.bands();

    let cache_dir = output_dir.join("data");
    let plan = DownloadPlan::for_items(&study.id, items, &bands, &cache_dir)?;
    plan.write(output_dir.join("download_plan.json"))?;
    let provider = Provider::as_anon().await;
    plan.execute(&provider, &http).await?;

    let aoi = study.bbox()?;
    let geobox = GeoBox::from_bbox(&aoi, study.output_crs(items)?, study.processing.resolution)?;
    let data = Loader::new(geobox, aoi, cache_dir).load(item, &bands)?;
    let values = ndvi(&data)?;
    write_png(
        &colorize(&values, Colormap::Greens, Some((-1.0, 1.0))),
        output_dir.join(format!("{}_ndvi.png", item.id)),
    )?;

    Ok(())
}
