use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use ndarray::Array2;
use spectral_stac::composite::{index_over_items, median_composite, IndexStats};
use spectral_stac::dataset::Loader;
use spectral_stac::download_plan::DownloadPlan;
use spectral_stac::element84::sentinel2collection1level2a::TRUE_COLOR;
use spectral_stac::element84::Provider;
use spectral_stac::error::Error;
use spectral_stac::grid::GeoBox;
use spectral_stac::indices::{dnbr, SpectralIndex};
use spectral_stac::logging;
use spectral_stac::render::{colorize, overlay, rgb_image, true_color, write_png, write_tiff_f32, Colormap};
use spectral_stac::search::{read_items, search, write_items, SearchResults};
use spectral_stac::selection::item_with_min_property;
use spectral_stac::study::{self, Study};
use spectral_stac::summary::{print_assets, print_search_summary};
use stac::Item;
use std::path::PathBuf;
use std::slice;
use tracing::{info, warn};

const OVERLAY_ALPHA: f64 = 0.5;

#[derive(Parser)]
#[command(name = "spectral-stac")]
#[command(version, about = "Search Sentinel-2 scenes on a STAC API and map spectral indices")]
struct Cli {
    /// Study configuration
    #[arg(long, global = true, default_value = "./inputs/study.toml")]
    study: PathBuf,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// AWS profile for S3 downloads, anonymous access when unset
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ItemSource {
    /// Use items saved by `search --save` instead of searching again
    #[arg(long, value_name = "FILE")]
    items: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default study to a TOML file
    Template { path: PathBuf },
    /// Search the catalog and summarise matching items
    Search {
        /// Save the items as a GeoJSON feature collection
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
        #[command(flatten)]
        source: ItemSource,
    },
    /// List the assets of an item
    Assets {
        /// Item id, defaults to the item minimising `select_by`
        #[arg(long)]
        item: Option<String>,
        #[command(flatten)]
        source: ItemSource,
    },
    /// Write the download plan for the study bands
    Plan {
        #[command(flatten)]
        source: ItemSource,
    },
    /// Write and execute the download plan
    Download {
        #[command(flatten)]
        source: ItemSource,
    },
    /// Compute the study index on a single item
    Index {
        /// Item id, defaults to the item minimising `select_by`
        #[arg(long)]
        item: Option<String>,
        /// Also write the true colour image and the index overlaid on it
        #[arg(long)]
        rgb: bool,
        #[command(flatten)]
        source: ItemSource,
    },
    /// Median of the study index over every item
    Composite {
        #[command(flatten)]
        source: ItemSource,
    },
    /// Difference in NBR between the best scenes before and after an event
    Dnbr {
        /// Datetime or interval to search before the event
        #[arg(long)]
        pre: String,
        /// Datetime or interval to search after the event
        #[arg(long)]
        post: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Command::Template { path } = &cli.command {
        study::template()?.write(path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let study = Study::read(&cli.study).with_context(|| {
        format!(
            "No usable study at {}, create one with `spectral-stac template {}`",
            cli.study.display(),
            cli.study.display()
        )
    })?;
    let http = reqwest::Client::new();
    let session = Session {
        study,
        http,
        profile: cli.profile,
    };

    match cli.command {
        Command::Template { .. } => Ok(()),
        Command::Search { save, source } => {
            let results = session.find_items(&source).await?;
            print_search_summary(&results);
            if let Some(path) = save {
                write_items(&path, &results.items)?;
                info!("Saved {} items to {}", results.items.len(), path.display());
            }
            Ok(())
        }
        Command::Assets { item, source } => {
            let items = session.require_items(&source).await?;
            print_assets(session.pick_item(&items, item.as_deref())?);
            Ok(())
        }
        Command::Plan { source } => {
            let items = session.require_items(&source).await?;
            session.plan(&items, &session.study.bands())?;
            Ok(())
        }
        Command::Download { source } => {
            let items = session.require_items(&source).await?;
            session.download(&items, &session.study.bands()).await
        }
        Command::Index { item, rgb, source } => {
            let items = session.require_items(&source).await?;
            let item = session.pick_item(&items, item.as_deref())?;
            session.index(item, rgb).await
        }
        Command::Composite { source } => {
            let items = session.require_items(&source).await?;
            session.composite(&items).await
        }
        Command::Dnbr { pre, post } => session.dnbr(&pre, &post).await,
    }
}

struct Session {
    study: Study,
    http: reqwest::Client,
    profile: Option<String>,
}

impl Session {
    async fn find_items(&self, source: &ItemSource) -> Result<SearchResults> {
        if let Some(path) = &source.items {
            let items = read_items(path)?;
            info!("Read {} items from {}", items.len(), path.display());
            return Ok(SearchResults {
                matched: items.len() as u64,
                items,
            });
        }
        self.search(&self.study.search.datetime).await
    }

    async fn search(&self, datetime: &str) -> Result<SearchResults> {
        let request = self.study.search_request()?.datetime(datetime);
        search(
            &self.http,
            &self.study.catalog.api,
            &request,
            self.study.search.max_items,
        )
        .await
    }

    async fn require_items(&self, source: &ItemSource) -> Result<Vec<Item>> {
        let results = self.find_items(source).await?;
        if results.items.is_empty() {
            return Err(Error::EmptySearch.into());
        }
        Ok(results.items)
    }

    fn pick_item<'a>(&self, items: &'a [Item], id: Option<&str>) -> Result<&'a Item> {
        match id {
            Some(id) => items
                .iter()
                .find(|item| item.id == id)
                .ok_or_else(|| anyhow!("Item {} is not among the searched items", id)),
            None => {
                let item = item_with_min_property(items, &self.study.processing.select_by)?;
                info!(
                    "Using {}, the item with the lowest {}",
                    item.id, self.study.processing.select_by
                );
                Ok(item)
            }
        }
    }

    fn plan(&self, items: &[Item], bands: &[String]) -> Result<DownloadPlan> {
        let plan = DownloadPlan::for_items(&self.study.id, items, bands, &self.study.output.cache_dir)?;
        let path = self.study.output.dir.join("download_plan.json");
        plan.write(&path)?;
        info!("Wrote {} download tasks to {}", plan.tasks().len(), path.display());
        Ok(plan)
    }

    async fn download(&self, items: &[Item], bands: &[String]) -> Result<()> {
        let plan = self.plan(items, bands)?;
        let provider = match &self.profile {
            Some(profile) => Provider::from_profile(profile).await,
            None => Provider::as_anon().await,
        };
        plan.execute(&provider, &self.http).await
    }

    /// Loader onto the study grid; the CRS comes from `items` unless the study
    /// fixes one.
    fn loader(&self, items: &[Item]) -> Result<Loader> {
        let aoi = self.study.bbox()?;
        let crs = self.study.output_crs(items)?;
        let geobox = GeoBox::from_bbox(&aoi, crs, self.study.processing.resolution)?;
        info!(
            "Output grid {} x {} in {}",
            geobox.width, geobox.height, geobox.crs
        );
        Ok(Loader::new(geobox, aoi, self.study.output.cache_dir.clone()))
    }

    fn write_index(&self, name: &str, data: &Array2<f64>, colormap: Colormap) -> Result<()> {
        let dir = &self.study.output.dir;
        write_tiff_f32(data, dir.join(format!("{name}.tif")))?;
        write_png(&colorize(data, colormap, None), dir.join(format!("{name}.png")))?;
        match IndexStats::from_array(data) {
            Some(stats) => println!("{name}: {stats}"),
            None => warn!("{} has no valid pixels", name),
        }
        Ok(())
    }

    async fn index(&self, item: &Item, rgb: bool) -> Result<()> {
        let index = self.study.processing.index;
        let mut bands = self.study.bands();
        if rgb {
            for band in TRUE_COLOR {
                if !bands.iter().any(|b| b == band) {
                    bands.push(band.to_string());
                }
            }
        }
        let items = slice::from_ref(item);
        self.download(items, &bands).await?;

        let data = self.loader(items)?.load(item, &bands)?;
        let values = index.compute(&data)?;
        let name = format!("{}_{}", item.id, index.name().to_lowercase());
        self.write_index(&name, &values, self.study.colormap())?;

        if rgb {
            let base = rgb_image(&true_color(&data)?);
            let layer = colorize(&values, self.study.colormap(), None);
            let dir = &self.study.output.dir;
            write_png(&base, dir.join(format!("{}_true_color.png", item.id)))?;
            write_png(
                &overlay(&base, &layer, OVERLAY_ALPHA)?,
                dir.join(format!("{name}_overlay.png")),
            )?;
        }
        Ok(())
    }

    async fn composite(&self, items: &[Item]) -> Result<()> {
        let index = self.study.processing.index;
        let bands: Vec<String> = index.bands().map(str::to_string).to_vec();
        self.download(items, &bands).await?;

        let loader = self.loader(items)?;
        let stack = index_over_items(&loader, items, &bands, |data| index.compute(data))?;
        let median = median_composite(&stack)?;
        let name = format!("{}_{}_median", self.study.id, index.name().to_lowercase());
        self.write_index(&name, &median, self.study.colormap())
    }

    async fn dnbr(&self, pre: &str, post: &str) -> Result<()> {
        let select_by = &self.study.processing.select_by;
        let pre_items = self.search(pre).await?.items;
        let post_items = self.search(post).await?.items;
        let pre_item = item_with_min_property(&pre_items, select_by)?.clone();
        let post_item = item_with_min_property(&post_items, select_by)?.clone();
        info!("Comparing {} with {}", pre_item.id, post_item.id);

        let bands: Vec<String> = SpectralIndex::Nbr.bands().map(str::to_string).to_vec();
        let pair = [pre_item, post_item];
        self.download(&pair, &bands).await?;

        let loader = self.loader(&pair)?;
        let before = loader.load(&pair[0], &bands)?;
        let after = loader.load(&pair[1], &bands)?;
        let values = dnbr(&before, &after)?;
        let name = format!("{}_{}_dnbr", pair[0].id, pair[1].id);
        self.write_index(&name, &values, Colormap::RdYlGn)
    }
}
