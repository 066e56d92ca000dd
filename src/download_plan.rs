use crate::s3::{S3ObjOps, S3Url};
use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use stac::Item;
use std::fs;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AssetSource {
    S3 {
        bucket: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    Http {
        url: String,
    },
}

impl AssetSource {
    pub fn from_href(href: &str) -> Self {
        match S3Url::parse(href) {
            Ok(S3Url { bucket, region, key }) => Self::S3 { bucket, key, region },
            Err(_) => Self::Http { url: href.to_string() },
        }
    }
}

/// Where an asset is cached locally: `<cache_dir>/<item id>/<file name>`.
pub fn local_asset_path(cache_dir: &Path, item_id: &str, href: &str) -> Option<PathBuf> {
    let file_name = match Url::parse(href) {
        Ok(url) => url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()?
            .to_string(),
        Err(_) => Path::new(href).file_name()?.to_str()?.to_string(),
    };
    Some(cache_dir.join(item_id).join(file_name))
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DownloadTask {
    pub item_id: String,
    pub asset: String,
    pub source: AssetSource,
    pub output: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadPlan {
    pub id: String,
    tasks: Vec<DownloadTask>,
}

impl DownloadPlan {
    pub fn new(id: &str, tasks: Vec<DownloadTask>) -> Self {
        Self {
            id: id.to_string(),
            tasks,
        }
    }

    /// One task per item and requested asset key.
    pub fn for_items(id: &str, items: &[Item], assets: &[String], cache_dir: &Path) -> Result<Self> {
        let mut tasks: Vec<DownloadTask> = vec![];
        for item in items {
            for key in assets {
                let asset = item
                    .assets
                    .get(key)
                    .ok_or(anyhow!("Asset {} not found on item {}", key, item.id))?;
                let output = local_asset_path(cache_dir, &item.id, &asset.href)
                    .ok_or(anyhow!("Unable to name a local file for {}", asset.href))?;
                tasks.push(DownloadTask {
                    item_id: item.id.clone(),
                    asset: key.clone(),
                    source: AssetSource::from_href(&asset.href),
                    output: output.to_string_lossy().to_string(),
                });
            }
        }
        Ok(Self::new(id, tasks))
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub async fn execute(&self, provider: &impl S3ObjOps, http: &reqwest::Client) -> Result<()> {
        let total = self.tasks.len();
        for (index, task) in self.tasks.iter().enumerate() {
            info!(
                "Task {}/{}: {} of {}",
                index + 1,
                total,
                task.asset,
                task.item_id
            );
            match &task.source {
                AssetSource::S3 { bucket, key, region } => {
                    check_region(region.as_deref(), provider.region(), bucket)?;
                    try_download(provider, bucket, key, &task.output).await?
                }
                AssetSource::Http { url } => try_download_http(http, url, &task.output).await?,
            }
        }
        Ok(())
    }
}

/// Buckets only answer in their own region.
fn check_region(bucket_region: Option<&str>, client_region: Option<&str>, bucket: &str) -> Result<()> {
    match (bucket_region, client_region) {
        (Some(wanted), Some(have)) if wanted != have => Err(anyhow!(
            "Bucket {} is in {}, but the S3 client sends requests to {}",
            bucket,
            wanted,
            have
        )),
        _ => Ok(()),
    }
}

/// Empty a `.partial` file that is longer than the remote object.
fn restart_if_oversized(file: &File, byte_count: &mut u64, total_size: u64, output: &str) -> Result<()> {
    if *byte_count > total_size {
        warn!(
            "Partial download of {} is larger than the remote object, restarting",
            output
        );
        file.set_len(0)?;
        *byte_count = 0;
    }
    Ok(())
}

/// Open the `.partial` file for `output`, creating parent directories as
/// needed. Returns `None` when the output already exists.
fn open_partial(output: &str) -> Result<Option<(String, File, u64)>> {
    let dst = Path::new(output);
    if dst.exists() {
        info!("Output file already exists: {}", output);
        return Ok(None);
    }

    if let Some(parent_dir) = dst.parent() {
        if !parent_dir.exists() {
            fs::create_dir_all(parent_dir)?;
        }
    }

    let partial = format!("{}.partial", output);
    let partial_file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(&partial)?;
    let byte_count = partial_file.metadata()?.len();
    Ok(Some((partial, partial_file, byte_count)))
}

fn progress_bar(total_size: u64, byte_count: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_size);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_position(byte_count);
    bar
}

fn report_resume(byte_count: u64, total_size: u64) {
    let progress = (byte_count as f64 / total_size as f64) * 100.;
    if progress > 0.0 {
        info!("Resuming download from {:.2}% completion", progress);
    }
}

pub async fn try_download(
    provider: &impl S3ObjOps,
    bucket: &str,
    key: &str,
    output: &str,
) -> Result<()> {
    let Some((partial, mut partial_file, mut byte_count)) = open_partial(output)? else {
        return Ok(());
    };

    // Get object details from S3
    let head_object = provider.head_object(bucket, key).await?;

    let total_size = head_object
        .content_length()
        .ok_or(anyhow!("Error reading size of remote object"))? as u64;

    restart_if_oversized(&partial_file, &mut byte_count, total_size, output)?;
    report_resume(byte_count, total_size);

    if byte_count < total_size {
        let bar = progress_bar(total_size, byte_count);
        bar.set_message(key.rsplit('/').next().unwrap_or(key).to_string());

        let mut response = provider
            .get_object_range(bucket, key, byte_count, total_size - 1)
            .await?;

        while let Some(bytes) = response.body.try_next().await? {
            partial_file.write_all(&bytes)?;
            byte_count += bytes.len() as u64;
            bar.set_position(byte_count);
        }
        bar.finish_and_clear();
    }

    info!("Download complete: {}", output);
    // Rename the file to remove .partial suffix
    fs::rename(partial, output)?;

    Ok(())
}

pub async fn try_download_http(client: &reqwest::Client, url: &str, output: &str) -> Result<()> {
    let Some((partial, mut partial_file, mut byte_count)) = open_partial(output)? else {
        return Ok(());
    };

    let head = client.head(url).send().await?.error_for_status()?;
    // `Response::content_length` is the size of the (empty) HEAD body
    let total_size = head
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if let Some(total_size) = total_size {
        restart_if_oversized(&partial_file, &mut byte_count, total_size, output)?;
        report_resume(byte_count, total_size);
    }

    if total_size.map_or(true, |total| byte_count < total) {
        let mut request = client.get(url);
        if byte_count > 0 {
            request = request.header(RANGE, format!("bytes={}-", byte_count));
        }
        let response = request.send().await?;
        // Without a known size, a 416 on resume means the partial is complete
        if byte_count > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            info!("Download complete: {}", output);
            fs::rename(partial, output)?;
            return Ok(());
        }
        let response = response.error_for_status()?;

        // Servers that ignore the range send the whole object again
        if byte_count > 0 && response.status() == StatusCode::OK {
            warn!("Server ignored range request, restarting {}", url);
            partial_file.set_len(0)?;
            byte_count = 0;
        }

        let bar = progress_bar(total_size.unwrap_or(0), byte_count);
        bar.set_message(url.rsplit('/').next().unwrap_or(url).to_string());

        let mut stream = response.bytes_stream();
        while let Some(bytes) = stream.next().await {
            let bytes = bytes?;
            partial_file.write_all(&bytes)?;
            byte_count += bytes.len() as u64;
            bar.set_position(byte_count);
        }
        bar.finish_and_clear();
    }

    info!("Download complete: {}", output);
    fs::rename(partial, output)?;

    Ok(())
}
