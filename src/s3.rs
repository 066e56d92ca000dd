//! Utility functions for creating s3 clients and locating s3 objects
use anyhow::{anyhow, Result};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::Client;
use regex::Regex;
use std::sync::OnceLock;

/// Client signing requests with the credentials of a named AWS profile. The
/// region must be the one the buckets live in, virtual host addressing is used.
pub async fn client_from_profile(profile_name: &str, region: &str) -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .profile_name(profile_name)
        .region(Region::new(region.to_owned()))
        .load()
        .await;
    Client::new(&config)
}

/// Client for public buckets; requests are sent unsigned.
pub async fn anon_client(region: &str) -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .no_credentials()
        .region(Region::new(region.to_owned()))
        .load()
        .await;
    Client::new(&config)
}

pub trait S3ObjOps {
    /// Region requests are sent to, when known.
    fn region(&self) -> Option<&str>;

    async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectOutput>;

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<GetObjectOutput>;
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct S3Url {
    pub bucket: String,
    pub region: Option<String>,
    pub key: String,
}

fn virtual_host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://(?<bucket>[^./]+)\.s3\.(?<region>[^./]+)\.amazonaws\.com/(?<key>.+)$")
            .expect("Regex pattern should always compile")
    })
}

impl S3Url {
    /// Parse `s3://bucket/key` and virtual-hosted
    /// `https://bucket.s3.region.amazonaws.com/key` urls.
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
                .ok_or(anyhow!("Malformed s3 url: {}", url))?;
            return Ok(Self {
                bucket: bucket.to_string(),
                region: None,
                key: key.to_string(),
            });
        }

        let captures = virtual_host_pattern()
            .captures(url)
            .ok_or(anyhow!("No regex matches found for: {}", url))?;
        let (_, [bucket, region, key]) = captures.extract();

        Ok(Self {
            bucket: bucket.to_string(),
            region: Some(region.to_string()),
            key: key.to_string(),
        })
    }
}
