use super::REGION;
use crate::s3::{self, S3ObjOps};
use anyhow::{Context, Result};
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::Client;

/// S3 access to the buckets behind Earth Search assets.
pub struct Provider {
    client: Client,
    region: String,
}

impl Provider {
    /// Wrap an existing client. Its configured region is used, falling back
    /// to the Earth Search region.
    pub fn new(client: Client) -> Self {
        let region = client
            .config()
            .region()
            .map(|r| r.as_ref().to_string())
            .unwrap_or_else(|| REGION.to_string());
        Self { client, region }
    }

    /// Signed requests with the credentials of an AWS profile.
    pub async fn from_profile(profile_name: &str) -> Self {
        Self::new(s3::client_from_profile(profile_name, REGION).await)
    }

    /// Unsigned requests; Earth Search buckets are public.
    pub async fn as_anon() -> Self {
        Self::new(s3::anon_client(REGION).await)
    }
}

impl S3ObjOps for Provider {
    fn region(&self) -> Option<&str> {
        Some(&self.region)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<HeadObjectOutput> {
        self.client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("HEAD s3://{}/{} failed", bucket, key))
    }

    async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<GetObjectOutput> {
        self.client
            .get_object()
            .bucket(bucket)
            .key(key)
            .range(format!("bytes={}-{}", start_byte, end_byte))
            .send()
            .await
            .with_context(|| format!("GET s3://{}/{} failed", bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_provider_uses_earth_search_region() {
        assert_eq!(Provider::as_anon().await.region(), Some("us-west-2"));
        let signed = Provider::from_profile("spectral-stac-test").await;
        assert_eq!(signed.region(), Some(REGION));
    }
}
