/// S3 configuration for publishing and source download
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name; publishing refuses to start without it
    pub bucket: Option<String>,
    /// AWS region
    pub region: String,
    /// Base URL for public access (CDN or path-style endpoint)
    pub base_url: Option<String>,
    /// Custom endpoint for S3-compatible storage (MinIO, R2, ...)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Whether to use path-style addressing against the endpoint
    pub path_style: bool,
}

impl S3Config {
    /// Load S3 configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bucket: std::env::var("AWS_BUCKET_NAME")
                .or_else(|_| std::env::var("S3_BUCKET"))
                .ok()
                .filter(|b| !b.trim().is_empty()),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            base_url: std::env::var("S3_BASE_URL").ok().filter(|u| !u.is_empty()),
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|u| !u.is_empty()),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            path_style: std::env::var("S3_PATH_STYLE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        }
    }

    /// Bucket name, if configured
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|b| !b.is_empty())
    }

    /// Public URL of an object, derived without any network round-trip
    ///
    /// `base_url` wins when set; otherwise the virtual-hosted AWS form is used.
    pub fn object_url(&self, key: &str) -> Option<String> {
        let key = key.trim_start_matches('/');
        if let Some(base_url) = &self.base_url {
            return Some(format!("{}/{}", base_url.trim_end_matches('/'), key));
        }

        let bucket = self.bucket()?;
        if self.path_style {
            let endpoint = self
                .endpoint
                .as_deref()
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region));
            Some(format!("{}/{}/{}", endpoint, bucket, key))
        } else {
            Some(format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                bucket, self.region, key
            ))
        }
    }

    /// Extract the object key from a URL pointing into this bucket
    ///
    /// Accepts `https://<bucket>.s3.<region>.amazonaws.com/<key>` and any URL
    /// containing `<bucket>/<key>`.
    pub fn key_from_url(&self, url: &str) -> Option<String> {
        let bucket = self.bucket()?;
        let virtual_host = format!("{}.s3.{}.amazonaws.com/", bucket, self.region);
        let path_style = format!("{}/", bucket);

        url.split_once(&virtual_host)
            .or_else(|| url.split_once(&path_style))
            .map(|(_, key)| key.split(['?', '#']).next().unwrap_or(key).to_string())
            .filter(|key| !key.is_empty())
    }
}
