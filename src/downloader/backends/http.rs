// HTTP transport - streams a descriptor's URL into a local file

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncWriteExt;

use crate::downloader::errors::BackendError;
use crate::downloader::models::{NetworkConfig, StreamDescriptor};
use crate::downloader::traits::Transport;

/// Progress is logged each time another this-many percent completes
const PROGRESS_STEP: u64 = 10;

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(network: &NetworkConfig) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder();

        // Only the connection is bounded; large bodies may legitimately take long
        if let Some(secs) = network.timeout {
            builder = builder.connect_timeout(Duration::from_secs(u64::from(secs)));
        }

        if let Some(proxy_url) = network.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| BackendError::InvalidUrl(format!("proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn download(
        &self,
        descriptor: &StreamDescriptor,
        dest: &Path,
    ) -> Result<u64, BackendError> {
        let response = self
            .client
            .get(&descriptor.url)
            .headers(header_map(descriptor))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                url: descriptor.url.clone(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut reported: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if total > 0 {
                let percent = written * 100 / total;
                if percent >= reported + PROGRESS_STEP {
                    reported = percent - percent % PROGRESS_STEP;
                    tracing::debug!(id = %descriptor.id, percent, "download progress");
                }
            }
        }

        file.flush().await?;
        Ok(written)
    }
}

/// Headers the source asked for; entries that are not valid HTTP are dropped
fn header_map(descriptor: &StreamDescriptor) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &descriptor.http_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(header = %name, "skipping invalid header"),
        }
    }
    headers
}
