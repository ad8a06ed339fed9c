// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::Client;

use crate::error::Result;
use crate::models::HttpConfig;

/// Create a configured asynchronous HTTP client for page fetches.
pub fn create_async_client(config: &HttpConfig) -> Result<Client> {
    create_client_with_timeout(config, config.timeout_secs)
}

/// Create a client for sitemap requests (shorter timeout).
pub fn create_sitemap_client(config: &HttpConfig) -> Result<Client> {
    create_client_with_timeout(config, config.sitemap_timeout_secs)
}

fn create_client_with_timeout(config: &HttpConfig, timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a URL as text, treating non-2xx statuses as errors.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let text = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(text)
}
