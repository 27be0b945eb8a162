use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use imgrag_indexing::GpsCoordinates;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// 坐标反查地名
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// 服务没有对应地点时返回 `None`
    async fn reverse(&self, coords: GpsCoordinates) -> Result<Option<String>>;
}

/// Nominatim `/reverse` 接口
pub struct NominatimGeocoder {
    base_url: String,
    client: Client,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .context("Failed to build geocoder http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, coords: GpsCoordinates) -> Result<Option<String>> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("accept-language", "en".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Geocoding failed: {}", response.status()));
        }

        let body: Value = response.json().await?;
        if let Some(error) = body["error"].as_str() {
            debug!("no location for {:?}: {}", coords, error);
            return Ok(None);
        }

        Ok(body["display_name"]
            .as_str()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty()))
    }
}
