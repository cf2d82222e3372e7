//! Geolocation over an ip-api compatible JSON endpoint.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sift_core::{GeoConfig, GeoInfo, LookupError};

use crate::cache::GeoProvider;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Interpret one response body. `status: "fail"` is an error.
fn parse_response(ip: IpAddr, body: &str) -> Result<GeoInfo, LookupError> {
    let r: IpApiResponse =
        serde_json::from_str(body).map_err(|e| LookupError::Geo { ip, reason: format!("bad response: {e}") })?;
    if r.status.as_deref().is_some_and(|s| !s.eq_ignore_ascii_case("success")) {
        let reason = r.message.unwrap_or_else(|| "lookup failed".into());
        return Err(LookupError::Geo { ip, reason });
    }
    Ok(GeoInfo { country: non_empty(r.country_code), isp: non_empty(r.isp), latitude: r.lat, longitude: r.lon })
}

pub struct HttpGeoProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGeoProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpGeoProvider { client, endpoint: endpoint.into() })
    }

    pub fn from_config(cfg: &GeoConfig) -> Result<Self, reqwest::Error> {
        Self::new(cfg.endpoint.clone(), Duration::from_millis(cfg.timeout_ms))
    }

    fn url_for(&self, ip: IpAddr) -> String {
        self.endpoint.replace("{ip}", &ip.to_string())
    }
}

#[async_trait]
impl GeoProvider for HttpGeoProvider {
    async fn locate(&self, ip: IpAddr) -> Result<GeoInfo, LookupError> {
        let geo_err = |e: reqwest::Error| LookupError::Geo { ip, reason: e.to_string() };
        let resp = self.client.get(self.url_for(ip)).send().await.map_err(geo_err)?;
        let body = resp.error_for_status().map_err(geo_err)?.text().await.map_err(geo_err)?;
        parse_response(ip, &body)
    }
}
