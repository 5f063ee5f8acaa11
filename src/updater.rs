//! Offline refresh of the air and weather snapshots.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

use crate::config::Feeds;
use crate::model::{StationRecord, WeatherRecord};
use crate::snapshot::{SnapshotStore, AIR_FILE, WEATHER_FILE};

/// Sentinel the weather bureau uses for a missing reading.
const MISSING_READING: f64 = -99.0;
/// Observation times without an offset are Taiwan local time.
const TAIWAN_OFFSET_SECS: i32 = 8 * 3600;

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_air(&self) -> Result<Vec<StationRecord>>;

    async fn fetch_weather(&self) -> Result<Vec<WeatherRecord>>;
}

#[derive(Debug, Clone)]
pub struct HttpFeeds {
    http: Client,
    air_url: Url,
    weather_url: Url,
    cwb_token: String,
}

impl HttpFeeds {
    pub fn from_config(feeds: &Feeds) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("tw-airbot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(feeds.timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            air_url: Url::parse(&feeds.air_url).context("invalid feeds.air_url")?,
            weather_url: Url::parse(&feeds.weather_url).context("invalid feeds.weather_url")?,
            cwb_token: feeds.cwb_token.clone(),
        })
    }

    async fn get_bytes(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>> {
        let res = request.send().await.context("failed to reach feed")?;
        if !res.status().is_success() {
            return Err(anyhow!("Server returned status code {}", res.status().as_u16()));
        }
        Ok(res.bytes().await.context("failed to read feed body")?.to_vec())
    }
}

#[async_trait]
impl FeedSource for HttpFeeds {
    async fn fetch_air(&self) -> Result<Vec<StationRecord>> {
        let body = self.get_bytes(self.http.get(self.air_url.clone())).await?;
        parse_air_payload(&body)
    }

    async fn fetch_weather(&self) -> Result<Vec<WeatherRecord>> {
        let request = self
            .http
            .get(self.weather_url.clone())
            .query(&[("Authorization", self.cwb_token.as_str())]);
        let body = self.get_bytes(request).await?;
        parse_weather_payload(&body)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AirPayload {
    List(Vec<StationRecord>),
    Wrapped { records: Vec<StationRecord> },
}

/// Accepts a bare array of stations or an object with a `records` array.
pub fn parse_air_payload(body: &[u8]) -> Result<Vec<StationRecord>> {
    let payload: AirPayload = serde_json::from_slice(body).context("invalid air feed")?;
    Ok(match payload {
        AirPayload::List(rows) | AirPayload::Wrapped { records: rows } => rows,
    })
}

#[derive(Deserialize)]
struct WeatherPayload {
    records: WeatherRecords,
}

#[derive(Deserialize)]
struct WeatherRecords {
    #[serde(default)]
    location: Vec<WeatherLocation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeatherLocation {
    location_name: String,
    station_id: String,
    time: ObservationTime,
    #[serde(default)]
    weather_element: Vec<ElementValue>,
    #[serde(default)]
    parameter: Vec<ParameterValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObservationTime {
    obs_time: String,
}

#[derive(Deserialize)]
struct ElementValue {
    #[serde(rename = "elementName")]
    name: String,
    #[serde(rename = "elementValue")]
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct ParameterValue {
    #[serde(rename = "parameterName")]
    name: String,
    #[serde(rename = "parameterValue")]
    value: String,
}

impl WeatherLocation {
    fn element(&self, name: &str) -> Option<&serde_json::Value> {
        self.weather_element
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    fn reading(&self, name: &str) -> Option<f64> {
        let value = match self.element(name)? {
            serde_json::Value::Number(n) => n.as_f64()?,
            serde_json::Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        (value > MISSING_READING).then_some(value)
    }

    fn parameter(&self, name: &str) -> String {
        self.parameter
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.clone())
            .unwrap_or_default()
    }

    fn into_record(self) -> WeatherRecord {
        let description = match self.element("Weather") {
            Some(serde_json::Value::String(s)) if s != "-99" => s.clone(),
            _ => String::new(),
        };
        // Relative humidity is published as a 0..1 fraction.
        let humidity = self
            .reading("HUMD")
            .map(|h| if h <= 1.0 { (h * 100.0).round() } else { h });
        WeatherRecord {
            temperature: self.reading("TEMP"),
            humidity,
            wind_speed: self.reading("WDSD"),
            county: self.parameter("CITY"),
            town: self.parameter("TOWN"),
            observed_at: parse_observation_time(&self.time.obs_time),
            description,
            station_id: self.station_id,
            station_name: self.location_name,
        }
    }
}

pub fn parse_observation_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
    FixedOffset::east_opt(TAIWAN_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
}

pub fn parse_weather_payload(body: &[u8]) -> Result<Vec<WeatherRecord>> {
    let payload: WeatherPayload = serde_json::from_slice(body).context("invalid weather feed")?;
    Ok(payload
        .records
        .location
        .into_iter()
        .map(WeatherLocation::into_record)
        .collect())
}

/// Rows written per snapshot; `None` when that snapshot was left stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub air_rows: Option<usize>,
    pub weather_rows: Option<usize>,
}

/// Fetch both feeds concurrently and overwrite whichever succeeded.
#[instrument(skip_all)]
pub async fn run_update(feeds: &dyn FeedSource, store: &SnapshotStore, log_path: &Path) -> UpdateOutcome {
    let (air, weather) = tokio::join!(feeds.fetch_air(), feeds.fetch_weather());
    UpdateOutcome {
        air_rows: persist("air", AIR_FILE, air, store, log_path).await,
        weather_rows: persist("weather", WEATHER_FILE, weather, store, log_path).await,
    }
}

async fn persist<T: Serialize>(
    label: &str,
    file: &str,
    fetched: Result<Vec<T>>,
    store: &SnapshotStore,
    log_path: &Path,
) -> Option<usize> {
    let rows = match fetched {
        Ok(rows) if rows.is_empty() => {
            append_update_log(log_path, &format!("Error while updating {}: feed returned no records", label)).await;
            return None;
        }
        Ok(rows) => rows,
        Err(err) => {
            append_update_log(log_path, &format!("Error while updating {}: {:#}", label, err)).await;
            return None;
        }
    };
    match store.write_all(file, &rows).await {
        Ok(()) => {
            info!(feed = label, rows = rows.len(), "snapshot updated");
            Some(rows.len())
        }
        Err(err) => {
            append_update_log(log_path, &format!("Error while saving {}: {}", label, err)).await;
            None
        }
    }
}

async fn append_update_log(path: &Path, message: &str) {
    error!(detail = message, "update failed");
    let line = format!("{} {}\n", Utc::now().to_rfc3339(), message);
    let result: std::io::Result<()> = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
    .await;
    if let Err(err) = result {
        error!(?err, path = %path.display(), "failed to write update log");
    }
}
