use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// One air-quality monitoring station from the EPA feed.
///
/// Accepts both the legacy capitalised keys and the lower-case keys of the
/// current feed. Fields the bot does not read are kept in `extra` so the
/// snapshot round-trips the feed content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StationRecord {
    #[serde(rename = "County", alias = "county", default, deserialize_with = "lenient_string")]
    pub county: String,
    #[serde(rename = "SiteName", alias = "sitename", default, deserialize_with = "lenient_string")]
    pub site_name: String,
    #[serde(rename = "PublishTime", alias = "publishtime", default, deserialize_with = "lenient_string")]
    pub publish_time: String,
    #[serde(rename = "MajorPollutant", alias = "pollutant", default, deserialize_with = "lenient_string")]
    pub major_pollutant: String,
    #[serde(rename = "Status", alias = "status", default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(rename = "PM2.5", alias = "pm2.5", default, deserialize_with = "lenient_string")]
    pub pm25: String,
    #[serde(rename = "AQI", alias = "aqi", default, deserialize_with = "lenient_string")]
    pub aqi: String,
    #[serde(rename = "PM10", alias = "pm10", default, deserialize_with = "lenient_string")]
    pub pm10: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Feed values arrive as strings, numbers or null depending on the feed
/// revision; blank means missing.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    })
}

/// One weather observation station.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeatherRecord {
    pub station_id: String,
    pub station_name: String,
    pub county: String,
    pub town: String,
    pub observed_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub description: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// A user or room that opted into the early-access list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
}

/// Row of `town.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TownRecord {
    #[serde(default)]
    pub id: Value,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Row of `pm-site.json`: a town and the station sharing its name, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TownSite {
    #[serde(flatten)]
    pub town: TownRecord,
    pub has_site: bool,
    pub best_site: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    User,
    Group,
    Room,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::User => "user",
            SourceKind::Group => "group",
            SourceKind::Room => "room",
        }
    }
}

/// A single inbound chat event, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub reply_token: String,
    pub source_kind: SourceKind,
    /// Room/group id for shared chats, user id otherwise.
    pub source_id: String,
    /// The speaking user, when the platform discloses it.
    pub user_id: Option<String>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Postback(Postback),
}

/// Data carried by a tapped button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Postback {
    NextSet { offset: usize, county: String },
    GetAirData { county: String, site: String },
    Registration { answer: bool },
}

#[derive(Debug, Error)]
pub enum PostbackError {
    #[error("malformed postback payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("location must look like `County|Site`, got {0:?}")]
    Location(String),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum RawPostback {
    NextSet { offset: usize, county: String },
    GetAirData { location: String },
    Registration { answer: bool },
}

impl Postback {
    pub fn parse(data: &str) -> Result<Self, PostbackError> {
        let raw: RawPostback = serde_json::from_str(data)?;
        Ok(match raw {
            RawPostback::NextSet { offset, county } => Postback::NextSet { offset, county },
            RawPostback::GetAirData { location } => {
                let Some((county, site)) = location.split_once('|') else {
                    return Err(PostbackError::Location(location));
                };
                if county.is_empty() || site.is_empty() {
                    return Err(PostbackError::Location(location));
                }
                Postback::GetAirData {
                    county: county.to_string(),
                    site: site.to_string(),
                }
            }
            RawPostback::Registration { answer } => Postback::Registration { answer },
        })
    }

    /// Compact JSON placed in a button's `data` field.
    pub fn to_data(&self) -> String {
        let raw = match self {
            Postback::NextSet { offset, county } => RawPostback::NextSet {
                offset: *offset,
                county: county.clone(),
            },
            Postback::GetAirData { county, site } => RawPostback::GetAirData {
                location: format!("{}|{}", county, site),
            },
            Postback::Registration { answer } => RawPostback::Registration { answer: *answer },
        };
        // Serializing a plain enum of strings and integers cannot fail.
        serde_json::to_string(&raw).unwrap_or_default()
    }
}

impl fmt::Display for Postback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_data())
    }
}
