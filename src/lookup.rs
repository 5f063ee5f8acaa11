//! Station and weather lookups over freshly loaded snapshots.

use crate::model::{StationRecord, WeatherRecord};
use crate::snapshot::{SnapshotStore, AIR_FILE, WEATHER_FILE};
use tracing::warn;

/// Official municipality names as they appear in the feeds.
pub const COUNTIES: [&str; 22] = [
    "基隆市", "臺北市", "新北市", "桃園市", "新竹市", "新竹縣", "苗栗縣", "臺中市",
    "彰化縣", "南投縣", "雲林縣", "嘉義市", "嘉義縣", "臺南市", "高雄市", "屏東縣",
    "宜蘭縣", "花蓮縣", "臺東縣", "澎湖縣", "金門縣", "連江縣",
];

const TOWN_SUFFIXES: [char; 3] = ['區', '鄉', '鎮'];

pub fn is_known_county(name: &str) -> bool {
    COUNTIES.contains(&name)
}

/// `前鎮區` -> `前鎮`. Only one trailing character is removed.
pub fn strip_town_suffix(name: &str) -> &str {
    match name.chars().last() {
        Some(last) if TOWN_SUFFIXES.contains(&last) => &name[..name.len() - last.len_utf8()],
        _ => name,
    }
}

pub fn find_by_county<'a>(records: &'a [StationRecord], county: &str) -> Vec<&'a StationRecord> {
    records.iter().filter(|r| r.county == county).collect()
}

pub fn find_by_county_and_site<'a>(
    records: &'a [StationRecord],
    county: &str,
    site: &str,
) -> Vec<&'a StationRecord> {
    records
        .iter()
        .filter(|r| r.county == county && r.site_name == site)
        .collect()
}

/// Stations are named after the town they stand in, minus the suffix.
pub fn find_by_town_name<'a>(records: &'a [StationRecord], town: &str) -> Option<&'a StationRecord> {
    let site = strip_town_suffix(town);
    records.iter().find(|r| r.site_name == site)
}

/// Same-county station first, then any county.
pub fn find_station_for_town<'a>(
    records: &'a [StationRecord],
    county: &str,
    town: &str,
) -> Option<&'a StationRecord> {
    let site = strip_town_suffix(town);
    records
        .iter()
        .find(|r| r.county == county && r.site_name == site)
        .or_else(|| find_by_town_name(records, town))
}

pub fn find_weather<'a>(
    records: &'a [WeatherRecord],
    county: &str,
    town: &str,
) -> Option<&'a WeatherRecord> {
    records
        .iter()
        .find(|r| r.county == county && r.town == town)
        .or_else(|| {
            let bare = strip_town_suffix(town);
            records
                .iter()
                .find(|r| r.county == county && strip_town_suffix(&r.town) == bare)
        })
}

/// Loads the snapshot on every call; unreadable snapshots yield no matches.
#[derive(Debug, Clone)]
pub struct LookupService {
    store: SnapshotStore,
}

impl LookupService {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    pub async fn stations(&self) -> Vec<StationRecord> {
        match self.store.read_all(AIR_FILE).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%err, "air snapshot unavailable");
                Vec::new()
            }
        }
    }

    pub async fn weather(&self) -> Vec<WeatherRecord> {
        match self.store.read_all(WEATHER_FILE).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%err, "weather snapshot unavailable");
                Vec::new()
            }
        }
    }

    pub async fn stations_in_county(&self, county: &str) -> Vec<StationRecord> {
        let all = self.stations().await;
        find_by_county(&all, county).into_iter().cloned().collect()
    }

    pub async fn stations_at(&self, county: &str, site: &str) -> Vec<StationRecord> {
        let all = self.stations().await;
        find_by_county_and_site(&all, county, site)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Reads both snapshots concurrently for a combined town report.
    pub async fn town_conditions(
        &self,
        county: &str,
        town: &str,
    ) -> (Option<WeatherRecord>, Option<StationRecord>) {
        let (weather, stations) = tokio::join!(self.weather(), self.stations());
        (
            find_weather(&weather, county, town).cloned(),
            find_station_for_town(&stations, county, town).cloned(),
        )
    }
}
