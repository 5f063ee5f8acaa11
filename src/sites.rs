//! Which towns have an air-quality station of their own.

use crate::lookup::strip_town_suffix;
use crate::model::{StationRecord, TownRecord, TownSite};

/// A town has a site when its name without the administrative suffix is a
/// station name.
pub fn annotate_towns(towns: Vec<TownRecord>, stations: &[StationRecord]) -> Vec<TownSite> {
    towns
        .into_iter()
        .map(|town| {
            let bare = strip_town_suffix(&town.name).to_string();
            let has_site = stations.iter().any(|s| s.site_name == bare);
            TownSite {
                town,
                has_site,
                best_site: if has_site { bare } else { String::new() },
            }
        })
        .collect()
}
