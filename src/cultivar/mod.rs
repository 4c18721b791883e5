pub mod matcher;
pub mod seedfinder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::runs::CultivarSnapshot;

/// Errors from cultivar lookups. Fetch failures and parse drift land in the
/// same bucket: from the caller's point of view the source is unavailable.
#[derive(thiserror::Error, Debug)]
pub enum MatchError {
    #[error("breeder and species are required")]
    MissingQuery,

    #[error("catalogue unavailable: {0}")]
    SourceUnavailable(String),

    #[error("strain '{species}' not found for breeder '{breeder}'")]
    NoMatch { species: String, breeder: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchQuery {
    pub breeder: String,
    pub species: String,
    #[serde(default)]
    pub prefer_automatic: bool,
}

/// One row of a breeder's strain listing, as scraped from the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRow {
    pub name: String,
    pub breeder: String,
    /// Detail-page link; may be empty when the listing omits it.
    pub detail_url: String,
    pub flower_time: Option<String>,
    pub plant_type: Option<String>,
    pub feminized: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub name: String,
    pub breeder: String,
    pub score: u32,
    pub detail_url: String,
}

/// Extra fields scraped from a strain's detail page.
#[derive(Debug, Clone, Default)]
pub struct StrainDetail {
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Full profile assembled by the single-best-match flow.
#[derive(Debug, Clone, Serialize)]
pub struct CultivarProfile {
    pub cultivar_id: String,
    pub provider: String,
    pub species: String,
    pub breeder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flower_window_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feminized: Option<String>,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CultivarProfile {
    /// The value attached to a run. Profiles carry more than the run model
    /// keeps; the snapshot is the persisted subset.
    pub fn snapshot(&self) -> CultivarSnapshot {
        CultivarSnapshot {
            name: self.species.clone(),
            breeder: self.breeder.clone(),
            flower_window_days: self.flower_window_days,
        }
    }
}

/// Narrow seam in front of the fragile HTML scraping, so the scoring logic
/// is testable against canned rows and the parser is swappable.
#[async_trait]
pub trait CatalogueSource: Send + Sync {
    async fn candidate_rows(&self, breeder_slug: &str) -> Result<Vec<CandidateRow>, MatchError>;
    async fn strain_detail(&self, url: &str) -> Result<StrainDetail, MatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_error_displays() {
        assert_eq!(
            MatchError::MissingQuery.to_string(),
            "breeder and species are required"
        );
        assert_eq!(
            MatchError::SourceUnavailable("breeder page failed (503)".into()).to_string(),
            "catalogue unavailable: breeder page failed (503)"
        );
        assert_eq!(
            MatchError::NoMatch {
                species: "Blue Dream".into(),
                breeder: "Humboldt".into(),
            }
            .to_string(),
            "strain 'Blue Dream' not found for breeder 'Humboldt'"
        );
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MatchError>();
    }

    #[test]
    fn snapshot_takes_persisted_subset() {
        let profile = CultivarProfile {
            cultivar_id: "seedfinder:humboldt:blue_dream".into(),
            provider: "seedfinder".into(),
            species: "Blue Dream".into(),
            breeder: "Humboldt".into(),
            flower_window_days: Some(65),
            plant_type: Some("mostly sativa".into()),
            feminized: Some("yes".into()),
            source_url: "https://seedfinder.eu/en/strain-info/blue_dream/".into(),
            description: None,
            image_url: None,
        };
        let snapshot = profile.snapshot();
        assert_eq!(snapshot.name, "Blue Dream");
        assert_eq!(snapshot.breeder, "Humboldt");
        assert_eq!(snapshot.flower_window_days, Some(65));
    }
}
