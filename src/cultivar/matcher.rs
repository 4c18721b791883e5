use std::collections::HashSet;
use std::sync::Arc;

use super::{
    CandidateRow, CatalogueSource, CultivarProfile, MatchError, MatchQuery, RankedCandidate,
};

/// Ranked output is capped at the top entries.
const MAX_RESULTS: usize = 5;

const EXACT_SCORE: u32 = 100;
const SUBSTRING_SCORE: u32 = 70;
const TOKEN_SCORE: u32 = 10;
const AUTOMATIC_BONUS: u32 = 35;

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Catalogue URL slug: lowercase, runs of non-alphanumerics become a single
/// underscore, trimmed at both ends.
pub fn slugify(value: &str) -> String {
    let mut slug = String::new();
    for c in value.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Similarity of a query species to one candidate name.
///
/// Exact match (post-normalization) scores 100, a substring match in either
/// direction 70, otherwise 10 per shared whitespace token (as sets). The
/// automatic preference adds 35 to any candidate containing "auto".
pub fn score_match(query: &str, candidate: &str, prefer_automatic: bool) -> u32 {
    let q = normalize(query);
    let c = normalize(candidate);
    if q.is_empty() || c.is_empty() {
        return 0;
    }

    let base = if q == c {
        EXACT_SCORE
    } else if c.contains(&q) || q.contains(&c) {
        SUBSTRING_SCORE
    } else {
        let q_tokens: HashSet<&str> = q.split_whitespace().collect();
        let c_tokens: HashSet<&str> = c.split_whitespace().collect();
        TOKEN_SCORE * q_tokens.intersection(&c_tokens).count() as u32
    };

    if prefer_automatic && c.contains("auto") {
        base + AUTOMATIC_BONUS
    } else {
        base
    }
}

/// Score and order candidate rows for a species query. Zero-score rows are
/// dropped, ties keep their original row order (stable sort), and the result
/// is truncated to the top five.
pub fn rank_candidates(
    rows: &[CandidateRow],
    species: &str,
    prefer_automatic: bool,
) -> Vec<(u32, CandidateRow)> {
    let mut scored: Vec<(u32, CandidateRow)> = rows
        .iter()
        .map(|row| (score_match(species, &row.name, prefer_automatic), row.clone()))
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
    scored.truncate(MAX_RESULTS);
    scored
}

/// Pull a day count out of a flowering-time column ("~65 days"). Columns in
/// other units are left unset.
pub fn parse_flower_days(text: &str) -> Option<u32> {
    let lower = text.to_lowercase();
    if !lower.contains("day") {
        return None;
    }
    let digits: String = lower
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Best-effort cultivar lookup over a catalogue source.
///
/// Two named policies: `search` degrades to an empty list on any fetch or
/// parse failure, `best_profile` surfaces an explicit error instead.
pub struct CultivarMatcher {
    source: Arc<dyn CatalogueSource>,
}

impl CultivarMatcher {
    pub fn new(source: Arc<dyn CatalogueSource>) -> Self {
        Self { source }
    }

    /// Ranked candidates for a breeder + species query. Blank input or an
    /// unavailable source yields an empty list; the failure is logged, not
    /// propagated.
    pub async fn search(&self, query: &MatchQuery) -> Vec<RankedCandidate> {
        if query.breeder.trim().is_empty() || query.species.trim().is_empty() {
            tracing::debug!("blank breeder or species in cultivar search");
            return Vec::new();
        }

        let rows = match self.source.candidate_rows(&slugify(&query.breeder)).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(
                    breeder = %query.breeder,
                    species = %query.species,
                    error = %e,
                    "cultivar search failed"
                );
                return Vec::new();
            }
        };

        rank_candidates(&rows, &query.species, query.prefer_automatic)
            .into_iter()
            .map(|(score, row)| RankedCandidate {
                name: row.name,
                breeder: row.breeder,
                score,
                detail_url: row.detail_url,
            })
            .collect()
    }

    /// The strict single-result flow: top candidate plus its detail page,
    /// assembled into a full profile. Every failure is an explicit error.
    pub async fn best_profile(&self, query: &MatchQuery) -> Result<CultivarProfile, MatchError> {
        let breeder = query.breeder.trim();
        let species = query.species.trim();
        if breeder.is_empty() || species.is_empty() {
            return Err(MatchError::MissingQuery);
        }

        let rows = self.source.candidate_rows(&slugify(breeder)).await?;
        let ranked = rank_candidates(&rows, species, query.prefer_automatic);
        let (_, row) = ranked.into_iter().next().ok_or_else(|| MatchError::NoMatch {
            species: species.to_string(),
            breeder: breeder.to_string(),
        })?;

        if row.detail_url.is_empty() {
            return Err(MatchError::SourceUnavailable(
                "detail link missing from listing".to_string(),
            ));
        }
        let detail = self.source.strain_detail(&row.detail_url).await?;

        Ok(CultivarProfile {
            cultivar_id: format!("seedfinder:{}:{}", slugify(breeder), slugify(&row.name)),
            provider: "seedfinder".to_string(),
            species: row.name,
            breeder: if row.breeder.is_empty() {
                breeder.to_string()
            } else {
                row.breeder
            },
            flower_window_days: row.flower_time.as_deref().and_then(parse_flower_days),
            plant_type: row.plant_type,
            feminized: row.feminized,
            source_url: row.detail_url,
            description: detail.description,
            image_url: detail.image_url,
        })
    }
}
