use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use super::{CandidateRow, CatalogueSource, MatchError, StrainDetail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_BASE_URL: &str = "https://seedfinder.eu";

/// SeedFinder catalogue scraper. Best effort against an unversioned site:
/// schema drift surfaces as `SourceUnavailable`, never as a crash.
pub struct SeedFinder {
    client: reqwest::Client,
    base_url: String,
}

impl SeedFinder {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Listing URLs in fixed preference order: English page first, German
    /// fallback. One attempt each, first 200 wins, no retry.
    fn breeder_urls(&self, breeder_slug: &str) -> [String; 2] {
        [
            format!("{}/en/database/breeder/{}/", self.base_url, breeder_slug),
            format!("{}/de/database/breeder/{}/", self.base_url, breeder_slug),
        ]
    }
}

#[async_trait]
impl CatalogueSource for SeedFinder {
    async fn candidate_rows(&self, breeder_slug: &str) -> Result<Vec<CandidateRow>, MatchError> {
        let mut last_failure = "no page attempted".to_string();
        for url in self.breeder_urls(breeder_slug) {
            match self.client.get(&url).timeout(REQUEST_TIMEOUT).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        tracing::debug!(url = %url, status = %status, "breeder page miss");
                        last_failure = format!("status {status}");
                        continue;
                    }
                    let html = response.text().await.map_err(|e| {
                        MatchError::SourceUnavailable(format!("failed to read breeder page: {e}"))
                    })?;
                    return parse_candidate_rows(&html, &self.base_url);
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "breeder page unreachable");
                    last_failure = e.to_string();
                }
            }
        }
        Err(MatchError::SourceUnavailable(format!(
            "breeder page failed ({last_failure})"
        )))
    }

    async fn strain_detail(&self, url: &str) -> Result<StrainDetail, MatchError> {
        let response = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MatchError::SourceUnavailable(format!("detail page failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MatchError::SourceUnavailable(format!(
                "detail page failed (status {status})"
            )));
        }

        let html = response.text().await.map_err(|e| {
            MatchError::SourceUnavailable(format!("failed to read detail page: {e}"))
        })?;
        Ok(parse_strain_detail(&html))
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Parse a breeder listing into candidate rows. The listing is a
/// `table.table` with one `tr` per strain; the first cell's anchor carries
/// the name and detail link, the second cell the breeder column. Rows
/// without an anchor are skipped; a missing table is schema drift.
fn parse_candidate_rows(html: &str, base_url: &str) -> Result<Vec<CandidateRow>, MatchError> {
    let document = Html::parse_document(html);
    let tbody_sel = Selector::parse("table.table tbody").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let cell_sel = Selector::parse("td").unwrap();
    let anchor_sel = Selector::parse("a").unwrap();

    let tbody = document.select(&tbody_sel).next().ok_or_else(|| {
        MatchError::SourceUnavailable("no strain table found on breeder page".to_string())
    })?;

    let mut rows = Vec::new();
    for tr in tbody.select(&row_sel) {
        let cells: Vec<ElementRef> = tr.select(&cell_sel).collect();
        if cells.is_empty() {
            continue;
        }
        let Some(anchor) = cells[0].select(&anchor_sel).next() else {
            continue;
        };
        let name = cell_text(anchor);
        if name.is_empty() {
            continue;
        }

        let detail_url = anchor
            .value()
            .attr("href")
            .map(|href| resolve_url(href, base_url))
            .unwrap_or_default();

        rows.push(CandidateRow {
            name,
            breeder: cells.get(1).map(|c| cell_text(*c)).unwrap_or_default(),
            detail_url,
            flower_time: cells.get(2).map(|c| cell_text(*c)).filter(|t| !t.is_empty()),
            plant_type: cells.get(3).map(|c| cell_text(*c)).filter(|t| !t.is_empty()),
            feminized: cells.get(4).map(|c| cell_text(*c)).filter(|t| !t.is_empty()),
        });
    }

    Ok(rows)
}

fn resolve_url(raw: &str, base_url: &str) -> String {
    if raw.is_empty() || raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if raw.starts_with('/') {
        format!("{base_url}{raw}")
    } else {
        format!("{base_url}/{raw}")
    }
}

/// Scrape the free-form parts of a strain detail page: up to three
/// heading + paragraph pairs, and the first absolute catalogue image.
fn parse_strain_detail(html: &str) -> StrainDetail {
    let document = Html::parse_document(html);
    let h2_sel = Selector::parse("h2").unwrap();
    let img_sel = Selector::parse("img").unwrap();

    let mut parts = Vec::new();
    for h2 in document.select(&h2_sel).take(3) {
        let heading = cell_text(h2);
        let paragraph = h2
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "p")
            .map(cell_text);
        if let Some(p) = paragraph.filter(|p| !p.is_empty()) {
            parts.push(format!("{heading}\n{p}"));
        }
    }

    let image_url = document
        .select(&img_sel)
        .filter_map(|img| {
            img.value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"))
        })
        .find(|src| src.starts_with("http") && src.contains("seedfinder"))
        .map(String::from);

    StrainDetail {
        description: if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        },
        image_url,
    }
}
