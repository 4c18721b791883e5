use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::repository::{RunRepository, StoreError};
use super::{CultivarSnapshot, MetricType, RunRecord, RunSummary};
use crate::cultivar::matcher::CultivarMatcher;
use crate::cultivar::{MatchError, MatchQuery, RankedCandidate};

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Match(#[from] MatchError),
}

// --- One request struct per operation, validated once at the boundary ---

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRun {
    pub friendly_name: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Accepted as a fallback for `start_time`; not stored separately.
    #[serde(default)]
    pub planted_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddPhase {
    pub phase_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddNote {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddBinding {
    pub metric_type: MetricType,
    pub sensor_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndRun {
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Manual snapshot, written as given.
#[derive(Debug, Clone, Deserialize)]
pub struct SetCultivar {
    pub name: String,
    pub breeder: String,
    #[serde(default)]
    pub flower_window_days: Option<u32>,
}

/// Matcher-driven snapshot. `on_no_match` picks the policy: `fail` surfaces
/// lookup errors (interactive flow), `unknown-breeder` stores a manual
/// placeholder instead (automation flow).
#[derive(Debug, Clone, Deserialize)]
pub struct MatchCultivar {
    pub breeder: String,
    pub strain: String,
    #[serde(default)]
    pub prefer_automatic: bool,
    #[serde(default)]
    pub on_no_match: MatchFallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchFallback {
    #[default]
    Fail,
    UnknownBreeder,
}

/// Lifecycle operations over the run store. Collaborators are injected, and
/// every mutation persists before the call returns. An unknown run id aborts
/// the operation with a logged, non-fatal error.
pub struct RunService {
    repo: Arc<dyn RunRepository>,
    matcher: CultivarMatcher,
    /// Serializes the read-modify-write cycle across concurrent callers so
    /// interleaved operations on one run cannot lose updates.
    write_lock: Mutex<()>,
}

impl RunService {
    pub fn new(repo: Arc<dyn RunRepository>, matcher: CultivarMatcher) -> Self {
        Self {
            repo,
            matcher,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn list_runs(&self) -> Vec<RunRecord> {
        self.repo.list().await
    }

    pub async fn summaries(&self) -> Vec<RunSummary> {
        self.repo
            .list()
            .await
            .iter()
            .map(RunSummary::project)
            .collect()
    }

    pub async fn get_run(&self, id: &str) -> Option<RunRecord> {
        self.repo.get(id).await
    }

    pub async fn search_cultivars(&self, query: &MatchQuery) -> Vec<RankedCandidate> {
        self.matcher.search(query).await
    }

    pub async fn create_run(&self, req: CreateRun) -> Result<RunRecord, ServiceError> {
        let _guard = self.write_lock.lock().await;
        let start = req
            .start_time
            .or(req.planted_date)
            .unwrap_or_else(Utc::now);
        let run = RunRecord::new(req.friendly_name, start);
        self.repo.add(run.clone()).await?;
        tracing::info!(run_id = %run.id, name = %run.friendly_name, "created run");
        Ok(run)
    }

    pub async fn add_phase(&self, run_id: &str, req: AddPhase) -> Result<RunRecord, ServiceError> {
        let run = self
            .mutate(run_id, |run| run.add_phase(&req.phase_name, Utc::now()))
            .await?;
        tracing::info!(run_id, phase = %req.phase_name, "added phase");
        Ok(run)
    }

    pub async fn add_note(&self, run_id: &str, req: AddNote) -> Result<RunRecord, ServiceError> {
        let run = self
            .mutate(run_id, |run| run.add_note(req.text, Utc::now()))
            .await?;
        tracing::info!(run_id, "added note");
        Ok(run)
    }

    pub async fn add_binding(
        &self,
        run_id: &str,
        req: AddBinding,
    ) -> Result<RunRecord, ServiceError> {
        let run = self
            .mutate(run_id, |run| run.set_binding(req.metric_type, req.sensor_id))
            .await?;
        tracing::info!(run_id, metric = ?req.metric_type, "bound sensor");
        Ok(run)
    }

    pub async fn end_run(&self, run_id: &str, req: EndRun) -> Result<RunRecord, ServiceError> {
        let end_time = req.end_time.unwrap_or_else(Utc::now);
        let run = self.mutate(run_id, |run| run.end(end_time)).await?;
        tracing::info!(run_id, "ended run");
        Ok(run)
    }

    pub async fn set_cultivar(
        &self,
        run_id: &str,
        req: SetCultivar,
    ) -> Result<RunRecord, ServiceError> {
        let snapshot = CultivarSnapshot {
            name: req.name,
            breeder: req.breeder,
            flower_window_days: req.flower_window_days,
        };
        let run = self.attach_cultivar(run_id, snapshot).await?;
        Ok(run)
    }

    /// Look the cultivar up in the catalogue and attach the best match. The
    /// lookup runs before the write lock is taken; no network I/O happens
    /// inside the persistence critical section.
    pub async fn match_cultivar(
        &self,
        run_id: &str,
        req: MatchCultivar,
    ) -> Result<RunRecord, ServiceError> {
        let query = MatchQuery {
            breeder: req.breeder.clone(),
            species: req.strain.clone(),
            prefer_automatic: req.prefer_automatic,
        };

        let snapshot = match self.matcher.best_profile(&query).await {
            Ok(profile) => profile.snapshot(),
            Err(e) if req.on_no_match == MatchFallback::UnknownBreeder => {
                tracing::warn!(
                    run_id,
                    breeder = %req.breeder,
                    strain = %req.strain,
                    error = %e,
                    "cultivar lookup failed, storing manual fallback"
                );
                CultivarSnapshot {
                    name: req.strain,
                    breeder: "Unknown breeder".to_string(),
                    flower_window_days: None,
                }
            }
            Err(e) => return Err(e.into()),
        };

        self.attach_cultivar(run_id, snapshot).await
    }

    async fn attach_cultivar(
        &self,
        run_id: &str,
        snapshot: CultivarSnapshot,
    ) -> Result<RunRecord, ServiceError> {
        let name = snapshot.name.clone();
        let run = self
            .mutate(run_id, |run| run.cultivar = Some(snapshot))
            .await?;
        tracing::info!(run_id, cultivar = %name, "set cultivar");
        Ok(run)
    }

    async fn mutate<F>(&self, run_id: &str, apply: F) -> Result<RunRecord, ServiceError>
    where
        F: FnOnce(&mut RunRecord),
    {
        let _guard = self.write_lock.lock().await;
        let Some(mut run) = self.repo.get(run_id).await else {
            tracing::warn!(run_id, "run not found");
            return Err(StoreError::NotFound(run_id.to_string()).into());
        };
        apply(&mut run);
        self.repo.update(run.clone()).await?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cultivar::{CandidateRow, CatalogueSource, StrainDetail};
    use crate::runs::RunStatus;
    use crate::runs::file_repository::FileRunRepository;
    use async_trait::async_trait;
    use tempfile::{TempDir, tempdir};

    struct StaticSource {
        rows: Vec<CandidateRow>,
        available: bool,
    }

    #[async_trait]
    impl CatalogueSource for StaticSource {
        async fn candidate_rows(&self, _slug: &str) -> Result<Vec<CandidateRow>, MatchError> {
            if self.available {
                Ok(self.rows.clone())
            } else {
                Err(MatchError::SourceUnavailable("breeder page failed (timeout)".into()))
            }
        }

        async fn strain_detail(&self, _url: &str) -> Result<StrainDetail, MatchError> {
            Ok(StrainDetail::default())
        }
    }

    fn service_with_rows(dir: &TempDir, rows: Vec<CandidateRow>, available: bool) -> RunService {
        let repo = Arc::new(FileRunRepository::new(dir.path()));
        let matcher = CultivarMatcher::new(Arc::new(StaticSource { rows, available }));
        RunService::new(repo, matcher)
    }

    fn service(dir: &TempDir) -> RunService {
        service_with_rows(dir, Vec::new(), true)
    }

    fn candidate(name: &str) -> CandidateRow {
        CandidateRow {
            name: name.to_string(),
            breeder: "Humboldt Seed Co".to_string(),
            detail_url: "https://seedfinder.eu/en/strain-info/blue_dream/".to_string(),
            flower_time: Some("~65 days".to_string()),
            plant_type: None,
            feminized: None,
        }
    }

    fn create_req(name: &str) -> CreateRun {
        CreateRun {
            friendly_name: name.to_string(),
            start_time: None,
            planted_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        assert_eq!(run.status, RunStatus::Active);
        assert!(run.phases.is_empty());
        assert!(run.notes.is_empty());
        assert!(run.bindings.is_empty());

        let listed = svc.list_runs().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, run.id);
    }

    #[tokio::test]
    async fn test_create_uses_planted_date_fallback() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let planted = "2026-03-01T08:00:00Z".parse().unwrap();
        let run = svc
            .create_run(CreateRun {
                friendly_name: "Tent A".to_string(),
                start_time: None,
                planted_date: Some(planted),
            })
            .await
            .unwrap();
        assert_eq!(run.start_time, planted);
    }

    #[tokio::test]
    async fn test_operations_on_unknown_run_abort_without_mutation() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        svc.create_run(create_req("Tent A")).await.unwrap();
        let before = svc.list_runs().await;

        let err = svc
            .add_phase("missing", AddPhase { phase_name: "Seedling".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::NotFound(_))));

        let err = svc
            .add_note("missing", AddNote { text: "hello".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::NotFound(_))));

        assert_eq!(svc.list_runs().await, before);
    }

    #[tokio::test]
    async fn test_mutations_persist_across_reload() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        svc.add_phase(&run.id, AddPhase { phase_name: "Vegetative".into() })
            .await
            .unwrap();
        svc.add_binding(
            &run.id,
            AddBinding {
                metric_type: MetricType::Humidity,
                sensor_id: "sensor.tent_rh".into(),
            },
        )
        .await
        .unwrap();

        // A fresh repository sees everything the service wrote
        let repo2 = FileRunRepository::new(dir.path());
        repo2.load().await.unwrap();
        let loaded = repo2.get(&run.id).await.unwrap();
        assert_eq!(loaded.phases.len(), 1);
        assert_eq!(loaded.bindings.len(), 1);
    }

    #[tokio::test]
    async fn test_end_run_with_explicit_time() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        svc.add_phase(&run.id, AddPhase { phase_name: "Flowering".into() })
            .await
            .unwrap();

        let end = "2026-08-01T12:00:00Z".parse().unwrap();
        let ended = svc
            .end_run(&run.id, EndRun { end_time: Some(end) })
            .await
            .unwrap();
        assert_eq!(ended.status, RunStatus::Ended);
        assert_eq!(ended.end_time, Some(end));
        assert_eq!(ended.phases[0].end_time, Some(end));
    }

    #[tokio::test]
    async fn test_set_cultivar_manual() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        let updated = svc
            .set_cultivar(
                &run.id,
                SetCultivar {
                    name: "Northern Lights".into(),
                    breeder: "Sensi".into(),
                    flower_window_days: Some(49),
                },
            )
            .await
            .unwrap();

        let cultivar = updated.cultivar.unwrap();
        assert_eq!(cultivar.name, "Northern Lights");
        assert_eq!(cultivar.flower_window_days, Some(49));
    }

    #[tokio::test]
    async fn test_match_cultivar_attaches_best_match() {
        let dir = tempdir().unwrap();
        let svc = service_with_rows(&dir, vec![candidate("Blue Dream")], true);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        let updated = svc
            .match_cultivar(
                &run.id,
                MatchCultivar {
                    breeder: "Humboldt Seed Co".into(),
                    strain: "Blue Dream".into(),
                    prefer_automatic: false,
                    on_no_match: MatchFallback::Fail,
                },
            )
            .await
            .unwrap();

        let cultivar = updated.cultivar.unwrap();
        assert_eq!(cultivar.name, "Blue Dream");
        assert_eq!(cultivar.breeder, "Humboldt Seed Co");
        assert_eq!(cultivar.flower_window_days, Some(65));
    }

    #[tokio::test]
    async fn test_match_cultivar_strict_surfaces_failure() {
        let dir = tempdir().unwrap();
        let svc = service_with_rows(&dir, Vec::new(), false);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        let err = svc
            .match_cultivar(
                &run.id,
                MatchCultivar {
                    breeder: "Humboldt Seed Co".into(),
                    strain: "Blue Dream".into(),
                    prefer_automatic: false,
                    on_no_match: MatchFallback::Fail,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Match(MatchError::SourceUnavailable(_))));

        // No mutation on failure
        assert!(svc.get_run(&run.id).await.unwrap().cultivar.is_none());
    }

    #[tokio::test]
    async fn test_match_cultivar_lenient_stores_unknown_breeder() {
        let dir = tempdir().unwrap();
        let svc = service_with_rows(&dir, Vec::new(), false);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        let updated = svc
            .match_cultivar(
                &run.id,
                MatchCultivar {
                    breeder: "Humboldt Seed Co".into(),
                    strain: "Blue Dream".into(),
                    prefer_automatic: false,
                    on_no_match: MatchFallback::UnknownBreeder,
                },
            )
            .await
            .unwrap();

        let cultivar = updated.cultivar.unwrap();
        assert_eq!(cultivar.name, "Blue Dream");
        assert_eq!(cultivar.breeder, "Unknown breeder");
        assert!(cultivar.flower_window_days.is_none());
    }

    #[tokio::test]
    async fn test_harvest_phase_via_service_ends_run() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let run = svc.create_run(create_req("Tent A")).await.unwrap();
        let updated = svc
            .add_phase(&run.id, AddPhase { phase_name: "harvest".into() })
            .await
            .unwrap();
        assert_eq!(updated.status, RunStatus::Ended);
        assert!(updated.end_time.is_some());
    }
}
