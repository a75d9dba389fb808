use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{
    AggregatedResponse, ObjectIdentity, SourceName, SourceResult, filter_label_from_path,
};
use crate::error::SpectraError;
use crate::resolver::IdentityResolver;
use crate::simbad::SimbadClient;
use crate::sources::{SourceOutcome, SpectrumSource};
use crate::store::{ArtifactStore, sanitize_file_name};

/// How adapters are scheduled for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetrievalMode {
    #[default]
    Sequential,
    /// One scoped thread per adapter; results are still reported in adapter order.
    Parallel,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: SourceName,
    pub status: &'static str,
    pub artifacts: usize,
    pub detail: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub response: AggregatedResponse,
    pub reports: Vec<SourceReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseEntry {
    pub source: SourceName,
    pub file_name: String,
    pub artifact_path: Utf8PathBuf,
    pub artifact_url: Option<String>,
    pub filter_label: Option<String>,
    pub wavelength_unit: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub identifier: String,
    pub identity: ObjectIdentity,
    pub entries: Vec<ResponseEntry>,
    pub reports: Vec<SourceReport>,
    pub manifest_path: Utf8PathBuf,
    pub fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<S: SimbadClient> {
    store: ArtifactStore,
    resolver: IdentityResolver<S>,
    sources: Vec<Box<dyn SpectrumSource>>,
    mode: RetrievalMode,
    artifact_base_url: Option<String>,
}

impl<S: SimbadClient> App<S> {
    /// Adapters are kept in their fixed order regardless of how they are passed in.
    pub fn new(
        store: ArtifactStore,
        resolver: IdentityResolver<S>,
        mut sources: Vec<Box<dyn SpectrumSource>>,
    ) -> Self {
        sources.sort_by_key(|source| source.name());
        Self {
            store,
            resolver,
            sources,
            mode: RetrievalMode::Sequential,
            artifact_base_url: None,
        }
    }

    pub fn with_mode(mut self, mode: RetrievalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_artifact_base_url(mut self, base_url: Option<String>) -> Self {
        self.artifact_base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn source_names(&self) -> Vec<SourceName> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    pub fn resolve(
        &self,
        identifier: &str,
        sink: &dyn ProgressSink,
    ) -> Result<ObjectIdentity, SpectraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {identifier}"),
            elapsed: None,
        });
        let start = Instant::now();
        let identity = self
            .resolver
            .resolve(identifier)
            .ok_or_else(|| SpectraError::ResolutionFailed(identifier.to_string()))?;
        sink.event(ProgressEvent {
            message: format!(
                "simbad.response record_key={}",
                identity.record_key().unwrap_or("-")
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(identity)
    }

    /// Runs every enabled adapter and flattens their artifacts in adapter order.
    pub fn retrieve(&self, identity: &ObjectIdentity) -> Retrieval {
        let timed = match self.mode {
            RetrievalMode::Sequential => self
                .sources
                .iter()
                .map(|source| run_source(source.as_ref(), identity, &self.store))
                .collect::<Vec<_>>(),
            RetrievalMode::Parallel => self.retrieve_parallel(identity),
        };

        let mut response = AggregatedResponse::default();
        let mut reports = Vec::with_capacity(timed.len());
        for (source, outcome, latency) in timed {
            for path in outcome.artifacts() {
                response.entries.push(SourceResult {
                    source_name: source,
                    artifact_paths: vec![path.clone()],
                    filter_label: filter_label_from_path(path),
                });
            }
            reports.push(SourceReport {
                source,
                status: outcome.status(),
                artifacts: outcome.artifacts().len(),
                detail: outcome.detail(),
                latency_ms: latency.as_millis() as u64,
            });
        }
        Retrieval { response, reports }
    }

    fn retrieve_parallel(
        &self,
        identity: &ObjectIdentity,
    ) -> Vec<(SourceName, SourceOutcome, Duration)> {
        let store = &self.store;
        thread::scope(|scope| {
            let handles = self
                .sources
                .iter()
                .map(|source| {
                    let name = source.name();
                    let handle = scope.spawn(move || run_source(source.as_ref(), identity, store));
                    (name, handle)
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|(name, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        warn!(source = %name, "adapter thread panicked");
                        (
                            name,
                            SourceOutcome::Failed(SpectraError::AdapterPanicked(name.to_string())),
                            Duration::ZERO,
                        )
                    })
                })
                .collect()
        })
    }

    /// Resolve, retrieve and record a manifest. Zero artifacts is `NotFound`.
    pub fn fetch(
        &self,
        identifier: &str,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, SpectraError> {
        let identity = self.resolve(identifier, sink)?;
        self.store.ensure_roots()?;

        sink.event(ProgressEvent {
            message: format!("phase=Retrieve; {} sources", self.sources.len()),
            elapsed: None,
        });
        let start = Instant::now();
        let Retrieval { response, reports } = self.retrieve(&identity);
        for report in &reports {
            sink.event(ProgressEvent {
                message: format!(
                    "{}.response status={} artifacts={} latency_ms={}",
                    report.source.label(),
                    report.status,
                    report.artifacts,
                    report.latency_ms
                ),
                elapsed: None,
            });
        }
        sink.event(ProgressEvent {
            message: "phase=Retrieve; done".to_string(),
            elapsed: Some(start.elapsed()),
        });

        if response.is_empty() {
            return Err(SpectraError::NotFound(identifier.to_string()));
        }

        let entries = response
            .entries
            .iter()
            .flat_map(|result| {
                result
                    .artifact_paths
                    .iter()
                    .map(|path| self.response_entry(result, path))
            })
            .collect::<Vec<_>>();

        let mut result = FetchResult {
            identifier: identifier.to_string(),
            identity,
            entries,
            reports,
            manifest_path: Utf8PathBuf::new(),
            fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        sink.event(ProgressEvent {
            message: "phase=Store; writing manifest".to_string(),
            elapsed: None,
        });
        let manifest_name = format!("manifest-{}.json", sanitize_file_name(identifier));
        result.manifest_path = self.store.artifact_path(&manifest_name);
        self.store.write_json(&manifest_name, &result)?;
        info!(
            identifier,
            entries = result.entries.len(),
            manifest = %result.manifest_path,
            "fetch complete"
        );
        Ok(result)
    }

    fn response_entry(&self, result: &SourceResult, path: &Utf8Path) -> ResponseEntry {
        let file_name = path.file_name().unwrap_or(path.as_str()).to_string();
        ResponseEntry {
            source: result.source_name,
            artifact_url: self
                .artifact_base_url
                .as_ref()
                .map(|base| format!("{base}/{file_name}")),
            file_name,
            artifact_path: path.to_path_buf(),
            filter_label: result.filter_label.clone(),
            wavelength_unit: result.source_name.wavelength_unit(),
        }
    }
}

fn run_source(
    source: &dyn SpectrumSource,
    identity: &ObjectIdentity,
    store: &ArtifactStore,
) -> (SourceName, SourceOutcome, Duration) {
    let name = source.name();
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.fetch(identity, store)))
        .unwrap_or_else(|_| {
            warn!(source = %name, "adapter panicked");
            SourceOutcome::Failed(SpectraError::AdapterPanicked(name.to_string()))
        });
    (name, outcome, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simbad::SimbadCoordinates;

    struct NoSimbad;

    impl SimbadClient for NoSimbad {
        fn query_object(&self, _: &str) -> Result<Option<SimbadCoordinates>, SpectraError> {
            Ok(None)
        }

        fn query_object_ids(&self, _: &str) -> Result<Vec<String>, SpectraError> {
            Ok(Vec::new())
        }
    }

    struct Fixed(SourceName, &'static [&'static str]);

    impl SpectrumSource for Fixed {
        fn name(&self) -> SourceName {
            self.0
        }

        fn fetch(&self, _: &ObjectIdentity, store: &ArtifactStore) -> SourceOutcome {
            SourceOutcome::Found(self.1.iter().map(|name| store.artifact_path(name)).collect())
        }
    }

    struct Exploding;

    impl SpectrumSource for Exploding {
        fn name(&self) -> SourceName {
            SourceName::Lamost
        }

        fn fetch(&self, _: &ObjectIdentity, _: &ArtifactStore) -> SourceOutcome {
            panic!("corrupt payload")
        }
    }

    fn app(mode: RetrievalMode) -> App<NoSimbad> {
        let store = ArtifactStore::new_with_paths("/out".into(), "/scratch".into());
        let sources: Vec<Box<dyn SpectrumSource>> = vec![
            Box::new(Fixed(SourceName::Rave, &["rave-1.csv"])),
            Box::new(Fixed(SourceName::Galah, &["galah-9_B.csv", "galah-9_R.csv"])),
            Box::new(Fixed(SourceName::GaiaRvs, &["gaia-dr3-1.csv"])),
        ];
        App::new(store, IdentityResolver::new(NoSimbad), sources).with_mode(mode)
    }

    #[test]
    fn entries_follow_adapter_order_in_both_modes() {
        for mode in [RetrievalMode::Sequential, RetrievalMode::Parallel] {
            let retrieval = app(mode).retrieve(&ObjectIdentity::new("x"));
            let order = retrieval
                .response
                .entries
                .iter()
                .map(|entry| (entry.source_name, entry.filter_label.clone()))
                .collect::<Vec<_>>();
            assert_eq!(
                order,
                vec![
                    (SourceName::GaiaRvs, None),
                    (SourceName::Galah, Some("B".to_string())),
                    (SourceName::Galah, Some("R".to_string())),
                    (SourceName::Rave, None),
                ]
            );
            assert_eq!(retrieval.reports.len(), 3);
        }
    }

    #[test]
    fn panicking_adapter_is_reported_as_failed_in_both_modes() {
        for mode in [RetrievalMode::Sequential, RetrievalMode::Parallel] {
            let store = ArtifactStore::new_with_paths("/out".into(), "/scratch".into());
            let sources: Vec<Box<dyn SpectrumSource>> = vec![
                Box::new(Exploding),
                Box::new(Fixed(SourceName::GaiaRvs, &["gaia-dr3-1.csv"])),
            ];
            let retrieval = App::new(store, IdentityResolver::new(NoSimbad), sources)
                .with_mode(mode)
                .retrieve(&ObjectIdentity::new("x"));
            assert_eq!(retrieval.response.entries.len(), 1);
            let lamost = &retrieval.reports[1];
            assert_eq!(lamost.source, SourceName::Lamost);
            assert_eq!(lamost.status, "failed");
        }
    }
}
