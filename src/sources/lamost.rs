use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use tracing::debug;

use crate::catalog::CatalogLookup;
use crate::domain::{ObjectIdentity, SourceName};
use crate::error::SpectraError;
use crate::http;
use crate::sources::{SourceOutcome, SpectrumSource};
use crate::store::ArtifactStore;

pub const DEFAULT_LAMOST_URL: &str = "http://dr7.lamost.org";

pub trait LamostClient: Send + Sync {
    /// The archive's own CSV rendering of one observation.
    fn fetch_csv(&self, obsid: &str) -> Result<String, SpectraError>;
}

#[derive(Clone)]
pub struct LamostHttpClient {
    client: Client,
    base_url: String,
}

impl LamostHttpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SpectraError> {
        let client = http::client(Duration::from_secs(60))
            .map_err(|err| SpectraError::LamostHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn spectrum_url(&self, obsid: &str) -> String {
        format!("{}/spectrum/fits2csv/{obsid}", self.base_url)
    }
}

impl LamostClient for LamostHttpClient {
    fn fetch_csv(&self, obsid: &str) -> Result<String, SpectraError> {
        let response = self
            .client
            .get(self.spectrum_url(obsid))
            .send()
            .map_err(|err| SpectraError::LamostHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "LAMOST request failed".to_string());
            return Err(SpectraError::LamostStatus { status, message });
        }
        response
            .text()
            .map_err(|err| SpectraError::LamostHttp(err.to_string()))
    }
}

/// Catalog + HTTP adapter. Without a catalog the source is skipped.
pub struct LamostSource<C: LamostClient, L: CatalogLookup> {
    client: C,
    catalog: Option<L>,
}

impl<C: LamostClient, L: CatalogLookup> LamostSource<C, L> {
    pub fn new(client: C, catalog: Option<L>) -> Self {
        Self { client, catalog }
    }
}

impl<C: LamostClient, L: CatalogLookup> SpectrumSource for LamostSource<C, L> {
    fn name(&self) -> SourceName {
        SourceName::Lamost
    }

    fn fetch(&self, identity: &ObjectIdentity, store: &ArtifactStore) -> SourceOutcome {
        let Some(catalog) = &self.catalog else {
            return SourceOutcome::empty(self.name(), "no LAMOST catalog configured");
        };
        let Some(record_key) = identity.record_key() else {
            return SourceOutcome::empty(self.name(), "no Gaia source id");
        };
        let Some(record) = catalog.lookup(record_key) else {
            return SourceOutcome::empty(self.name(), "not in LAMOST catalog");
        };

        let start = Instant::now();
        let result = self.client.fetch_csv(&record.key).and_then(|content| {
            debug!(
                obsid = %record.key,
                latency_ms = start.elapsed().as_millis() as u64,
                "lamost.response"
            );
            if content.trim().is_empty() {
                return Ok(Vec::<Utf8PathBuf>::new());
            }
            let path = store.write_text(&format!("lamost-{}.csv", record.key), &content)?;
            Ok(vec![path])
        });
        SourceOutcome::from_result(self.name(), result, "LAMOST returned an empty spectrum")
    }
}
