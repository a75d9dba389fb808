use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;

use crate::domain::{GaiaSourceId, ObjectIdentity, SourceName, SpectrumSeries};
use crate::error::SpectraError;
use crate::fs_util;
use crate::http;
use crate::sources::{SourceOutcome, SpectrumSource};
use crate::store::ArtifactStore;
use crate::table::CsvTable;

pub const DEFAULT_GAIA_URL: &str = "https://gea.esac.esa.int";

pub trait GaiaClient: Send + Sync {
    /// Raw DataLink payload for the RVS product, `None` when the archive has none.
    fn load_rvs(&self, source_id: &GaiaSourceId) -> Result<Option<Vec<u8>>, SpectraError>;
}

#[derive(Clone)]
pub struct GaiaDataLinkClient {
    client: Client,
    base_url: String,
}

impl GaiaDataLinkClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SpectraError> {
        let client = http::client(Duration::from_secs(60))
            .map_err(|err| SpectraError::GaiaHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn data_url(&self) -> String {
        format!("{}/data-server/data", self.base_url)
    }
}

impl GaiaClient for GaiaDataLinkClient {
    fn load_rvs(&self, source_id: &GaiaSourceId) -> Result<Option<Vec<u8>>, SpectraError> {
        let id = format!("Gaia DR3 {source_id}");
        let response = self
            .client
            .get(self.data_url())
            .query(&[
                ("RETRIEVAL_TYPE", "RVS"),
                ("ID", id.as_str()),
                ("DATA_STRUCTURE", "INDIVIDUAL"),
                ("RELEASE", "Gaia DR3"),
                ("FORMAT", "csv"),
                ("VALID_DATA", "false"),
                ("USE_ZIP_ALWAYS", "true"),
            ])
            .send()
            .map_err(|err| SpectraError::GaiaHttp(err.to_string()))?;

        let status = response.status();
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::NOT_FOUND) {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Gaia DataLink request failed".to_string());
            return Err(SpectraError::GaiaStatus {
                status: status.as_u16(),
                message,
            });
        }
        let bytes = response
            .bytes()
            .map_err(|err| SpectraError::GaiaHttp(err.to_string()))?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(bytes.to_vec()))
    }
}

/// Direct-ID adapter: needs only the Gaia DR3 record key.
pub struct GaiaRvsSource<C: GaiaClient> {
    client: C,
}

impl<C: GaiaClient> GaiaRvsSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    fn try_fetch(
        &self,
        source_id: &GaiaSourceId,
        store: &ArtifactStore,
    ) -> Result<Vec<Utf8PathBuf>, SpectraError> {
        let start = Instant::now();
        let payload = self.client.load_rvs(source_id)?;
        debug!(
            source_id = %source_id,
            latency_ms = start.elapsed().as_millis() as u64,
            "gaia.response"
        );
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        let Some(series) = rvs_series(&payload)? else {
            return Ok(Vec::new());
        };
        let path = store.write_series(&format!("gaia-dr3-{source_id}.csv"), &series)?;
        Ok(vec![path])
    }
}

impl<C: GaiaClient> SpectrumSource for GaiaRvsSource<C> {
    fn name(&self) -> SourceName {
        SourceName::GaiaRvs
    }

    fn fetch(&self, identity: &ObjectIdentity, store: &ArtifactStore) -> SourceOutcome {
        let Some(record_key) = identity.record_key() else {
            return SourceOutcome::empty(self.name(), "no Gaia source id");
        };
        let result = record_key
            .parse::<GaiaSourceId>()
            .and_then(|source_id| self.try_fetch(&source_id, store));
        SourceOutcome::from_result(self.name(), result, "no RVS spectrum in the Gaia archive")
    }
}

/// Extracts the first RVS table from a DataLink payload, zipped or bare.
pub fn rvs_series(payload: &[u8]) -> Result<Option<SpectrumSeries>, SpectraError> {
    if !fs_util::is_zip(payload) {
        return parse_rvs_table(&String::from_utf8_lossy(payload)).map(Some);
    }
    let entries = fs_util::read_zip_entries(payload)?;
    let entry = entries
        .iter()
        .find(|entry| entry.name.to_ascii_lowercase().ends_with(".csv"))
        .or_else(|| entries.first());
    match entry {
        Some(entry) => parse_rvs_table(&String::from_utf8_lossy(&entry.bytes)).map(Some),
        None => Ok(None),
    }
}

pub fn parse_rvs_table(text: &str) -> Result<SpectrumSeries, SpectraError> {
    let table = CsvTable::parse(text)?;
    let wavelength = table.float_column("wavelength")?;
    let flux = table.float_column("flux")?;
    let error = match table.column_index("flux_error") {
        Some(_) => Some(table.float_column("flux_error")?),
        None => None,
    };
    if wavelength.is_empty() {
        return Err(SpectraError::Table("RVS table has no rows".to_string()));
    }
    Ok(SpectrumSeries::new(wavelength, flux, error)?)
}
