use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::catalog::CatalogLookup;
use crate::domain::{ObjectIdentity, SourceName};
use crate::error::SpectraError;
use crate::fits;
use crate::http;
use crate::sources::{DownloadStatus, SourceOutcome, SpectrumSource};
use crate::store::{ArtifactStore, sanitize_file_name};

pub const DEFAULT_GALAH_URL: &str = "https://datacentral.org.au/vo/slink/links";

/// HERMES camera bands, in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalahFilter {
    Blue,
    Green,
    Red,
    Infrared,
}

impl GalahFilter {
    pub const ALL: [GalahFilter; 4] = [
        GalahFilter::Blue,
        GalahFilter::Green,
        GalahFilter::Red,
        GalahFilter::Infrared,
    ];

    pub fn code(self) -> &'static str {
        match self {
            GalahFilter::Blue => "B",
            GalahFilter::Green => "G",
            GalahFilter::Red => "R",
            GalahFilter::Infrared => "I",
        }
    }
}

impl fmt::Display for GalahFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

pub trait GalahClient: Send + Sync {
    fn download_fits(
        &self,
        sobject_id: &str,
        filter: GalahFilter,
        destination: &Path,
    ) -> Result<DownloadStatus, SpectraError>;
}

#[derive(Clone)]
pub struct GalahHttpClient {
    client: Client,
    base_url: String,
}

impl GalahHttpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SpectraError> {
        let client = http::client(Duration::from_secs(60))
            .map_err(|err| SpectraError::GalahHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl GalahClient for GalahHttpClient {
    fn download_fits(
        &self,
        sobject_id: &str,
        filter: GalahFilter,
        destination: &Path,
    ) -> Result<DownloadStatus, SpectraError> {
        let mut response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("ID", sobject_id),
                ("DR", "galah_dr3"),
                ("IDX", "0"),
                ("FILT", filter.code()),
                ("RESPONSEFORMAT", "fits"),
            ])
            .send()
            .map_err(|err| SpectraError::GalahHttp(err.to_string()))?;
        if response.status() != reqwest::StatusCode::OK {
            return Ok(DownloadStatus::Missing(response.status().as_u16()));
        }
        let mut file =
            File::create(destination).map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SpectraError::GalahHttp(err.to_string()))?;
        Ok(DownloadStatus::Saved)
    }
}

/// Catalog + multi-filter adapter: one artifact per band that downloads and decodes.
pub struct GalahSource<C: GalahClient, L: CatalogLookup> {
    client: C,
    catalog: Option<L>,
}

impl<C: GalahClient, L: CatalogLookup> GalahSource<C, L> {
    pub fn new(client: C, catalog: Option<L>) -> Self {
        Self { client, catalog }
    }

    fn fetch_filter(
        &self,
        sobject_id: &str,
        filter: GalahFilter,
        store: &ArtifactStore,
    ) -> Result<Option<Utf8PathBuf>, SpectraError> {
        let prefix = format!("galah-{}-{filter}-", sanitize_file_name(sobject_id));
        let scratch = store.scratch_file(&prefix, ".fits")?;
        match self.client.download_fits(sobject_id, filter, scratch.path())? {
            DownloadStatus::Saved => {}
            DownloadStatus::Missing(status) => {
                debug!(sobject_id, filter = %filter, status, "no GALAH spectrum in band");
                return Ok(None);
            }
        }
        let payload =
            fs::read(scratch.path()).map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        let series = fits::decode(&payload)?;
        let path = store.write_series(&format!("galah-{sobject_id}_{filter}.csv"), &series)?;
        Ok(Some(path))
    }
}

impl<C: GalahClient, L: CatalogLookup> SpectrumSource for GalahSource<C, L> {
    fn name(&self) -> SourceName {
        SourceName::Galah
    }

    fn fetch(&self, identity: &ObjectIdentity, store: &ArtifactStore) -> SourceOutcome {
        let Some(catalog) = &self.catalog else {
            return SourceOutcome::empty(self.name(), "no GALAH catalog configured");
        };
        let Some(record_key) = identity.record_key() else {
            return SourceOutcome::empty(self.name(), "no Gaia source id");
        };
        let Some(record) = catalog.lookup(record_key) else {
            return SourceOutcome::empty(self.name(), "not in GALAH catalog");
        };

        let mut artifacts = Vec::new();
        for filter in GalahFilter::ALL {
            match self.fetch_filter(&record.key, filter, store) {
                Ok(Some(path)) => artifacts.push(path),
                Ok(None) => {}
                Err(err) => {
                    warn!(sobject_id = %record.key, filter = %filter, "GALAH band skipped: {err}");
                }
            }
        }
        SourceOutcome::from_result(self.name(), Ok(artifacts), "no GALAH band yielded a spectrum")
    }
}
