use std::fs::{self, File};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::domain::{ObjectIdentity, SourceName};
use crate::error::SpectraError;
use crate::fits;
use crate::http;
use crate::sources::{DownloadStatus, SourceOutcome, SpectrumSource};
use crate::store::{ArtifactStore, sanitize_file_name};
use crate::table::CsvTable;

pub const DEFAULT_RAVE_URL: &str = "https://www.rave-survey.org";
pub const DEFAULT_SEARCH_RADIUS_DEG: f64 = 0.1;
const QUERY_NAME: &str = "simple_cs_adql";

#[derive(Debug, Clone)]
pub struct RaveOptions {
    pub token: Option<String>,
    pub search_radius_deg: f64,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RaveOptions {
    fn default() -> Self {
        Self {
            token: None,
            search_radius_deg: DEFAULT_SEARCH_RADIUS_DEG,
            job_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeSearch {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub radius_deg: f64,
}

impl ConeSearch {
    /// ADQL selecting every DR6 observation inside the cone, nearest first.
    pub fn to_adql(&self) -> String {
        let (ra, dec, radius) = (self.ra_deg, self.dec_deg, self.radius_deg);
        format!(
            "SELECT rave_obs_id, ra_input, dec_input, DISTANCE(\
             POINT('ICRS', ra_input, dec_input), POINT('ICRS', {ra:.4}, {dec:.4})) AS dist \
             FROM ravedr6.dr6_obsdata \
             WHERE 1 = CONTAINS(POINT('ICRS', ra_input, dec_input), \
             CIRCLE('ICRS', {ra:.4}, {dec:.4}, {radius:.4})) \
             ORDER BY dist"
        )
    }
}

pub trait RaveClient: Send + Sync {
    /// `false` when no access token is available; the adapter then skips the archive.
    fn is_authorized(&self) -> bool {
        true
    }
    fn cone_search(&self, cone: &ConeSearch) -> Result<Vec<String>, SpectraError>;
    fn download_fits(
        &self,
        obs_id: &str,
        destination: &Path,
    ) -> Result<DownloadStatus, SpectraError>;
}

/// Asynchronous (UWS) TAP client for the RAVE DR6 service.
#[derive(Clone)]
pub struct RaveTapClient {
    client: Client,
    base_url: String,
    options: RaveOptions,
}

impl RaveTapClient {
    pub fn new(base_url: impl Into<String>, options: RaveOptions) -> Result<Self, SpectraError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &options.token {
            let mut value = HeaderValue::from_str(&format!("Token {token}"))
                .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .user_agent(http::user_agent())
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            options,
        })
    }

    pub fn async_url(&self) -> String {
        format!("{}/tap/async", self.base_url)
    }

    pub fn fits_url(&self, obs_id: &str) -> String {
        format!(
            "{}/files/fits/{}/RAVE_{obs_id}.fits",
            self.base_url,
            observation_date(obs_id)
        )
    }

    fn handle_status(response: Response) -> Result<Response, SpectraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "RAVE TAP request failed".to_string());
        Err(SpectraError::RaveStatus { status, message })
    }

    fn submit_job(&self, query: &str) -> Result<String, SpectraError> {
        let submit_url = self.async_url();
        let response = self
            .client
            .post(&submit_url)
            .form(&[
                ("REQUEST", "doQuery"),
                ("LANG", "ADQL"),
                ("QUERY", query),
                ("RUNID", QUERY_NAME),
                ("QUEUE", "60s"),
                ("RESPONSEFORMAT", "csv"),
            ])
            .send()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;

        // Most services answer 303 to the job resource, which reqwest follows.
        let final_url = response.url().as_str().trim_end_matches('/').to_string();
        if final_url != submit_url {
            return Ok(final_url);
        }
        let body = response
            .text()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        let job_id = parse_job_id(&body).ok_or_else(|| SpectraError::TapJob {
            phase: "PENDING".to_string(),
            message: "submission returned no job id".to_string(),
        })?;
        Ok(format!("{submit_url}/{job_id}"))
    }

    fn run_job(&self, job_url: &str) -> Result<(), SpectraError> {
        let response = self
            .client
            .post(format!("{job_url}/phase"))
            .form(&[("PHASE", "RUN")])
            .send()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        Self::handle_status(response)?;
        Ok(())
    }

    fn phase(&self, job_url: &str) -> Result<String, SpectraError> {
        let response = self
            .client
            .get(format!("{job_url}/phase"))
            .send()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        let text = Self::handle_status(response)?
            .text()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        Ok(text.trim().to_ascii_uppercase())
    }

    /// Polls until the job reaches a terminal phase or the wait bound elapses.
    fn wait_for_completion(&self, job_url: &str) -> Result<(), SpectraError> {
        let start = Instant::now();
        loop {
            let phase = self.phase(job_url)?;
            match phase.as_str() {
                "COMPLETED" => return Ok(()),
                "ERROR" | "ABORTED" => {
                    return Err(SpectraError::TapJob {
                        phase,
                        message: format!("job {job_url} did not complete"),
                    });
                }
                _ => {}
            }
            if start.elapsed() >= self.options.job_timeout {
                return Err(SpectraError::TapJob {
                    phase,
                    message: format!(
                        "no terminal phase after {}s",
                        self.options.job_timeout.as_secs()
                    ),
                });
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    fn fetch_result(&self, job_url: &str) -> Result<String, SpectraError> {
        let response = self
            .client
            .get(format!("{job_url}/results/result"))
            .send()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        Self::handle_status(response)?
            .text()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))
    }
}

impl RaveClient for RaveTapClient {
    fn is_authorized(&self) -> bool {
        self.options.token.is_some()
    }

    fn cone_search(&self, cone: &ConeSearch) -> Result<Vec<String>, SpectraError> {
        let start = Instant::now();
        let job_url = self.submit_job(&cone.to_adql())?;
        debug!(job = %job_url, "rave.job submitted");
        self.run_job(&job_url)?;
        self.wait_for_completion(&job_url)?;
        let csv = self.fetch_result(&job_url)?;
        debug!(
            job = %job_url,
            latency_ms = start.elapsed().as_millis() as u64,
            "rave.job completed"
        );
        observation_ids(&csv)
    }

    fn download_fits(
        &self,
        obs_id: &str,
        destination: &Path,
    ) -> Result<DownloadStatus, SpectraError> {
        let mut response = self
            .client
            .get(self.fits_url(obs_id))
            .send()
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        if response.status() != reqwest::StatusCode::OK {
            return Ok(DownloadStatus::Missing(response.status().as_u16()));
        }
        let mut file =
            File::create(destination).map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| SpectraError::RaveHttp(err.to_string()))?;
        Ok(DownloadStatus::Saved)
    }
}

/// Cone-search adapter: needs coordinates, not a Gaia id.
pub struct RaveSource<C: RaveClient> {
    client: C,
    search_radius_deg: f64,
}

impl<C: RaveClient> RaveSource<C> {
    pub fn new(client: C, search_radius_deg: f64) -> Self {
        Self {
            client,
            search_radius_deg,
        }
    }

    fn fetch_observation(
        &self,
        obs_id: &str,
        store: &ArtifactStore,
    ) -> Result<Option<Utf8PathBuf>, SpectraError> {
        let prefix = format!("RAVE_{}-", sanitize_file_name(obs_id));
        let scratch = store.scratch_file(&prefix, ".fits")?;
        if let DownloadStatus::Missing(status) = self.client.download_fits(obs_id, scratch.path())?
        {
            debug!(obs_id, status, "RAVE spectrum not served");
            return Ok(None);
        }
        let payload =
            fs::read(scratch.path()).map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        let series = fits::decode(&payload)?;
        let file_name = format!("rave-{}.csv", obs_id.replace('_', "-"));
        Ok(Some(store.write_series(&file_name, &series)?))
    }
}

impl<C: RaveClient> SpectrumSource for RaveSource<C> {
    fn name(&self) -> SourceName {
        SourceName::Rave
    }

    fn fetch(&self, identity: &ObjectIdentity, store: &ArtifactStore) -> SourceOutcome {
        let Some(position) = identity.position else {
            return SourceOutcome::empty(self.name(), "no coordinates for cone search");
        };
        if !self.client.is_authorized() {
            return SourceOutcome::empty(self.name(), "no access token");
        }
        let cone = ConeSearch {
            ra_deg: position.ra_deg,
            dec_deg: position.dec_deg,
            radius_deg: self.search_radius_deg,
        };
        let obs_ids = match self.client.cone_search(&cone) {
            Ok(obs_ids) => obs_ids,
            Err(err) => {
                warn!(source = %self.name(), "cone search failed: {err}");
                return SourceOutcome::Failed(err);
            }
        };

        let mut artifacts = Vec::new();
        for obs_id in &obs_ids {
            match self.fetch_observation(obs_id, store) {
                Ok(Some(path)) => artifacts.push(path),
                Ok(None) => {}
                Err(err) => warn!(obs_id = %obs_id, "RAVE observation skipped: {err}"),
            }
        }
        SourceOutcome::from_result(self.name(), Ok(artifacts), "no RAVE observation in the cone")
    }
}

/// `20070506_1143m09_001` was observed on `20070506`.
pub fn observation_date(obs_id: &str) -> &str {
    obs_id.split('_').next().unwrap_or(obs_id)
}

pub fn observation_ids(csv: &str) -> Result<Vec<String>, SpectraError> {
    let table = CsvTable::parse(csv)?;
    Ok(table
        .text_column("rave_obs_id")?
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

fn parse_job_id(body: &str) -> Option<String> {
    let pattern = Regex::new(r"<(?:uws:)?jobId>\s*([^<\s]+)\s*</(?:uws:)?jobId>").ok()?;
    pattern
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}
