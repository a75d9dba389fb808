mod common;

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;

use spectrator::catalog::{CatalogMatch, FileCatalog};
use spectrator::domain::{GaiaSourceId, ObjectIdentity, SkyPosition, Survey};
use spectrator::error::SpectraError;
use spectrator::sources::{
    ConeSearch, DownloadStatus, GaiaClient, GaiaRvsSource, GalahClient, GalahFilter, GalahSource,
    LamostClient, LamostSource, RaveClient, RaveSource, SourceOutcome, SpectrumSource,
};

use common::{dual_spectrum, primary_spectrum, scratch_entries, temp_store, write_catalog};

const GAIA_ID: &str = "1234567890";

fn identity() -> ObjectIdentity {
    let mut identity = ObjectIdentity::new(format!("Gaia DR3 {GAIA_ID}"));
    identity
        .survey_ids
        .insert(Survey::GaiaDr3, GAIA_ID.to_string());
    identity.position = Some(SkyPosition {
        ra_deg: 279.2347,
        dec_deg: 38.7837,
    });
    identity
}

struct MockGaia {
    payload: Result<Option<Vec<u8>>, u16>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl GaiaClient for MockGaia {
    fn load_rvs(&self, source_id: &GaiaSourceId) -> Result<Option<Vec<u8>>, SpectraError> {
        self.requested
            .lock()
            .unwrap()
            .push(source_id.as_str().to_string());
        self.payload.clone().map_err(|status| SpectraError::GaiaStatus {
            status,
            message: "unavailable".to_string(),
        })
    }
}

fn zipped(name: &str, content: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(content.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

#[test]
fn gaia_writes_rvs_table_from_zip() {
    let (_temp, store) = temp_store();
    let requested = Arc::new(Mutex::new(Vec::new()));
    let csv = "source_id,wavelength,flux,flux_error\n1234567890,846.0,1.0,0.5\n";
    let source = GaiaRvsSource::new(MockGaia {
        payload: Ok(Some(zipped("RVS-Gaia DR3 1234567890.csv", csv))),
        requested: requested.clone(),
    });

    let outcome = source.fetch(&identity(), &store);
    let paths = outcome.artifacts();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].file_name(), Some("gaia-dr3-1234567890.csv"));
    assert_eq!(
        fs::read_to_string(paths[0].as_std_path()).unwrap(),
        "wavelength,flux,error\n846,1,0.5\n"
    );
    assert_eq!(requested.lock().unwrap().as_slice(), [GAIA_ID]);
}

#[test]
fn gaia_without_product_or_with_error_yields_nothing() {
    let (_temp, store) = temp_store();
    let empty = GaiaRvsSource::new(MockGaia {
        payload: Ok(None),
        requested: Arc::default(),
    });
    assert_matches!(empty.fetch(&identity(), &store), SourceOutcome::Empty(_));

    let failing = GaiaRvsSource::new(MockGaia {
        payload: Err(500),
        requested: Arc::default(),
    });
    assert_matches!(
        failing.fetch(&identity(), &store),
        SourceOutcome::Failed(SpectraError::GaiaStatus { status: 500, .. })
    );
}

#[test]
fn gaia_skips_identities_without_record_key() {
    let (_temp, store) = temp_store();
    let requested = Arc::new(Mutex::new(Vec::new()));
    let source = GaiaRvsSource::new(MockGaia {
        payload: Ok(None),
        requested: requested.clone(),
    });
    let outcome = source.fetch(&ObjectIdentity::new("Vega"), &store);
    assert_matches!(outcome, SourceOutcome::Empty(_));
    assert!(requested.lock().unwrap().is_empty());
}

struct MockLamost;

impl LamostClient for MockLamost {
    fn fetch_csv(&self, obsid: &str) -> Result<String, SpectraError> {
        Ok(format!("# obsid {obsid}\nWavelength,Flux\n3700.1,12.5\n"))
    }
}

#[test]
fn lamost_payload_is_written_verbatim() {
    let (temp, store) = temp_store();
    let catalog = write_catalog(
        temp.path(),
        "lamost.csv",
        "obsid,gaia_source_id\n55001,91234567890\n55002,1234567890\n",
    );
    let source = LamostSource::new(
        MockLamost,
        Some(FileCatalog::new(catalog, CatalogMatch::Field)),
    );
    let outcome = source.fetch(&identity(), &store);
    let paths = outcome.artifacts();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].file_name(), Some("lamost-55002.csv"));
    assert_eq!(
        fs::read_to_string(paths[0].as_std_path()).unwrap(),
        "# obsid 55002\nWavelength,Flux\n3700.1,12.5\n"
    );
}

#[test]
fn lamost_catalog_miss_is_empty() {
    let (temp, store) = temp_store();
    let catalog = write_catalog(temp.path(), "lamost.csv", "55001,42\n");
    let source = LamostSource::new(
        MockLamost,
        Some(FileCatalog::new(catalog, CatalogMatch::Field)),
    );
    assert_matches!(source.fetch(&identity(), &store), SourceOutcome::Empty(_));
    let unconfigured = LamostSource::<_, FileCatalog>::new(MockLamost, None);
    assert_matches!(unconfigured.fetch(&identity(), &store), SourceOutcome::Empty(_));
}

/// Serves a FITS file for the listed bands and a status code for the rest.
struct MockGalah {
    served: HashMap<&'static str, Vec<u8>>,
}

impl GalahClient for MockGalah {
    fn download_fits(
        &self,
        _sobject_id: &str,
        filter: GalahFilter,
        destination: &Path,
    ) -> Result<DownloadStatus, SpectraError> {
        match self.served.get(filter.code()) {
            Some(bytes) => {
                fs::write(destination, bytes).unwrap();
                Ok(DownloadStatus::Saved)
            }
            None => Ok(DownloadStatus::Missing(404)),
        }
    }
}

#[test]
fn galah_keeps_bands_that_download() {
    let (temp, store) = temp_store();
    let catalog = write_catalog(temp.path(), "galah.csv", "131216001101026,1234567890\n");
    let served = HashMap::from([
        ("B", primary_spectrum(4718.0, 0.05, &[1.0, 0.5])),
        ("R", primary_spectrum(6480.0, 0.05, &[0.75, 1.0])),
    ]);
    let source = GalahSource::new(
        MockGalah { served },
        Some(FileCatalog::new(catalog, CatalogMatch::Field)),
    );

    let outcome = source.fetch(&identity(), &store);
    let names = outcome
        .artifacts()
        .iter()
        .filter_map(|path| path.file_name())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        ["galah-131216001101026_B.csv", "galah-131216001101026_R.csv"]
    );
    assert_eq!(scratch_entries(&store), 0);
}

#[test]
fn galah_with_no_band_is_empty_and_undecodable_band_is_skipped() {
    let (temp, store) = temp_store();
    let catalog = write_catalog(temp.path(), "galah.csv", "131216001101026,1234567890\n");
    let served = HashMap::from([("G", b"<html>maintenance</html>".to_vec())]);
    let source = GalahSource::new(
        MockGalah { served },
        Some(FileCatalog::new(catalog, CatalogMatch::Field)),
    );
    assert_matches!(source.fetch(&identity(), &store), SourceOutcome::Empty(_));
    assert_eq!(scratch_entries(&store), 0);
}

struct MockRave {
    authorized: bool,
    obs_ids: Result<Vec<String>, String>,
    served: HashMap<String, Vec<u8>>,
    cones: Arc<Mutex<Vec<ConeSearch>>>,
}

impl RaveClient for MockRave {
    fn is_authorized(&self) -> bool {
        self.authorized
    }

    fn cone_search(&self, cone: &ConeSearch) -> Result<Vec<String>, SpectraError> {
        self.cones.lock().unwrap().push(*cone);
        self.obs_ids.clone().map_err(|message| SpectraError::TapJob {
            phase: "ERROR".to_string(),
            message,
        })
    }

    fn download_fits(
        &self,
        obs_id: &str,
        destination: &Path,
    ) -> Result<DownloadStatus, SpectraError> {
        match self.served.get(obs_id) {
            Some(bytes) => {
                fs::write(destination, bytes).unwrap();
                Ok(DownloadStatus::Saved)
            }
            None => Ok(DownloadStatus::Missing(404)),
        }
    }
}

#[test]
fn rave_decodes_each_served_observation() {
    let (_temp, store) = temp_store();
    let cones = Arc::new(Mutex::new(Vec::new()));
    let served = HashMap::from([(
        "20070506_1143m09_001".to_string(),
        dual_spectrum(8410.0, 0.4, 1.0, &[1.0, 0.5], &[0.25, 0.25]),
    )]);
    let source = RaveSource::new(
        MockRave {
            authorized: true,
            obs_ids: Ok(vec![
                "20070506_1143m09_001".to_string(),
                "20080612_1840p38_042".to_string(),
            ]),
            served,
            cones: cones.clone(),
        },
        0.1,
    );

    let outcome = source.fetch(&identity(), &store);
    let paths = outcome.artifacts();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].file_name(), Some("rave-20070506-1143m09-001.csv"));
    let csv = fs::read_to_string(paths[0].as_std_path()).unwrap();
    assert!(csv.starts_with("wavelength,flux,error\n8410,1,0.25\n"));
    assert_eq!(scratch_entries(&store), 0);

    let cones = cones.lock().unwrap();
    assert_eq!(cones.len(), 1);
    assert_eq!(cones[0].radius_deg, 0.1);
    assert_eq!(cones[0].ra_deg, 279.2347);
}

#[test]
fn rave_submission_failure_is_reported_not_raised() {
    let (_temp, store) = temp_store();
    let source = RaveSource::new(
        MockRave {
            authorized: true,
            obs_ids: Err("query rejected".to_string()),
            served: HashMap::new(),
            cones: Arc::default(),
        },
        0.1,
    );
    let outcome = source.fetch(&identity(), &store);
    assert_matches!(outcome, SourceOutcome::Failed(SpectraError::TapJob { .. }));
    assert!(outcome.artifacts().is_empty());
}

#[test]
fn rave_needs_token_and_coordinates() {
    let (_temp, store) = temp_store();
    let cones = Arc::new(Mutex::new(Vec::new()));
    let unauthorized = RaveSource::new(
        MockRave {
            authorized: false,
            obs_ids: Ok(Vec::new()),
            served: HashMap::new(),
            cones: cones.clone(),
        },
        0.1,
    );
    assert_matches!(
        unauthorized.fetch(&identity(), &store),
        SourceOutcome::Empty(reason) if reason == "no access token"
    );

    let mut without_position = identity();
    without_position.position = None;
    assert_matches!(
        unauthorized.fetch(&without_position, &store),
        SourceOutcome::Empty(_)
    );
    assert!(cones.lock().unwrap().is_empty());
}
