#![allow(dead_code)]

use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use spectrator::store::ArtifactStore;

const BLOCK: usize = 2880;

pub fn card(keyword: &str, value: &str) -> String {
    format!("{keyword:<8}= {value:>20}")
}

pub fn text_card(keyword: &str, value: &str) -> String {
    format!("{keyword:<8}= '{value:<8}'")
}

fn header_block(cards: &[String]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for card in cards.iter().map(String::as_str).chain(["END"]) {
        bytes.extend_from_slice(format!("{card:<80}").as_bytes());
    }
    pad(bytes, b' ')
}

fn pad(mut bytes: Vec<u8>, fill: u8) -> Vec<u8> {
    let len = bytes.len().div_ceil(BLOCK) * BLOCK;
    bytes.resize(len, fill);
    bytes
}

pub fn f32_data(values: &[f32]) -> Vec<u8> {
    let bytes = values.iter().flat_map(|v| v.to_be_bytes()).collect();
    pad(bytes, 0)
}

/// Single primary array with a linear wavelength axis.
pub fn primary_spectrum(crval1: f64, cdelt1: f64, flux: &[f32]) -> Vec<u8> {
    let mut bytes = header_block(&[
        card("SIMPLE", "T"),
        card("BITPIX", "-32"),
        card("NAXIS", "1"),
        card("NAXIS1", &flux.len().to_string()),
        card("CRVAL1", &format!("{crval1:.4}")),
        card("CDELT1", &format!("{cdelt1:.4}")),
    ]);
    bytes.extend(f32_data(flux));
    bytes
}

/// Empty primary HDU followed by `SPECTRUM` and `ERROR` image extensions.
pub fn dual_spectrum(crval1: f64, cdelt1: f64, crpix1: f64, flux: &[f32], error: &[f32]) -> Vec<u8> {
    let mut bytes = header_block(&[
        card("SIMPLE", "T"),
        card("BITPIX", "8"),
        card("NAXIS", "0"),
        card("EXTEND", "T"),
    ]);
    for (name, values) in [("SPECTRUM", flux), ("ERROR", error)] {
        bytes.extend(header_block(&[
            text_card("XTENSION", "IMAGE"),
            card("BITPIX", "-32"),
            card("NAXIS", "1"),
            card("NAXIS1", &values.len().to_string()),
            card("PCOUNT", "0"),
            card("GCOUNT", "1"),
            text_card("EXTNAME", name),
            card("CRVAL1", &format!("{crval1:.4}")),
            card("CDELT1", &format!("{cdelt1:.4}")),
            card("CRPIX1", &format!("{crpix1:.1}")),
        ]));
        bytes.extend(f32_data(values));
    }
    bytes
}

/// Raw header cards plus data, for malformed fixtures.
pub fn custom_primary(cards: &[String], data: Vec<u8>) -> Vec<u8> {
    let mut bytes = header_block(cards);
    bytes.extend(pad(data, 0));
    bytes
}

pub fn temp_store() -> (TempDir, ArtifactStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = ArtifactStore::new_with_paths(root.join("spectra_csv"), root.join("scratch"));
    store.ensure_roots().unwrap();
    (temp, store)
}

pub fn write_catalog(dir: &Path, name: &str, content: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(dir.join(name)).unwrap();
    fs::write(path.as_std_path(), content).unwrap();
    path
}

pub fn scratch_entries(store: &ArtifactStore) -> usize {
    match fs::read_dir(store.scratch_root().as_std_path()) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}
