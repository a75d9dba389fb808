use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::SpectraError;

const ZIP_MAGIC: [u8; 4] = [b'P', b'K', 0x03, 0x04];

#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub fn is_zip(payload: &[u8]) -> bool {
    payload.starts_with(&ZIP_MAGIC)
}

/// Reads every file entry of an in-memory archive, in archive order.
pub fn read_zip_entries(payload: &[u8]) -> Result<Vec<ZipEntry>, SpectraError> {
    let mut archive = ZipArchive::new(Cursor::new(payload))
        .map_err(|err| SpectraError::Filesystem(format!("open zip: {err}")))?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let name = match entry.enclosed_name() {
            Some(path) => path.to_string_lossy().to_string(),
            None => {
                return Err(SpectraError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        entries.push(ZipEntry { name, bytes });
    }
    Ok(entries)
}
