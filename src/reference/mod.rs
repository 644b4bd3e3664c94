use crate::error::{Error, Result};
use crate::models::District;
use log::warn;
use std::fs;
use std::path::Path;

/// Loads the district reference list. A missing or corrupt file is logged
/// and yields an empty list so the server can still start.
pub fn load_districts(path: &Path) -> Vec<District> {
    match read_districts(path) {
        Ok(districts) => districts,
        Err(e) => {
            warn!("{}; starting with no districts", e);
            Vec::new()
        }
    }
}

pub fn read_districts(path: &Path) -> Result<Vec<District>> {
    let raw = fs::read_to_string(path).map_err(|source| Error::ReferenceIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| Error::ReferenceJson {
        path: path.to_path_buf(),
        source,
    })
}
