use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timestamps::TimeTable;

const CACHE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cache file is corrupt: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Cache version {found} is not supported (expected {expected}); delete the file or run with --refresh")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Cache columns have different lengths")]
    Inconsistent,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    times: TimeTable,
}

pub fn exists(path: &Path) -> bool {
    path.is_file()
}

pub fn load(path: &Path) -> Result<TimeTable, CacheError> {
    let reader = BufReader::new(File::open(path)?);
    let cache: CacheFile = serde_json::from_reader(reader)?;

    if cache.version != CACHE_VERSION {
        return Err(CacheError::VersionMismatch {
            found: cache.version,
            expected: CACHE_VERSION,
        });
    }
    if !cache.times.is_consistent() {
        return Err(CacheError::Inconsistent);
    }

    log::debug!("Loaded {} timestamps from {}", cache.times.len(), path.display());
    Ok(cache.times)
}

pub fn save(path: &Path, times: &TimeTable) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let cache = CacheFile {
        version: CACHE_VERSION,
        times: times.clone(),
    };

    // a half-written cache must never sit at `path`
    let partial = partial_path(path);
    let written = File::create(&partial)
        .map_err(CacheError::from)
        .and_then(|file| write_cache(file, &cache));
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::rename(&partial, path)?;

    log::debug!("Saved {} timestamps to {}", times.len(), path.display());
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn write_cache<W: Write>(out: W, cache: &CacheFile) -> Result<(), CacheError> {
    let mut writer = BufWriter::new(out);
    serde_json::to_writer(&mut writer, cache)?;
    writer.flush()?;
    Ok(())
}
