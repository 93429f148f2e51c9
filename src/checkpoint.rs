//! Persisted analysis state connecting a compute invocation to later plot invocations.
//!
//! Layout: 8-byte magic, little-endian `u32` schema version, then a `bincode`
//! payload of [`AnalysisState`]. A save replaces the previous file wholesale.
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{AnalysisMode, EngineParams, EnrichmentResult};
use crate::error::{CorruptKind, GseaError, Result};

pub const MAGIC: &[u8; 8] = b"GSWCKPT\0";
pub const SCHEMA_VERSION: u32 = 1;

/// Everything a plot invocation needs from the compute invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisState {
    pub mode: AnalysisMode,
    pub params: EngineParams,
    pub result: EnrichmentResult,
}

pub fn save(state: &AnalysisState, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let written = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&SCHEMA_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, state)
            .map_err(|e| GseaError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        writer.flush()?;
        Ok(())
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), terms = state.result.terms.len(), "checkpoint written");
    Ok(())
}

pub fn load(path: &Path) -> Result<AnalysisState> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(GseaError::CheckpointMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let corrupt = |why: String| GseaError::CheckpointCorrupt(CorruptKind::UnreadableBytes(why));

    let mut header = [0u8; 12];
    reader
        .read_exact(&mut header)
        .map_err(|_| corrupt("truncated header".to_string()))?;
    if &header[..8] != MAGIC {
        return Err(corrupt("not a gseawrap checkpoint".to_string()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&header[8..]);
    let found = u32::from_le_bytes(version);
    if found != SCHEMA_VERSION {
        return Err(GseaError::CheckpointCorrupt(CorruptKind::SchemaVersion {
            found,
            expected: SCHEMA_VERSION,
        }));
    }
    let state: AnalysisState =
        bincode::deserialize_from(&mut reader).map_err(|e| corrupt(e.to_string()))?;
    debug!(path = %path.display(), terms = state.result.terms.len(), "checkpoint restored");
    Ok(state)
}
