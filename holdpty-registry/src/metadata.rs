use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `{name, pid, childPid, command, cols, rows, startedAt}` — the on-disk
/// shape of a session. Readers must tolerate extra fields (`#[serde(default)]`
/// is not needed for that; untagged extra JSON keys are simply ignored by
/// serde_json unless `deny_unknown_fields` is set, which this type never
/// sets).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub name: String,
    pub pid: u32,
    #[serde(rename = "childPid")]
    pub child_pid: u32,
    pub command: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    #[serde(rename = "startedAt")]
    pub started_at: String,
}

pub fn metadata_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Writes the metadata file for `meta.name`. Called exactly once, after the
/// endpoint is already listening.
pub fn write_metadata(dir: &Path, meta: &Metadata) -> io::Result<()> {
    let path = metadata_path(dir, &meta.name);
    let json = serde_json::to_vec_pretty(meta)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json)
}

/// Reads and parses the metadata file for `name`.
pub fn read_metadata(dir: &Path, name: &str) -> io::Result<Metadata> {
    let json = fs::read_to_string(metadata_path(dir, name))?;
    serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Removes the metadata file for `name`. A missing file is not an error.
pub fn remove_metadata(dir: &Path, name: &str) -> io::Result<()> {
    let path = metadata_path(dir, name);
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Lists every `*.json` file in `dir` that parses as [`Metadata`].
///
/// Files that fail to parse are skipped, not removed — a parse failure may
/// be a holder in the middle of its (non-atomic) write, and raciness there is
/// tolerated rather than treated as staleness.
pub fn list_metadata(dir: &Path) -> io::Result<Vec<Metadata>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Ok(json) = fs::read_to_string(&path) {
            if let Ok(meta) = serde_json::from_str::<Metadata>(&json) {
                out.push(meta);
            }
        }
    }
    Ok(out)
}
