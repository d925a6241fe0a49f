//! Filesystem-as-registry for holdpty sessions. No process in this crate
//! owns a PTY or speaks the wire protocol — it only knows how to name,
//! locate, and enumerate sessions that some holder elsewhere maintains.

pub mod command;
pub mod endpoint;
pub mod liveness;
pub mod metadata;
pub mod name;

use std::path::{Path, PathBuf};

pub use command::resolve_command;
pub use metadata::Metadata;
pub use name::{generate_name, is_valid_name};

#[cfg(unix)]
pub use endpoint::endpoint_path;
#[cfg(windows)]
pub use endpoint::endpoint_name;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session name {0:?} is invalid")]
    InvalidName(String),
    #[error("session {name:?} not found")]
    NotFound { name: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One entry in an enumeration result.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub name: String,
    pub metadata: Metadata,
    pub endpoint_reachable: bool,
}

/// Resolves the session directory, honouring an explicit override before
/// falling back to [`endpoint::resolve_session_dir`]'s environment-based
/// precedence.
pub fn session_dir(explicit: Option<&Path>) -> std::io::Result<PathBuf> {
    match explicit {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Ok(dir.to_path_buf())
        }
        None => endpoint::resolve_session_dir(),
    }
}

/// Lists every session whose metadata parses, reaping (removing the
/// metadata file of) any entry whose holder PID is dead *and* whose
/// endpoint is unreachable. Entries that fail to parse are left alone —
/// they may be a holder's metadata file mid-write.
pub fn enumerate(dir: &Path) -> Result<Vec<SessionEntry>, RegistryError> {
    let all = metadata::list_metadata(dir)?;
    let mut live = Vec::with_capacity(all.len());
    for meta in all {
        let pid_alive = liveness::process_exists(meta.pid);
        // PID existence is necessary but not sufficient (PID reuse); the
        // endpoint probe is the tiebreaker and must always be consulted
        // before an entry is reaped, so it's only skipped when the PID
        // check already proves liveness.
        let reachable = pid_alive || liveness::probe_endpoint(dir, &meta.name);
        if pid_alive || reachable {
            live.push(SessionEntry {
                name: meta.name.clone(),
                metadata: meta,
                endpoint_reachable: reachable,
            });
        } else {
            let _ = metadata::remove_metadata(dir, &meta.name);
        }
    }
    Ok(live)
}

/// Removes a session's metadata file unconditionally, for externally
/// coordinated cleanup (e.g. after an external `stop`).
pub fn remove_session(dir: &Path, name: &str) -> Result<(), RegistryError> {
    if !is_valid_name(name) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    metadata::remove_metadata(dir, name).map_err(RegistryError::Io)
}
