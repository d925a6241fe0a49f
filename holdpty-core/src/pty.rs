use std::collections::HashMap;
use std::io::{Read, Write};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::error::HolderError;

/// Separately-owned halves of a spawned PTY, so the reader can live on a
/// blocking thread while the master and writer are driven from the async
/// holder task.
pub struct PtyHandle {
    pub master: Box<dyn MasterPty + Send>,
    pub writer: Box<dyn Write + Send>,
    pub reader: Box<dyn Read + Send>,
    pub child: Box<dyn Child + Send + Sync>,
    pub child_pid: u32,
}

/// Spawns `argv[0]` with `argv[1..]` under a fresh PTY of `cols`x`rows`.
///
/// `argv` must already be resolved for the target platform (see
/// `holdpty_registry::resolve_command` on Windows); this function performs
/// no further `PATH`/shim resolution of its own, matching `portable-pty`'s
/// own direct-exec behaviour.
pub fn spawn(
    argv: &[String],
    cols: u16,
    rows: u16,
    cwd: Option<&str>,
    env: Option<&HashMap<String, String>>,
) -> Result<PtyHandle, HolderError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(HolderError::Protocol("empty command".into()));
    };

    let pty_system = native_pty_system();
    let size = PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    };
    let pair = pty_system
        .openpty(size)
        .map_err(|e| HolderError::Io(std::io::Error::other(format!("openpty: {e}"))))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.cwd(dir);
    }
    if let Some(vars) = env {
        for (k, v) in vars {
            cmd.env(k, v);
        }
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| HolderError::Io(std::io::Error::other(format!("spawn: {e}"))))?;
    let child_pid = child.process_id().unwrap_or(0);

    let writer = pair
        .master
        .take_writer()
        .map_err(|e| HolderError::Io(std::io::Error::other(format!("take_writer: {e}"))))?;
    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| HolderError::Io(std::io::Error::other(format!("clone_reader: {e}"))))?;

    drop(pair.slave);

    Ok(PtyHandle {
        master: pair.master,
        writer,
        reader,
        child,
        child_pid,
    })
}
