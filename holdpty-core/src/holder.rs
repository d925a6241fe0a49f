use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_pty::{Child, MasterPty};
use tokio::sync::{mpsc, watch, Notify};

use holdpty_protocol::{encode_exit_code, OP_EXIT};
use holdpty_registry::{endpoint, metadata, name as name_gen, Metadata};

use crate::error::HolderError;
use crate::listener::Listener;
use crate::{client, log, pty};

#[cfg(unix)]
const DRAIN_MS: u64 = 100;
#[cfg(windows)]
const DRAIN_MS: u64 = 200;

const DEFAULT_LINGER_MS: u64 = 5000;
const RING_CAPACITY: usize = 1024 * 1024;

/// Everything a `start()` caller may override; unset fields fall back to
/// environment defaults the way the teacher's shim reads `PTY_SHIM_*` vars,
/// except here the override lives in a struct so tests never race on process
/// environment.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub command: Vec<String>,
    pub name: Option<String>,
    pub cols: Option<u16>,
    pub rows: Option<u16>,
    pub cwd: Option<String>,
    pub env: Option<HashMap<String, String>>,
    pub dir: Option<PathBuf>,
    pub linger_ms: Option<u64>,
}

/// Shared, `Arc`-owned state reachable from the holder's main task and from
/// every per-connection task spawned by `client::run`.
pub struct Shared {
    pub name: String,
    pub holder_pid: u32,
    pub child_pid: u32,
    ring_state: Mutex<holdpty_ring::Ring>,
    clients: Mutex<HashMap<u64, mpsc::Sender<Vec<u8>>>>,
    pub writer_slot: Mutex<Option<u64>>,
    pty_writer: Mutex<Box<dyn std::io::Write + Send>>,
    pty_master: Mutex<Box<dyn MasterPty + Send>>,
    pty_child: Mutex<Box<dyn Child + Send + Sync>>,
    cols_rows: Mutex<(u16, u16)>,
    exit_code: Mutex<Option<i32>>,
    next_client_id: AtomicU64,
    stop_requested: std::sync::atomic::AtomicBool,
}

impl Shared {
    pub fn cols_rows(&self) -> (u16, u16) {
        *self.cols_rows.lock()
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    fn set_exit_code(&self, code: i32) {
        *self.exit_code.lock() = Some(code);
    }

    pub fn write_to_pty(&self, bytes: &[u8]) {
        let _ = self.pty_writer.lock().write_all(bytes);
    }

    pub fn resize_pty(&self, cols: u16, rows: u16) {
        *self.cols_rows.lock() = (cols, rows);
        let _ = self.pty_master.lock().resize(portable_pty::PtySize {
            cols,
            rows,
            pixel_width: 0,
            pixel_height: 0,
        });
    }

    /// Appends `chunk` to the ring and fans it out to every registered
    /// client, all under the ring's lock so a concurrently-handshaking
    /// client can never see this chunk twice (once in its snapshot, once
    /// live) or miss it entirely. See `snapshot_and_register`.
    fn on_pty_output(&self, chunk: &[u8]) {
        let encoded = holdpty_protocol::frame::encode(holdpty_protocol::OP_DATA_OUT, chunk);
        let mut ring = self.ring_state.lock();
        ring.write(chunk);
        let mut clients = self.clients.lock();
        clients.retain(|_, tx| tx.try_send(encoded.clone()).is_ok());
    }

    pub(crate) fn snapshot_only(&self) -> Vec<u8> {
        self.ring_state.lock().read()
    }

    pub(crate) fn snapshot_and_register(&self, id: u64, tx: mpsc::Sender<Vec<u8>>) -> Vec<u8> {
        let ring = self.ring_state.lock();
        let snapshot = ring.read();
        self.clients.lock().insert(id, tx);
        snapshot
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.clients.lock().remove(&id);
    }

    fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends `EXIT` to every still-connected attach/view client and drops
    /// their channel, which half-closes the write side once buffered frames
    /// flush; their read loops notice EOF/closed-channel on their own.
    fn broadcast_exit_and_close(&self, code: i32) {
        let frame = holdpty_protocol::frame::encode(OP_EXIT, &encode_exit_code(code));
        let clients = std::mem::take(&mut *self.clients.lock());
        for (_, tx) in clients {
            let _ = tx.try_send(frame.clone());
        }
    }
}

pub struct Holder {
    shared: Arc<Shared>,
    exit_rx: watch::Receiver<Option<i32>>,
    force_shutdown: Arc<Notify>,
    shutdown_done: Arc<Notify>,
}

impl Holder {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn pid(&self) -> u32 {
        self.shared.holder_pid
    }

    /// Resolves once the child's exit code is known — right after the
    /// drain window starts, not after the full linger/cleanup sequence.
    pub async fn wait_for_exit(&self) -> Option<i32> {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(code) = *rx.borrow() {
                return Some(code);
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Terminates the child. On POSIX this alone is sufficient — the PTY
    /// reader observes EOF and the normal exit/drain/shutdown path runs. On
    /// Windows process termination doesn't reliably unblock a pending pipe
    /// read, so we additionally nudge the holder's own shutdown path instead
    /// of targeting the holder's OS process: self-terminating the hosting
    /// process would be unsound for a library that may hold several
    /// sessions in one process (as our own test suite does).
    ///
    /// Errors with [`HolderError::ShuttingDown`] if a previous call already
    /// initiated shutdown; the first call always wins.
    pub fn stop(&self) -> Result<(), HolderError> {
        if self.shared.stop_requested.swap(true, Ordering::SeqCst) {
            return Err(HolderError::ShuttingDown);
        }
        let _ = self.shared.pty_child.lock().kill();
        #[cfg(windows)]
        self.force_shutdown.notify_one();
        Ok(())
    }

    /// Waits for the entire shutdown sequence — drain, client `EXIT`
    /// broadcast, linger, and registry cleanup — to finish. Unlike
    /// [`Holder::wait_for_exit`], this is how a long-running front-end (the
    /// `holdpty` binary itself, running as the session's own process) knows
    /// it is safe to exit without orphaning the listening endpoint.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown_done.notified().await;
    }
}

pub async fn start(options: StartOptions) -> Result<Holder, HolderError> {
    if options.command.is_empty() {
        return Err(HolderError::Protocol("command must not be empty".into()));
    }

    let dir = match &options.dir {
        Some(d) => d.clone(),
        None => endpoint::resolve_session_dir()?,
    };

    let name = match &options.name {
        Some(n) if holdpty_registry::name::is_valid_name(n) => n.clone(),
        Some(n) => return Err(HolderError::Protocol(format!("invalid session name {n:?}"))),
        None => name_gen::generate_name(&options.command[0]),
    };

    let cols = options.cols.unwrap_or(120);
    let rows = options.rows.unwrap_or(40);

    let argv = holdpty_registry::resolve_command(&options.command);

    let handle = pty::spawn(&argv, cols, rows, options.cwd.as_deref(), options.env.as_ref())?;

    #[cfg(unix)]
    let listener = Listener::bind(&endpoint::endpoint_path(&dir, &name))?;
    #[cfg(windows)]
    let listener = Listener::bind(&endpoint::endpoint_name(&dir, &name))?;

    let holder_pid = std::process::id();
    let meta = Metadata {
        name: name.clone(),
        pid: holder_pid,
        child_pid: handle.child_pid,
        command: options.command.clone(),
        cols,
        rows,
        started_at: rfc3339_now(),
    };
    metadata::write_metadata(&dir, &meta)?;

    log::init(&dir, &name);
    log::operational_log!("holder starting: name={name} pid={holder_pid} child_pid={}", handle.child_pid);

    let (exit_tx, exit_rx) = watch::channel(None);
    let force_shutdown = Arc::new(Notify::new());
    let shutdown_done = Arc::new(Notify::new());

    let shared = Arc::new(Shared {
        name: name.clone(),
        holder_pid,
        child_pid: handle.child_pid,
        ring_state: Mutex::new(holdpty_ring::Ring::new(RING_CAPACITY)),
        clients: Mutex::new(HashMap::new()),
        writer_slot: Mutex::new(None),
        pty_writer: Mutex::new(handle.writer),
        pty_master: Mutex::new(handle.master),
        pty_child: Mutex::new(handle.child),
        cols_rows: Mutex::new((cols, rows)),
        exit_code: Mutex::new(None),
        next_client_id: AtomicU64::new(1),
        stop_requested: std::sync::atomic::AtomicBool::new(false),
    });

    let linger_ms = options.linger_ms.unwrap_or_else(|| {
        std::env::var("HOLDPTY_LINGER_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_LINGER_MS)
    });

    tokio::spawn(run_main_loop(
        shared.clone(),
        listener,
        handle.reader,
        dir,
        exit_tx,
        force_shutdown.clone(),
        shutdown_done.clone(),
        linger_ms,
    ));

    Ok(Holder {
        shared,
        exit_rx,
        force_shutdown,
        shutdown_done,
    })
}

/// Current UTC time as an RFC3339 timestamp, hand-rolled from `SystemTime`
/// rather than pulling in a datetime crate for one field.
fn rfc3339_now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let days = (secs / 86_400) as i64;
    let time_of_day = secs % 86_400;
    let (hour, minute, second) = (time_of_day / 3600, (time_of_day / 60) % 60, time_of_day % 60);
    let (year, month, day) = civil_from_days(days);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Howard Hinnant's `civil_from_days`: days-since-epoch to a (year, month,
/// day) Gregorian date, valid for any day an `i64` can represent.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };
    (year, month, day)
}

#[cfg(test)]
mod civil_date_tests {
    use super::civil_from_days;

    #[test]
    fn epoch_is_1970_01_01() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }

    #[test]
    fn known_reference_dates() {
        assert_eq!(civil_from_days(11_017), (2000, 3, 1));
        assert_eq!(civil_from_days(-135_140), (1600, 3, 1));
    }
}

/// Runs the PTY reader on a blocking thread, forwards chunks and the final
/// exit code back to the async main loop over channels, since
/// `portable_pty`'s reader and `Child::wait` are both synchronous APIs.
fn spawn_pty_io(
    mut reader: Box<dyn std::io::Read + Send>,
    mut child: impl FnMut() -> Option<i32> + Send + 'static,
) -> (mpsc::UnboundedReceiver<Vec<u8>>, tokio::sync::oneshot::Receiver<i32>) {
    let (data_tx, data_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if data_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let (exit_tx, exit_rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let code = child().unwrap_or(0);
        let _ = exit_tx.send(code);
    });

    (data_rx, exit_rx)
}

async fn run_main_loop(
    shared: Arc<Shared>,
    mut listener: Listener,
    reader: Box<dyn std::io::Read + Send>,
    dir: PathBuf,
    exit_tx: watch::Sender<Option<i32>>,
    force_shutdown: Arc<Notify>,
    shutdown_done: Arc<Notify>,
    linger_ms: u64,
) {
    let wait_shared = shared.clone();
    let (mut data_rx, exit_code_rx) = spawn_pty_io(reader, move || {
        let mut child = wait_shared.pty_child.lock();
        child.wait().ok().map(|status| status.exit_code() as i32)
    });

    let mut exit_code_rx = Some(exit_code_rx);

    loop {
        tokio::select! {
            biased;

            _ = force_shutdown.notified() => {
                log::operational_log!("stop() requested early shutdown");
                break;
            }

            chunk = data_rx.recv() => match chunk {
                Some(bytes) => shared.on_pty_output(&bytes),
                None => {}
            },

            conn = listener.accept() => match conn {
                Ok(stream) => {
                    let id = shared.next_client_id();
                    log::operational_log!("client {id} accepted");
                    let client_shared = shared.clone();
                    tokio::spawn(client::run(id, stream, client_shared));
                }
                Err(e) => {
                    log::operational_log!("client rejected: accept error: {e}");
                }
            },

            code = async {
                match exit_code_rx.as_mut() {
                    Some(rx) => rx.await.ok(),
                    None => std::future::pending().await,
                }
            }, if exit_code_rx.is_some() => {
                exit_code_rx = None;
                if let Some(code) = code {
                    log::operational_log!("child exited with code {code}");
                    shared.set_exit_code(code);
                    let _ = exit_tx.send(Some(code));
                    break;
                }
            }
        }
    }

    // Drain: keep forwarding any trailing PTY output that arrives just
    // after exit before the holder stops paying attention to it.
    let drain = tokio::time::sleep(Duration::from_millis(DRAIN_MS));
    tokio::pin!(drain);
    loop {
        tokio::select! {
            _ = &mut drain => break,
            chunk = data_rx.recv() => match chunk {
                Some(bytes) => shared.on_pty_output(&bytes),
                None => break,
            },
        }
    }

    // If `stop()` forced us out before the child's real wait() resolved, 0
    // is a placeholder — the blocking wait thread finishes on its own but
    // nothing is listening for it anymore once this function returns.
    let code = shared.exit_code().unwrap_or(0);
    let _ = exit_tx.send(Some(code));
    log::operational_log!("draining, then broadcasting exit({code}) to attached clients");
    shared.broadcast_exit_and_close(code);
    *shared.writer_slot.lock() = None;

    tokio::time::sleep(Duration::from_millis(linger_ms.max(1))).await;

    drop(listener);
    let _ = metadata::remove_metadata(&dir, &shared.name);
    #[cfg(unix)]
    let _ = std::fs::remove_file(endpoint::endpoint_path(&dir, &shared.name));

    log::operational_log!("holder {} shut down", shared.name);
    shutdown_done.notify_one();
}

pub fn list_sessions(dir: Option<&std::path::Path>) -> Result<Vec<holdpty_registry::SessionEntry>, HolderError> {
    let dir = holdpty_registry::session_dir(dir)?;
    Ok(holdpty_registry::enumerate(&dir)?)
}

pub fn remove_session(dir: Option<&std::path::Path>, name: &str) -> Result<(), HolderError> {
    let dir = holdpty_registry::session_dir(dir)?;
    Ok(holdpty_registry::remove_session(&dir, name)?)
}
