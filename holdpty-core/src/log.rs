use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<std::fs::File>> = OnceLock::new();
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Opens `{dir}/{name}.log`, truncated fresh for this run, for postmortem
/// diagnosis when stderr isn't captured. Best effort: a failure here is
/// never fatal to the holder, it just means there's no file log this run.
pub fn init(dir: &Path, name: &str) {
    START_TIME.get_or_init(Instant::now);

    let path = dir.join(format!("{name}.log"));
    if let Ok(file) = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        let _ = LOG_FILE.set(Mutex::new(file));
    }
}

/// Writes one line to the session's debug log, if it was opened. This is
/// the full-detail trail; see [`operational`] for events that should also
/// reach stderr.
pub fn log(msg: &str) {
    if let Some(mutex) = LOG_FILE.get() {
        if let Ok(mut file) = mutex.lock() {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            let elapsed = START_TIME.get().map(|s| s.elapsed()).unwrap_or_default();
            let _ = writeln!(
                file,
                "[{}.{:03}] [{:>8.3}s] {}",
                ts.as_secs(),
                ts.subsec_millis(),
                elapsed.as_secs_f64(),
                msg
            );
            let _ = file.flush();
        }
    }
}

/// Writes one line to the debug log *and* stderr, for events an operator
/// watching the holder without access to the log file should still see:
/// session start, client accept/reject, child exit, shutdown phases.
pub fn operational(msg: &str) {
    eprintln!("[holdpty] {msg}");
    log(msg);
}

macro_rules! operational_log {
    ($($arg:tt)*) => {
        crate::log::operational(&format!($($arg)*))
    };
}

pub(crate) use operational_log;
