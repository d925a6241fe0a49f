use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

/// Upper bound on the endpoint connect probe used to corroborate PID-based
/// liveness.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// `true` iff a process with this pid currently exists. Necessary but not
/// sufficient for liveness — PID reuse is aggressive enough, especially on
/// Windows, that this must always be corroborated with [`probe_endpoint`]
/// before a session is reaped.
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    // kill(pid, 0) checks for existence/permission without sending a signal.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(windows)]
pub fn process_exists(pid: u32) -> bool {
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
    use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }
        let mut exit_code: u32 = 0;
        let ok = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);
        const STILL_ACTIVE: u32 = 259;
        ok != 0 && exit_code == STILL_ACTIVE
    }
}

/// Attempts to connect to the session's endpoint within [`PROBE_TIMEOUT`].
/// `true` means something is listening; used as the tiebreaker when PID
/// existence alone is inconclusive (always, on Windows; as a sanity check
/// elsewhere).
#[cfg(unix)]
pub fn probe_endpoint(dir: &Path, name: &str) -> bool {
    let path = crate::endpoint::endpoint_path(dir, name);
    bounded(move || std::os::unix::net::UnixStream::connect(&path).is_ok())
}

#[cfg(windows)]
pub fn probe_endpoint(dir: &Path, name: &str) -> bool {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE};

    const ERROR_PIPE_BUSY: u32 = 231;

    let pipe_name = crate::endpoint::endpoint_name(dir, name);
    bounded(move || {
        let wide: Vec<u16> = OsStr::new(&pipe_name)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        unsafe {
            let handle = CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null_mut(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            );
            if handle == INVALID_HANDLE_VALUE {
                winapi::um::errhandlingapi::GetLastError() == ERROR_PIPE_BUSY
            } else {
                CloseHandle(handle);
                true
            }
        }
    })
}

/// Runs `probe` on a helper thread and returns `false` if it doesn't
/// complete within [`PROBE_TIMEOUT`] — a wedged connect attempt must never
/// hang session enumeration.
fn bounded(probe: impl FnOnce() -> bool + Send + 'static) -> bool {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(probe());
    });
    rx.recv_timeout(PROBE_TIMEOUT).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_exists() {
        assert!(process_exists(std::process::id()));
    }

    #[test]
    fn pid_zero_or_absurd_does_not_exist() {
        assert!(!process_exists(u32::MAX));
    }

    #[cfg(unix)]
    #[test]
    fn probe_endpoint_false_when_nothing_listening() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!probe_endpoint(dir.path(), "nope"));
    }

    #[cfg(unix)]
    #[test]
    fn probe_endpoint_true_when_listening() {
        let dir = tempfile::tempdir().unwrap();
        let path = crate::endpoint::endpoint_path(dir.path(), "live");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        assert!(probe_endpoint(dir.path(), "live"));
    }
}
