use std::path::{Path, PathBuf};

/// Resolves the session directory per the precedence order:
///
/// 1. `HOLDPTY_DIR`, verbatim, if set.
/// 2. On Windows, `<system-temp>/dt`.
/// 3. On POSIX, `$XDG_RUNTIME_DIR/dt` if `XDG_RUNTIME_DIR` is set.
/// 4. On POSIX, `/tmp/dt-<uid>` if the real user id is available.
/// 5. Otherwise `<system-temp>/dt`.
///
/// The directory is created on demand; on POSIX with owner-only (0700)
/// permission.
pub fn resolve_session_dir() -> std::io::Result<PathBuf> {
    if let Ok(dir) = std::env::var("HOLDPTY_DIR") {
        return ensure_dir(PathBuf::from(dir));
    }

    #[cfg(windows)]
    {
        return ensure_dir(std::env::temp_dir().join("dt"));
    }

    #[cfg(not(windows))]
    {
        if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
            return ensure_dir(PathBuf::from(runtime_dir).join("dt"));
        }
        let uid = unsafe { libc::getuid() };
        // getuid() is always defined on POSIX; there is no failure case to
        // fall through on here, but a real-uid-unavailable embedded target
        // would fall through to the generic system-temp path below.
        return ensure_dir(PathBuf::from(format!("/tmp/dt-{uid}")));
    }

    #[allow(unreachable_code)]
    {
        ensure_dir(std::env::temp_dir().join("dt"))
    }
}

fn ensure_dir(dir: PathBuf) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(&dir, perms)?;
    }
    Ok(dir)
}

/// POSIX endpoint path: `{dir}/{name}.sock`.
#[cfg(unix)]
pub fn endpoint_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.sock"))
}

/// Windows endpoint name: `\\.\pipe\holdpty-<hash>-<name>`, where `<hash>`
/// is an 8-hex-digit FNV-1a fingerprint of the absolute session directory.
/// Pipe names are process-wide global, so two environments pointing at
/// different `HOLDPTY_DIR`s must not collide on the same session name.
#[cfg(windows)]
pub fn endpoint_name(dir: &Path, name: &str) -> String {
    format!(
        "\\\\.\\pipe\\holdpty-{:08x}-{}",
        fnv1a_32(dir.to_string_lossy().as_bytes()),
        name
    )
}

#[cfg(windows)]
fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn posix_endpoint_path_layout() {
        let dir = Path::new("/tmp/dt-1000");
        assert_eq!(endpoint_path(dir, "sess"), dir.join("sess.sock"));
    }

    #[cfg(windows)]
    #[test]
    fn windows_endpoint_name_embeds_hash_and_name() {
        let name = endpoint_name(Path::new(r"C:\temp\dt"), "sess");
        assert!(name.starts_with(r"\\.\pipe\holdpty-"));
        assert!(name.ends_with("-sess"));
    }

    #[cfg(windows)]
    #[test]
    fn windows_endpoint_name_differs_across_directories() {
        let a = endpoint_name(Path::new(r"C:\a"), "sess");
        let b = endpoint_name(Path::new(r"C:\b"), "sess");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_session_dir_honours_holdpty_dir_override() {
        let tmp = std::env::temp_dir().join(format!("holdpty-test-{}", std::process::id()));
        // SAFETY: test runs single-threaded within this process's env mutation window.
        unsafe {
            std::env::set_var("HOLDPTY_DIR", &tmp);
        }
        let resolved = resolve_session_dir().unwrap();
        unsafe {
            std::env::remove_var("HOLDPTY_DIR");
        }
        assert_eq!(resolved, tmp);
        assert!(tmp.is_dir());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
