//! Windows-only resolution of a command vector into something
//! `portable-pty`'s `CommandBuilder` can actually spawn.
//!
//! The PTY backend exec's the first token directly — it does not consult
//! `PATH`, does not know about `.cmd`/`.bat` shims, and cannot run a script
//! association the way `cmd.exe` or a shell would. This module does that
//! resolution ahead of time. On POSIX it is the identity transform; the
//! spawning shell there already knows how to do all of this.

/// Resolves `[cmd, args...]` into a directly spawnable command vector.
///
/// - If `cmd` already has a `.cmd`/`.bat` extension, rewrites it to
///   `cmd.exe /c <original...>`.
/// - If `cmd` has some other extension, passes it through unchanged.
/// - Otherwise searches candidate directories (the literal parent if `cmd`
///   contains a path separator, else each entry of `PATH`) for, in order,
///   `<cmd>.exe`, `<cmd>.com` (returned directly), then `<cmd>.cmd`,
///   `<cmd>.bat` (returned as `cmd.exe /c ...`).
/// - If nothing matches, falls back to `<cmd>.exe` so the spawn fails with a
///   clear "not found" error instead of silently doing nothing.
#[cfg(windows)]
pub fn resolve_command(argv: &[String]) -> Vec<String> {
    use std::path::Path;

    let Some((cmd, rest)) = argv.split_first() else {
        return argv.to_vec();
    };

    if let Some(ext) = Path::new(cmd).extension().and_then(|e| e.to_str()) {
        return if is_script_ext(ext) {
            wrap_cmd_exe(cmd, rest)
        } else {
            argv.to_vec()
        };
    }

    let candidate_dirs: Vec<String> = if cmd.contains('\\') || cmd.contains('/') {
        vec![
            Path::new(cmd)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ]
    } else {
        std::env::var("PATH")
            .unwrap_or_default()
            .split(';')
            .map(|s| s.to_string())
            .collect()
    };
    let basename = Path::new(cmd)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| cmd.clone());

    for ext in ["exe", "com"] {
        if let Some(found) = find_in(&candidate_dirs, &basename, ext) {
            let mut out = vec![found];
            out.extend(rest.iter().cloned());
            return out;
        }
    }
    for ext in ["cmd", "bat"] {
        if let Some(found) = find_in(&candidate_dirs, &basename, ext) {
            return wrap_cmd_exe(&found, rest);
        }
    }

    vec![format!("{cmd}.exe")]
        .into_iter()
        .chain(rest.iter().cloned())
        .collect()
}

#[cfg(windows)]
fn is_script_ext(ext: &str) -> bool {
    matches!(ext.to_ascii_lowercase().as_str(), "cmd" | "bat")
}

#[cfg(windows)]
fn wrap_cmd_exe(cmd: &str, rest: &[String]) -> Vec<String> {
    let mut out = vec!["cmd.exe".to_string(), "/c".to_string(), cmd.to_string()];
    out.extend(rest.iter().cloned());
    out
}

#[cfg(windows)]
fn find_in(dirs: &[String], basename: &str, ext: &str) -> Option<String> {
    for dir in dirs {
        let candidate = std::path::Path::new(dir).join(format!("{basename}.{ext}"));
        if candidate.is_file() {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    None
}

/// Identity transform on POSIX: the spawning shell already resolves `PATH`
/// and script shebangs.
#[cfg(not(windows))]
pub fn resolve_command(argv: &[String]) -> Vec<String> {
    argv.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn posix_is_identity() {
        let argv = vec!["bash".to_string(), "-c".to_string(), "echo hi".to_string()];
        assert_eq!(resolve_command(&argv), argv);
    }

    #[cfg(windows)]
    #[test]
    fn cmd_extension_rewritten_to_cmd_exe() {
        let argv = vec!["run.cmd".to_string(), "arg".to_string()];
        let resolved = resolve_command(&argv);
        assert_eq!(
            resolved,
            vec![
                "cmd.exe".to_string(),
                "/c".to_string(),
                "run.cmd".to_string(),
                "arg".to_string()
            ]
        );
    }

    #[cfg(windows)]
    #[test]
    fn other_extension_passed_through() {
        let argv = vec!["tool.exe".to_string(), "arg".to_string()];
        assert_eq!(resolve_command(&argv), argv);
    }

    #[cfg(windows)]
    #[test]
    fn unresolvable_command_falls_back_to_exe_suffix() {
        let argv = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let resolved = resolve_command(&argv);
        assert_eq!(resolved[0], "definitely-not-a-real-binary-xyz.exe");
    }
}
