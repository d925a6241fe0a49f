use rand::Rng;

/// A session name matches `[A-Za-z0-9_-]{1,64}`.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

const SCRIPT_EXTENSIONS: &[&str] = &["exe", "cmd", "bat", "sh", "ps1"];

/// Derives a default session name from the command's first token when the
/// caller supplies none.
///
/// Takes the basename, strips a trailing script extension (case-insensitive),
/// drops characters outside `[A-Za-z0-9_-]`, truncates to 16 bytes, falls
/// back to `"session"` if that leaves nothing, then appends `-` and four
/// random lowercase hex digits.
pub fn generate_name(command_first_token: &str) -> String {
    let basename = command_first_token
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(command_first_token);

    let stem = match basename.rsplit_once('.') {
        Some((stem, ext)) if SCRIPT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
            stem
        }
        _ => basename,
    };

    let mut cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    cleaned.truncate(16);
    if cleaned.is_empty() {
        cleaned = "session".to_string();
    }

    format!("{cleaned}-{}", random_hex_suffix())
}

fn random_hex_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..4)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_accepted() {
        assert!(is_valid_name("a"));
        assert!(is_valid_name("bold-otter_2"));
        assert!(is_valid_name(&"a".repeat(64)));
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name(&"a".repeat(65)));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("slash/es"));
        assert!(!is_valid_name("semi;colon"));
    }

    #[test]
    fn generate_name_strips_extension_and_path() {
        let name = generate_name("/usr/bin/bash.sh");
        assert!(name.starts_with("bash-"));
        assert_eq!(name.len(), "bash-".len() + 4);
    }

    #[test]
    fn generate_name_strips_exe_case_insensitive() {
        let name = generate_name(r"C:\Windows\System32\Node.EXE");
        assert!(name.starts_with("Node-"));
    }

    #[test]
    fn generate_name_keeps_non_script_extension() {
        // ".app" isn't a recognized script extension, so the dot is dropped
        // by the character filter rather than treated as a stem boundary.
        let name = generate_name("my.app");
        assert!(name.starts_with("myapp-"));
    }

    #[test]
    fn generate_name_truncates_long_stems() {
        let name = generate_name("a_very_long_executable_name_indeed");
        let stem = name.rsplit_once('-').unwrap().0;
        assert!(stem.len() <= 16);
    }

    #[test]
    fn generate_name_falls_back_to_session_when_empty() {
        let name = generate_name("@@@@");
        assert!(name.starts_with("session-"));
    }

    #[test]
    fn generate_name_suffix_is_lowercase_hex() {
        let name = generate_name("tool");
        let suffix = name.rsplit_once('-').unwrap().1;
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
