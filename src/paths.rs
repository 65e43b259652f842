use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "PAGE_OVERLAY_DIR";
const HOME_DIR_NAME: &str = ".page-overlay-rust";

/// Base directory for settings and stored pages.
pub(crate) fn settings_dir() -> Option<PathBuf> {
    if let Some(dir) = base_dir_override() {
        return Some(dir);
    }
    home_join(HOME_DIR_NAME)
}

/// Default page store location when settings do not name one.
pub(crate) fn store_dir() -> PathBuf {
    if let Some(dir) = base_dir_override() {
        return dir.join("pages");
    }
    home_join(&format!("{}/pages", HOME_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(HOME_DIR_NAME).join("pages"))
}

/// Resolves a configured directory, expanding a leading `~`.
pub(crate) fn resolve_dir(value: &str) -> Option<PathBuf> {
    normalize_dir(value)
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(suffix))
        }
    })
}

fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    let mut normalized = PathBuf::new();
    for component in Path::new(&expanded).components() {
        normalized.push(component.as_os_str());
    }
    Some(normalized)
}

fn expand_tilde(value: &str) -> String {
    if (value == "~" || value.starts_with("~/"))
        && let Ok(home) = std::env::var("HOME")
    {
        let home = home.trim();
        if !home.is_empty() {
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_dirs_are_ignored() {
        assert!(resolve_dir("   ").is_none());
    }

    #[test]
    fn plain_dirs_are_normalized() {
        assert_eq!(
            resolve_dir("/tmp//pages/"),
            Some(PathBuf::from("/tmp/pages"))
        );
        assert_eq!(expand_tilde("pages"), "pages");
    }
}
