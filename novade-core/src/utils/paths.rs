//! XDG Base Directory resolution for the compositing manager.
//!
//! User directories come from `directories-next`; the system configuration
//! directories follow `$XDG_CONFIG_DIRS` (default `/etc/xdg`).

use crate::error::{ConfigError, CoreError};
use directories_next::BaseDirs;
use std::env;
use std::path::PathBuf;

/// Directory name used under every XDG configuration root.
pub const APPLICATION: &str = "nova-compmgr";
/// File name of the configuration document.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns `$XDG_CONFIG_HOME` (usually `~/.config`).
pub fn get_config_base_dir() -> Result<PathBuf, CoreError> {
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| {
            CoreError::Config(ConfigError::DirectoryUnavailable {
                dir_type: "Config Base".to_string(),
            })
        })
}

/// Returns the user configuration directory of the compositing manager.
pub fn get_app_config_dir() -> Result<PathBuf, CoreError> {
    Ok(get_config_base_dir()?.join(APPLICATION))
}

/// Returns `$XDG_STATE_HOME` on Linux (default `~/.local/state`), the local
/// data directory elsewhere.
pub fn get_state_base_dir() -> Result<PathBuf, CoreError> {
    BaseDirs::new()
        .map(|dirs| {
            #[cfg(target_os = "linux")]
            {
                match env::var("XDG_STATE_HOME") {
                    Ok(state_home) if !state_home.is_empty() => PathBuf::from(state_home),
                    _ => dirs.home_dir().join(".local/state"),
                }
            }
            #[cfg(not(target_os = "linux"))]
            {
                dirs.data_local_dir().to_path_buf()
            }
        })
        .ok_or_else(|| {
            CoreError::Config(ConfigError::DirectoryUnavailable {
                dir_type: "State Base".to_string(),
            })
        })
}

/// Returns the state directory used to resolve relative log file paths.
pub fn get_app_state_dir() -> Result<PathBuf, CoreError> {
    Ok(get_state_base_dir()?.join(APPLICATION))
}

/// Parses a `$XDG_CONFIG_DIRS` style value. Empty entries are skipped and an
/// unset or empty value yields `/etc/xdg`.
pub fn parse_config_dirs(value: Option<&str>) -> Vec<PathBuf> {
    let dirs: Vec<PathBuf> = value
        .unwrap_or_default()
        .split(':')
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect();
    if dirs.is_empty() {
        vec![PathBuf::from("/etc/xdg")]
    } else {
        dirs
    }
}

/// Candidate configuration files in lookup order: system directories first,
/// then the user configuration directory.
pub fn config_search_paths() -> Vec<PathBuf> {
    let system_dirs = env::var("XDG_CONFIG_DIRS").ok();
    let mut paths: Vec<PathBuf> = parse_config_dirs(system_dirs.as_deref())
        .into_iter()
        .map(|dir| dir.join(APPLICATION).join(CONFIG_FILE_NAME))
        .collect();
    if let Ok(user_dir) = get_app_config_dir() {
        paths.push(user_dir.join(CONFIG_FILE_NAME));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(None, vec!["/etc/xdg"])]
    #[case(Some(""), vec!["/etc/xdg"])]
    #[case(Some("/opt/xdg"), vec!["/opt/xdg"])]
    #[case(Some("/a::/b:"), vec!["/a", "/b"])]
    fn test_parse_config_dirs(#[case] value: Option<&str>, #[case] expected: Vec<&str>) {
        let expected: Vec<PathBuf> = expected.into_iter().map(PathBuf::from).collect();
        assert_eq!(parse_config_dirs(value), expected);
    }

    #[test]
    fn test_config_search_paths_end_with_file_name() {
        for path in config_search_paths() {
            assert!(path.ends_with(PathBuf::from(APPLICATION).join(CONFIG_FILE_NAME)));
        }
    }
}
