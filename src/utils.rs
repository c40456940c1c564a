use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    /// Directory name used under the platform config/data roots
    pub fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "tpp-dev",
            Profile::Prod => "tpp",
        }
    }
}

/// Get the configuration directory path.
/// If profile is Dev, uses "tpp-dev" instead of "tpp"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "tpp", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path.
/// If profile is Dev, uses "tpp-dev" instead of "tpp"
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "tpp", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<chrono::NaiveDate, chrono::ParseError> {
    chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
}

/// Parse a 24-hour clock time (HH:MM)
pub fn parse_time(time_str: &str) -> Result<chrono::NaiveTime, chrono::ParseError> {
    chrono::NaiveTime::parse_from_str(time_str, "%H:%M")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_leaves_absolute_paths() {
        assert_eq!(expand_path("/var/tpp/app.db"), PathBuf::from("/var/tpp/app.db"));
    }

    #[test]
    fn test_parse_date_and_time() {
        assert!(parse_date("2025-12-24").is_ok());
        assert!(parse_date("24/12/2025").is_err());
        assert!(parse_time("09:30").is_ok());
        assert!(parse_time("25:00").is_err());
    }
}
