use dirs::home_dir;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::enums::OutputFormat;

const DATA_DIR_ENV: &str = "KQLITE_DATA_DIR";
const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Row cap for queries without `limit`/`take`/`top`; 0 disables it.
    pub default_row_limit: u64,
    pub pretty_sql: bool,
    pub output_format: OutputFormat,
    /// Reject unknown tables and columns before execution.
    pub validate_names: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { default_row_limit: 1000, pretty_sql: false, output_format: OutputFormat::Table, validate_names: true }
    }
}

impl Preferences {
    /// Loads from the data directory; any failure yields the defaults.
    pub fn load() -> Self {
        let path = get_data_dir().join(PREFERENCES_FILE);
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(prefs) => {
                info!("Loaded preferences from {}", path.display());
                prefs
            }
            Err(e) => {
                warn!("Ignoring preferences at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dir = get_data_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(PREFERENCES_FILE);
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn row_limit(&self) -> Option<u64> {
        (self.default_row_limit > 0).then_some(self.default_row_limit)
    }
}

pub fn get_data_dir() -> PathBuf {
    // Try to get custom data directory from environment variable first
    if let Ok(custom_dir) = std::env::var(DATA_DIR_ENV) {
        let path = PathBuf::from(custom_dir);
        if path.is_absolute() {
            return path;
        }
        warn!("{} must be an absolute path, ignoring it", DATA_DIR_ENV);
    }

    // Default to ~/.kqlite
    if let Some(mut hd) = home_dir() {
        hd.push(".kqlite");
        return hd;
    }
    PathBuf::from(".")
}

pub fn set_data_dir(new_path: &str) -> Result<(), String> {
    let path = PathBuf::from(new_path);
    if !path.is_absolute() {
        return Err("Path must be absolute".to_string());
    }
    if let Err(e) = fs::create_dir_all(&path) {
        return Err(format!("Cannot create directory: {}", e));
    }

    // Set environment variable for this session
    unsafe {
        std::env::set_var(DATA_DIR_ENV, new_path);
    }
    info!("Data directory changed to: {}", new_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kqlite-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn roundtrip_through_file() {
        let path = scratch_file("prefs.json");
        let prefs = Preferences {
            default_row_limit: 50,
            pretty_sql: true,
            output_format: OutputFormat::Csv,
            validate_names: false,
        };
        prefs.save_to(&path).unwrap();
        assert_eq!(Preferences::load_from(&path).unwrap(), prefs);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let path = scratch_file("partial.json");
        fs::write(&path, r#"{"pretty_sql": true}"#).unwrap();
        let prefs = Preferences::load_from(&path).unwrap();
        assert!(prefs.pretty_sql);
        assert_eq!(prefs.default_row_limit, 1000);
        assert_eq!(prefs.output_format, OutputFormat::Table);
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let prefs = Preferences { default_row_limit: 0, ..Default::default() };
        assert_eq!(prefs.row_limit(), None);
        assert_eq!(Preferences::default().row_limit(), Some(1000));
    }
}
