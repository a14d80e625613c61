use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use agedetect_core::detection::infrastructure::onnx_blazeface_locator::{
    DEFAULT_CONFIDENCE, DEFAULT_MARGIN,
};

/// Persisted defaults for the command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub confidence: f64,
    /// Fraction of each face box added on every side before cropping.
    pub margin: f64,
    /// Classification worker threads; `None` uses every available core.
    pub workers: Option<usize>,
    /// Directory searched for bundled model files.
    pub models_dir: Option<PathBuf>,
    pub detector_url: Option<String>,
    pub age_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            margin: DEFAULT_MARGIN,
            workers: None,
            models_dir: None,
            detector_url: None,
            age_url: None,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("AgeDetector").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or malformed files fall back to defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid settings in {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Writes to the user config directory and returns the path written.
    pub fn save(&self) -> io::Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| io::Error::other("could not determine config directory"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_json_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"workers": 3}"#).unwrap();

        let settings = Settings::load_from(&path);

        assert_eq!(settings.workers, Some(3));
        assert_eq!(settings.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(settings.margin, DEFAULT_MARGIN);
        assert!(settings.models_dir.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            confidence: 0.7,
            margin: 0.1,
            workers: Some(2),
            models_dir: Some(PathBuf::from("/opt/models")),
            detector_url: None,
            age_url: Some("https://example.com/age.onnx".into()),
        };

        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_save_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a regular file").unwrap();
        let path = blocker.join("AgeDetector").join("settings.json");

        let result = Settings::default().save_to(&path);

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
