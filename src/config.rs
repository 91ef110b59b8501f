//! Config module - Manages PaperVault configuration (papervault.toml).
//!
//! The config file carries the vault location, the security settings
//! (toggle + PIN hash) and the OCR command. Written with restrictive
//! permissions since the PIN hash lives here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Security settings for the vault.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Global "security enabled" toggle. When off and no PIN is set, the
    /// vault opens without authentication.
    #[serde(default)]
    pub enabled: bool,
    /// Argon2id PHC string of the user's PIN. Never the PIN itself.
    #[serde(default)]
    pub pin_hash: Option<String>,
}

/// OCR settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Whether to run text extraction after adding a document.
    #[serde(default = "default_ocr_enabled")]
    pub enabled: bool,
    /// External recognizer command (fed the image on stdin).
    #[serde(default = "default_ocr_command")]
    pub command: String,
}

fn default_ocr_enabled() -> bool {
    true
}

fn default_ocr_command() -> String {
    "tesseract".to_string()
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: default_ocr_enabled(),
            command: default_ocr_command(),
        }
    }
}

/// Main PaperVault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config version (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the vault directory (metadata database + content files)
    pub vault_path: PathBuf,

    /// Directory holding the legacy flat-store blobs, if any
    #[serde(default = "default_legacy_path")]
    pub legacy_path: PathBuf,

    /// Security settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// OCR settings
    #[serde(default)]
    pub ocr: OcrConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            vault_path: default_vault_path(),
            legacy_path: default_legacy_path(),
            security: SecurityConfig::default(),
            ocr: OcrConfig::default(),
        }
    }
}

/// Get default vault path.
pub fn default_vault_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("papervault").join("vault"))
        .unwrap_or_else(|| PathBuf::from("./vault"))
}

/// Get default legacy flat-store path.
pub fn default_legacy_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("papervault").join("legacy"))
        .unwrap_or_else(|| PathBuf::from("./legacy"))
}

/// Get default config directory (~/.config/papervault/).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("papervault"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get default config file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("papervault.toml")
}

impl Config {
    /// Create new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config rooted at a specific vault path.
    pub fn with_vault_path(vault_path: PathBuf) -> Self {
        Self {
            vault_path,
            ..Self::default()
        }
    }

    /// Load config from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Cannot parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from default path, falling back to defaults.
    pub fn load_default() -> Result<Self> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Cannot serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Cannot write config file: {}", path.display()))?;

        // Restrict file permissions on Unix; the PIN hash lives in this file
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Save config to default path.
    pub fn save_default(&self) -> Result<PathBuf> {
        let path = default_config_path();
        self.save(&path)?;
        Ok(path)
    }

    /// Directory holding encrypted content files.
    pub fn content_dir(&self) -> PathBuf {
        self.vault_path.join("content")
    }

    /// Path of the metadata database.
    pub fn index_db_path(&self) -> PathBuf {
        self.vault_path.join("index.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, 1);
        assert!(!config.security.enabled);
        assert!(config.security.pin_hash.is_none());
        assert!(config.ocr.enabled);
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("test.toml");

        let mut config = Config::new();
        config.security.enabled = true;
        config.security.pin_hash = Some("$argon2id$test".to_string());
        config.save(&config_path)?;

        let loaded = Config::load(&config_path)?;
        assert!(loaded.security.enabled);
        assert_eq!(loaded.security.pin_hash, Some("$argon2id$test".to_string()));

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_save_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("test_perms.toml");

        let config = Config::new();
        config.save(&config_path)?;

        let metadata = std::fs::metadata(&config_path)?;
        let mode = metadata.permissions().mode();
        assert_eq!(
            mode & 0o777,
            0o600,
            "Config file should have 0600 permissions"
        );

        Ok(())
    }
}
