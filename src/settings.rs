//! Application settings persisted as JSON next to the ledger database.
//!
//! The data directory resolves in this order:
//! 1. `BUDGET_KIT_DATA_DIR` environment variable
//! 2. The platform config directory (`directories::ProjectDirs`)
//! 3. `./.budget-kit` when neither is available

use crate::error::{codes, Error, Result};
use crate::localization::{Language, Theme};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const DATA_DIR_ENV: &str = "BUDGET_KIT_DATA_DIR";

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "budget-kit";
const APPLICATION: &str = "budget-kit";

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "budget.db";

// ============================================================================
// Paths
// ============================================================================

/// Locations of everything the application writes to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        AppPaths {
            base_dir: Self::resolve_base_dir(),
        }
    }

    /// Fixed base directory, for tests and embedding.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        AppPaths {
            base_dir: base_dir.into(),
        }
    }

    fn resolve_base_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".budget-kit"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }

    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).map_err(|e| {
            Error::system(
                codes::IO_ERROR,
                format!("Failed to create {}: {}", self.base_dir.display(), e),
            )
        })
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub language: Language,
    pub theme: Theme,
    /// Day of month a budget cycle starts on.
    pub budget_cycle_day: u32,
    pub currency_symbol: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            language: Language::default(),
            theme: Theme::default(),
            budget_cycle_day: 1,
            currency_symbol: "$".to_string(),
        }
    }
}

impl Settings {
    /// Clamp values a hand-edited file may have broken.
    fn normalized(mut self) -> Self {
        self.budget_cycle_day = self.budget_cycle_day.clamp(1, 31);
        if self.currency_symbol.trim().is_empty() {
            self.currency_symbol = Settings::default().currency_symbol;
        }
        self
    }
}

/// Settings loaded once and written back atomically on every change.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `paths`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load(paths: &AppPaths) -> Self {
        Self::load_from(paths.settings_file())
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_json::<Settings>(&path) {
            Ok(Some(settings)) => {
                debug!("✓ Loaded settings from {}", path.display());
                settings.normalized()
            }
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!("⚠ Ignoring unreadable settings file {}: {}", path.display(), e);
                Settings::default()
            }
        };
        SettingsStore {
            path,
            current: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.get())
    }

    /// Apply `change`, persist, and return the new settings.
    ///
    /// The in-memory value only changes once the file write succeeds.
    pub fn update<F>(&self, change: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self
            .current
            .write()
            .map_err(|_| Error::system(codes::CONFIG_ERROR, "Settings lock poisoned"))?;

        let mut next = guard.clone();
        change(&mut next);
        let next = next.normalized();

        write_json_atomic(&self.path, &next)?;
        *guard = next.clone();
        Ok(next)
    }
}

// ============================================================================
// File helpers
// ============================================================================

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write to a sibling temp file, then rename it over `path`.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("json.tmp");
    let written = File::create(&temp_path)
        .map_err(Error::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })
        .and_then(|_| fs::rename(&temp_path, path).map_err(Error::from));

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}
