use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::engine::DEFAULT_HISTORY_LIMIT;
use crate::viewport::restore::RestorePolicy;

const APP_DIR: &str = "Flow-Canvas";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    // Bound on both undo and redo stacks
    pub history_limit: usize,
    // How long programmatic replacement keeps trailing canvas events from counting as edits
    pub hydration_settle_ms: u64,
    // Second Ctrl/Cmd+C inside this window copies the whole graph
    pub copy_all_window_ms: u64,
    // Remote viewport persistence, tried in order
    pub viewport_endpoints: Vec<String>,
    pub viewport_flush_debounce_ms: u64,
    pub desktop_min_zoom: f64,
    pub mobile_min_zoom: f64,
    pub restore_retry_delays_ms: Vec<u64>,
    pub restore_match_tolerance_px: f64,
    pub paste_offset: f64,
    // If None, use OS default autosave directory
    pub autosave_override: Option<PathBuf>,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            hydration_settle_ms: 100,
            copy_all_window_ms: 600,
            viewport_endpoints: vec!["http://127.0.0.1:8000/api".to_string()],
            viewport_flush_debounce_ms: 1500,
            desktop_min_zoom: 0.5,
            mobile_min_zoom: 0.2,
            restore_retry_delays_ms: vec![0, 10, 50, 100],
            restore_match_tolerance_px: 1.0,
            paste_offset: 40.0,
            autosave_override: None,
        }
    }
}

impl EditorSettings {
    fn config_dir() -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Flow-Canvas
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join(APP_DIR);
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Flow-Canvas
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join(APP_DIR);
            }
            return PathBuf::from(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Flow-Canvas or ~/.config/Flow-Canvas
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join(APP_DIR);
            }
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join(APP_DIR);
        }
    }

    fn autosave_default_dir() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            if let Ok(local) = std::env::var("LOCALAPPDATA") {
                return PathBuf::from(local).join(APP_DIR).join("Autosave");
            }
            return std::env::temp_dir().join(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_STATE_HOME/flow-canvas or ~/.local/state/flow-canvas
            if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
                return PathBuf::from(xdg).join("flow-canvas");
            }
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(".local").join("state").join("flow-canvas");
            }
            return std::env::temp_dir().join(APP_DIR);
        }
        #[cfg(target_os = "macos")]
        {
            std::env::temp_dir().join(APP_DIR)
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_dir().join("settings.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&s)?)
    }

    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join("settings.json");
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    pub fn autosave_dir(&self) -> PathBuf {
        if let Some(p) = &self.autosave_override { return p.clone(); }
        Self::autosave_default_dir()
    }

    /// Per-user directory holding settings.json (and the shell's history file).
    pub fn settings_dir() -> PathBuf {
        Self::config_dir()
    }

    pub fn hydration_settle(&self) -> Duration { Duration::from_millis(self.hydration_settle_ms) }
    pub fn copy_all_window(&self) -> Duration { Duration::from_millis(self.copy_all_window_ms) }
    pub fn viewport_flush_debounce(&self) -> Duration { Duration::from_millis(self.viewport_flush_debounce_ms) }

    pub fn restore_policy(&self) -> RestorePolicy {
        let mut retry_delays: Vec<Duration> =
            self.restore_retry_delays_ms.iter().copied().map(Duration::from_millis).collect();
        if retry_delays.is_empty() {
            log::warn!("restore_retry_delays_ms is empty, using the default schedule");
            retry_delays = RestorePolicy::default().retry_delays;
        }
        RestorePolicy {
            retry_delays,
            tolerance_px: self.restore_match_tolerance_px,
            desktop_min_zoom: self.desktop_min_zoom,
            mobile_min_zoom: self.mobile_min_zoom,
        }
    }
}
