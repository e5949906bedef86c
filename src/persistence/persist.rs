use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

use super::settings::EditorSettings;
use crate::clipboard::document::PortableDocument;
use crate::viewport::key::ViewportRecord;

/// Autosave of one editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub workflow_id: String,
    pub version_id: Option<i64>,
    pub document: PortableDocument,
    #[serde(default)]
    pub viewports: Vec<ViewportRecord>,
}

static SETTINGS_OVERRIDE: OnceLock<EditorSettings> = OnceLock::new();

pub fn set_settings_override(settings: EditorSettings) {
    let _ = SETTINGS_OVERRIDE.set(settings);
}

fn autosave_dir() -> PathBuf {
    if let Some(settings) = SETTINGS_OVERRIDE.get() {
        return settings.autosave_dir();
    }
    EditorSettings::load().unwrap_or_default().autosave_dir()
}

pub fn active_session_path() -> PathBuf {
    autosave_dir().join("session.ron")
}

fn versioned_file_name(now: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(fmt).unwrap_or_else(|_| "unknown".to_string());
    format!("session_{}.ron", stamp)
}

pub fn versioned_session_path_now() -> PathBuf {
    autosave_dir().join(versioned_file_name(OffsetDateTime::now_utc()))
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("ron.tmp");
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.flush()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

fn to_ron(state: &SessionFile) -> anyhow::Result<String> {
    let pretty = PrettyConfig::new().separate_tuple_members(true);
    Ok(ron::ser::to_string_pretty(state, pretty)?)
}

/// Write `state` to `path`, creating parent directories as needed.
pub fn save_to_path(state: &SessionFile, path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    atomic_write(path, to_ron(state)?.as_bytes())?;
    Ok(())
}

pub fn save_active(state: &SessionFile) -> anyhow::Result<PathBuf> {
    let path = active_session_path();
    save_to_path(state, &path)?;
    Ok(path)
}

pub fn save_versioned(state: &SessionFile) -> anyhow::Result<PathBuf> {
    let path = versioned_session_path_now();
    save_to_path(state, &path)?;
    Ok(path)
}

pub fn load_active() -> anyhow::Result<Option<SessionFile>> {
    let path = active_session_path();
    if !path.exists() {
        return Ok(None);
    }
    load_from_path(&path).map(Some)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<SessionFile> {
    let buf = fs::read_to_string(path)?;
    Ok(ron::from_str(&buf)?)
}

pub fn list_versions() -> anyhow::Result<Vec<PathBuf>> {
    list_versions_in(&autosave_dir())
}

/// Timestamped autosaves in `dir`, newest first.
pub fn list_versions_in(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = Vec::new();
    if dir.exists() {
        for e in fs::read_dir(dir)? {
            let p = e?.path();
            if let Some(name) = p.file_name().and_then(|s| s.to_str())
                && name.starts_with("session_") && name.ends_with(".ron")
            {
                entries.push(p);
            }
        }
    }
    // timestamps sort lexically
    entries.sort();
    entries.reverse();
    Ok(entries)
}
