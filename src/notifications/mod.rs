//! Threshold alerts: user rules, evaluation with duplicate suppression, device
//! registrations and push delivery.

pub mod devices;
pub mod evaluator;
pub mod push;
pub mod rules;

pub use devices::{Device, DeviceStore, UserDevices};
pub use evaluator::{evaluate, DedupKey, NotificationLedger};
pub use push::{
    build_payload, LogPushGateway, Notifier, PushGateway, PushPayload, WebhookPushGateway,
};
pub use rules::{NotificationRule, RuleStore, UserNotifications};

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const USER_FILE_EXTENSION: &str = "json";

/// `<dir>/<user_id>.json`. User ids come from session tokens and must be a plain file stem.
pub(crate) fn user_file(dir: &Path, user_id: &str) -> Result<PathBuf> {
    if user_id.is_empty()
        || user_id.starts_with('.')
        || user_id.contains(|c: char| c == '/' || c == '\\' || c.is_control())
    {
        bail!("invalid user id {:?}", user_id);
    }
    Ok(dir.join(format!("{}.{}", user_id, USER_FILE_EXTENSION)))
}

/// Parse a per-user JSON file; `None` when it does not exist.
pub(crate) fn read_user_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let value = serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Write pretty JSON through a temp file and rename so readers never see half a file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(value).context("Failed to encode JSON")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// `(user_id, path)` for every `*.json` file in `dir`. A missing directory is empty.
pub(crate) fn list_user_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read directory: {}", dir.display()))
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list directory: {}", dir.display()))?
            .path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(USER_FILE_EXTENSION)
        {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.push((stem.to_string(), path.clone()));
        }
    }
    files.sort();
    Ok(files)
}
