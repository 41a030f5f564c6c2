//! Push device registrations, one JSON file per user.

use super::{read_user_file, user_file, write_json_atomic};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub token: String,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDevices {
    pub user_id: String,
    #[serde(default)]
    pub devices: Vec<Device>,
}

impl UserDevices {
    pub fn active_tokens(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| d.is_active)
            .map(|d| d.token.clone())
            .collect()
    }
}

pub struct DeviceStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DeviceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn load(&self, user_id: &str) -> Result<UserDevices> {
        let path = user_file(&self.dir, user_id)?;
        let mut devices = read_user_file::<UserDevices>(&path)?.unwrap_or_default();
        devices.user_id = user_id.to_string();
        Ok(devices)
    }

    /// Add `token` for the user, or reactivate and touch it if already known.
    pub fn register(&self, user_id: &str, token: &str) -> Result<UserDevices> {
        let token = token.trim();
        if token.is_empty() {
            bail!("device_token is required");
        }

        let _guard = self.write_lock.lock();
        let mut user = self.load(user_id)?;
        let now = Utc::now();
        match user.devices.iter_mut().find(|d| d.token == token) {
            Some(device) => {
                device.is_active = true;
                device.updated_at = now;
            }
            None => user.devices.push(Device {
                token: token.to_string(),
                updated_at: now,
                is_active: true,
            }),
        }
        write_json_atomic(&user_file(&self.dir, user_id)?, &user)?;

        info!(user = %user_id, devices = user.devices.len(), "device registered");
        Ok(user)
    }

    pub fn active_tokens(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.load(user_id)?.active_tokens())
    }
}
