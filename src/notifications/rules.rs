//! Per-user notification rules persisted as one JSON file per user.
//!
//! The in-memory index maps ticker to every `(user, rule)` pair watching it and is
//! what the streaming pipeline consults. It is rebuilt from disk at startup and on
//! a timer, and patched in place whenever a rule is replaced through the API.

use super::{list_user_files, read_user_file, user_file, write_json_atomic};
use anyhow::{bail, Context, Result};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Thresholds for one ticker. Zero disables a dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationRule {
    pub ticker: String,
    /// Minimum total premium before either ratio floor is considered.
    pub ratio_premium_threshold: f64,
    pub call_ratio_threshold: f64,
    pub put_ratio_threshold: f64,
    pub call_premium_threshold: f64,
    pub put_premium_threshold: f64,
}

impl NotificationRule {
    /// Upper-case the ticker and reject unusable values.
    pub fn normalized(mut self) -> Result<Self> {
        self.ticker = self.ticker.trim().to_ascii_uppercase();
        if self.ticker.is_empty() {
            bail!("ticker is required");
        }
        for (name, value) in [
            ("ratio_premium_threshold", self.ratio_premium_threshold),
            ("call_ratio_threshold", self.call_ratio_threshold),
            ("put_ratio_threshold", self.put_ratio_threshold),
            ("call_premium_threshold", self.call_premium_threshold),
            ("put_premium_threshold", self.put_premium_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number", name);
            }
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserNotifications {
    pub user_id: String,
    #[serde(default)]
    pub notifications: BTreeMap<String, NotificationRule>,
}

impl UserNotifications {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            notifications: BTreeMap::new(),
        }
    }
}

type RuleIndex = HashMap<String, Vec<(String, NotificationRule)>>;

pub struct RuleStore {
    dir: PathBuf,
    index: RwLock<RuleIndex>,
    // Serializes read-modify-write of user files.
    write_lock: Mutex<()>,
}

impl RuleStore {
    /// Open the rules directory, creating it if needed, and load every file.
    ///
    /// Any unreadable or malformed rule file is an error.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| {
            format!("Failed to create notifications directory: {}", dir.display())
        })?;
        let index = load_index(&dir)?;
        info!(
            dir = %dir.display(),
            tickers = index.len(),
            "notification rules loaded"
        );
        Ok(Self {
            dir,
            index: RwLock::new(index),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rebuild the index from disk. On error the current index is left untouched.
    pub fn reload(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        let fresh = load_index(&self.dir)?;
        debug!(tickers = fresh.len(), "notification rules reloaded");
        *self.index.write() = fresh;
        Ok(())
    }

    /// A user's rules; a user without a file has none.
    pub fn get_user(&self, user_id: &str) -> Result<UserNotifications> {
        load_user(&self.dir, user_id)
    }

    /// Replace the rule for `rule.ticker` wholesale and persist the user's file.
    pub fn put_rule(&self, user_id: &str, rule: NotificationRule) -> Result<UserNotifications> {
        let rule = rule.normalized()?;
        let _guard = self.write_lock.lock();

        let mut user = load_user(&self.dir, user_id)?;
        user.notifications.insert(rule.ticker.clone(), rule);
        write_json_atomic(&user_file(&self.dir, user_id)?, &user)?;

        let mut index = self.index.write();
        for entries in index.values_mut() {
            entries.retain(|(u, _)| u != user_id);
        }
        index.retain(|_, entries| !entries.is_empty());
        insert_user(&mut index, &user);

        Ok(user)
    }

    pub fn rules_for(&self, ticker: &str) -> Vec<(String, NotificationRule)> {
        self.index
            .read()
            .get(&ticker.to_ascii_uppercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_rules(&self, ticker: &str) -> bool {
        self.index
            .read()
            .contains_key(&ticker.to_ascii_uppercase())
    }

    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.index.read().keys().cloned().collect();
        tickers.sort();
        tickers
    }
}

fn load_user(dir: &Path, user_id: &str) -> Result<UserNotifications> {
    let path = user_file(dir, user_id)?;
    let mut user = read_user_file::<UserNotifications>(&path)?
        .unwrap_or_else(|| UserNotifications::empty(user_id));
    user.user_id = user_id.to_string();
    Ok(user)
}

fn load_index(dir: &Path) -> Result<RuleIndex> {
    let mut index = RuleIndex::new();
    for (user_id, path) in list_user_files(dir)? {
        let mut user = read_user_file::<UserNotifications>(&path)?
            .unwrap_or_else(|| UserNotifications::empty(&user_id));
        user.user_id = user_id;
        insert_user(&mut index, &user);
    }
    Ok(index)
}

fn insert_user(index: &mut RuleIndex, user: &UserNotifications) {
    for (ticker, rule) in &user.notifications {
        let ticker = ticker.to_ascii_uppercase();
        let rule = NotificationRule {
            ticker: ticker.clone(),
            ..rule.clone()
        };
        index
            .entry(ticker)
            .or_default()
            .push((user.user_id.clone(), rule));
    }
}
