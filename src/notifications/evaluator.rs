//! Threshold evaluation and duplicate suppression.

use super::rules::NotificationRule;
use crate::models::{BucketStatus, PeriodSummary};
use std::collections::{HashMap, HashSet};

/// Whether `summary` satisfies any enabled dimension of `rule`.
///
/// Premium floors are independent. Ratio floors only apply once total premium
/// reaches `ratio_premium_threshold`, and both must be configured. Ratios are
/// compared as published, so the -1 "infinite" sentinel never clears a positive
/// floor.
pub fn evaluate(summary: &PeriodSummary, rule: &NotificationRule) -> bool {
    if rule.call_premium_threshold > 0.0 && summary.call_premium >= rule.call_premium_threshold {
        return true;
    }
    if rule.put_premium_threshold > 0.0 && summary.put_premium >= rule.put_premium_threshold {
        return true;
    }

    let gate_met = rule.ratio_premium_threshold > 0.0
        && summary.total_premium >= rule.ratio_premium_threshold;
    if !gate_met {
        return false;
    }

    if rule.call_ratio_threshold > 0.0 && summary.call_put_ratio >= rule.call_ratio_threshold {
        return true;
    }
    rule.put_ratio_threshold > 0.0 && summary.put_call_ratio() >= rule.put_ratio_threshold
}

/// Identity of one logical alert for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupKey {
    /// At most one alert per completed bucket.
    Completed { period_end_ms: i64 },
    /// At most one alert per throttle window while the bucket is open.
    InProgress {
        period_end_ms: i64,
        window_start_ms: i64,
    },
}

impl DedupKey {
    pub fn for_bucket(period_end_ms: i64, status: BucketStatus, now_ms: i64, window_ms: i64) -> Self {
        match status {
            BucketStatus::Completed => DedupKey::Completed { period_end_ms },
            BucketStatus::InProgress => {
                let window = window_ms.max(1);
                DedupKey::InProgress {
                    period_end_ms,
                    window_start_ms: now_ms.div_euclid(window) * window,
                }
            }
        }
    }

    pub fn period_end_ms(&self) -> i64 {
        match self {
            DedupKey::Completed { period_end_ms } => *period_end_ms,
            DedupKey::InProgress { period_end_ms, .. } => *period_end_ms,
        }
    }
}

/// Per-ticker record of alerts already triggered, keyed by user.
#[derive(Debug)]
pub struct NotificationLedger {
    monitoring_since_ms: i64,
    window_ms: i64,
    sent: HashMap<String, HashSet<DedupKey>>,
}

impl NotificationLedger {
    pub fn new(monitoring_since_ms: i64, window_ms: i64) -> Self {
        Self {
            monitoring_since_ms,
            window_ms,
            sent: HashMap::new(),
        }
    }

    /// Evaluate and, when the rule fires for a key not yet claimed by `user`,
    /// claim it and return it. A claimed key stays claimed whatever happens to
    /// the delivery.
    pub fn check(
        &mut self,
        user: &str,
        summary: &PeriodSummary,
        rule: &NotificationRule,
        now_ms: i64,
    ) -> Option<DedupKey> {
        let status = summary.status_at(now_ms);
        if status == BucketStatus::Completed && summary.end_ms() < self.monitoring_since_ms {
            return None;
        }
        if !evaluate(summary, rule) {
            return None;
        }
        let key = DedupKey::for_bucket(summary.end_ms(), status, now_ms, self.window_ms);
        self.claim(user, key).then_some(key)
    }

    /// Mark `key` as sent. Returns false when it already was.
    ///
    /// Claiming an in-progress window also claims the bucket's completed key so
    /// the same bucket is not alerted again when it closes.
    pub fn claim(&mut self, user: &str, key: DedupKey) -> bool {
        let keys = self.sent.entry(user.to_string()).or_default();
        if !keys.insert(key) {
            return false;
        }
        if let DedupKey::InProgress { period_end_ms, .. } = key {
            keys.insert(DedupKey::Completed { period_end_ms });
        }
        true
    }

    /// Forget keys for buckets that ended before `cutoff_ms`.
    pub fn prune(&mut self, cutoff_ms: i64) {
        for keys in self.sent.values_mut() {
            keys.retain(|k| k.period_end_ms() >= cutoff_ms);
        }
        self.sent.retain(|_, keys| !keys.is_empty());
    }

    pub fn len(&self) -> usize {
        self.sent.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
