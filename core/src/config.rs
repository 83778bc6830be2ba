use crate::types::AccountId;
use serde::{Deserialize, Serialize};

/// What the batch does when one account's work fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Roll back the account's unit of work, dead-letter it, quarantine the
    /// account and carry on with the rest of the batch.
    Quarantine,
    /// Stop the whole batch on the first failure.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub failure_policy: FailurePolicy,
    /// Store a state snapshot every N days. 0 disables snapshots.
    pub snapshot_interval_days: u32,
    /// Restrict snapshots to these accounts. `None` dumps every account.
    pub snapshot_accounts: Option<Vec<AccountId>>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Quarantine,
            snapshot_interval_days: 1,
            snapshot_accounts: None,
        }
    }
}

impl BatchConfig {
    /// Load from a JSON file. Missing keys fall back to the defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: BatchConfig = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Reference behaviour: any failure stops the batch.
    pub fn aborting() -> Self {
        Self {
            failure_policy: FailurePolicy::Abort,
            ..Self::default()
        }
    }

    pub fn snapshot_due(&self, day_index: u64) -> bool {
        self.snapshot_interval_days > 0
            && (day_index + 1) % u64::from(self.snapshot_interval_days) == 0
    }

    pub fn includes_account(&self, account_id: AccountId) -> bool {
        self.snapshot_accounts
            .as_ref()
            .map_or(true, |ids| ids.contains(&account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BatchConfig::from_json(r#"{ "failure_policy": "abort" }"#).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.snapshot_interval_days, 1);
        assert!(config.snapshot_accounts.is_none());
    }

    #[test]
    fn account_filter_applies_only_when_set() {
        let all = BatchConfig::default();
        assert!(all.includes_account(42));

        let some = BatchConfig::from_json(r#"{ "snapshot_accounts": [6] }"#).unwrap();
        assert!(some.includes_account(6));
        assert!(!some.includes_account(5));
    }

    #[test]
    fn snapshot_interval_counts_days() {
        let weekly = BatchConfig::from_json(r#"{ "snapshot_interval_days": 7 }"#).unwrap();
        assert!(!weekly.snapshot_due(0));
        assert!(weekly.snapshot_due(6));
        assert!(weekly.snapshot_due(13));

        let never = BatchConfig::from_json(r#"{ "snapshot_interval_days": 0 }"#).unwrap();
        assert!(!never.snapshot_due(0));
    }

    #[test]
    fn daily_snapshots_every_day() {
        let daily = BatchConfig::from_json(r#"{ "snapshot_interval_days": 1 }"#).unwrap();
        assert!((0..5).all(|day| daily.snapshot_due(day)));

        let monthly = BatchConfig::from_json(r#"{ "snapshot_interval_days": 30 }"#).unwrap();
        let due: Vec<u64> = (0..90).filter(|&day| monthly.snapshot_due(day)).collect();
        assert_eq!(due, vec![29, 59, 89]);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(BatchConfig::from_json(r#"{ "failure_policy": "retry" }"#).is_err());
    }
}
