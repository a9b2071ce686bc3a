//! Swappable rule table snapshots.
//!
//! Readers take a snapshot and keep using it for the whole event, so a
//! reload never shows them a half-updated table.

use crate::config::RulesConfig;
use crate::error::ConfigError;
use crate::protocol::ProtocolSet;
use crate::table::RuleTable;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

/// A rule table together with the version it was installed as.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The table.
    pub table: Arc<RuleTable>,
    /// Starts at 1 and increases by one per successful replace.
    pub version: u64,
}

/// Holds the active rule table.
#[derive(Debug)]
pub struct RuleStore {
    current: RwLock<Snapshot>,
}

impl RuleStore {
    /// Create a store holding an initial table.
    #[must_use]
    pub fn new(table: RuleTable) -> Self {
        Self {
            current: RwLock::new(Snapshot {
                table: Arc::new(table),
                version: 1,
            }),
        }
    }

    /// The active table and its version.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The active table.
    #[must_use]
    pub fn table(&self) -> Arc<RuleTable> {
        self.snapshot().table
    }

    /// The active version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Install a new table. Returns its version.
    pub fn replace(&self, table: RuleTable) -> u64 {
        let table = Arc::new(table);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.version += 1;
        current.table = table;
        current.version
    }

    /// Build a table from configuration and install it.
    ///
    /// # Errors
    ///
    /// If validation fails the active table is left in place and the
    /// error is returned.
    pub fn reload(
        &self,
        config: &RulesConfig,
        protocols: &ProtocolSet,
    ) -> Result<u64, ConfigError> {
        match RuleTable::load(config, protocols) {
            Ok(table) => {
                let rules = table.len();
                let version = self.replace(table);
                info!(version, rules, "Rule table reloaded");
                Ok(version)
            }
            Err(e) => {
                error!(
                    version = self.version(),
                    error = %e,
                    "Rule table reload failed, keeping current table"
                );
                Err(e)
            }
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new(RuleTable::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSpec;
    use crate::protocol::Capabilities;

    fn valid_config() -> RulesConfig {
        serde_json::from_str(
            r##"{
                "rules": {
                    "name1": {
                        "from": {
                            "protocol": "irc-esper", "source": "#Ultros", "source_type": "channel"
                        },
                        "to": {
                            "protocol": "irc-archives", "target": "#Ultros",
                            "target_type": "channel"
                        },
                        "formatting": {"general": {"join": "* {USER} joined {CHANNEL}"}}
                    }
                }
            }"##,
        )
        .unwrap()
    }

    fn protocols() -> ProtocolSet {
        ProtocolSet::new()
            .with("irc-esper", Capabilities::new("irc"))
            .with("irc-archives", Capabilities::new("irc"))
    }

    #[test]
    fn test_reload_swaps_table() {
        let store = RuleStore::default();
        assert_eq!(store.version(), 1);
        assert!(store.table().is_empty());

        let version = store.reload(&valid_config(), &protocols()).unwrap();
        assert_eq!(version, 2);
        assert_eq!(store.table().len(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_previous_table() {
        let store = RuleStore::default();
        store.reload(&valid_config(), &protocols()).unwrap();

        let mut broken = valid_config();
        broken.rules.push(("broken".to_string(), RuleSpec::default()));

        assert!(store.reload(&broken, &protocols()).is_err());
        assert_eq!(store.version(), 2);
        assert!(store.table().get("name1").is_some());
        assert!(store.table().get("broken").is_none());
    }

    #[test]
    fn test_snapshot_outlives_replace() {
        let store = RuleStore::default();
        store.reload(&valid_config(), &protocols()).unwrap();

        let before = store.snapshot();
        store.replace(RuleTable::empty());

        assert_eq!(before.table.len(), 1);
        assert_eq!(before.version, 2);
        assert_eq!(store.version(), 3);
        assert!(store.table().is_empty());
    }
}
