//! The economy facade. Each concern lives in its own module as an
//! `impl Economy` block; this file only holds the shared state.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::economy::catalog::Catalog;
use crate::economy::locks::RecordLocks;
use crate::economy::port::{GameEvent, IdentityPort, Notifier};
use crate::economy::storage::EconomyStore;

/// Tunable game rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Rules {
    pub scavenge_duration: Duration,
    pub general_scavenge_rolls: u32,
    pub targeted_scavenge_rolls: u32,
    /// Chance each scavenge roll finds anything, in `[0, 1]`.
    pub scavenge_chance: f64,
    pub max_labor_hours: u32,
    pub trade_expiry: Duration,
    pub max_characters_per_owner: usize,
    /// Experience granted per point of honor consumed.
    pub honor_xp_rate: u64,
    pub confirmation_timeout: StdDuration,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            scavenge_duration: Duration::minutes(60),
            general_scavenge_rolls: 10,
            targeted_scavenge_rolls: 5,
            scavenge_chance: 0.4,
            max_labor_hours: 10,
            trade_expiry: Duration::days(7),
            max_characters_per_owner: 10,
            honor_xp_rate: 25,
            confirmation_timeout: StdDuration::from_secs(30),
        }
    }
}

/// Shared handle to the game economy. Cheap to clone; every clone sees the
/// same store, locks and ports.
#[derive(Clone)]
pub struct Economy {
    pub(crate) store: Arc<EconomyStore>,
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) locks: RecordLocks,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) identity: Arc<dyn IdentityPort>,
    pub(crate) rules: Rules,
}

impl Economy {
    pub fn new(
        store: Arc<EconomyStore>,
        catalog: Arc<Catalog>,
        notifier: Arc<dyn Notifier>,
        identity: Arc<dyn IdentityPort>,
    ) -> Self {
        Self {
            store,
            catalog,
            locks: RecordLocks::new(),
            notifier,
            identity,
            rules: Rules::default(),
        }
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &EconomyStore {
        &self.store
    }

    pub(crate) fn announce(&self, events: &[GameEvent]) {
        for event in events {
            self.notifier.notify(event);
        }
    }
}
