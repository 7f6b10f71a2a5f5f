//! Bounded series lengths

use super::Tier;
use crate::core::{Error, Result};
use crate::db::SeriesStore;
use std::collections::{BTreeMap, HashMap};

/// Maximum length per tier, enforced after every append
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    limits: HashMap<Tier, usize>,
}

impl RetentionPolicy {
    /// Policy using each tier's default limit
    pub fn new() -> Self {
        Self {
            limits: Tier::ALL
                .iter()
                .map(|&tier| (tier, tier.default_retention()))
                .collect(),
        }
    }

    /// Defaults with per-series overrides keyed by series name
    pub fn with_overrides(overrides: &BTreeMap<String, usize>) -> Result<Self> {
        let mut policy = Self::new();

        for (name, &limit) in overrides {
            let tier: Tier = name.parse()?;
            if limit == 0 {
                return Err(Error::Config(format!(
                    "Retention limit for {} must be at least 1",
                    tier
                )));
            }
            policy.set_limit(tier, limit);
        }

        Ok(policy)
    }

    pub fn limit(&self, tier: Tier) -> usize {
        self.limits
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_retention())
    }

    pub fn set_limit(&mut self, tier: Tier, limit: usize) {
        self.limits.insert(tier, limit);
    }

    /// Trim `tier`'s series back to its limit, dropping the oldest records.
    ///
    /// Returns the number of records removed.
    pub fn enforce<S: SeriesStore + ?Sized>(&self, store: &mut S, tier: Tier) -> Result<usize> {
        let limit = self.limit(tier);
        let length = store.len(tier.name())?;

        if length <= limit {
            return Ok(0);
        }

        let excess = length - limit;
        store.trim(tier.name(), excess as i64, -1)?;
        log::debug!(
            "Trimmed {} oldest records from {} (limit {})",
            excess,
            tier,
            limit
        );

        Ok(excess)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn fill(store: &mut MemoryStore, tier: Tier, count: usize) {
        for i in 0..count {
            store.push(tier.name(), &i.to_string()).unwrap();
        }
    }

    #[test]
    fn test_under_limit_is_untouched() {
        let mut store = MemoryStore::new();
        let mut policy = RetentionPolicy::new();
        policy.set_limit(Tier::Hours, 5);
        fill(&mut store, Tier::Hours, 5);

        assert_eq!(policy.enforce(&mut store, Tier::Hours).unwrap(), 0);
        assert_eq!(store.len("hours").unwrap(), 5);
    }

    #[test]
    fn test_trims_oldest_first() {
        let mut store = MemoryStore::new();
        let mut policy = RetentionPolicy::new();
        policy.set_limit(Tier::Hours, 3);
        fill(&mut store, Tier::Hours, 8);

        assert_eq!(policy.enforce(&mut store, Tier::Hours).unwrap(), 5);
        assert_eq!(store.range("hours", 0, -1).unwrap(), vec!["5", "6", "7"]);
    }

    #[test]
    fn test_enforce_twice_is_stable() {
        let mut store = MemoryStore::new();
        let mut policy = RetentionPolicy::new();
        policy.set_limit(Tier::Days, 4);
        fill(&mut store, Tier::Days, 10);

        policy.enforce(&mut store, Tier::Days).unwrap();
        assert!(store.len("days").unwrap() <= 4);
        assert_eq!(policy.enforce(&mut store, Tier::Days).unwrap(), 0);
        assert!(store.len("days").unwrap() <= 4);
    }

    #[test]
    fn test_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("minutes".to_string(), 100);
        let policy = RetentionPolicy::with_overrides(&overrides).unwrap();

        assert_eq!(policy.limit(Tier::Minutes), 100);
        assert_eq!(policy.limit(Tier::Seconds), 90_000);
    }

    #[test]
    fn test_override_rejects_unknown_tier() {
        let mut overrides = BTreeMap::new();
        overrides.insert("decades".to_string(), 10);

        assert!(matches!(
            RetentionPolicy::with_overrides(&overrides),
            Err(Error::UnknownTier(_))
        ));
    }

    #[test]
    fn test_override_rejects_zero() {
        let mut overrides = BTreeMap::new();
        overrides.insert("days".to_string(), 0);

        assert!(matches!(
            RetentionPolicy::with_overrides(&overrides),
            Err(Error::Config(_))
        ));
    }
}
