//! Expiry and size-budget eviction planning.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::entities::{CachedEntry, ResourceLocator};

/// Size and age budget of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    max_size: u64,
    max_age: TimeDelta,
}

/// Locators an eviction pass removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Entries older than the maximum age.
    pub expired: Vec<ResourceLocator>,
    /// Least-recently-used entries removed to fit the size budget.
    pub over_budget: Vec<ResourceLocator>,
    /// Bytes retained by the surviving entries.
    pub retained_bytes: u64,
    /// Number of surviving entries.
    pub retained_entries: usize,
}

impl EvictionPlan {
    /// Every locator to remove, expired first.
    pub fn removals(&self) -> impl Iterator<Item = &ResourceLocator> {
        self.expired.iter().chain(self.over_budget.iter())
    }

    /// Returns true if nothing is removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.over_budget.is_empty()
    }
}

impl EvictionPolicy {
    /// Creates a policy. Ages beyond `TimeDelta::MAX` never expire.
    #[must_use]
    pub fn new(max_size: u64, max_age: Duration) -> Self {
        Self {
            max_size,
            max_age: TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Size budget in bytes.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Returns true if the entry is past the maximum age at `now`.
    #[must_use]
    pub fn is_expired(&self, entry: &CachedEntry, now: DateTime<Utc>) -> bool {
        entry.age(now) > self.max_age
    }

    /// Plans one eviction pass.
    ///
    /// Expired entries go first; if the survivors still exceed the size budget they
    /// are removed least-recently-used first until the total fits.
    pub fn plan<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a CachedEntry>,
        now: DateTime<Utc>,
    ) -> EvictionPlan {
        let mut plan = EvictionPlan::default();
        let mut live: Vec<&CachedEntry> = Vec::new();

        for entry in entries {
            if self.is_expired(entry, now) {
                plan.expired.push(entry.locator.clone());
            } else {
                plan.retained_bytes += entry.size_bytes();
                live.push(entry);
            }
        }

        if plan.retained_bytes > self.max_size {
            live.sort_by(|a, b| {
                a.last_accessed_at
                    .cmp(&b.last_accessed_at)
                    .then_with(|| a.locator.cmp(&b.locator))
            });

            for entry in &live {
                if plan.retained_bytes <= self.max_size {
                    break;
                }
                plan.retained_bytes -= entry.size_bytes();
                plan.over_budget.push(entry.locator.clone());
            }
        }

        plan.retained_entries = live.len() - plan.over_budget.len();
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntryMetadata, ImageFormat};
    use bytes::Bytes;

    const MB: u64 = 1024 * 1024;

    fn entry(name: &str, size: u64, created: DateTime<Utc>, accessed: DateTime<Utc>) -> CachedEntry {
        let mut e = CachedEntry::new(
            ResourceLocator::new(name),
            Bytes::new(),
            EntryMetadata::opaque(ImageFormat::Webp, size),
            created,
        );
        e.last_accessed_at = accessed;
        e
    }

    #[test]
    fn test_budget_scenario_evicts_two_least_recent() {
        let now = Utc::now();
        let policy = EvictionPolicy::new(50 * MB, Duration::from_secs(365 * 24 * 3600));
        let entries: Vec<_> = (0..10)
            .map(|i| {
                let t = now - TimeDelta::minutes(60 - i);
                entry(&format!("/uploads/{i}.jpg"), 6 * MB, t, t)
            })
            .collect();

        let plan = policy.plan(&entries, now);

        assert!(plan.expired.is_empty());
        assert_eq!(
            plan.over_budget,
            vec![
                ResourceLocator::new("/uploads/0.jpg"),
                ResourceLocator::new("/uploads/1.jpg")
            ]
        );
        assert_eq!(plan.retained_entries, 8);
        assert!(plan.retained_bytes <= 50 * MB);
    }

    #[test]
    fn test_expired_entries_removed_first() {
        let now = Utc::now();
        let policy = EvictionPolicy::new(100 * MB, Duration::from_secs(3600));
        let entries = vec![
            entry("/old", MB, now - TimeDelta::hours(2), now),
            entry("/fresh", MB, now - TimeDelta::minutes(5), now),
        ];

        let plan = policy.plan(&entries, now);

        assert_eq!(plan.expired, vec![ResourceLocator::new("/old")]);
        assert!(plan.over_budget.is_empty());
        assert_eq!(plan.retained_bytes, MB);
        assert_eq!(plan.retained_entries, 1);
    }

    #[test]
    fn test_expired_bytes_not_counted_against_budget() {
        let now = Utc::now();
        let policy = EvictionPolicy::new(10 * MB, Duration::from_secs(3600));
        let entries = vec![
            entry("/stale", 20 * MB, now - TimeDelta::days(1), now),
            entry("/a", 5 * MB, now, now - TimeDelta::seconds(10)),
            entry("/b", 5 * MB, now, now),
        ];

        let plan = policy.plan(&entries, now);

        assert_eq!(plan.expired.len(), 1);
        assert!(plan.over_budget.is_empty());
        assert_eq!(plan.retained_bytes, 10 * MB);
    }

    #[test]
    fn test_survivors_respect_both_budgets() {
        let now = Utc::now();
        let policy = EvictionPolicy::new(7, Duration::from_secs(60));
        let entries: Vec<_> = (0..20)
            .map(|i| {
                let created = now - TimeDelta::seconds(i * 7);
                entry(&format!("/{i}"), u64::try_from(i % 4).unwrap() + 1, created, created)
            })
            .collect();

        let plan = policy.plan(&entries, now);
        let removed: Vec<_> = plan.removals().cloned().collect();
        let survivors: Vec<_> = entries
            .iter()
            .filter(|e| !removed.contains(&e.locator))
            .collect();

        let total: u64 = survivors.iter().map(|e| e.size_bytes()).sum();
        assert!(total <= 7);
        assert_eq!(total, plan.retained_bytes);
        assert!(survivors.iter().all(|e| e.age(now) <= TimeDelta::seconds(60)));
    }

    #[test]
    fn test_empty_plan_under_budget() {
        let now = Utc::now();
        let policy = EvictionPolicy::new(MB, Duration::from_secs(60));
        let entries = vec![entry("/a", 10, now, now)];

        assert!(policy.plan(&entries, now).is_empty());
    }
}
