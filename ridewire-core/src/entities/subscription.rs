//! Location subscriptions: driver → riders watching it.

use dashmap::DashMap;
use ridewire_sdk::objects::{DriverId, UserId};
use std::collections::HashSet;

#[derive(Default)]
pub struct SubscriptionTable {
    by_driver: DashMap<DriverId, HashSet<UserId>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `user_id` to the subscribers of `driver_id`.
    ///
    /// Idempotent; returns `false` if the subscription already existed.
    pub fn subscribe(&self, user_id: UserId, driver_id: DriverId) -> bool {
        self.by_driver.entry(driver_id).or_default().insert(user_id)
    }

    pub fn subscribers_of(&self, driver_id: &DriverId) -> Vec<UserId> {
        self.by_driver
            .get(driver_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, user_id: &UserId, driver_id: &DriverId) -> bool {
        self.by_driver
            .get(driver_id)
            .is_some_and(|set| set.contains(user_id))
    }

    /// Remove a rider from every driver's subscriber set.
    ///
    /// Returns the number of subscriptions dropped. Empty sets are pruned.
    pub fn remove_rider(&self, user_id: &UserId) -> usize {
        let mut removed = 0;
        self.by_driver.retain(|_, set| {
            if set.remove(user_id) {
                removed += 1;
            }
            !set.is_empty()
        });
        removed
    }

    /// Drop a driver's subscriber set entirely.
    pub fn remove_driver(&self, driver_id: &DriverId) -> usize {
        self.by_driver
            .remove(driver_id)
            .map(|(_, set)| set.len())
            .unwrap_or(0)
    }

    /// Total number of (driver, rider) subscriptions.
    pub fn len(&self) -> usize {
        self.by_driver.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_driver.is_empty()
    }
}
