//! Driver location store.
//!
//! Holds the last known [`DriverPresence`] of every driver. No history is
//! kept: every location update overwrites the previous entry. Availability
//! is additionally driven by the ride lifecycle through
//! [`claim`](PresenceStore::claim) and [`release`](PresenceStore::release),
//! which tie a `busy` status to the ride that caused it.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ridewire_sdk::objects::{Coordinates, DriverId, DriverStatus, PresenceView, RequestId};
use time::OffsetDateTime;

use crate::utils::geo::normalize_heading;

#[derive(Debug, Clone, PartialEq)]
pub struct DriverPresence {
    pub driver_id: DriverId,
    pub coordinates: Coordinates,
    /// Degrees clockwise from north, in `[0, 360)`.
    pub heading: f64,
    pub status: DriverStatus,
    /// Ride currently holding this driver busy.
    pub engaged_in: Option<RequestId>,
    pub updated_at: OffsetDateTime,
}

impl DriverPresence {
    pub fn view(&self) -> PresenceView {
        PresenceView {
            driver_id: self.driver_id.clone(),
            latitude: self.coordinates.latitude,
            longitude: self.coordinates.longitude,
            heading: self.heading,
            status: self.status,
            updated_at: (self.updated_at.unix_timestamp_nanos() / 1_000_000) as i64,
        }
    }
}

#[derive(Default)]
pub struct PresenceStore {
    drivers: DashMap<DriverId, DriverPresence>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a driver's presence from a location update.
    ///
    /// `status` defaults to `available`. A driver engaged in a ride stays
    /// `busy` whatever the update says.
    pub fn upsert(
        &self,
        driver_id: &DriverId,
        coordinates: Coordinates,
        heading: Option<f64>,
        status: Option<DriverStatus>,
    ) -> DriverPresence {
        let heading = normalize_heading(heading);
        let reported = status.unwrap_or_default();
        let now = OffsetDateTime::now_utc();

        match self.drivers.entry(driver_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let presence = occupied.get_mut();
                presence.coordinates = coordinates;
                presence.heading = heading;
                presence.status = if presence.engaged_in.is_some() {
                    DriverStatus::Busy
                } else {
                    reported
                };
                presence.updated_at = now;
                presence.clone()
            }
            Entry::Vacant(vacant) => vacant
                .insert(DriverPresence {
                    driver_id: driver_id.clone(),
                    coordinates,
                    heading,
                    status: reported,
                    engaged_in: None,
                    updated_at: now,
                })
                .value()
                .clone(),
        }
    }

    pub fn get(&self, driver_id: &DriverId) -> Option<DriverPresence> {
        self.drivers
            .get(driver_id)
            .map(|presence| presence.value().clone())
    }

    pub fn status(&self, driver_id: &DriverId) -> Option<DriverStatus> {
        self.drivers.get(driver_id).map(|presence| presence.status)
    }

    /// Atomically flip an available driver to busy on behalf of `request_id`.
    ///
    /// Returns the updated presence, or `None` if the driver is unknown or
    /// not available.
    pub fn claim(&self, driver_id: &DriverId, request_id: RequestId) -> Option<DriverPresence> {
        let mut presence = self.drivers.get_mut(driver_id)?;
        if presence.status != DriverStatus::Available || presence.engaged_in.is_some() {
            return None;
        }
        presence.status = DriverStatus::Busy;
        presence.engaged_in = Some(request_id);
        Some(presence.value().clone())
    }

    /// Make a driver available again if `request_id` is what kept it busy.
    pub fn release(&self, driver_id: &DriverId, request_id: RequestId) -> bool {
        let Some(mut presence) = self.drivers.get_mut(driver_id) else {
            return false;
        };
        if presence.engaged_in != Some(request_id) {
            return false;
        }
        presence.engaged_in = None;
        if presence.status == DriverStatus::Busy {
            presence.status = DriverStatus::Available;
        }
        true
    }

    /// Mark a disconnected driver offline, dropping any engagement.
    pub fn mark_offline(&self, driver_id: &DriverId) -> bool {
        let Some(mut presence) = self.drivers.get_mut(driver_id) else {
            return false;
        };
        presence.status = DriverStatus::Offline;
        presence.engaged_in = None;
        true
    }

    /// Snapshot of every driver currently available.
    pub fn available(&self) -> Vec<DriverPresence> {
        self.drivers
            .iter()
            .filter(|presence| presence.status == DriverStatus::Available)
            .map(|presence| presence.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(id: &str) -> DriverId {
        DriverId::from(id)
    }

    #[test]
    fn test_last_write_wins() {
        let store = PresenceStore::new();
        store.upsert(&d("a"), Coordinates::new(1.0, 1.0), Some(10.0), None);
        store.upsert(
            &d("a"),
            Coordinates::new(2.0, 3.0),
            Some(200.0),
            Some(DriverStatus::Offline),
        );

        let presence = store.get(&d("a")).unwrap();
        assert_eq!(presence.coordinates, Coordinates::new(2.0, 3.0));
        assert_eq!(presence.heading, 200.0);
        assert_eq!(presence.status, DriverStatus::Offline);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_defaults_to_available_with_zero_heading() {
        let store = PresenceStore::new();
        let presence = store.upsert(&d("a"), Coordinates::new(1.0, 1.0), None, None);
        assert_eq!(presence.status, DriverStatus::Available);
        assert_eq!(presence.heading, 0.0);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let store = PresenceStore::new();
        store.upsert(&d("a"), Coordinates::new(1.0, 1.0), None, None);
        let first = RequestId::generate();
        let second = RequestId::generate();

        assert!(store.claim(&d("a"), first).is_some());
        assert!(store.claim(&d("a"), second).is_none());
        assert_eq!(store.status(&d("a")), Some(DriverStatus::Busy));
        assert!(store.claim(&d("ghost"), first).is_none());
    }

    #[test]
    fn test_engaged_driver_stays_busy_on_location_update() {
        let store = PresenceStore::new();
        store.upsert(&d("a"), Coordinates::new(1.0, 1.0), None, None);
        let ride = RequestId::generate();
        store.claim(&d("a"), ride).unwrap();

        let presence = store.upsert(
            &d("a"),
            Coordinates::new(1.1, 1.1),
            None,
            Some(DriverStatus::Available),
        );
        assert_eq!(presence.status, DriverStatus::Busy);
    }

    #[test]
    fn test_release_only_for_owning_ride() {
        let store = PresenceStore::new();
        store.upsert(&d("a"), Coordinates::new(1.0, 1.0), None, None);
        let ride = RequestId::generate();
        store.claim(&d("a"), ride).unwrap();

        assert!(!store.release(&d("a"), RequestId::generate()));
        assert_eq!(store.status(&d("a")), Some(DriverStatus::Busy));

        assert!(store.release(&d("a"), ride));
        assert_eq!(store.status(&d("a")), Some(DriverStatus::Available));
    }

    #[test]
    fn test_offline_drivers_are_not_available() {
        let store = PresenceStore::new();
        store.upsert(&d("a"), Coordinates::new(1.0, 1.0), None, None);
        store.upsert(&d("b"), Coordinates::new(1.0, 1.0), None, None);
        store.mark_offline(&d("b"));

        let available: Vec<_> = store.available().into_iter().map(|p| p.driver_id).collect();
        assert_eq!(available, vec![d("a")]);
    }
}
