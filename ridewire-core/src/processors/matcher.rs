//! Proximity matching and the retry-search sweep.

use itertools::Itertools;
use kanau::processor::Processor;
use ridewire_sdk::objects::{Coordinates, NearbyDriver, RequestId, ServerMessage, UserId};
use std::convert::Infallible;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::entities::{DriverPresence, PresenceStore, RideEvent, SearchStep};
use crate::events::AdvanceSearches;
use crate::framework::Dispatcher;
use crate::utils::geo::haversine_m;

/// An available driver within the search radius.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub presence: DriverPresence,
    pub distance_m: f64,
}

impl Candidate {
    pub fn to_wire(&self) -> NearbyDriver {
        NearbyDriver {
            driver_id: self.presence.driver_id.clone(),
            latitude: self.presence.coordinates.latitude,
            longitude: self.presence.coordinates.longitude,
            heading: self.presence.heading,
            distance: self.distance_m,
        }
    }
}

/// Available drivers within `radius_m` of `origin`, closest first.
///
/// Ties are broken by driver id so the order is stable.
pub fn search(presence: &PresenceStore, origin: Coordinates, radius_m: f64) -> Vec<Candidate> {
    presence
        .available()
        .into_iter()
        .map(|presence| Candidate {
            distance_m: haversine_m(origin, presence.coordinates),
            presence,
        })
        .filter(|candidate| candidate.distance_m <= radius_m)
        .sorted_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.presence.driver_id.cmp(&b.presence.driver_id))
        })
        .collect()
}

/// Outcome of one [`AdvanceSearches`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSweep {
    /// Searches that found drivers and were delivered.
    pub matched: usize,
    /// Searches that gave up.
    pub exhausted: usize,
    /// Terminal rides forgotten.
    pub purged: usize,
}

impl Dispatcher {
    /// Give up on a search. Emits only if this call removed the entry.
    ///
    /// The search is removed under the ride lock, so a booking that already
    /// holds the ride keeps it.
    fn exhaust(&self, request_id: RequestId, rider_id: &UserId, now: Instant) -> bool {
        let outcome = self.rides.update(&request_id, |ride| {
            if ride.driver_id.is_some() || ride.is_terminal() {
                self.searches.cancel(&request_id);
                return None;
            }
            self.searches.cancel(&request_id)?;
            Some(ride.apply(RideEvent::SearchExhausted, now).is_ok())
        });
        let closed = match outcome {
            Some(Some(closed)) => closed,
            Some(None) => return false,
            None if self.searches.cancel(&request_id).is_some() => false,
            None => return false,
        };
        info!(request_id = %request_id, closed, "No drivers found, search exhausted");
        self.notify_rider(
            rider_id,
            ServerMessage::RequestFailed {
                request_id: Some(request_id),
                message: "no drivers found nearby".into(),
            },
        );
        true
    }
}

impl Processor<AdvanceSearches> for Dispatcher {
    type Output = SearchSweep;
    type Error = Infallible;

    async fn process(&self, event: AdvanceSearches) -> Result<SearchSweep, Infallible> {
        let now = event.now;
        let mut sweep = SearchSweep::default();

        for request_id in self.searches.due(now) {
            let Some(step) = self.searches.step(&request_id, now) else {
                continue;
            };
            match step {
                SearchStep::Attempt {
                    rider_id,
                    origin,
                    radius_m,
                    last,
                } => {
                    let candidates = search(&self.presence, origin, radius_m);
                    if !candidates.is_empty() {
                        // Whoever removes the search delivers the result.
                        if self.searches.cancel(&request_id).is_some() {
                            debug!(
                                request_id = %request_id,
                                found = candidates.len(),
                                "Retry search matched"
                            );
                            self.notify_rider(
                                &rider_id,
                                ServerMessage::NearbyDrivers {
                                    request_id,
                                    drivers: candidates.iter().map(Candidate::to_wire).collect(),
                                },
                            );
                            sweep.matched += 1;
                        }
                    } else if last && self.exhaust(request_id, &rider_id, now) {
                        sweep.exhausted += 1;
                    }
                }
                SearchStep::Expire { rider_id } => {
                    if self.exhaust(request_id, &rider_id, now) {
                        sweep.exhausted += 1;
                    }
                }
            }
        }

        let retention = self.config().terminal_retention;
        sweep.purged = self.rides.purge_closed(now, retention);
        if sweep.purged > 0 {
            debug!(purged = sweep.purged, "Purged closed rides");
        }
        Ok(sweep)
    }
}
