use std::{net::SocketAddr, time::Instant};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use toll_common::{elapsed_secs, unix_micros};

use crate::{
    error::{BoothConflict, EntryError, ExitError},
    network::{Network, Tariff},
    random::{RandomSource, StdRandom},
    travel::TravelTimeModel,
    BoothId, BoothKey, Direction, Point,
};

/// Options for a [`Ledger`].
#[derive(Debug, Clone, Default)]
pub struct LedgerOptions {
    pub network: Network,
    pub tariff: Tariff,
    pub travel: TravelTimeModel,
    /// Ends the simulation once this many vehicles have entered. `None` runs forever.
    pub max_vehicles: Option<u64>,
}

impl LedgerOptions {
    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn tariff(mut self, tariff: Tariff) -> Self {
        self.tariff = tariff;
        self
    }

    pub fn travel(mut self, travel: TravelTimeModel) -> Self {
        self.travel = travel;
        self
    }

    pub fn max_vehicles(mut self, max_vehicles: u64) -> Self {
        self.max_vehicles = Some(max_vehicles);
        self
    }
}

/// A vehicle currently on the highway.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub vehicle_id: String,
    pub entry_point: Point,
    pub entry_booth: BoothKey,
    /// Used for elapsed time comparisons only.
    pub entered_at: Instant,
    /// UNIX timestamp in microseconds.
    pub entry_timestamp: u64,
    /// Admission order, used to make scans deterministic.
    sequence: u64,
}

/// The live connection registered under a [`BoothKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoothHandle {
    pub session_id: u64,
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleStatus {
    OnHighway,
    Completed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryReceipt {
    pub vehicle_id: String,
    pub entry_point: Point,
    pub booth_id: BoothId,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitReceipt {
    pub vehicle_id: String,
    pub entry_point: Point,
    pub exit_point: Point,
    /// The exit booth, or `None` if the system forced the exit.
    pub booth_id: Option<BoothId>,
    pub toll_fee: f64,
    /// Measured travel time in seconds.
    pub travel_time: f64,
    pub timestamp: u64,
}

impl ExitReceipt {
    pub fn is_forced(&self) -> bool {
        self.booth_id.is_none()
    }
}

/// Point-in-time copy of the ledger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerStats {
    pub on_highway: usize,
    pub completed: usize,
    pub total_vehicles_entered: u64,
    pub total_fees_collected: f64,
    pub connected_entry_booths: usize,
    pub connected_exit_booths: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    current_vehicles: FxHashMap<String, VehicleRecord>,
    completed_vehicles: FxHashSet<String>,
    /// Vehicles attributed to the entry booth that admitted them.
    booth_vehicles: FxHashMap<BoothKey, FxHashSet<String>>,
    connected_booths: FxHashMap<BoothKey, BoothHandle>,
    total_vehicles_entered: u64,
    total_fees_collected: f64,
}

struct Inner<R> {
    state: LedgerState,
    rng: R,
}

/// The authoritative record of vehicles on the highway.
///
/// Every public operation is one critical section: membership checks, random draws and the
/// mutation they lead to happen under a single lock acquisition. Nothing in here performs
/// I/O; callers emit events from the returned receipts after the call returns.
pub struct Ledger<R = StdRandom> {
    options: LedgerOptions,
    inner: Mutex<Inner<R>>,
}

impl Ledger<StdRandom> {
    /// Creates a ledger with an entropy seeded random source.
    pub fn new(options: LedgerOptions) -> Self {
        Self::with_random(options, StdRandom::from_entropy())
    }
}

impl<R: RandomSource> Ledger<R> {
    pub fn with_random(options: LedgerOptions, rng: R) -> Self {
        Self { options, inner: Mutex::new(Inner { state: LedgerState::default(), rng }) }
    }

    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    pub fn network(&self) -> &Network {
        &self.options.network
    }

    /// Records a vehicle entering through the entry booth `key`.
    pub fn try_enter(
        &self,
        key: &BoothKey,
        vehicle_id: &str,
        now: Instant,
    ) -> Result<EntryReceipt, EntryError> {
        if key.direction != Direction::Entry {
            return Err(EntryError::NotAnEntryBooth(*key));
        }

        if vehicle_id.is_empty() {
            return Err(EntryError::InvalidVehicleId);
        }

        let mut inner = self.inner.lock();
        let state = &mut inner.state;

        if self.limit_reached(state) {
            return Err(EntryError::SimulationComplete);
        }

        if state.current_vehicles.contains_key(vehicle_id) {
            return Err(EntryError::AlreadyOnHighway(vehicle_id.to_string()));
        }

        if state.completed_vehicles.contains(vehicle_id) {
            return Err(EntryError::AlreadyCompleted(vehicle_id.to_string()));
        }

        let timestamp = unix_micros();
        let record = VehicleRecord {
            vehicle_id: vehicle_id.to_string(),
            entry_point: key.point,
            entry_booth: *key,
            entered_at: now,
            entry_timestamp: timestamp,
            sequence: state.total_vehicles_entered,
        };

        state.current_vehicles.insert(record.vehicle_id.clone(), record);
        state.booth_vehicles.entry(*key).or_default().insert(vehicle_id.to_string());
        state.total_vehicles_entered += 1;

        Ok(EntryReceipt {
            vehicle_id: vehicle_id.to_string(),
            entry_point: key.point,
            booth_id: key.booth_id,
            timestamp,
        })
    }

    /// Releases one vehicle at the exit booth `key`, picked uniformly at random among the
    /// vehicles that entered upstream and have travelled for at least their sampled dwell.
    ///
    /// The dwell is drawn afresh for every candidate on every call, so a booth that polls
    /// often tends to release vehicles closer to their minimum dwell than their maximum.
    pub fn try_exit(&self, key: &BoothKey, now: Instant) -> Result<ExitReceipt, ExitError> {
        if key.direction != Direction::Exit {
            return Err(ExitError::NotAnExitBooth(*key));
        }

        let mut guard = self.inner.lock();
        let Inner { state, rng } = &mut *guard;

        let mut candidates: Vec<&VehicleRecord> = state
            .current_vehicles
            .values()
            .filter(|record| record.entry_point < key.point)
            .collect();
        candidates.sort_unstable_by_key(|record| record.sequence);
        candidates.retain(|record| {
            let dwell =
                self.options.travel.expected_dwell(record.entry_point, key.point, &mut *rng);
            now.saturating_duration_since(record.entered_at) >= dwell
        });

        if candidates.is_empty() {
            if self.limit_reached(state) && state.current_vehicles.is_empty() {
                return Err(ExitError::SimulationComplete);
            }

            return Err(ExitError::NoEligibleVehicle(key.point));
        }

        let chosen = candidates[rng.pick(candidates.len())].vehicle_id.clone();

        self.complete(state, &chosen, key.point, Some(key.booth_id), now)
            .ok_or(ExitError::NoEligibleVehicle(key.point))
    }

    /// Forcibly exits every vehicle still attributed to the entry booth `key`. Each vehicle
    /// leaves at a point drawn uniformly from the points downstream of its entry, or at the
    /// last point if there are none.
    pub fn force_exit_all(&self, key: &BoothKey, now: Instant) -> Vec<ExitReceipt> {
        let mut guard = self.inner.lock();
        let Inner { state, rng } = &mut *guard;

        self.force_exit_locked(state, rng, key, now)
    }

    /// Ends the booth session `session_id` registered under `key`: removes it from the
    /// connected booths and, for an entry booth, force-exits its vehicles, in one critical
    /// section. Does nothing if `key` is no longer held by that session.
    pub fn close_booth(&self, key: &BoothKey, session_id: u64, now: Instant) -> Vec<ExitReceipt> {
        let mut guard = self.inner.lock();
        let Inner { state, rng } = &mut *guard;

        match state.connected_booths.get(key) {
            Some(handle) if handle.session_id == session_id => {
                state.connected_booths.remove(key);
            }
            _ => return Vec::new(),
        }

        if !key.direction.is_entry() {
            return Vec::new();
        }

        self.force_exit_locked(state, rng, key, now)
    }

    /// Registers a live booth session. Fails if the key is already connected.
    pub fn connect_booth(&self, key: BoothKey, handle: BoothHandle) -> Result<(), BoothConflict> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.state.connected_booths.get(&key) {
            return Err(BoothConflict { key, existing: *existing });
        }

        inner.state.connected_booths.insert(key, handle);
        Ok(())
    }

    /// Removes a booth session, if it's still the one registered under `key`.
    pub fn disconnect_booth(&self, key: &BoothKey, session_id: u64) -> Option<BoothHandle> {
        let mut inner = self.inner.lock();

        match inner.state.connected_booths.get(key) {
            Some(handle) if handle.session_id == session_id => {
                inner.state.connected_booths.remove(key)
            }
            _ => None,
        }
    }

    pub fn is_connected(&self, key: &BoothKey) -> bool {
        self.inner.lock().state.connected_booths.contains_key(key)
    }

    pub fn vehicle_status(&self, vehicle_id: &str) -> VehicleStatus {
        let inner = self.inner.lock();

        if inner.state.current_vehicles.contains_key(vehicle_id) {
            VehicleStatus::OnHighway
        } else if inner.state.completed_vehicles.contains(vehicle_id) {
            VehicleStatus::Completed
        } else {
            VehicleStatus::Unknown
        }
    }

    pub fn vehicle(&self, vehicle_id: &str) -> Option<VehicleRecord> {
        self.inner.lock().state.current_vehicles.get(vehicle_id).cloned()
    }

    /// Vehicles still attributed to the entry booth `key`.
    pub fn booth_vehicles(&self, key: &BoothKey) -> Vec<String> {
        let inner = self.inner.lock();

        let mut ids: Vec<String> = inner
            .state
            .booth_vehicles
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Whether the vehicle limit has been reached and every vehicle has left the highway.
    pub fn is_complete(&self) -> bool {
        let inner = self.inner.lock();
        self.limit_reached(&inner.state) && inner.state.current_vehicles.is_empty()
    }

    pub fn stats(&self) -> LedgerStats {
        let inner = self.inner.lock();
        let state = &inner.state;

        let connected_entry_booths =
            state.connected_booths.keys().filter(|k| k.direction.is_entry()).count();

        LedgerStats {
            on_highway: state.current_vehicles.len(),
            completed: state.completed_vehicles.len(),
            total_vehicles_entered: state.total_vehicles_entered,
            total_fees_collected: state.total_fees_collected,
            connected_entry_booths,
            connected_exit_booths: state.connected_booths.len() - connected_entry_booths,
        }
    }

    fn force_exit_locked(
        &self,
        state: &mut LedgerState,
        rng: &mut R,
        key: &BoothKey,
        now: Instant,
    ) -> Vec<ExitReceipt> {
        let Some(attributed) = state.booth_vehicles.remove(key) else {
            return Vec::new();
        };

        let mut pending: Vec<(u64, String, Point)> = attributed
            .into_iter()
            .filter_map(|id| {
                let record = state.current_vehicles.get(&id)?;
                Some((record.sequence, id, record.entry_point))
            })
            .collect();
        pending.sort_unstable_by_key(|(sequence, ..)| *sequence);

        let last_point = self.options.network.last_point();

        pending
            .into_iter()
            .filter_map(|(_, id, entry_point)| {
                let exit_point = if entry_point < last_point {
                    let downstream = (last_point - entry_point) as usize;
                    entry_point + 1 + rng.pick(downstream) as Point
                } else {
                    last_point
                };

                self.complete(state, &id, exit_point, None, now)
            })
            .collect()
    }

    fn limit_reached(&self, state: &LedgerState) -> bool {
        self.options.max_vehicles.is_some_and(|max| state.total_vehicles_entered >= max)
    }

    /// Moves a vehicle from the highway to the completed set and charges its toll. Returns
    /// `None` if the vehicle isn't on the highway.
    fn complete(
        &self,
        state: &mut LedgerState,
        vehicle_id: &str,
        exit_point: Point,
        booth_id: Option<BoothId>,
        now: Instant,
    ) -> Option<ExitReceipt> {
        let record = state.current_vehicles.remove(vehicle_id)?;

        if let Some(ids) = state.booth_vehicles.get_mut(&record.entry_booth) {
            ids.remove(vehicle_id);
            if ids.is_empty() {
                state.booth_vehicles.remove(&record.entry_booth);
            }
        }

        state.completed_vehicles.insert(record.vehicle_id.clone());

        let toll_fee = self.options.tariff.fee(record.entry_point, exit_point);
        state.total_fees_collected += toll_fee;

        Some(ExitReceipt {
            vehicle_id: record.vehicle_id,
            entry_point: record.entry_point,
            exit_point,
            booth_id,
            toll_fee,
            travel_time: elapsed_secs(record.entered_at, now),
            timestamp: unix_micros(),
        })
    }
}

impl<R> std::fmt::Debug for Ledger<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").field("options", &self.options).finish_non_exhaustive()
    }
}
