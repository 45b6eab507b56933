use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::{task::JoinSet, time::sleep};
use tracing::{debug, error, info, info_span, warn, Instrument};

use toll_ledger::{Direction, Network, RandomSource, StdRandom};
use toll_wire::{Registration, Response};

use crate::booth::{
    BoothError, BoothOptions, BoothSocket, ExponentialBackoff, VehicleGenerator,
};

/// Options for a [`Simulation`].
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub network: Network,
    /// Vehicles generated across all entry booths.
    pub max_vehicles: usize,
    /// Range of delays between two arrivals at one entry booth.
    pub entry_delay: (Duration, Duration),
    /// Range of delays between two exit polls at one exit booth.
    pub exit_poll: (Duration, Duration),
    /// Range of pauses after a successful request.
    pub processing: (Duration, Duration),
    /// Consecutive failed entries after which an entry booth shuts down.
    pub max_failures: u32,
    /// How long exit booths keep polling once every entry booth has stopped.
    pub drain_timeout: Duration,
    pub seed: Option<u64>,
    pub booth: BoothOptions,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            network: Network::default(),
            max_vehicles: 30,
            entry_delay: (Duration::from_secs(6), Duration::from_secs(20)),
            exit_poll: (Duration::from_secs(3), Duration::from_secs(10)),
            processing: (Duration::from_secs(1), Duration::from_secs(2)),
            max_failures: 5,
            drain_timeout: Duration::from_secs(120),
            seed: None,
            booth: BoothOptions::default(),
        }
    }
}

impl SimulationOptions {
    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn max_vehicles(mut self, max_vehicles: usize) -> Self {
        self.max_vehicles = max_vehicles;
        self
    }

    pub fn entry_delay(mut self, low: Duration, high: Duration) -> Self {
        self.entry_delay = (low, high);
        self
    }

    pub fn exit_poll(mut self, low: Duration, high: Duration) -> Self {
        self.exit_poll = (low, high);
        self
    }

    pub fn processing(mut self, low: Duration, high: Duration) -> Self {
        self.processing = (low, high);
        self
    }

    pub fn max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn booth(mut self, booth: BoothOptions) -> Self {
        self.booth = booth;
        self
    }

    fn random(&self, stream: u64) -> StdRandom {
        match self.seed {
            Some(seed) => StdRandom::seeded(seed.wrapping_add(stream)),
            None => StdRandom::from_entropy(),
        }
    }
}

/// Why a booth task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothExit {
    /// The plaza reported the simulation complete.
    Complete,
    /// Too many consecutive failures.
    GaveUp,
    /// The plaza refused the registration.
    Rejected,
    /// The connection could not be re-established.
    Unreachable,
}

/// Outcome of a single booth task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoothReport {
    pub registration: Registration,
    pub exit: BoothExit,
    pub successes: u64,
    pub failures: u64,
    pub reconnects: u64,
    pub fees: f64,
}

impl BoothReport {
    fn new(registration: Registration) -> Self {
        Self {
            registration,
            exit: BoothExit::Complete,
            successes: 0,
            failures: 0,
            reconnects: 0,
            fees: 0.0,
        }
    }
}

/// Aggregated outcome of a [`Simulation`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationReport {
    pub booths: Vec<BoothReport>,
    /// Exit booths still polling when the drain timeout elapsed.
    pub aborted: usize,
}

impl SimulationReport {
    pub fn entries(&self) -> u64 {
        self.sum(Direction::Entry, |r| r.successes)
    }

    pub fn exits(&self) -> u64 {
        self.sum(Direction::Exit, |r| r.successes)
    }

    pub fn failures(&self) -> u64 {
        self.booths.iter().map(|r| r.failures).sum()
    }

    pub fn fees(&self) -> f64 {
        self.booths.iter().map(|r| r.fees).sum()
    }

    pub fn rejected(&self) -> usize {
        self.booths.iter().filter(|r| r.exit == BoothExit::Rejected).count()
    }

    fn sum(&self, direction: Direction, f: impl Fn(&BoothReport) -> u64) -> u64 {
        self.booths
            .iter()
            .filter(|r| Direction::from_is_entry(r.registration.is_entry) == direction)
            .map(f)
            .sum()
    }
}

/// Drives one booth connection per provisioned booth against a plaza.
///
/// Entry booths `1..=k` and exit booths `k+1..=n` are provisioned at every point, where `n` is
/// the number of booths at the point and `k` the number of entry booths.
pub struct Simulation {
    addr: SocketAddr,
    options: Arc<SimulationOptions>,
}

impl Simulation {
    pub fn new(addr: SocketAddr, options: SimulationOptions) -> Self {
        Self { addr, options: Arc::new(options) }
    }

    /// Every booth this simulation provisions, entry booths first at each point.
    pub fn registrations(&self) -> Vec<Registration> {
        let network = &self.options.network;

        (0..network.points())
            .flat_map(|point| {
                let entries = network.entry_booths_at(point);
                (1..=network.booths_at(point)).map(move |booth_id| Registration {
                    booth_id,
                    point,
                    is_entry: booth_id <= entries,
                })
            })
            .collect()
    }

    /// Runs every booth until entry booths stop and exit booths see the simulation complete
    /// or the drain timeout elapses.
    pub async fn run(self) -> SimulationReport {
        let generator = Arc::new(Mutex::new(VehicleGenerator::with_random(
            self.options.max_vehicles,
            self.options.random(0),
        )));

        let mut entries = JoinSet::new();
        let mut exits = JoinSet::new();

        for (i, registration) in self.registrations().into_iter().enumerate() {
            let task = BoothTask {
                addr: self.addr,
                registration,
                options: Arc::clone(&self.options),
                generator: Arc::clone(&generator),
                rng: self.options.random(i as u64 + 1),
            };

            let span = info_span!(
                "booth",
                point = registration.point,
                id = registration.booth_id,
                entry = registration.is_entry
            );

            if registration.is_entry {
                entries.spawn(task.run().instrument(span));
            } else {
                exits.spawn(task.run().instrument(span));
            }
        }

        info!(
            entry_booths = entries.len(),
            exit_booths = exits.len(),
            max_vehicles = self.options.max_vehicles,
            "simulation started"
        );

        let mut report = SimulationReport::default();
        collect(&mut entries, &mut report).await;

        info!(entries = report.entries(), "entry booths stopped, draining exits");

        if tokio::time::timeout(self.options.drain_timeout, collect(&mut exits, &mut report))
            .await
            .is_err()
        {
            report.aborted = exits.len();
            warn!(remaining = report.aborted, "drain timeout elapsed, stopping exit booths");
            exits.shutdown().await;
        }

        info!(
            entries = report.entries(),
            exits = report.exits(),
            fees = report.fees(),
            "simulation finished"
        );

        report
    }
}

async fn collect(set: &mut JoinSet<BoothReport>, report: &mut SimulationReport) {
    while let Some(result) = set.join_next().await {
        match result {
            Ok(booth) => report.booths.push(booth),
            Err(e) if e.is_panic() => error!(err = ?e, "booth task panicked"),
            Err(_) => {}
        }
    }
}

struct BoothTask {
    addr: SocketAddr,
    registration: Registration,
    options: Arc<SimulationOptions>,
    generator: Arc<Mutex<VehicleGenerator>>,
    rng: StdRandom,
}

impl BoothTask {
    async fn run(mut self) -> BoothReport {
        let mut report = BoothReport::new(self.registration);

        let mut socket = match self.connect(&mut report).await {
            Ok(socket) => socket,
            Err(exit) => {
                report.exit = exit;
                return report;
            }
        };

        let mut consecutive_failures = 0u32;

        loop {
            let result = if self.registration.is_entry {
                self.pause(self.options.entry_delay).await;
                let vehicle_id = self.generator.lock().next_id();
                socket.enter(vehicle_id.as_deref()).await
            } else {
                self.pause(self.options.exit_poll).await;
                socket.exit().await
            };

            match result {
                Ok(Response::Success(outcome)) => {
                    consecutive_failures = 0;
                    report.successes += 1;
                    report.fees += outcome.toll_fee.unwrap_or_default();

                    if self.registration.is_entry {
                        info!(vehicle_id = ?outcome.vehicle_id, "vehicle entered");
                    } else {
                        info!(
                            vehicle_id = ?outcome.vehicle_id,
                            entry_point = ?outcome.entry_point,
                            toll_fee = ?outcome.toll_fee,
                            "vehicle exited"
                        );
                    }

                    self.pause(self.options.processing).await;
                }
                Ok(Response::Complete) => {
                    info!("simulation complete, stopping booth");
                    report.exit = BoothExit::Complete;
                    break;
                }
                Ok(Response::Failure { message }) => {
                    debug!(%message, "request failed");

                    if self.registration.is_entry {
                        consecutive_failures += 1;
                        report.failures += 1;

                        if consecutive_failures >= self.options.max_failures {
                            warn!(consecutive_failures, "too many failures, shutting down");
                            report.exit = BoothExit::GaveUp;
                            break;
                        }

                        let wait = 0.5 * f64::from(consecutive_failures);
                        sleep(Duration::from_secs_f64(wait.min(5.0))).await;
                    } else {
                        self.pause(self.options.processing).await;
                    }
                }
                Err(e) if e.is_connection_failure() => {
                    warn!(err = ?e, "connection lost, reconnecting");
                    report.reconnects += 1;

                    socket = match self.connect(&mut report).await {
                        Ok(socket) => socket,
                        Err(exit) => {
                            report.exit = exit;
                            break;
                        }
                    };
                }
                Err(e) => {
                    warn!(err = ?e, "request failed");
                    report.failures += 1;
                    consecutive_failures += 1;

                    let exhausted = consecutive_failures >= self.options.max_failures;
                    if self.registration.is_entry && exhausted {
                        report.exit = BoothExit::GaveUp;
                        break;
                    }
                }
            }
        }

        if let Err(e) = socket.close().await {
            debug!(err = ?e, "error closing booth connection");
        }

        report
    }

    /// Connects and registers, retrying connection failures with exponential backoff.
    async fn connect(&self, report: &mut BoothReport) -> Result<BoothSocket, BoothExit> {
        let options = &self.options.booth;
        let mut backoff = ExponentialBackoff::from(options);

        loop {
            match BoothSocket::connect_with_options(self.addr, self.registration, options.clone())
                .await
            {
                Ok(socket) => {
                    debug!(peer = %socket.peer_addr(), "booth registered");
                    return Ok(socket);
                }
                Err(BoothError::Rejected(reason)) => {
                    error!(%reason, "registration rejected");
                    return Err(BoothExit::Rejected);
                }
                Err(e) => {
                    report.failures += 1;

                    match backoff.next().await {
                        Some(waited) => {
                            debug!(err = ?e, ?waited, attempt = backoff.retry_count(), "retrying");
                        }
                        None => {
                            error!(err = ?e, "giving up on plaza");
                            return Err(BoothExit::Unreachable);
                        }
                    }
                }
            }
        }
    }

    async fn pause(&mut self, (low, high): (Duration, Duration)) {
        let secs = self.rng.uniform(low.as_secs_f64(), high.as_secs_f64());
        sleep(Duration::from_secs_f64(secs.max(0.0))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisions_entry_booths_first() {
        let network = Network::new(3).unwrap().with_plaza_points(vec![0, 2]).unwrap();
        let sim = Simulation::new(
            "127.0.0.1:0".parse().unwrap(),
            SimulationOptions::default().network(network),
        );

        let regs = sim.registrations();
        assert_eq!(regs.len(), 6 + 4 + 6);

        let at_zero: Vec<_> = regs.iter().filter(|r| r.point == 0).collect();
        assert!(at_zero[..3].iter().all(|r| r.is_entry));
        assert!(at_zero[3..].iter().all(|r| !r.is_entry));
        assert_eq!(at_zero.iter().map(|r| r.booth_id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);

        let at_one: Vec<_> = regs.iter().filter(|r| r.point == 1).collect();
        assert_eq!(at_one.iter().filter(|r| r.is_entry).count(), 2);
    }
}
