//! Runs a toll plaza, or a fleet of simulated booths against one.
//!
//! ```bash
//! tollplaza serve --addr 0.0.0.0:31214 --log-file transactions.jsonl
//! tollplaza simulate --addr 127.0.0.1:31214 --max-vehicles 30
//! ```

use std::{error::Error, path::PathBuf, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use tokio::{net::lookup_host, signal::ctrl_c};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use toll::{
    summary, JsonlSink, Ledger, LedgerOptions, Network, PlazaOptions, PlazaSocket, Simulation,
    SimulationOptions, Sinks, StdRandom, Tariff, TracingSink, TravelTimeModel,
};

#[derive(Parser, Debug)]
#[command(name = "tollplaza", version)]
#[command(about = "Coordination server and booth simulator for a highway toll network")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the plaza server.
    Serve(ServeArgs),
    /// Connect one simulated booth per provisioned booth to a running plaza.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct NetworkArgs {
    /// Number of entry/exit points on the highway.
    #[arg(long, default_value_t = 18)]
    points: u32,
    #[arg(long, default_value_t = 6)]
    booths_per_plaza: u32,
    #[arg(long, default_value_t = 4)]
    booths_per_regular: u32,
}

impl NetworkArgs {
    fn build(&self) -> Result<Network, Box<dyn Error>> {
        Ok(Network::new(self.points)?.with_booths(self.booths_per_plaza, self.booths_per_regular)?)
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "0.0.0.0:31214")]
    addr: String,
    #[command(flatten)]
    network: NetworkArgs,
    /// Toll charged per unit of distance.
    #[arg(long, default_value_t = 2.0)]
    rate: f64,
    /// Simulated travel time per unit of distance, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    base_delay_ms: u64,
    /// Stop admitting vehicles after this many entries.
    #[arg(long)]
    max_vehicles: Option<u64>,
    /// Append every transaction to this file as JSON lines.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Seconds between statistics summaries. 0 disables them.
    #[arg(long, default_value_t = 10)]
    stats_interval_secs: u64,
    /// Seed for dwell times and exit selection.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[arg(long, default_value = "127.0.0.1:31214")]
    addr: String,
    #[command(flatten)]
    network: NetworkArgs,
    /// Vehicles to generate across all entry booths.
    #[arg(long, default_value_t = 30)]
    max_vehicles: usize,
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Simulate(args) => simulate(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error>> {
    let travel =
        TravelTimeModel::default().with_base_delay(Duration::from_millis(args.base_delay_ms));
    let mut options = LedgerOptions::default()
        .network(args.network.build()?)
        .tariff(Tariff::new(args.rate)?)
        .travel(travel);

    if let Some(max_vehicles) = args.max_vehicles {
        options = options.max_vehicles(max_vehicles);
    }

    let ledger = match args.seed {
        Some(seed) => Ledger::with_random(options, StdRandom::seeded(seed)),
        None => Ledger::new(options),
    };

    let mut sinks = Sinks::new().with(TracingSink);
    let mut log = None;

    if let Some(path) = &args.log_file {
        let sink = Arc::new(JsonlSink::open(path).await?);
        sinks.push(Arc::clone(&sink));
        log = Some(sink);
    }

    let plaza_options =
        PlazaOptions::default().stats_interval(Duration::from_secs(args.stats_interval_secs));
    let mut plaza = PlazaSocket::with_options(ledger, plaza_options).with_sink(sinks);

    plaza.bind(args.addr.as_str()).await?;
    info!(addr = ?plaza.local_addr(), "plaza listening");

    ctrl_c().await?;
    info!("shutting down");
    plaza.shutdown().await;

    info!("{}", summary(&plaza.ledger().stats(), plaza.stats()));

    if let Some(log) = log {
        log.flush().await?;
        if log.dropped() > 0 {
            warn!(dropped = log.dropped(), path = ?log.path(), "transaction log is incomplete");
        }
    }

    Ok(())
}

async fn simulate(args: SimulateArgs) -> Result<(), Box<dyn Error>> {
    let addr = lookup_host(args.addr.as_str())
        .await?
        .next()
        .ok_or_else(|| format!("no address found for {}", args.addr))?;

    let mut options =
        SimulationOptions::default().network(args.network.build()?).max_vehicles(args.max_vehicles);
    if let Some(seed) = args.seed {
        options = options.seed(seed);
    }

    let simulation = Simulation::new(addr, options);
    info!(booths = simulation.registrations().len(), %addr, "starting simulation");

    tokio::select! {
        report = simulation.run() => {
            info!(
                entries = report.entries(),
                exits = report.exits(),
                failures = report.failures(),
                rejected = report.rejected(),
                fees = %format!("${:.2}", report.fees()),
                "simulation report"
            );
        }
        _ = ctrl_c() => info!("simulation interrupted"),
    }

    Ok(())
}
