use std::time::Duration;

use tokio::net::TcpListener;

use toll_ledger::Network;
use toll_socket::{BoothExit, BoothOptions, BoothSocket, MemorySink, Simulation, SimulationOptions};
use toll_wire::{Registration, Response};

use crate::{ledger_options, plaza};

fn fast_options(network: Network) -> SimulationOptions {
    let ms = Duration::from_millis;

    SimulationOptions::default()
        .network(network)
        .entry_delay(ms(1), ms(5))
        .exit_poll(ms(1), ms(5))
        .processing(ms(0), ms(1))
        .drain_timeout(Duration::from_secs(5))
        .seed(42)
        .booth(BoothOptions::default().backoff(ms(1), ms(4)).retry_attempts(Some(3)))
}

#[tokio::test]
async fn booth_socket_reports_its_key() {
    let plaza = plaza(ledger_options(), MemorySink::new()).await;
    let registration = Registration { booth_id: 2, point: 7, is_entry: false };

    let mut booth = BoothSocket::connect(plaza.local_addr().unwrap(), registration).await.unwrap();

    assert_eq!(booth.registration(), registration);
    assert_eq!(booth.key().to_string(), "exit booth 2 @ point 7");
    assert_eq!(
        booth.exit().await.unwrap(),
        Response::failure("No eligible vehicle for exit at point 7")
    );
    assert!(plaza.ledger().is_connected(&booth.key()));
}

#[tokio::test]
async fn simulation_runs_to_completion() {
    let network = Network::new(3).unwrap();
    let plaza =
        plaza(ledger_options().network(network.clone()).max_vehicles(4), MemorySink::new()).await;

    let sim = Simulation::new(plaza.local_addr().unwrap(), fast_options(network).max_vehicles(4));
    assert_eq!(sim.registrations().len(), 16);

    let report = sim.run().await;

    assert_eq!(report.booths.len(), 16);
    assert_eq!(report.aborted, 0);
    assert_eq!(report.rejected(), 0);
    assert_eq!(report.entries(), 4);
    assert!(report.booths.iter().all(|b| b.exit == BoothExit::Complete), "{report:?}");

    let stats = plaza.ledger().stats();
    assert_eq!(stats.total_vehicles_entered, 4);
    assert_eq!(stats.on_highway, 0);
    assert_eq!(stats.completed, 4);
    assert!(plaza.ledger().is_complete());
}

#[tokio::test]
async fn simulation_gives_up_on_unreachable_plaza() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let report = Simulation::new(addr, fast_options(Network::new(1).unwrap())).run().await;

    assert_eq!(report.booths.len(), 6);
    assert!(report.booths.iter().all(|b| b.exit == BoothExit::Unreachable), "{report:?}");
    assert_eq!(report.entries(), 0);
}

#[tokio::test]
async fn rejected_booths_stop() {
    // A plaza with fewer booths than the simulation provisions.
    let network = Network::new(1).unwrap().with_booths(2, 2).unwrap();
    let plaza = plaza(ledger_options().network(network).max_vehicles(1), MemorySink::new()).await;

    let options = fast_options(Network::new(1).unwrap()).max_vehicles(1);
    let report = Simulation::new(plaza.local_addr().unwrap(), options).run().await;

    // Booths 3..=6 don't exist on the plaza's network.
    assert_eq!(report.rejected(), 4);
    assert_eq!(report.entries(), 1);
    assert_eq!(plaza.ledger().stats().total_vehicles_entered, 1);
}
