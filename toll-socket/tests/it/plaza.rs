use futures::{SinkExt, StreamExt};
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tokio_util::codec::Framed;

use toll_ledger::{EventAction, EventOrigin, VehicleStatus};
use toll_socket::{BoothError, BoothSocket, MemorySink};
use toll_wire::{BoothCodec, Frame, Registration, Response};

use crate::{eventually, ledger_options, plaza, BASE_DELAY};

fn entry(point: u32, booth_id: u32) -> Registration {
    Registration { booth_id, point, is_entry: true }
}

fn exit(point: u32, booth_id: u32) -> Registration {
    Registration { booth_id, point, is_entry: false }
}

#[tokio::test]
async fn vehicle_travels_and_pays() {
    let sink = MemorySink::new();
    let plaza = plaza(ledger_options(), sink.clone()).await;
    let addr = plaza.local_addr().unwrap();

    let mut entry_booth = BoothSocket::connect(addr, entry(0, 1)).await.unwrap();
    let mut exit_booth = BoothSocket::connect(addr, exit(5, 1)).await.unwrap();

    let response = entry_booth.enter(Some("CAR001")).await.unwrap();
    let outcome = response.outcome().unwrap();
    assert_eq!(outcome.vehicle_id.as_deref(), Some("CAR001"));
    assert_eq!(outcome.entry_point, Some(0));

    // Still inside its minimum travel time.
    let response = exit_booth.exit().await.unwrap();
    assert!(matches!(response, Response::Failure { .. }), "{response:?}");
    assert_eq!(plaza.ledger().vehicle_status("CAR001"), VehicleStatus::OnHighway);

    let max_dwell = plaza.ledger().options().travel.max_dwell(0, 5);
    tokio::time::sleep(max_dwell + BASE_DELAY).await;

    let response = exit_booth.exit().await.unwrap();
    let outcome = response.outcome().unwrap();
    assert_eq!(outcome.vehicle_id.as_deref(), Some("CAR001"));
    assert_eq!(outcome.entry_point, Some(0));
    assert_eq!(outcome.exit_point, Some(5));
    assert_eq!(outcome.toll_fee, Some(10.0));
    assert!(outcome.travel_time.unwrap() > 0.0);

    let stats = plaza.ledger().stats();
    assert_eq!(stats.on_highway, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.total_fees_collected, 10.0);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, EventAction::Entry);
    assert_eq!(events[1].action, EventAction::Exit);
    assert_eq!(events[1].booth_id, EventOrigin::Booth(1));
    assert_eq!(events[1].toll_fee, Some(10.0));
}

#[tokio::test]
async fn rejects_reentry_and_completed_vehicles() {
    let plaza = plaza(ledger_options(), MemorySink::new()).await;
    let addr = plaza.local_addr().unwrap();

    let mut first = BoothSocket::connect(addr, entry(0, 1)).await.unwrap();
    let mut second = BoothSocket::connect(addr, entry(3, 1)).await.unwrap();
    let mut exit_booth = BoothSocket::connect(addr, exit(1, 3)).await.unwrap();

    assert!(first.enter(Some("SUV123")).await.unwrap().is_success());

    let response = second.enter(Some("SUV123")).await.unwrap();
    assert_eq!(response, Response::failure("Vehicle SUV123 is already on the highway"));

    let max_dwell = plaza.ledger().options().travel.max_dwell(0, 1);
    tokio::time::sleep(max_dwell + BASE_DELAY).await;
    assert!(exit_booth.exit().await.unwrap().is_success());

    let response = second.enter(Some("SUV123")).await.unwrap();
    assert_eq!(response, Response::failure("Vehicle SUV123 has already completed its journey"));

    let response = second.enter(Some("")).await.unwrap();
    assert!(matches!(response, Response::Failure { .. }));
}

#[tokio::test]
async fn direction_and_identity_mismatches_fail() {
    let plaza = plaza(ledger_options(), MemorySink::new()).await;
    let addr = plaza.local_addr().unwrap();

    let mut exit_booth = BoothSocket::connect(addr, exit(4, 3)).await.unwrap();

    let response = exit_booth
        .request(toll_wire::Request::Entry {
            booth_id: 3,
            point: 4,
            vehicle_id: Some("VAN007".into()),
        })
        .await
        .unwrap();
    assert!(matches!(response, Response::Failure { .. }), "{response:?}");

    let response =
        exit_booth.request(toll_wire::Request::Exit { booth_id: 2, point: 4 }).await.unwrap();
    assert!(matches!(response, Response::Failure { .. }), "{response:?}");

    // The connection survives both failures.
    let response = exit_booth.exit().await.unwrap();
    assert_eq!(response, Response::failure("No eligible vehicle for exit at point 4"));
    assert_eq!(plaza.ledger().stats().on_highway, 0);
    assert_eq!(plaza.stats().failed_requests(), 2);
}

#[tokio::test]
async fn malformed_request_keeps_connection() {
    let plaza = plaza(ledger_options(), MemorySink::new()).await;
    let addr = plaza.local_addr().unwrap();

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut conn = Framed::new(stream, BoothCodec::new());

    conn.send(entry(0, 2)).await.unwrap();
    let ack = conn.next().await.unwrap().unwrap();
    assert!(matches!(ack, Frame::Message(Response::Success(_))));

    conn.get_mut().write_all(b"{not json}\n").await.unwrap();
    let Frame::Message(response) = conn.next().await.unwrap().unwrap() else {
        panic!("expected a response");
    };
    assert!(matches!(response, Response::Failure { .. }), "{response:?}");

    conn.send(serde_json::json!({
        "action": "entry",
        "booth_id": 2,
        "point": 0,
        "vehicle_id": "BUS999"
    }))
    .await
    .unwrap();
    let Frame::Message(response) = conn.next().await.unwrap().unwrap() else {
        panic!("expected a response");
    };
    assert!(response.is_success(), "{response:?}");
    assert_eq!(plaza.ledger().vehicle_status("BUS999"), VehicleStatus::OnHighway);

    // A missing vehicle id is a bad request, not the end of the booth's vehicles.
    conn.send(serde_json::json!({ "action": "entry", "booth_id": 2, "point": 0 })).await.unwrap();
    let Frame::Message(response) = conn.next().await.unwrap().unwrap() else {
        panic!("expected a response");
    };
    assert!(
        matches!(&response, Response::Failure { message } if message.contains("vehicle_id")),
        "{response:?}"
    );

    conn.send(serde_json::json!({
        "action": "entry",
        "booth_id": 2,
        "point": 0,
        "vehicle_id": "BUS998"
    }))
    .await
    .unwrap();
    let Frame::Message(response) = conn.next().await.unwrap().unwrap() else {
        panic!("expected a response");
    };
    assert!(response.is_success(), "{response:?}");
}

#[tokio::test]
async fn invalid_and_duplicate_registrations_are_rejected() {
    let plaza = plaza(ledger_options(), MemorySink::new()).await;
    let addr = plaza.local_addr().unwrap();

    let err = BoothSocket::connect(addr, entry(18, 1)).await.err().unwrap();
    assert!(
        matches!(err, BoothError::Rejected(ref m) if m.contains("between 0 and 17")),
        "{err:?}"
    );

    let err = BoothSocket::connect(addr, exit(3, 5)).await.err().unwrap();
    assert!(matches!(err, BoothError::Rejected(_)), "{err:?}");

    let mut original = BoothSocket::connect(addr, entry(2, 1)).await.unwrap();
    assert!(original.enter(Some("TRUCK042")).await.unwrap().is_success());

    let err = BoothSocket::connect(addr, entry(2, 1)).await.err().unwrap();
    assert!(matches!(err, BoothError::Rejected(_)), "{err:?}");

    // The rejected duplicate must not tear down the original's vehicles.
    assert_eq!(plaza.ledger().vehicle_status("TRUCK042"), VehicleStatus::OnHighway);
    assert!(original.enter(Some("TRUCK043")).await.unwrap().is_success());

    // Same booth id in the other direction is a different booth.
    BoothSocket::connect(addr, exit(2, 1)).await.unwrap();

    let stats = plaza.stats();
    eventually(|| stats.rejected_registrations() == 3).await;
    assert_eq!(stats.registrations(), 2);
}

#[tokio::test]
async fn disconnected_entry_booth_forces_exits() {
    let sink = MemorySink::new();
    let plaza = plaza(ledger_options(), sink.clone()).await;
    let addr = plaza.local_addr().unwrap();

    let mut leaving = BoothSocket::connect(addr, entry(3, 1)).await.unwrap();
    let mut staying = BoothSocket::connect(addr, entry(0, 1)).await.unwrap();

    assert!(leaving.enter(Some("CAR100")).await.unwrap().is_success());
    assert!(leaving.enter(Some("CAR101")).await.unwrap().is_success());
    assert!(staying.enter(Some("CAR200")).await.unwrap().is_success());
    assert!(staying.enter(Some("CAR201")).await.unwrap().is_success());

    leaving.close().await.unwrap();

    // Two entries from each booth, then the two forced exits.
    eventually(|| sink.len() == 6).await;
    let ledger = plaza.ledger();

    assert_eq!(ledger.vehicle_status("CAR100"), VehicleStatus::Completed);
    assert_eq!(ledger.vehicle_status("CAR101"), VehicleStatus::Completed);
    assert_eq!(ledger.vehicle_status("CAR200"), VehicleStatus::OnHighway);
    assert_eq!(ledger.stats().on_highway, 2);

    let forced: Vec<_> =
        sink.events().into_iter().filter(|e| e.action == EventAction::ForcedExit).collect();
    assert_eq!(forced.len(), 2);
    for event in &forced {
        assert_eq!(event.booth_id, EventOrigin::System);
        assert_eq!(event.entry_point, 3);
        let exit_point = event.exit_point.unwrap();
        assert!((4..=17).contains(&exit_point));
        assert_eq!(event.toll_fee, Some(f64::from(exit_point - 3) * 2.0));
    }

    assert_eq!(plaza.stats().forced_exits(), 2);
    eventually(|| ledger.stats().connected_entry_booths == 1).await;

    // The booth key is free again.
    BoothSocket::connect(addr, entry(3, 1)).await.unwrap();
}

#[tokio::test]
async fn signals_completion() {
    let plaza = plaza(ledger_options().max_vehicles(2), MemorySink::new()).await;
    let addr = plaza.local_addr().unwrap();

    let mut entry_booth = BoothSocket::connect(addr, entry(0, 1)).await.unwrap();
    let mut exit_booth = BoothSocket::connect(addr, exit(1, 3)).await.unwrap();

    assert_eq!(entry_booth.enter(None).await.unwrap(), Response::Complete);

    assert!(entry_booth.enter(Some("VAN001")).await.unwrap().is_success());
    assert!(entry_booth.enter(Some("VAN002")).await.unwrap().is_success());
    assert_eq!(entry_booth.enter(Some("VAN003")).await.unwrap(), Response::Complete);

    // Vehicles are still travelling, so exits are not complete yet.
    assert!(matches!(exit_booth.exit().await.unwrap(), Response::Failure { .. }));

    let max_dwell = plaza.ledger().options().travel.max_dwell(0, 1);
    tokio::time::sleep(max_dwell + BASE_DELAY).await;

    assert!(exit_booth.exit().await.unwrap().is_success());
    assert!(exit_booth.exit().await.unwrap().is_success());
    assert_eq!(exit_booth.exit().await.unwrap(), Response::Complete);
    assert!(plaza.ledger().is_complete());
}

#[tokio::test]
async fn shutdown_waits_for_forced_exits() {
    let sink = MemorySink::new();
    let mut plaza = plaza(ledger_options(), sink.clone()).await;
    let addr = plaza.local_addr().unwrap();

    let mut entry_booth = BoothSocket::connect(addr, entry(3, 1)).await.unwrap();
    let _exit_booth = BoothSocket::connect(addr, exit(5, 1)).await.unwrap();
    assert!(entry_booth.enter(Some("CAR100")).await.unwrap().is_success());

    plaza.shutdown().await;

    let ledger = plaza.ledger();
    assert_eq!(ledger.vehicle_status("CAR100"), VehicleStatus::Completed);

    let stats = ledger.stats();
    assert_eq!(stats.on_highway, 0);
    assert_eq!(stats.connected_entry_booths, 0);
    assert_eq!(stats.connected_exit_booths, 0);

    let forced: Vec<_> =
        sink.events().into_iter().filter(|e| e.action == EventAction::ForcedExit).collect();
    assert_eq!(forced.len(), 1);
    assert_eq!(forced[0].vehicle_id, "CAR100");
    assert_eq!(plaza.stats().forced_exits(), 1);
    assert_eq!(plaza.stats().active_sessions(), 0);

    // The booth's connection is gone.
    assert!(entry_booth.enter(Some("CAR101")).await.is_err());
}
