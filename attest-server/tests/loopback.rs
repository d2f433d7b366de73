//! Loopback tests: the real wire client against a real server, and the full
//! verifier on top of both.

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use attest::{KvStore, RunConfig, StoreError, Verdict, WorkloadConfig};
use attest_proto::{ErrorCode, KvConnection, Request, TcpConnector};
use attest_server::{FaultDelay, KvServer, MemoryStore};

fn spawn_server(store: MemoryStore) -> SocketAddr {
    let server = KvServer::bind("127.0.0.1:0", store).expect("bind loopback");
    let addr = server.local_addr().expect("local address");
    thread::spawn(move || {
        let _ = server.run();
    });
    addr
}

fn connect(addr: SocketAddr) -> KvConnection {
    KvConnection::connect(addr, Duration::from_secs(5)).expect("connect to loopback server")
}

#[test]
fn wire_set_get_delete_round_trip() {
    let addr = spawn_server(MemoryStore::new());
    let mut conn = connect(addr);

    conn.set("alpha", "1").expect("set succeeds");
    assert_eq!(conn.get("alpha").expect("get succeeds"), "1");

    conn.delete("alpha").expect("delete succeeds");
    match conn.get("alpha") {
        Err(StoreError::KeyNotFound { key }) => assert_eq!(key, "alpha"),
        other => panic!("expected key-not-found, got {:?}", other),
    }
}

#[test]
fn raw_protocol_reports_documented_error_codes() {
    let addr = spawn_server(MemoryStore::new());
    let mut conn = connect(addr);

    let missing = conn
        .call(&Request::Get {
            key: "nope".to_string(),
        })
        .expect("call completes");
    assert_eq!(missing.error, ErrorCode::KeyNotFound);
    assert_eq!(missing.error.code(), 1);
    assert!(missing.error_text.contains("nope"));
}

#[test]
fn connections_are_independent() {
    let addr = spawn_server(MemoryStore::new());
    let mut first = connect(addr);
    let mut second = connect(addr);

    first.set("shared", "x").expect("set succeeds");
    assert_eq!(second.get("shared").expect("get succeeds"), "x");
}

#[test]
fn verifier_passes_the_correct_server() {
    let addr = spawn_server(MemoryStore::new());
    let connector = TcpConnector::new(addr, Duration::from_secs(5));

    let config = RunConfig {
        workload: WorkloadConfig {
            workers: 4,
            max_ops: 300,
            send_window: Duration::from_secs(30),
            setup_timeout: Duration::from_secs(5),
            key: "test".to_string(),
            seed: Some(13),
        },
        fast_check: true,
        fast_check_key: "fastcheck".to_string(),
        program_timeout: Duration::from_secs(60),
    };

    let outcome = attest::verify(&connector, &config).expect("run must complete");
    assert!(!outcome.verdict.is_violation());
    assert_eq!(outcome.operations, 301);
}

#[test]
fn verifier_catches_the_faulty_server() {
    // Writes are acknowledged 20-80 ms before they land; the fast checker's
    // immediate read-back cannot observe them in time.
    let addr = spawn_server(MemoryStore::faulty(FaultDelay::from_millis(20, 80)));
    let connector = TcpConnector::new(addr, Duration::from_secs(5));

    let config = RunConfig {
        workload: WorkloadConfig {
            workers: 4,
            max_ops: 500,
            send_window: Duration::from_secs(30),
            setup_timeout: Duration::from_secs(10),
            key: "test".to_string(),
            seed: Some(17),
        },
        fast_check: true,
        fast_check_key: "fastcheck".to_string(),
        program_timeout: Duration::from_secs(60),
    };

    let outcome = attest::verify(&connector, &config).expect("run must complete");
    match outcome.verdict {
        Verdict::Inconsistent(_) => {}
        Verdict::Consistent(_) => panic!("faulty server slipped through"),
    }
}
