use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nodescope_common::{IntrinsicScope, ObjType};
use nodescope_rmi::{Client, Server};

fn run_daemon(port: u16, shutdown: Arc<AtomicBool>) -> u16 {
    let mut server = Server::bind(port, PathBuf::from("/tmp/nodescope-test-hwtopo.xml"), shutdown)
        .expect("server should bind to loopback");
    let bound_port = server.local_port().expect("server should report its bound port");
    std::thread::spawn(move || {
        server.run().expect("server loop should exit cleanly");
    });
    std::thread::sleep(Duration::from_millis(100));
    bound_port
}

#[test]
fn hello_handshake_reports_hwtopo_path() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = run_daemon(0, shutdown.clone());

    let client = Client::attach(Some(port)).expect("client should attach to the daemon");
    assert_eq!(client.hwtopo_path, "/tmp/nodescope-test-hwtopo.xml");

    shutdown.store(true, Ordering::SeqCst);
}

#[test]
fn get_and_set_cpubind_round_trip() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = run_daemon(0, shutdown.clone());
    let mut client = Client::attach(Some(port)).expect("client should attach");

    let tid = unsafe { libc::pthread_self() } as u64;
    let original = client.get_cpubind(tid).expect("get_cpubind should succeed");
    assert!(!original.is_empty());

    client
        .set_cpubind(tid, &original)
        .expect("rebinding to the current cpuset should succeed");

    shutdown.store(true, Ordering::SeqCst);
}

#[test]
fn intrinsic_hwpool_spans_the_whole_topology() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = run_daemon(0, shutdown.clone());
    let mut client = Client::attach(Some(port)).expect("client should attach");

    let cpuset = client
        .intrinsic_hwpool_cpuset(IntrinsicScope::User, &[])
        .expect("intrinsic pool query should succeed");
    let npus = client
        .nobjs_in_cpuset(ObjType::Pu, &cpuset)
        .expect("nobjs_in_cpuset should succeed");
    assert_eq!(npus, cpuset.len());

    shutdown.store(true, Ordering::SeqCst);
}

#[test]
fn intrinsic_hwpool_process_scope_matches_current_cpubind() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = run_daemon(0, shutdown.clone());
    let mut client = Client::attach(Some(port)).expect("client should attach");

    let tid = unsafe { libc::pthread_self() } as u64;
    let expected = client.get_cpubind(tid).expect("get_cpubind should succeed");
    let cpuset = client
        .intrinsic_hwpool_cpuset(IntrinsicScope::Process, &[tid])
        .expect("PROCESS intrinsic pool query should succeed");
    assert_eq!(cpuset, expected);

    shutdown.store(true, Ordering::SeqCst);
}

#[test]
fn intrinsic_hwpool_system_scope_is_not_supported() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = run_daemon(0, shutdown.clone());
    let mut client = Client::attach(Some(port)).expect("client should attach");

    let err = client
        .intrinsic_hwpool_cpuset(IntrinsicScope::System, &[])
        .expect_err("SYSTEM intrinsic scope should be rejected");
    assert_eq!(err.rc, nodescope_common::Rc::ErrNotSupported);

    shutdown.store(true, Ordering::SeqCst);
}

#[test]
fn shutdown_rpc_stops_the_server_loop() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let port = run_daemon(0, shutdown.clone());
    let mut client = Client::attach(Some(port)).expect("client should attach");

    client.shutdown().expect("shutdown RPC should be acknowledged");
    std::thread::sleep(Duration::from_millis(100));
    assert!(shutdown.load(Ordering::SeqCst));
}
