use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nodescope_rmi::{Client, Server};
use nodescope_scope::BindStack;

fn run_daemon() -> (u16, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut server = Server::bind(0, PathBuf::from("/tmp/nodescope-test-hwtopo.xml"), shutdown.clone())
        .expect("server should bind to loopback");
    let port = server.local_port().expect("server should report its bound port");
    std::thread::spawn(move || {
        server.run().expect("server loop should exit cleanly");
    });
    std::thread::sleep(Duration::from_millis(100));
    (port, shutdown)
}

#[test]
fn push_then_pop_restores_the_original_binding() {
    let (port, shutdown) = run_daemon();
    let client = Client::attach(Some(port)).expect("client should attach");
    let mut stack = BindStack::attach(client).expect("bind stack should attach");

    let original = stack.top();
    assert_eq!(stack.depth(), 1);

    let mut narrowed = original.clone();
    if let Some(first) = narrowed.iter().next().copied() {
        narrowed = nodescope_common::Cpuset::from_pus(std::iter::once(first));
    }
    stack.push(narrowed.clone()).expect("push should apply the narrower cpuset");
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.top(), narrowed);

    stack.pop().expect("pop should restore the prior binding");
    assert_eq!(stack.depth(), 1);
    assert_eq!(stack.top(), original);

    shutdown.store(true, Ordering::SeqCst);
}

#[test]
fn popping_the_base_binding_is_rejected() {
    let (port, shutdown) = run_daemon();
    let client = Client::attach(Some(port)).expect("client should attach");
    let mut stack = BindStack::attach(client).expect("bind stack should attach");

    assert!(stack.pop().is_err());
    assert_eq!(stack.depth(), 1);

    shutdown.store(true, Ordering::SeqCst);
}
