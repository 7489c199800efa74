use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nodescope_common::{ObjType, Result};
use nodescope_group::PthreadGroup;
use nodescope_hwloc::Oracle;
use nodescope_rmi::{Client, Server};
use nodescope_scope::Scope;

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

/// Scenario 2: a two-way split by alternating color over a two-member team
/// partitions the parent's cpuset into disjoint halves whose union is the
/// whole parent cpuset.
#[test]
fn two_way_split_partitions_the_parent_cpuset() {
    let (port, shutdown) = run_daemon();
    let oracle = Oracle::load().expect("oracle should load");
    let parent_cpuset = oracle.topology_cpuset();
    if parent_cpuset.len() < 2 {
        shutdown.store(true, Ordering::SeqCst);
        return;
    }

    let team = PthreadGroup::new_team(2);
    let handles: Vec<_> = team
        .into_iter()
        .enumerate()
        .map(|(i, group)| {
            std::thread::spawn(move || -> Result<_> {
                let oracle = Oracle::load()?;
                let client = Client::attach(Some(port))?;
                let mut scope = Scope::create(&oracle, client, port, group, oracle.topology_cpuset())?;
                let child = scope.split_at(&oracle, 2, ObjType::Last, i as i32)?;
                Ok(child.pool().cpuset().clone())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
    assert!(!results[0].intersects(&results[1]));
    assert_eq!(results[0].union(&results[1]), parent_cpuset);

    shutdown.store(true, Ordering::SeqCst);
}
