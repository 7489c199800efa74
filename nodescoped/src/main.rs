//! `nodescoped`: the node-local daemon that publishes this node's hardware
//! topology and arbitrates cpu binding on behalf of every attached client.
//!
//! No CLI framework; flags are parsed by hand the way `aquatic`'s binaries
//! do. One process per node, one session directory per `tmpdir`, one
//! `nodescoped.<port>` marker enforcing a single writer per port.

mod config;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use config::{CliOverrides, DaemonConfig};
use nodescope_hwloc::Oracle;
use nodescope_rmi::Server;

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new().init()?;

    let cli = CliOverrides::parse(std::env::args().skip(1))?;
    let config_path = cli.config_path.clone();
    let config = DaemonConfig::load(config_path.as_deref(), cli)?;

    std::fs::create_dir_all(&config.tmpdir)?;

    if !config.no_daemonize {
        daemonize()?;
    }

    let oracle = Oracle::load()?;
    let hwtopo_path = config.hwtopo_path(std::process::id());
    oracle.export_topology_xml(&hwtopo_path)?;
    info!("exported topology to {}", hwtopo_path.display());

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut server = Server::bind(config.port, hwtopo_path.clone(), shutdown.clone())?;
    let port = server.local_port()?;

    let marker_path = config.port_marker_path(port);
    let _marker = claim_port_marker(&marker_path)?;
    info!("nodescoped listening on 127.0.0.1:{port}, session dir {}", config.tmpdir.display());

    install_signal_handlers(shutdown.clone())?;

    let run_result = server.run();

    let _ = std::fs::remove_file(&marker_path);
    let _ = std::fs::remove_file(&hwtopo_path);

    run_result.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    info!("nodescoped shut down cleanly");
    Ok(())
}

/// Creates `<tmpdir>/nodescoped.<port>` with `O_EXCL` semantics: a second
/// daemon racing for the same port fails to claim it instead of silently
/// coexisting.
fn claim_port_marker(path: &PathBuf) -> anyhow::Result<std::fs::File> {
    OpenOptions::new().write(true).create_new(true).open(path).map_err(|e| {
        anyhow::anyhow!("port marker {} already exists (another nodescoped running?): {e}", path.display())
    })
}

/// Detaches from the controlling terminal with the classic double-fork:
/// the parent exits once the first child has called `setsid`, leaving the
/// daemon session-leaderless and re-parented to init.
fn daemonize() -> anyhow::Result<()> {
    unsafe {
        match libc::fork() {
            n if n < 0 => anyhow::bail!("fork() failed"),
            0 => {}
            _ => std::process::exit(0),
        }
        if libc::setsid() < 0 {
            anyhow::bail!("setsid() failed");
        }
        match libc::fork() {
            n if n < 0 => anyhow::bail!("fork() failed"),
            0 => {}
            _ => std::process::exit(0),
        }
        libc::close(0);
        libc::close(1);
        libc::close(2);
    }
    Ok(())
}

fn install_signal_handlers(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    for sig in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT, signal_hook::consts::SIGHUP] {
        signal_hook::flag::register(sig, shutdown.clone())?;
    }
    warn!("listening for SIGTERM/SIGINT/SIGHUP to request a clean shutdown");
    Ok(())
}
