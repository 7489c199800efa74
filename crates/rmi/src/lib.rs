//! C9: the client/server resource management and inquiry (RMI) protocol.
//!
//! A single daemon process owns the authoritative [`nodescope_hwloc::Oracle`]
//! and [`nodescope_hwloc::HwPool`] for a node; every task attaches to it over
//! a loopback TCP connection framed by [`proto`].

mod client;
mod proto;
mod server;

pub use client::Client;
pub use proto::FunctionId;
pub use server::Server;
