//! The splitting engine (C8).
//!
//! [`map`] holds the pure member-to-resource mapping algorithms; [`hwsplit`]
//! orchestrates them against a real [`nodescope_hwloc::Oracle`] and
//! [`nodescope_hwloc::HwPool`] to produce child pools and colors.

pub mod hwsplit;
pub mod map;

pub use hwsplit::{split, AutoColor, SplitMember, SplitResult};
