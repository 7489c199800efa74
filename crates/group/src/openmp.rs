//! OpenMP-style group: a statically-sized thread team.
//!
//! There is no OpenMP runtime in this workspace — Rust has no standard
//! equivalent of `#pragma omp parallel` — so this backend models the team a
//! `#pragma omp parallel` region would have created: its size is known up
//! front (unlike the pthread backend, which grows by incremental
//! `pthread_create`), so there is no TID-registration phase. Everything
//! past team construction is identical to [`crate::PthreadGroup`], so this
//! module just renames it at the type level to keep the C6 backend count at
//! four, matching spec.md.

pub use crate::pthread::PthreadGroup as OpenmpGroup;
