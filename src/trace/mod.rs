//! Provenance — BLAKE3 output hashing and the append-only run log.

pub mod eventlog;
pub mod hasher;
