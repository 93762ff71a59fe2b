#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_arguments,
    clippy::similar_names
)]

//! # arenaplane
//!
//! A distributed matchmaking and session-placement control plane for a real-time game
//! service. Five cooperating role types — gateway, matchmaker, session runner, reaper,
//! capacity provider — communicate only through a shared coordination store; no role
//! calls another directly.

/// Watches demand and provisions/decommissions session runners.
pub mod capacity;

/// Layered configuration: compiled-in defaults, config file, environment overrides.
pub mod config;

/// Accepts player connections, tracks identity, forwards lifecycle events.
pub mod gateway;

/// Stable session-runner identity derivation.
pub mod ids;

/// Structured logging configuration.
pub mod logging;

/// Advisory locking over the coordination store's set-if-absent-with-TTL primitive.
pub mod locks;

/// Continuously forms fixed-size batches of ready players and places them on sessions.
pub mod matchmaker;

/// In-process counters for each role.
pub mod metrics;

/// Shared domain types: identifiers, state enums, store-backed records, wire protocol.
pub mod model;

/// Background sweeper of stale player records and stale queue entries.
pub mod reaper;

/// Retry logic utilities.
pub mod retry;

/// Owns one or more concurrent game slots; detects game end, finalizes and releases.
pub mod session_runner;

/// The coordination store: the single shared resource every role talks to.
pub mod store;
