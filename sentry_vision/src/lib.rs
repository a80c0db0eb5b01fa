// THEORY:
// This file is the entry point for the `sentry_vision` library crate. It exposes the
// pieces the service binary wires together: the supervisor and its camera workers,
// the analysis layer (`pipeline`, `scheduler`, `core_modules`), and the collaborator
// seams (`stream`, `inventory`, `classifier`, `persistence`).
//
// The collaborator seams are traits so the service can run against real cameras
// and files while the tests run the very same workers against scripted streams
// and in-memory sinks.

pub mod classifier;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod scheduler;
pub mod stream;
pub mod supervisor;
pub mod worker;
