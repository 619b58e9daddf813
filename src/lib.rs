//! fleet_watch Library
//!
//! Cold-chain fleet monitoring: watches shipment telemetry, decides which trucks are offline,
//! raises sensor and connection alerts, delivers them by e-mail and exports trip reports.
//!
//! ## Architecture
//!
//! - `config`: paths under `~/.fleet-watch/` and `Settings` from `config.toml`
//! - `logging`: tracing setup (stderr + log file)
//! - `telemetry`: vehicle documents, snapshots and snapshot sources (file, Firestore)
//! - `liveness`: the shared offline threshold and per-vehicle transitions
//! - `alerts`: rules, notification center, channels, delivery queue and dispatcher
//! - `monitor`: the watch loop tying the above together
//! - `store`: persisted session, language, recipient and sent-alert ids
//! - `trips`: trip history and CSV reports
//! - `translate`: static UI strings and cached machine translation
//! - `cli`: subcommands used by the binary

pub mod alerts;
pub mod cli;
pub mod config;
pub mod liveness;
pub mod logging;
pub mod monitor;
pub mod store;
pub mod telemetry;
pub mod translate;
pub mod trips;

pub use logging::init_tracing;
