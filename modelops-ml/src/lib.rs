//! # modelops-ml: datasets, training, gating and registry workflows
//!
//! The pieces behind each `modelops` subcommand:
//!
//! - **data**: CSV loading, schema inference and the dataset contract check
//! - **training**: seeded split, closed-form one-feature estimators, metrics
//!   files and candidate registration
//! - **gate**: the CI threshold check on `metrics.txt`
//! - **tracking**: the MLflow REST client and an in-memory stand-in
//! - **registry**: best-run promotion and alias/stage model resolution

pub mod error;

// Local data and training
pub mod data;
pub mod gate;
pub mod training;

// Tracking server and registry
pub mod registry;
pub mod tracking;

pub use error::MlError;
pub use gate::{GateError, GateOutcome, run_gate};
pub use tracking::{InMemoryTracking, MlflowClient, TrackingClient, TrackingError};
