//! Disaster-response message triage worker.
//!
//! Two batch jobs share this library: `process_data` cleans the raw message
//! and category CSVs into a SQLite table, and `train_classifier` fits a
//! multi-label TF-IDF + gradient-boosted-tree pipeline against that table
//! and writes a versioned model artifact.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod etl;
pub mod model;
pub mod observability;
pub mod store;
pub mod training;
