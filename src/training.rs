//! Training job: read the cleaned table, cross-validate the pipeline grid,
//! evaluate per category on a held-out split, and persist the versioned
//! model artifact.

pub mod data;
pub mod metrics;
pub mod trainer;

pub use trainer::run_training;
