//! Shared primitives for the dmkit statistical modeling crates.
//!
//! `dmkit-core` provides the foundation the other dmkit crates build on:
//!
//! - **Error types**: [`DmError`] and [`Result`] for structured error handling
//! - **Traits**: [`Summarizable`] and [`Named`]
//! - **Samples**: [`Sample`], the weighted view over dataset rows
//! - **Datasets**: typed columns with uniform `Option` missingness, pair
//!   matrices, and the column factories used to publish fitted results

pub mod dataset;
pub mod error;
pub mod sample;
pub mod traits;

pub use dataset::{
    BoolColumn, Column, Dataset, IntColumn, NominalColumn, PairMatrix, RealColumn, RealKind,
};
pub use error::{DmError, Result};
pub use sample::{Sample, SampleIter};
pub use traits::*;
