//! # Counters
//!
//! Time series of sampled hardware performance counters.
//!
//! Each monitored source (usually one CPU core) contributes a
//! [`CounterSeries`]: a time-ordered run of [`CounterSample`]s carrying
//! cumulative LLC load, LLC miss and retired instruction counts. A
//! [`CounterSet`] holds all sources of one analysis run.
//!
//! Series answer windowed range queries ([`CounterSeries::query`]) and expose
//! per-sample increments ([`CounterSeries::activity_in`]), which is what the
//! trace correlation works on.

pub mod metric;
pub mod sample;
pub mod series;
pub mod set;

pub use metric::*;
pub use sample::*;
pub use series::*;
pub use set::*;

use thiserror::Error;

/// Errors that can occur while building counter series
#[derive(Error, Debug, PartialEq)]
pub enum Error {
    /// A long-form record named a counter type this crate does not know
    #[error("unknown counter type: {0}")]
    UnknownCounterType(String),
}
