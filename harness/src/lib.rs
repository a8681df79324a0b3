//! Backend-agnostic storage benchmark: synthetic workload, query suite, runner and the
//! HTTP surface that each backend binary serves.

pub mod benchmark;
pub mod config;
pub mod error;
pub mod generator;
pub mod memory;
pub mod models;
pub mod predicate;
pub mod queries;
pub mod server;
pub mod stats;
pub mod storage;

pub use benchmark::{ BenchmarkRunner, FullBenchmarkParams, StressBenchmarkParams };
pub use error::HarnessError;
pub use storage::StorageAdapter;
