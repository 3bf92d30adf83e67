pub mod config;
pub mod dates;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod price;
pub mod service;
pub mod sources;
pub mod store;

pub use model::{AdRecord, CandidateRef, Query, Site};
pub use pipeline::{run_aggregation, Aggregator, RunOutput};
