// =============================================================================
// transfermarkt_engine
// =============================================================================
//
// Fetch layer (limiter, pool, retries, breaker) at the bottom, per-page
// extractors in the middle, typed records with field-level degradation on
// top. The binary in main.rs is a thin shell over `extractors::Extractors`.
// =============================================================================

pub mod assembler;
pub mod circuit_breaker;
pub mod config;
pub mod emitter;
pub mod error;
pub mod extractors;
pub mod fetch;
pub mod html;
pub mod metrics;
pub mod models;
pub mod normalizers;
pub mod pool;
pub mod rate_limiter;
pub mod transport;

pub use assembler::Outcome;
pub use config::Config;
pub use error::FetchError;
pub use extractors::{Extractors, Job, JobResult, SearchKind};
pub use fetch::FetchClient;
