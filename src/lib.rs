//! In-process request profiler.
//!
//! [`AccessProf`] collects one [`Observation`] per finished request (usually
//! through the [`record_requests`] middleware), optionally spills them to an
//! append-only log file, and aggregates everything into a [`Report`] grouped
//! by method, path (or path pattern) and status.
//!
//! ```ignore
//! let prof = AccessProf::new(ProfilerConfig::with_log_file("access.ltsv"));
//! let app = accessprof::instrument(app, prof.clone())
//!     .nest("/accessprof", accessprof::report_router(prof.clone()));
//!
//! let patterns = AggregationPatterns::compile([r"/users/\d+"])?;
//! println!("{}", prof.report(&patterns)?);
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;

pub use config::{FlushFailurePolicy, ProfilerConfig, DEFAULT_FLUSH_THRESHOLD};
pub use error::{DecodeError, Error, Result};
pub use metrics::{
    AccessProf, AggregationPatterns, Observation, PercentileSet, Report, ReportSummary, Segment,
    SegmentSummary,
};
pub use middleware::record_requests;
pub use server::{instrument, report_router};
