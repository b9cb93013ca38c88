//! # Server Query Service
//!
//! Finds game servers through a directory and queries each of them with
//! bounded concurrency, collecting the answers into one JSON report.
//!
//! ## Module Organization
//!
//! ### Scheduler Module (`scheduler`)
//! [`BatchScheduler`] runs a handler over batches of items:
//! - at most `max_tasks` handlers run at once, the rest wait in a backlog
//! - `submit` returns once the coordinator has accepted the whole batch
//! - `drain` finishes everything accepted, `abandon` drops the backlog
//!   and lets in-flight handlers finish on their own
//!
//! ### Discovery Module (`discovery`)
//! The [`Discovery`] trait and its two backends, the Steam Web API and
//! the rate-limited UDP master server.
//!
//! ### Pipeline Module (`pipeline`)
//! [`QueryPipeline`] feeds discovered batches into the scheduler while
//! discovery is still running, then collects one result per server.
//!
//! ### Report Module (`report`)
//! Result records and the `{"data": [...], "total": n}` document.
//!
//! ### Config Module (`config`)
//! Command line arguments of the `mastersteam` binary.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use service::discovery::{Filter, MasterServerDiscovery, DEFAULT_MASTER_SERVER};
//! use service::pipeline::{PipelineConfig, QueryPipeline};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let discovery = MasterServerDiscovery::new(DEFAULT_MASTER_SERVER, Duration::from_secs(3));
//!     let pipeline = QueryPipeline::new(PipelineConfig::default());
//!
//!     let report = pipeline.run(&discovery, &Filter::new().app_id(440)).await?;
//!     println!("{}", report.to_json(true)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod pipeline;
pub mod report;
pub mod scheduler;

pub use discovery::{Discovery, DiscoveryError, Filter};
pub use pipeline::{PipelineConfig, QueryPipeline};
pub use report::{QueryResult, Report};
pub use scheduler::{BacklogOrder, BatchScheduler, SubmitError};
