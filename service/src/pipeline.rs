//! Discovery, bounded querying and result collection wired together

use crate::discovery::{Discovery, DiscoveryError, Filter};
use crate::report::{QueryResult, Report, ServerRecord};
use crate::scheduler::{BacklogOrder, BatchScheduler};
use log::{debug, error, info, warn};
use query::{QueryError, ServerQuerier};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Deadline applied to every send and receive of a server query
    pub timeout: Duration,
    /// Maximum number of servers queried at once
    pub concurrency: usize,
    pub backlog_order: BacklogOrder,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            backlog_order: BacklogOrder::default(),
        }
    }
}

/// Accumulates results from concurrently running queries
#[derive(Clone)]
struct ResultSink {
    tx: mpsc::UnboundedSender<(String, QueryResult)>,
}

impl ResultSink {
    fn channel() -> (Self, mpsc::UnboundedReceiver<(String, QueryResult)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn record(&self, endpoint: String, result: QueryResult) {
        if self.tx.send((endpoint, result)).is_err() {
            debug!("Result sink closed, dropping result");
        }
    }
}

pub struct QueryPipeline {
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Queries every server `discovery` finds for `filter`
    ///
    /// Batches are queried while discovery is still producing later ones.
    /// A discovery failure abandons queued work and is returned instead of
    /// a partial report.
    pub async fn run<D: Discovery>(
        &self,
        discovery: &D,
        filter: &Filter,
    ) -> Result<Report, DiscoveryError> {
        let (sink, mut results) = ResultSink::channel();
        let timeout = self.config.timeout;

        let scheduler = BatchScheduler::with_order(
            move |addr: SocketAddr| {
                let sink = sink.clone();
                async move {
                    let result = query_endpoint(addr, timeout).await;
                    sink.record(addr.to_string(), result);
                }
            },
            self.config.concurrency,
            self.config.backlog_order,
        );

        let discovered = discovery
            .query(filter, |batch| {
                let scheduler = &scheduler;
                async move {
                    debug!("Scheduling batch of {} servers", batch.len());
                    scheduler.submit(batch).await?;
                    Ok(())
                }
            })
            .await;

        if let Err(e) = discovered {
            error!("Server discovery failed: {}", e);
            scheduler.abandon().await;
            return Err(e);
        }

        scheduler.drain().await;
        scheduler.join().await;

        let mut report = Report::new();
        while let Ok((endpoint, result)) = results.try_recv() {
            report.push(endpoint, result);
        }

        info!(
            "Queried {} servers, {} answered",
            report.len(),
            report.successes()
        );
        Ok(report)
    }
}

/// Queries one server for its info and, when anyone is online, its players
///
/// Never fails: transport and decode errors become a failure result.
pub async fn query_endpoint(addr: SocketAddr, timeout: Duration) -> QueryResult {
    let endpoint = addr.to_string();

    let mut querier = match ServerQuerier::connect(addr, timeout).await {
        Ok(querier) => querier,
        Err(e) => return failure(endpoint, e),
    };

    let result = match querier.fetch_info().await {
        Ok(info) => {
            debug!("{} - {} ({}/{})", endpoint, info.name, info.players, info.max_players);
            let players_online = if info.players > 0 {
                match querier.fetch_players().await {
                    Ok(players) => Some(players),
                    Err(e) => {
                        debug!("Player query failed for {}: {}", endpoint, e);
                        Some(Vec::new())
                    }
                }
            } else {
                None
            };
            QueryResult::Success(ServerRecord::new(endpoint, info, players_online))
        }
        Err(e) => failure(endpoint, e),
    };

    querier.close();
    result
}

fn failure(endpoint: String, err: QueryError) -> QueryResult {
    warn!("Server query error [{}]: {}", endpoint, err);
    QueryResult::failure(endpoint, err.category())
}
