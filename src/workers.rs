use crate::limiter::Limiter;
use crate::peers::{unique_by_pubkey, ClusterNode};
use crate::probe::{probe_node, Prober};
use crate::progress::Progress;
use crate::result_store::{self, new_store};
use crate::select_or_shutdown::select_or_shutdown;
use crate::types::{Measurement, ProbeOutcome};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{sync::Notify, task};
use tracing::{debug, info, trace};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("probe task failed: {0}")]
    Task(#[from] task::JoinError),
    #[error("interrupted")]
    Interrupted,
}

/// Reports one completion when dropped, so a task that returns early, panics
/// or is aborted is still counted exactly once.
struct Completion(Arc<dyn Progress>);

impl Drop for Completion {
    fn drop(&mut self) {
        self.0.inc();
    }
}

/// Probe every node, at most `limiter.capacity()` at a time, and collect the
/// ones that answered cleanly. Each node gets `node_timeout` from the moment
/// it holds a slot.
///
/// Per-node failures only keep that node out of the result. The run itself fails
/// if a probe task panics or `shutdown` is notified before all tasks finish; on
/// shutdown the remaining tasks are aborted and the limiter is closed.
pub async fn check_latency<P>(
    nodes: Vec<ClusterNode>,
    prober: Arc<P>,
    node_timeout: Duration,
    limiter: &Limiter,
    progress: Arc<dyn Progress>,
    shutdown: Arc<Notify>,
) -> Result<Vec<Measurement>, RunError>
where
    P: Prober + 'static,
{
    let nodes = unique_by_pubkey(nodes);
    let store = new_store();
    progress.start(nodes.len());

    let mut tasks = Vec::with_capacity(nodes.len());
    for node in nodes {
        let prober = prober.clone();
        let limiter = limiter.clone();
        let store = store.clone();
        let done = Completion(progress.clone());

        tasks.push(task::spawn(async move {
            let _done = done;
            let outcome = match limiter.acquire().await {
                Some(_slot) => probe_node(prober.as_ref(), node, node_timeout).await,
                None => return,
            };
            match outcome {
                ProbeOutcome::Measured(measurement) => {
                    trace!(
                        "{} answered in {:?}",
                        measurement.ip,
                        measurement.latency
                    );
                    result_store::append(&store, measurement);
                }
                ProbeOutcome::Failed { address, reason } => {
                    debug!("Skipping {:?}: {}", address, reason);
                }
            }
        }));
    }

    let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
    let joined = match select_or_shutdown(futures_util::future::join_all(tasks), shutdown).await {
        Ok(joined) => joined,
        Err(()) => {
            info!(
                "Shutdown requested with {} probes in flight",
                limiter.in_flight()
            );
            limiter.close();
            for abort in aborts {
                abort.abort();
            }
            return Err(RunError::Interrupted);
        }
    };

    progress.finish();
    if let Some(e) = joined.into_iter().find_map(Result::err) {
        return Err(RunError::Task(e));
    }
    Ok(result_store::take(&store))
}
