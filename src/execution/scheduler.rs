use dashmap::DashSet;
use metrics::counter;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::orchestrator::Orchestrator;
use crate::models::{ExecutionRequest, Priority};

fn class(priority: Priority) -> usize {
    match priority {
        Priority::High => 0,
        Priority::Medium => 1,
        Priority::Low => 2,
    }
}

/// Three-class priority queue with per-trade leases.
///
/// `next` hands out requests high-before-medium-before-low, FIFO within a
/// class, and never hands out a request for a trade that already has one in
/// flight — such requests park in a per-trade deferred list and are promoted
/// when the lease releases.
pub struct Scheduler {
    queues: Mutex<[VecDeque<ExecutionRequest>; 3]>,
    notify: Notify,
    in_flight: DashSet<Uuid>,
    deferred: StdMutex<HashMap<Uuid, VecDeque<ExecutionRequest>>>,
    shutdown: CancellationToken,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            notify: Notify::new(),
            in_flight: DashSet::new(),
            deferred: StdMutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn enqueue(&self, req: ExecutionRequest) {
        if self.shutdown.is_cancelled() {
            tracing::warn!(
                trade_id = %req.trade_id,
                action = %req.action,
                "Scheduler shutting down — request dropped"
            );
            return;
        }

        counter!("exec_requests_enqueued").increment(1);
        tracing::debug!(
            trade_id = %req.trade_id,
            action = %req.action,
            priority = %req.priority,
            "Request enqueued"
        );

        let mut queues = self.queues.lock().await;
        queues[class(req.priority)].push_back(req);
        drop(queues);
        self.notify.notify_one();
    }

    /// Pop the next dispatchable request, acquiring its trade lease. Returns
    /// `None` once shutdown begins.
    pub async fn next(&self) -> Option<ExecutionRequest> {
        loop {
            let notified = self.notify.notified();
            {
                let mut queues = self.queues.lock().await;
                let mut picked = None;
                'scan: for queue in queues.iter_mut() {
                    while let Some(req) = queue.pop_front() {
                        if self.in_flight.insert(req.trade_id) {
                            picked = Some(req);
                            break 'scan;
                        }
                        // Lease busy: park behind the in-flight request.
                        self.deferred
                            .lock()
                            .expect("deferred lock")
                            .entry(req.trade_id)
                            .or_default()
                            .push_back(req);
                    }
                }
                if let Some(req) = picked {
                    return Some(req);
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    /// Release a trade's lease and promote its oldest deferred request, if
    /// any, back into the queue.
    pub async fn release(&self, trade_id: Uuid) {
        self.in_flight.remove(&trade_id);

        let promoted = {
            let mut deferred = self.deferred.lock().expect("deferred lock");
            let next = deferred.get_mut(&trade_id).and_then(VecDeque::pop_front);
            if deferred.get(&trade_id).map(VecDeque::is_empty).unwrap_or(false) {
                deferred.remove(&trade_id);
            }
            next
        };

        if let Some(req) = promoted {
            let mut queues = self.queues.lock().await;
            queues[class(req.priority)].push_back(req);
            drop(queues);
            self.notify.notify_one();
        }
    }

    /// Drop every queued and deferred request for a terminal trade.
    pub async fn cancel_trade(&self, trade_id: Uuid) {
        let mut queues = self.queues.lock().await;
        for queue in queues.iter_mut() {
            queue.retain(|r| r.trade_id != trade_id);
        }
        drop(queues);
        self.deferred
            .lock()
            .expect("deferred lock")
            .remove(&trade_id);
    }

    pub async fn pending_len(&self) -> usize {
        let queues = self.queues.lock().await;
        queues.iter().map(VecDeque::len).sum()
    }

    /// Remaining queued requests at shutdown, for failure marking.
    pub async fn drain_pending(&self) -> Vec<ExecutionRequest> {
        let mut queues = self.queues.lock().await;
        let mut out = Vec::new();
        for queue in queues.iter_mut() {
            out.extend(queue.drain(..));
        }
        drop(queues);
        let mut deferred = self.deferred.lock().expect("deferred lock");
        for (_, mut reqs) in deferred.drain() {
            out.extend(reqs.drain(..));
        }
        out
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Spawn the executor worker pool. Each worker pulls leased requests and
/// routes them through the orchestrator's dispatch path.
pub fn run_workers(orchestrator: Arc<Orchestrator>, fan_out: usize) -> Vec<JoinHandle<()>> {
    (0..fan_out.max(1))
        .map(|worker| {
            let orch = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                loop {
                    let Some(req) = orch.scheduler().next().await else {
                        break;
                    };
                    let trade_id = req.trade_id;
                    orch.dispatch(req).await;
                    orch.scheduler().release(trade_id).await;
                }
                tracing::debug!(worker, "Execution worker stopped");
            })
        })
        .collect()
}
