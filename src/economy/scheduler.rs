//! Periodic sweeps.
//!
//! One tokio task per sweep kind, each on its own interval. The first tick
//! fires immediately, so anything that fell due while the process was down
//! is finished right after startup. Workers stop on an explicit shutdown
//! message and acknowledge it before the handle returns.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::economy::engine::Economy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    Tasks,
    Trades,
    Cleanup,
}

impl SweepKind {
    pub fn label(self) -> &'static str {
        match self {
            SweepKind::Tasks => "tasks",
            SweepKind::Trades => "trades",
            SweepKind::Cleanup => "cleanup",
        }
    }
}

/// Intervals for each sweep. A zero interval disables that sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub task_interval: Duration,
    pub trade_interval: Duration,
    pub cleanup_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            task_interval: Duration::from_secs(60),
            trade_interval: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(6 * 3600),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub passes: u64,
    /// Records finished, expired or cleaned over all passes.
    pub affected: u64,
}

enum SweepCommand {
    RunNow(oneshot::Sender<usize>),
    Snapshot(oneshot::Sender<SweepStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct SweepHandle {
    workers: Vec<(SweepKind, mpsc::UnboundedSender<SweepCommand>)>,
}

impl SweepHandle {
    fn worker(&self, kind: SweepKind) -> Option<&mpsc::UnboundedSender<SweepCommand>> {
        self.workers.iter().find(|(k, _)| *k == kind).map(|(_, tx)| tx)
    }

    pub fn kinds(&self) -> Vec<SweepKind> {
        self.workers.iter().map(|(k, _)| *k).collect()
    }

    /// Run one pass right away. `None` if that sweep is not running.
    pub async fn run_now(&self, kind: SweepKind) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.worker(kind)?.send(SweepCommand::RunNow(tx)).ok()?;
        rx.await.ok()
    }

    pub async fn snapshot(&self, kind: SweepKind) -> Option<SweepStats> {
        let (tx, rx) = oneshot::channel();
        self.worker(kind)?.send(SweepCommand::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Stop every worker and wait for each to acknowledge.
    pub async fn shutdown(&self) {
        for (kind, worker) in &self.workers {
            let (tx, rx) = oneshot::channel();
            if worker.send(SweepCommand::Shutdown(tx)).is_ok() {
                let _ = rx.await;
            }
            debug!("{} sweep stopped", kind.label());
        }
    }
}

async fn run_pass(economy: &Economy, kind: SweepKind) -> usize {
    match kind {
        SweepKind::Tasks => economy.sweep_due_tasks().await.completed,
        SweepKind::Trades => match economy.expire_trades().await {
            Ok(expired) => expired,
            Err(e) => {
                log::warn!("trade sweep failed: {}", e);
                0
            }
        },
        SweepKind::Cleanup => economy.cleanup_inventories().await,
    }
}

fn spawn_worker(economy: Economy, kind: SweepKind, every: Duration) -> mpsc::UnboundedSender<SweepCommand> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SweepCommand>();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = SweepStats::default();
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(SweepCommand::RunNow(done)) => {
                            let affected = run_pass(&economy, kind).await;
                            stats.passes += 1;
                            stats.affected += affected as u64;
                            let _ = done.send(affected);
                        }
                        Some(SweepCommand::Snapshot(resp)) => { let _ = resp.send(stats); }
                        Some(SweepCommand::Shutdown(done)) => { let _ = done.send(()); break; }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    let affected = run_pass(&economy, kind).await;
                    stats.passes += 1;
                    stats.affected += affected as u64;
                }
            }
        }
    });
    tx
}

/// Spawn the configured sweeps against `economy`.
pub fn start_sweeps(economy: &Economy, cfg: &SweepConfig) -> SweepHandle {
    let mut workers = Vec::new();
    for (kind, every) in [
        (SweepKind::Tasks, cfg.task_interval),
        (SweepKind::Trades, cfg.trade_interval),
        (SweepKind::Cleanup, cfg.cleanup_interval),
    ] {
        if every.is_zero() {
            info!("{} sweep disabled", kind.label());
            continue;
        }
        info!("{} sweep every {:?}", kind.label(), every);
        workers.push((kind, spawn_worker(economy.clone(), kind, every)));
    }
    SweepHandle { workers }
}
