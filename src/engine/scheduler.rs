//! Duty cycle driver: resolve, create, sleep.
//!
//! A cycle that errors or panics is logged and followed by a cooldown;
//! the loop itself only stops on the shutdown future. Status is published
//! as a read-only snapshot over a `watch` channel.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use super::creation::CreationEngine;
use super::resolution::ResolutionEngine;
use crate::config::AgentConfig;
use crate::types::CycleReport;

/// What the status endpoint and `check` see.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub agent_name: String,
    pub dry_run: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub total_resolved: u64,
    pub total_created: u64,
    /// Expired-but-undecidable markets as of the last cycle.
    pub pending_resolution: usize,
    pub last_cycle: Option<CycleReport>,
    pub last_error: Option<String>,
}

pub struct CycleScheduler {
    resolution: ResolutionEngine,
    creation: CreationEngine,
    interval: Duration,
    cooldown: Duration,
    cycle_number: u64,
    status: watch::Sender<StatusSnapshot>,
}

impl CycleScheduler {
    pub fn new(resolution: ResolutionEngine, creation: CreationEngine, agent: &AgentConfig) -> Self {
        let (status, _) = watch::channel(StatusSnapshot {
            agent_name: agent.name.clone(),
            dry_run: agent.dry_run,
            started_at: Some(Utc::now()),
            ..Default::default()
        });
        Self {
            resolution,
            creation,
            interval: Duration::from_secs(agent.cycle_interval_secs),
            cooldown: Duration::from_secs(agent.cycle_cooldown_secs),
            cycle_number: 0,
            status,
        }
    }

    /// Override the sleeps (tests use zero).
    pub fn with_timing(mut self, interval: Duration, cooldown: Duration) -> Self {
        self.interval = interval;
        self.cooldown = cooldown;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    /// One resolve-then-create cycle, without isolation.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        self.cycle_number += 1;
        let started_at = Utc::now();
        info!(cycle = self.cycle_number, "Starting cycle");

        let resolution = self.resolution.run_pass(started_at).await?;
        let creation = self.creation.run_pass(Utc::now()).await?;

        Ok(CycleReport {
            cycle_number: self.cycle_number,
            started_at,
            finished_at: Utc::now(),
            resolution,
            creation,
        })
    }

    /// One cycle with errors and panics caught and recorded in the status
    /// snapshot.
    pub async fn run_guarded(&mut self) -> Result<CycleReport> {
        let outcome = match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("cycle panicked: {}", panic_message(panic.as_ref()))),
        };

        match &outcome {
            Ok(report) => {
                info!(cycle = report.cycle_number, "{report}");
                self.status.send_modify(|s| {
                    s.cycles_completed += 1;
                    s.total_resolved += report.resolution.resolved as u64;
                    s.total_created += report.creation.created as u64;
                    s.pending_resolution = report.resolution.pending_resolution;
                    s.last_cycle = Some(report.clone());
                    s.last_error = None;
                });
            }
            Err(e) => {
                error!(kind = "cycle_fatal", cycle = self.cycle_number, error = %e, "Cycle failed; cooling down");
                self.status.send_modify(|s| {
                    s.cycles_failed += 1;
                    s.last_error = Some(e.to_string());
                });
            }
        }
        outcome
    }

    /// Run cycles until `shutdown` resolves. Shutdown is checked between
    /// cycles only.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            interval_secs = self.interval.as_secs(),
            cooldown_secs = self.cooldown.as_secs(),
            "Entering main loop. Press Ctrl+C to stop."
        );

        loop {
            let pause = match self.run_guarded().await {
                Ok(_) => self.interval,
                Err(_) => self.cooldown,
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
