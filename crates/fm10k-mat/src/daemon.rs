//! The maintenance daemon: attach switches, run the worker loop.
//!
//! One worker task services every attached switch round-robin. A shared
//! `Notify` wakes it when any switch queues work; a timed wait drives the
//! periodic passes that aging and polling families depend on.

use crate::config::{DaemonConfig, MatConfig};
use crate::error::{MatError, MatResult};
use crate::events::MacUpdateEvent;
use crate::maint::ops::MaintOps;
use crate::switch::SwitchContext;
use fm10k_fsm::Engine;
use fm10k_hal::{Clock, RegisterIo, SwitchId};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

/// Coordinates MA table maintenance for up to `max_switches` switches.
pub struct MaintDaemon {
    config: DaemonConfig,
    engine: Arc<Engine>,
    slots: RwLock<Vec<Option<Arc<SwitchContext>>>>,
    work_notify: Arc<Notify>,
    running: AtomicBool,
}

impl MaintDaemon {
    /// Creates a daemon with no switches attached.
    pub fn new(config: DaemonConfig) -> Self {
        let slots = (0..config.max_switches).map(|_| None).collect();
        MaintDaemon {
            config,
            engine: Arc::new(Engine::new()),
            slots: RwLock::new(slots),
            work_notify: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
        }
    }

    /// State machine engine shared by every switch.
    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    /// Attaches a switch and returns the consumer half of its update
    /// channel.
    pub fn attach_switch(
        &self,
        id: SwitchId,
        config: MatConfig,
        ops: Arc<dyn MaintOps>,
        regs: Arc<dyn RegisterIo>,
        clock: Arc<dyn Clock>,
    ) -> MatResult<mpsc::Receiver<MacUpdateEvent>> {
        let mut slots = self.lock_slots_mut();
        let slot = slots.get_mut(id.as_usize()).ok_or_else(|| {
            MatError::invalid_argument(format!(
                "{} out of range, daemon supports {} switches",
                id, self.config.max_switches
            ))
        })?;
        if slot.is_some() {
            return Err(MatError::invalid_argument(format!(
                "{} is already attached",
                id
            )));
        }
        let (ctx, rx) = SwitchContext::new(
            id,
            config,
            self.engine.clone(),
            ops,
            regs,
            clock,
            self.work_notify.clone(),
        )?;
        info!("{}: attached, {} table entries", id, ctx.config().geometry.entries());
        *slot = Some(ctx);
        self.work_notify.notify_one();
        Ok(rx)
    }

    /// Detaches a switch, dropping its cache and purge machine.
    pub fn detach_switch(&self, id: SwitchId) -> MatResult<()> {
        let ctx = {
            let mut slots = self.lock_slots_mut();
            slots
                .get_mut(id.as_usize())
                .and_then(Option::take)
                .ok_or(MatError::SwitchDown(id))?
        };
        ctx.set_up(false);
        ctx.purge().shutdown();
        info!("{}: detached", id);
        Ok(())
    }

    /// Looks an attached switch up.
    pub fn switch(&self, id: SwitchId) -> MatResult<Arc<SwitchContext>> {
        self.lock_slots()
            .get(id.as_usize())
            .and_then(Option::clone)
            .ok_or(MatError::SwitchDown(id))
    }

    /// Snapshot of every attached switch, in index order.
    pub fn switches(&self) -> Vec<Arc<SwitchContext>> {
        self.lock_slots().iter().flatten().cloned().collect()
    }

    /// Runs one maintenance pass on one switch.
    ///
    /// The worker loop does this on its own; tests and diagnostics call
    /// it directly for a deterministic pass.
    pub async fn service_once(&self, id: SwitchId) -> MatResult<()> {
        self.switch(id)?.service().await
    }

    /// Returns true while the worker loop runs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs the worker loop until `stop`.
    pub async fn run(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("maintenance worker already running");
            return;
        }
        info!(
            "maintenance worker started, interval {:?}",
            self.config.mat.maint_interval()
        );
        while self.is_running() {
            debug!("maintenance worker pass");
            for ctx in self.switches() {
                if !ctx.is_up() {
                    continue;
                }
                if let Err(e) = ctx.service().await {
                    warn!("{}: maintenance pass failed: {}", ctx.id(), e);
                }
                tokio::task::yield_now().await;
            }
            let throttle = self.config.mat.worker_throttle();
            if !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }
            if self.config.mat.periodic_maintenance {
                let _ = timeout(self.config.mat.maint_interval(), self.work_notify.notified())
                    .await;
            } else {
                self.work_notify.notified().await;
            }
        }
        info!("maintenance worker stopped");
    }

    /// Stops the worker loop.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("stopping maintenance worker");
        }
        self.work_notify.notify_one();
    }

    /// Human-readable state of every switch.
    pub async fn dump(&self) -> Vec<String> {
        let switches = self.switches();
        let mut lines = vec![format!(
            "matmaintd: {} of {} switches attached, worker {}",
            switches.len(),
            self.config.max_switches,
            if self.is_running() { "running" } else { "stopped" }
        )];
        for ctx in switches {
            lines.extend(ctx.dump().await);
        }
        lines
    }

    fn lock_slots(&self) -> std::sync::RwLockReadGuard<'_, Vec<Option<Arc<SwitchContext>>>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_slots_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Option<Arc<SwitchContext>>>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }
}
