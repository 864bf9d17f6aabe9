//! Controller lifecycle management.
//!
//! Owns attach/detach of one OTG controller instance, the runtime
//! power-management hooks, and the public [`GlueHandle`] used to feed
//! mailbox events and role-driver requests into the state machine. The
//! single-instance constraint is enforced here with an attach-time check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::GlueConfig;
use crate::error::{GlueError, Result};
use crate::events::{LineEvent, LineEventBus};
use crate::otg::dispatcher::MailboxDispatcher;
use crate::otg::idle::IdleTimer;
use crate::otg::machine::ControllerContext;
use crate::otg::{MailboxEvent, OtgState};
use crate::phy::{CompanionPhy, Transceiver};
use crate::power::{RuntimePm, WakeGuard};
use crate::regs::RegisterBus;

/// External collaborators bound to the controller at attach.
pub struct GlueParts {
    /// Register access transport for the controller instance.
    pub regs: Arc<dyn RegisterBus>,
    /// External transceiver. Attach fails without one.
    pub transceiver: Option<Arc<dyn Transceiver>>,
    /// Companion PHY power controller, if the board has one.
    pub companion: Option<Arc<dyn CompanionPhy>>,
    /// Runtime power-management hooks.
    pub pm: Arc<dyn RuntimePm>,
}

/// Snapshot of the controller state for introspection and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlueState {
    pub role_state: OtgState,
    pub is_active: bool,
    pub default_a: bool,
    pub is_host: bool,
    pub wake_held: bool,
    pub last_event: Option<LineEvent>,
    pub latched_status: MailboxEvent,
}

struct GlueShared {
    ctx: Arc<AsyncMutex<ControllerContext>>,
    dispatcher: MailboxDispatcher,
    idle: IdleTimer,
    wake: Arc<WakeGuard>,
    events: Arc<LineEventBus>,
    detached: AtomicBool,
    idle_timeout: Duration,
}

impl GlueShared {
    /// Arm or delete the idle timer for the current controller state.
    ///
    /// Idling is suppressed while the session is active or while sitting in
    /// `a_wait_bcon` with the session-wait policy off; suppression deletes
    /// any pending expiry. A request while a timer is pending is dropped,
    /// so the pending timer fires at its original deadline.
    fn try_idle(shared: &Arc<Self>, ctx: &ControllerContext, timeout: Option<Duration>) {
        if ctx.idle_suppressed() {
            debug!("{} active, deleting idle timer", ctx.role_state);
            shared.idle.disarm();
            return;
        }

        let delay = timeout.unwrap_or(shared.idle_timeout);
        let deadline = Instant::now() + delay;
        let runner = Arc::clone(shared);
        let armed = shared.idle.arm(deadline, async move {
            GlueShared::run_idle(runner).await;
        });
        if armed {
            debug!(
                "{} inactive, idle timer for {} ms",
                ctx.role_state,
                delay.as_millis()
            );
        }
    }

    /// Timer body: re-evaluate the role state, then re-arm per policy.
    async fn run_idle(shared: Arc<Self>) {
        shared.idle.mark_fired();
        let mut ctx = shared.ctx.lock().await;
        ctx.evaluate_idle();
        Self::try_idle(&shared, &ctx, None);
    }
}

/// Handle to an attached controller.
///
/// Cloneable; clones stay valid for introspection after detach but any
/// mailbox delivery through them reports [`GlueError::NotReady`].
#[derive(Clone)]
pub struct GlueHandle {
    shared: Arc<GlueShared>,
}

impl std::fmt::Debug for GlueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlueHandle")
            .field("detached", &self.shared.detached.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl GlueHandle {
    /// Deliver a line-state event from the PHY/mailbox source.
    ///
    /// Callable from any context, any time. The event is latched as the
    /// most recent status and the dispatch task is woken; posts that land
    /// before dispatch coalesce, latest wins. Wake-relevant events take
    /// the wake guard before the dispatch is scheduled.
    pub fn notify(&self, event: MailboxEvent) -> Result<()> {
        if self.shared.detached.load(Ordering::Acquire) {
            return Err(GlueError::NotReady);
        }

        debug!("mailbox status {}", event);
        self.shared.dispatcher.latch(event);
        if event.grants_wake() {
            self.shared.wake.acquire();
        }
        self.shared.dispatcher.schedule();
        Ok(())
    }

    /// Role-driver request to re-evaluate idling after `timeout` (the
    /// configured delay when `None`).
    pub async fn request_idle(&self, timeout: Option<Duration>) {
        if self.shared.detached.load(Ordering::Acquire) {
            return;
        }
        let ctx = self.shared.ctx.lock().await;
        GlueShared::try_idle(&self.shared, &ctx, timeout);
    }

    /// Core-enable hook: re-signal the companion PHY for the latched
    /// status and restart the session where the interface needs it.
    pub async fn enable(&self) {
        if self.shared.detached.load(Ordering::Acquire) {
            return;
        }
        let latched = self.shared.dispatcher.latched();
        let mut ctx = self.shared.ctx.lock().await;
        ctx.enable(latched).await;
    }

    /// Core-disable hook.
    pub async fn disable(&self) {
        if self.shared.detached.load(Ordering::Acquire) {
            return;
        }
        let mut ctx = self.shared.ctx.lock().await;
        ctx.disable();
    }

    /// Role-driver request to assert the session-enable bit.
    pub async fn request_session(&self) {
        if self.shared.detached.load(Ordering::Acquire) {
            return;
        }
        let ctx = self.shared.ctx.lock().await;
        ctx.request_session();
    }

    /// Bind or unbind the host/peripheral role driver.
    pub async fn set_role_driver_bound(&self, bound: bool) {
        let mut ctx = self.shared.ctx.lock().await;
        ctx.role_driver_bound = bound;
    }

    /// Subscribe to line events published on OTG transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<LineEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot the controller state.
    pub async fn state(&self) -> GlueState {
        let ctx = self.shared.ctx.lock().await;
        GlueState {
            role_state: ctx.role_state,
            is_active: ctx.is_active,
            default_a: ctx.default_a,
            is_host: ctx.is_host,
            wake_held: self.shared.wake.is_held(),
            last_event: ctx.last_event,
            latched_status: self.shared.dispatcher.latched(),
        }
    }
}

/// Lifecycle manager for one physical OTG controller.
///
/// Holds at most one attached instance; a second attach before detach is
/// rejected. The power-management hooks are no-ops while nothing is
/// attached.
pub struct OtgGlue {
    slot: Mutex<Option<Arc<GlueShared>>>,
}

impl OtgGlue {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Attach the controller.
    ///
    /// Requires a transceiver, programs the PHY interface selection, brings
    /// the transceiver up, starts the mailbox dispatch task, and, when
    /// board code latched a line status before attach completed, applies
    /// that status synchronously before returning.
    pub async fn attach(&self, config: GlueConfig, parts: GlueParts) -> Result<GlueHandle> {
        let xceiv = match parts.transceiver {
            Some(xceiv) => xceiv,
            None => {
                error!("HS USB OTG: no transceiver configured");
                return Err(GlueError::NoTransceiver);
            }
        };

        let wake = Arc::new(WakeGuard::new());
        let events = Arc::new(LineEventBus::new());
        let ctx = ControllerContext::new(
            config.clone(),
            Arc::clone(&parts.regs),
            Arc::clone(&xceiv),
            parts.companion,
            Arc::clone(&parts.pm),
            Arc::clone(&events),
            Arc::clone(&wake),
        );

        let shared = Arc::new(GlueShared {
            ctx: Arc::new(AsyncMutex::new(ctx)),
            dispatcher: MailboxDispatcher::new(),
            idle: IdleTimer::new(),
            wake,
            events,
            detached: AtomicBool::new(false),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
        });

        {
            let mut slot = self.slot.lock();
            if slot.is_some() {
                return Err(GlueError::AlreadyAttached);
            }
            *slot = Some(Arc::clone(&shared));
        }

        // powered bring-up
        parts.pm.enable();
        parts.pm.get();

        {
            let ctx = shared.ctx.lock().await;
            ctx.program_interface_select();
            ctx.log_revision();
        }

        if let Err(err) = xceiv.init().await {
            parts.pm.put();
            *self.slot.lock() = None;
            return Err(GlueError::Phy(err.to_string()));
        }

        shared.dispatcher.spawn(Arc::clone(&shared.ctx));

        // board code may have latched a line status before attach finished
        if config.initial_status != MailboxEvent::Unknown {
            shared.dispatcher.latch(config.initial_status);
            if config.initial_status.grants_wake() {
                shared.wake.acquire();
            }
            let mut ctx = shared.ctx.lock().await;
            ctx.apply_event(config.initial_status).await;
        }

        parts.pm.put();

        info!("OTG controller attached");
        Ok(GlueHandle { shared })
    }

    /// Detach the controller.
    ///
    /// Cancels the pending idle timer, then cancels and drains the mailbox
    /// dispatch task; an in-flight dispatch finishes before this returns.
    /// Never fails. Events delivered once detach has begun are rejected
    /// with `NotReady`.
    pub async fn detach(&self, handle: GlueHandle) {
        let shared = {
            let mut slot = self.slot.lock();
            match slot.take() {
                Some(current) if Arc::ptr_eq(&current, &handle.shared) => current,
                Some(other) => {
                    *slot = Some(other);
                    warn!("detach called with a stale handle");
                    return;
                }
                None => {
                    debug!("detach with no controller attached");
                    return;
                }
            }
        };

        shared.detached.store(true, Ordering::Release);
        shared.idle.shutdown().await;
        shared.dispatcher.shutdown().await;

        info!("OTG controller detached");
    }

    /// Runtime-suspend hook. No-op while nothing is attached.
    pub async fn on_suspend(&self) -> Result<()> {
        let shared = self.slot.lock().clone();
        if let Some(shared) = shared {
            let mut ctx = shared.ctx.lock().await;
            ctx.runtime_suspend().await;
        }
        Ok(())
    }

    /// Runtime-resume hook. No-op while nothing is attached; idempotent
    /// when no suspend preceded it.
    pub async fn on_resume(&self) -> Result<()> {
        let shared = self.slot.lock().clone();
        if let Some(shared) = shared {
            let mut ctx = shared.ctx.lock().await;
            ctx.runtime_resume().await;
        }
        Ok(())
    }
}

impl Default for OtgGlue {
    fn default() -> Self {
        Self::new()
    }
}
