//! Shared test doubles for the state machine and lifecycle suites.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::machine::ControllerContext;
use crate::config::GlueConfig;
use crate::error::{GlueError, Result};
use crate::events::LineEventBus;
use crate::phy::{CompanionPhy, Transceiver};
use crate::power::{RuntimePm, WakeGuard};
use crate::regs::SharedRegs;

/// Transceiver double recording suspend and VBUS line calls.
#[derive(Default)]
pub(crate) struct MockXceiv {
    vbus: Mutex<Vec<bool>>,
    suspends: Mutex<Vec<bool>>,
}

impl MockXceiv {
    pub fn vbus_calls(&self) -> Vec<bool> {
        self.vbus.lock().clone()
    }

    pub fn suspend_calls(&self) -> Vec<bool> {
        self.suspends.lock().clone()
    }
}

#[async_trait]
impl Transceiver for MockXceiv {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn set_suspend(&self, suspend: bool) -> Result<()> {
        self.suspends.lock().push(suspend);
        Ok(())
    }

    async fn set_vbus(&self, on: bool) -> Result<()> {
        self.vbus.lock().push(on);
        Ok(())
    }
}

/// Companion PHY double recording mailbox signals; can fail on demand.
#[derive(Default)]
pub(crate) struct MockCompanion {
    signals: Mutex<Vec<u32>>,
    fail_next: AtomicBool,
}

impl MockCompanion {
    pub fn signals(&self) -> Vec<u32> {
        self.signals.lock().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::Release);
    }
}

impl CompanionPhy for MockCompanion {
    fn phy_mailbox(&self, bits: u32) -> Result<()> {
        if self.fail_next.swap(false, Ordering::AcqRel) {
            return Err(GlueError::Phy("mailbox write fault".to_string()));
        }
        self.signals.lock().push(bits);
        Ok(())
    }
}

/// Runtime PM double counting reference traffic.
#[derive(Default)]
pub(crate) struct CountingPm {
    enabled: AtomicBool,
    gets: AtomicU32,
    puts: AtomicU32,
    last_busy: AtomicU32,
    autosuspends: AtomicU32,
}

impl CountingPm {
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::Acquire)
    }

    pub fn puts(&self) -> u32 {
        self.puts.load(Ordering::Acquire)
    }

    pub fn last_busy(&self) -> u32 {
        self.last_busy.load(Ordering::Acquire)
    }

    pub fn autosuspends(&self) -> u32 {
        self.autosuspends.load(Ordering::Acquire)
    }
}

impl RuntimePm for CountingPm {
    fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    fn get(&self) {
        self.gets.fetch_add(1, Ordering::AcqRel);
    }

    fn put(&self) {
        self.puts.fetch_add(1, Ordering::AcqRel);
    }

    fn mark_last_busy(&self) {
        self.last_busy.fetch_add(1, Ordering::AcqRel);
    }

    fn put_autosuspend(&self) {
        self.autosuspends.fetch_add(1, Ordering::AcqRel);
    }
}

/// Everything a state-machine test needs, with the doubles still reachable.
pub(crate) struct TestParts {
    pub ctx: ControllerContext,
    pub regs: SharedRegs,
    pub companion: Arc<MockCompanion>,
    pub pm: Arc<CountingPm>,
    pub wake: Arc<WakeGuard>,
    pub xceiv: Arc<MockXceiv>,
}

pub(crate) fn test_context(config: GlueConfig) -> TestParts {
    let regs = SharedRegs::new();
    let xceiv = Arc::new(MockXceiv::default());
    let companion = Arc::new(MockCompanion::default());
    let pm = Arc::new(CountingPm::default());
    let wake = Arc::new(WakeGuard::new());
    let events = Arc::new(LineEventBus::new());

    let ctx = ControllerContext::new(
        config,
        Arc::new(regs.clone()),
        xceiv.clone(),
        Some(companion.clone()),
        pm.clone(),
        events,
        wake.clone(),
    );

    TestParts {
        ctx,
        regs,
        companion,
        pm,
        wake,
        xceiv,
    }
}
