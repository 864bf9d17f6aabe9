//! OTG session/role state machine.
//!
//! Owns the controller-side view of the OTG session: role state, session
//! activity, and the register writes that start or stop a session. All
//! methods run under the per-controller lock held by the caller; the
//! session-start poll in [`ControllerContext::set_vbus`] is the one
//! operation that keeps the lock across a bounded multi-millisecond wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::state::{MailboxEvent, OtgState};
use crate::config::{GlueConfig, PhyInterface};
use crate::error::{GlueError, Result};
use crate::events::{LineEvent, LineEventBus};
use crate::phy::{
    CompanionPhy, Transceiver, PHY_AVALID, PHY_IDDIG, PHY_SESSEND, PHY_VBUSVALID,
};
use crate::power::{RuntimePm, WakeGuard};
use crate::regs::{
    RegisterBus, DEVCTL_BDEVICE, DEVCTL_SESSION, FORCESTDBY_ENABLEFORCE, INTERFSEL_ULPI_12PIN,
    POWER_RESUME, REG_DEVCTL, REG_FORCESTDBY, REG_INTERFSEL, REG_POWER, REG_REVISION,
    REG_SIMENABLE, REG_SYSCONFIG, REG_SYSSTATUS,
};

/// Session-start poll bounds: iteration cap and wall-clock cap, whichever
/// triggers first. This is a hardware timing contract, not a tunable.
const SESSION_START_POLLS: u32 = 100;
const SESSION_POLL_DELAY: Duration = Duration::from_millis(5);
const SESSION_START_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-controller state shared between the mailbox dispatcher, the idle
/// timer, and the lifecycle hooks. One instance per attached controller,
/// always behind the per-controller async mutex.
pub(crate) struct ControllerContext {
    pub(crate) config: GlueConfig,
    regs: Arc<dyn RegisterBus>,
    xceiv: Arc<dyn Transceiver>,
    companion: Option<Arc<dyn CompanionPhy>>,
    pm: Arc<dyn RuntimePm>,
    events: Arc<LineEventBus>,
    wake: Arc<WakeGuard>,
    pub(crate) role_state: OtgState,
    pub(crate) is_active: bool,
    pub(crate) default_a: bool,
    pub(crate) is_host: bool,
    pub(crate) role_driver_bound: bool,
    pub(crate) last_event: Option<LineEvent>,
    /// INTERFSEL snapshot, valid only between a suspend and its resume.
    pub(crate) saved_interface_select: Option<u32>,
}

impl ControllerContext {
    pub(crate) fn new(
        config: GlueConfig,
        regs: Arc<dyn RegisterBus>,
        xceiv: Arc<dyn Transceiver>,
        companion: Option<Arc<dyn CompanionPhy>>,
        pm: Arc<dyn RuntimePm>,
        events: Arc<LineEventBus>,
        wake: Arc<WakeGuard>,
    ) -> Self {
        let role_driver_bound = config.role_driver_bound;
        Self {
            config,
            regs,
            xceiv,
            companion,
            pm,
            events,
            wake,
            role_state: OtgState::BIdle,
            is_active: false,
            default_a: false,
            is_host: false,
            role_driver_bound,
            last_event: None,
            saved_interface_select: None,
        }
    }

    /// Apply one mailbox event to the controller.
    ///
    /// Called with the latched status read at dispatch time; intermediate
    /// statuses overwritten before dispatch are never seen here.
    pub(crate) async fn apply_event(&mut self, event: MailboxEvent) {
        match event {
            MailboxEvent::IdGround => {
                debug!("ID GND");

                self.default_a = true;
                self.role_state = OtgState::AIdle;
                self.last_event = Some(LineEvent::IdGround);
                self.events.publish(LineEvent::IdGround);
                if self.role_driver_bound {
                    self.pm.get();
                    self.signal_companion(PHY_AVALID | PHY_VBUSVALID);
                    self.set_vbus(true).await;
                }
            }
            MailboxEvent::VbusValid => {
                debug!("VBUS Connect");

                self.default_a = false;
                self.role_state = OtgState::BIdle;
                self.last_event = Some(LineEvent::VbusValid);
                self.events.publish(LineEvent::VbusValid);
                if self.role_driver_bound {
                    self.pm.get();
                }
                self.signal_companion(PHY_IDDIG | PHY_AVALID | PHY_VBUSVALID);
            }
            MailboxEvent::IdFloat | MailboxEvent::VbusOff => {
                debug!("VBUS Disconnect");

                self.last_event = Some(LineEvent::SessionEnd);
                self.events.publish(LineEvent::SessionEnd);

                if self.role_driver_bound {
                    self.pm.mark_last_busy();
                    self.pm.put_autosuspend();
                }

                if self.config.interface.needs_vbus_teardown() {
                    self.set_vbus(false).await;
                    if let Err(err) = self.xceiv.set_vbus(false).await {
                        warn!("transceiver VBUS off failed: {}", err);
                    }
                    let devctl = self.regs.read8(REG_DEVCTL);
                    if devctl & DEVCTL_SESSION != 0 {
                        self.regs.write8(REG_DEVCTL, devctl & !DEVCTL_SESSION);
                    }
                }

                self.signal_companion(PHY_SESSEND | PHY_IDDIG);
                self.wake.release();
            }
            MailboxEvent::Unknown => {
                debug!("mailbox status unknown, nothing to apply");
            }
        }
    }

    /// Start or stop the hardware session.
    ///
    /// The start path is only valid from `a_idle` and polls the session
    /// control register until the controller reports itself as the A
    /// device, bounded by [`SESSION_START_POLLS`] and
    /// [`SESSION_START_TIMEOUT`]. A poll timeout is logged and the session
    /// is still treated as started. The stop path is safe from any state.
    pub(crate) async fn set_vbus(&mut self, on: bool) {
        if on {
            if self.role_state != OtgState::AIdle {
                return;
            }

            // start the session
            let devctl = self.regs.read8(REG_DEVCTL);
            self.regs.write8(REG_DEVCTL, devctl | DEVCTL_SESSION);

            if let Err(err) = self.wait_until_a_device().await {
                warn!("configured as A device timeout: {}", err);
            }

            if let Err(err) = self.xceiv.set_vbus(true).await {
                warn!("transceiver VBUS on failed: {}", err);
            }
            self.default_a = true;
            self.host_mode();
        } else {
            self.is_active = false;

            // skip a_wait_vfall and drop straight to b_idle
            self.default_a = false;
            self.role_state = OtgState::BIdle;
            let devctl = self.regs.read8(REG_DEVCTL);
            self.regs.write8(REG_DEVCTL, devctl & !DEVCTL_SESSION);
            self.peripheral_mode();
        }

        debug!(
            "VBUS {} in {}, devctl {:02x}",
            if on { "on" } else { "off" },
            self.role_state,
            self.regs.read8(REG_DEVCTL)
        );
    }

    /// Wait for the controller to drop its B-device indication after a
    /// session start, so VBUS may be raised.
    async fn wait_until_a_device(&self) -> Result<()> {
        let started = Instant::now();
        let mut polls = SESSION_START_POLLS;

        while self.regs.read8(REG_DEVCTL) & DEVCTL_BDEVICE != 0 {
            sleep(SESSION_POLL_DELAY).await;

            if started.elapsed() >= SESSION_START_TIMEOUT || polls == 0 {
                return Err(GlueError::RegisterTimeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            polls -= 1;
        }

        Ok(())
    }

    /// Re-evaluate the role state on idle-timer expiry.
    ///
    /// Re-reads hardware bits to disambiguate the waiting states. `a_host`
    /// is an explicit case: demote to `b_idle` when a peripheral shows up,
    /// otherwise fall back to `a_wait_bcon`, with no further action.
    pub(crate) fn evaluate_idle(&mut self) {
        match self.role_state {
            OtgState::AWaitBcon => {
                let devctl = self.regs.read8(REG_DEVCTL);
                if devctl & DEVCTL_BDEVICE != 0 {
                    self.role_state = OtgState::BIdle;
                    self.peripheral_mode();
                } else {
                    self.role_state = OtgState::AIdle;
                    self.host_mode();
                }
            }
            OtgState::ASuspend => {
                // finish RESUME signaling if the root port still drives it
                let power = self.regs.read8(REG_POWER);
                if power & POWER_RESUME != 0 {
                    let power = power & !POWER_RESUME;
                    debug!("root port resume stopped, power {:02x}", power);
                    self.regs.write8(REG_POWER, power);
                    self.is_active = true;
                    self.role_state = OtgState::AHost;
                }
            }
            OtgState::AHost => {
                let devctl = self.regs.read8(REG_DEVCTL);
                if devctl & DEVCTL_BDEVICE != 0 {
                    self.role_state = OtgState::BIdle;
                } else {
                    self.role_state = OtgState::AWaitBcon;
                }
            }
            OtgState::AIdle | OtgState::BIdle => {}
        }
    }

    /// Whether idling is currently suppressed: active sessions never idle,
    /// and neither does `a_wait_bcon` when the session-wait policy is off.
    pub(crate) fn idle_suppressed(&self) -> bool {
        self.is_active
            || (!self.config.session_wait && self.role_state == OtgState::AWaitBcon)
    }

    /// Role-driver request to (re)start a session: assert the session
    /// enable bit and let the hardware take it from there.
    pub(crate) fn request_session(&self) {
        let devctl = self.regs.read8(REG_DEVCTL);
        self.regs.write8(REG_DEVCTL, devctl | DEVCTL_SESSION);
    }

    /// Core-enable hook: re-signal the companion PHY for the latched
    /// status and, on UTMI boards with a grounded ID, restart the session.
    pub(crate) async fn enable(&mut self, latched: MailboxEvent) {
        match latched {
            MailboxEvent::IdGround => {
                self.signal_companion(PHY_AVALID | PHY_VBUSVALID);

                if self.config.interface != PhyInterface::Utmi {
                    return;
                }
                let devctl = self.regs.read8(REG_DEVCTL);
                self.regs.write8(REG_DEVCTL, devctl | DEVCTL_SESSION);
                if let Err(err) = self.wait_until_a_device().await {
                    warn!("configured as A device timeout: {}", err);
                }
            }
            MailboxEvent::VbusValid => {
                self.signal_companion(PHY_IDDIG | PHY_AVALID | PHY_VBUSVALID);
            }
            _ => {}
        }
    }

    /// Core-disable hook: tell the companion PHY the session is gone if a
    /// session-relevant line event had been applied.
    pub(crate) fn disable(&mut self) {
        if matches!(
            self.last_event,
            Some(LineEvent::IdGround) | Some(LineEvent::VbusValid)
        ) {
            self.signal_companion(PHY_SESSEND | PHY_IDDIG);
        }
    }

    /// Program INTERFSEL for the board's PHY interface.
    pub(crate) fn program_interface_select(&self) {
        let mut l = self.regs.read32(REG_INTERFSEL);
        match self.config.interface {
            // on-die UTMI PHY, 8-bit interface
            PhyInterface::Utmi => l &= !INTERFSEL_ULPI_12PIN,
            PhyInterface::Ulpi => l |= INTERFSEL_ULPI_12PIN,
        }
        self.regs.write32(REG_INTERFSEL, l);
    }

    /// Assert or release the wrapper's force-standby bit.
    pub(crate) fn force_standby(&self, enable: bool) {
        let l = self.regs.read32(REG_FORCESTDBY);
        if enable {
            self.regs.write32(REG_FORCESTDBY, l | FORCESTDBY_ENABLEFORCE);
        } else {
            self.regs.write32(REG_FORCESTDBY, l & !FORCESTDBY_ENABLEFORCE);
        }
    }

    /// Runtime-suspend path: snapshot INTERFSEL, drop to the 12-pin
    /// electrical configuration, force standby, suspend the transceiver.
    pub(crate) async fn runtime_suspend(&mut self) {
        self.saved_interface_select = Some(self.regs.read32(REG_INTERFSEL));
        self.regs.write32(REG_INTERFSEL, INTERFSEL_ULPI_12PIN);
        self.force_standby(true);
        if let Err(err) = self.xceiv.set_suspend(true).await {
            warn!("transceiver suspend failed: {}", err);
        }
    }

    /// Runtime-resume path. Without a preceding suspend there is no
    /// snapshot and INTERFSEL is left untouched.
    pub(crate) async fn runtime_resume(&mut self) {
        self.force_standby(false);
        if let Some(saved) = self.saved_interface_select.take() {
            self.regs.write32(REG_INTERFSEL, saved);
        }
        if let Err(err) = self.xceiv.set_suspend(false).await {
            warn!("transceiver resume failed: {}", err);
        }
    }

    /// Debug dump of the wrapper identification/status block.
    pub(crate) fn log_revision(&self) {
        debug!(
            "HS USB OTG: revision 0x{:x}, sysconfig 0x{:02x}, sysstatus 0x{:x}, intrfsel 0x{:x}, simenable 0x{:x}",
            self.regs.read32(REG_REVISION),
            self.regs.read32(REG_SYSCONFIG),
            self.regs.read32(REG_SYSSTATUS),
            self.regs.read32(REG_INTERFSEL),
            self.regs.read32(REG_SIMENABLE),
        );
    }

    fn host_mode(&mut self) {
        self.is_host = true;
    }

    fn peripheral_mode(&mut self) {
        self.is_host = false;
    }

    fn signal_companion(&self, bits: u32) {
        if let Some(companion) = &self.companion {
            if let Err(err) = companion.phy_mailbox(bits) {
                warn!("companion PHY mailbox write failed: {}", err);
            }
        }
    }
}
