//! Controller glue configuration.
//!
//! Static board-level knobs for one controller instance: which electrical
//! PHY interface the board wired up, the host session-wait policy, the idle
//! timer delay, and the line status latched by board code before attach.

use serde::{Deserialize, Serialize};

use crate::otg::MailboxEvent;

/// Physical PHY interface wired to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhyInterface {
    /// On-die PHY over the 8-bit UTMI interface.
    Utmi,
    /// External transceiver over the 12-pin ULPI interface.
    Ulpi,
}

impl Default for PhyInterface {
    fn default() -> Self {
        Self::Ulpi
    }
}

impl PhyInterface {
    /// VBUS teardown on session end is explicit only on UTMI boards; ULPI
    /// transceivers drop the session themselves.
    pub fn needs_vbus_teardown(&self) -> bool {
        matches!(self, Self::Utmi)
    }
}

/// Configuration for one OTG controller glue instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlueConfig {
    /// PHY interface selection programmed into INTERFSEL at attach.
    pub interface: PhyInterface,
    /// Host session-wait policy: when false, the idle timer never runs
    /// while the controller sits in `a_wait_bcon`.
    pub session_wait: bool,
    /// Idle timer delay in milliseconds.
    pub idle_timeout_ms: u64,
    /// Whether a host/peripheral role driver is bound at attach.
    pub role_driver_bound: bool,
    /// Line status latched by board code before attach completed. Anything
    /// other than `unknown` is dispatched synchronously during attach.
    pub initial_status: MailboxEvent,
}

impl Default for GlueConfig {
    fn default() -> Self {
        Self {
            interface: PhyInterface::default(),
            session_wait: true,
            idle_timeout_ms: 3,
            role_driver_bound: false,
            initial_status: MailboxEvent::Unknown,
        }
    }
}
