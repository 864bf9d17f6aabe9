//! OTG role/session states and mailbox event kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// OTG role/session state.
///
/// `A*` states mean this end is the power-sourcing, host-capable side of the
/// cable; `B*` means the peripheral side. Exactly one state holds at a time
/// and every read or write goes through the per-controller lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtgState {
    /// Host-capable side, session not started.
    AIdle,
    /// Session started, waiting for a peripheral to connect.
    AWaitBcon,
    /// Operating as host.
    AHost,
    /// Host session suspended on the bus.
    ASuspend,
    /// Peripheral side (or no session).
    BIdle,
}

impl fmt::Display for OtgState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AIdle => "a_idle",
            Self::AWaitBcon => "a_wait_bcon",
            Self::AHost => "a_host",
            Self::ASuspend => "a_suspend",
            Self::BIdle => "b_idle",
        };
        f.write_str(name)
    }
}

/// Line-state event delivered through the PHY mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxEvent {
    /// ID pin grounded: host-capable cable end attached.
    IdGround,
    /// VBUS present at valid voltage.
    VbusValid,
    /// ID pin floated.
    IdFloat,
    /// VBUS dropped.
    VbusOff,
    /// Nothing reported yet.
    Unknown,
}

impl Default for MailboxEvent {
    fn default() -> Self {
        Self::Unknown
    }
}

impl MailboxEvent {
    /// Whether this event makes the session wake-relevant (the wake guard
    /// must be held before its dispatch is scheduled).
    pub fn grants_wake(&self) -> bool {
        matches!(self, Self::IdGround | Self::VbusValid)
    }
}

impl fmt::Display for MailboxEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IdGround => "id_ground",
            Self::VbusValid => "vbus_valid",
            Self::IdFloat => "id_float",
            Self::VbusOff => "vbus_off",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
