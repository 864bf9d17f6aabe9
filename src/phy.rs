//! Transceiver and companion PHY seams.
//!
//! The controller itself never drives VBUS or sequences PHY power directly;
//! it talks to an external transceiver (line-level glue) and, on boards that
//! have one, a companion PHY power controller reached through a status
//! mailbox.

use async_trait::async_trait;

use crate::error::Result;

// Companion PHY status mailbox bits. Downstream power sequencing keys off
// these whenever the VALID/IDDIG/SESSEND picture changes.
pub const PHY_AVALID: u32 = 1 << 0;
pub const PHY_BVALID: u32 = 1 << 1;
pub const PHY_VBUSVALID: u32 = 1 << 2;
pub const PHY_SESSEND: u32 = 1 << 3;
pub const PHY_IDDIG: u32 = 1 << 4;

/// External USB transceiver bound to the controller.
///
/// Boards hook this up through ULPI or an on-die UTMI PHY; either way the
/// glue only needs init, suspend control, and the VBUS line.
#[async_trait]
pub trait Transceiver: Send + Sync {
    /// One-time transceiver bring-up at attach.
    async fn init(&self) -> Result<()>;

    /// Enter or leave transceiver low-power suspend.
    async fn set_suspend(&self, suspend: bool) -> Result<()>;

    /// Physically raise or drop VBUS.
    async fn set_vbus(&self, on: bool) -> Result<()>;
}

/// Companion PHY power controller.
///
/// Signaled with the `PHY_*` status bits whenever the line state picture
/// changes. Failures are non-fatal to the transition in progress.
pub trait CompanionPhy: Send + Sync {
    fn phy_mailbox(&self, bits: u32) -> Result<()>;
}
