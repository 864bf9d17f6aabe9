//! USB OTG transceiver controller glue layer.
//!
//! Decides whether a dual-role USB port acts as host or peripheral, reacts
//! to VBUS/ID-pin line events delivered asynchronously by a PHY or
//! companion chip, drives the hardware session accordingly, and powers the
//! port down when it sits idle. The hardware itself is reached through a
//! small register-bus seam, so the crate runs against real MMIO, a
//! simulator, or the in-memory register file used by the tests.

pub mod config;
pub mod error;
pub mod events;
pub mod glue;
pub mod otg;
pub mod phy;
pub mod power;
pub mod regs;

pub use config::{GlueConfig, PhyInterface};
pub use error::{GlueError, Result};
pub use events::{LineEvent, LineEventBus};
pub use glue::{GlueHandle, GlueParts, GlueState, OtgGlue};
pub use otg::{MailboxEvent, OtgState};
