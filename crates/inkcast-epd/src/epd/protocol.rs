//! Panel controller protocol definitions.
//!
//! Protocol structure:
//! - Every transfer is a command byte (DC low) followed by zero or more data
//!   bytes (DC high).
//! - Pixels are 4-bit palette indices, two per byte, high nibble first.
//! - The busy line reads high when the controller is idle.

use std::time::Duration;

use crate::{EPD_HEIGHT, EPD_WIDTH};

/// Size of one full frame on the wire.
pub const FRAME_BYTES: usize = (EPD_WIDTH as usize * EPD_HEIGHT as usize) / 2;

/// Data byte that accompanies the deep sleep command.
pub const DEEP_SLEEP_DATA: u8 = 0xA5;

/// Reset pulse: high, low, high, each held for its duration.
pub const RESET_HOLD: Duration = Duration::from_millis(20);
pub const RESET_LOW: Duration = Duration::from_millis(2);

/// Settle time after the first idle following reset.
pub const POST_RESET_SETTLE: Duration = Duration::from_millis(30);

/// Time the panel needs to latch deep sleep before the lines drop.
pub const SLEEP_SETTLE: Duration = Duration::from_secs(2);

/// Controller commands and configuration registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Panel setting.
    Psr = 0x00,
    /// Power setting.
    Pwr = 0x01,
    /// Power off.
    PowerOff = 0x02,
    /// Power off sequence setting.
    Pofs = 0x03,
    /// Power on.
    PowerOn = 0x04,
    /// Booster soft start 1.
    Btst1 = 0x05,
    /// Booster soft start 2.
    Btst2 = 0x06,
    /// Deep sleep.
    DeepSleep = 0x07,
    /// Booster soft start 3.
    Btst3 = 0x08,
    /// Start of frame data.
    DataStartTransmission = 0x10,
    /// Display refresh.
    DisplayRefresh = 0x12,
    /// Internal power control.
    Ipc = 0x13,
    /// PLL control.
    Pll = 0x30,
    /// Temperature sensor enable.
    Tse = 0x41,
    /// VCOM and data interval setting.
    Cdi = 0x50,
    /// Gate/source non-overlap period.
    Tcon = 0x60,
    /// Resolution setting.
    Tres = 0x61,
    /// VCOM DC setting.
    Vdcs = 0x82,
    /// VCOM DC timing.
    TVdcs = 0x84,
    /// Auto gate ID.
    Agid = 0x86,
    /// Command header unlock.
    Cmdh = 0xAA,
    /// Cascade setting.
    Ccset = 0xE0,
    /// Power saving.
    Pws = 0xE3,
    /// Temperature sensor setting.
    Tsset = 0xE6,
}

/// One entry of the initialization table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStep {
    pub command: Command,
    pub data: &'static [u8],
}

/// Encodes a resolution as big-endian 16-bit width and height.
pub const fn resolution_bytes(width: u32, height: u32) -> [u8; 4] {
    [
        (width >> 8) as u8,
        (width & 0xFF) as u8,
        (height >> 8) as u8,
        (height & 0xFF) as u8,
    ]
}

const RESOLUTION: [u8; 4] = resolution_bytes(EPD_WIDTH, EPD_HEIGHT);

/// Register setup sent after reset, in order.
pub const INIT_SEQUENCE: [InitStep; 19] = [
    InitStep { command: Command::Cmdh, data: &[0x49, 0x55, 0x20, 0x08, 0x09, 0x18] },
    InitStep { command: Command::Pwr, data: &[0x3F, 0x00, 0x32, 0x2A, 0x0E, 0x2A] },
    InitStep { command: Command::Psr, data: &[0x5F, 0x69] },
    InitStep { command: Command::Pofs, data: &[0x00, 0x54, 0x00, 0x44] },
    InitStep { command: Command::Btst1, data: &[0x40, 0x1F, 0x1F, 0x2C] },
    InitStep { command: Command::Btst2, data: &[0x6F, 0x1F, 0x1F, 0x22] },
    InitStep { command: Command::Btst3, data: &[0x6F, 0x1F, 0x1F, 0x22] },
    InitStep { command: Command::Ipc, data: &[0x00, 0x04] },
    InitStep { command: Command::Pll, data: &[0x3C] },
    InitStep { command: Command::Tse, data: &[0x00] },
    InitStep { command: Command::Cdi, data: &[0x3F] },
    InitStep { command: Command::Tcon, data: &[0x02, 0x00] },
    InitStep { command: Command::Tres, data: &RESOLUTION },
    InitStep { command: Command::Vdcs, data: &[0x1E] },
    InitStep { command: Command::TVdcs, data: &[0x00] },
    InitStep { command: Command::Agid, data: &[0x00] },
    InitStep { command: Command::Pws, data: &[0x2F] },
    InitStep { command: Command::Ccset, data: &[0x00] },
    InitStep { command: Command::Tsset, data: &[0x00] },
];
