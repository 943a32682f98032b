//! Panel controller driver.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::packing::{pack, solid_frame};
use super::protocol::{
    Command, DEEP_SLEEP_DATA, FRAME_BYTES, INIT_SEQUENCE, POST_RESET_SETTLE, RESET_HOLD,
    RESET_LOW, SLEEP_SETTLE,
};
use crate::bus::{BusConfig, Delay, DigitalLine, PhysicalBus};
use crate::canvas::Canvas;
use crate::palette::PaletteColor;
use crate::{Error, Result, EPD_HEIGHT, EPD_WIDTH};

const MIN_BUSY_POLL: Duration = Duration::from_millis(1);

/// Driver lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelState {
    /// Lines acquired, nothing sent yet.
    #[default]
    Uninitialized,
    /// Power line up and bus open, configuration in progress.
    PoweredUp,
    /// Configured and ready for a frame.
    Idle,
    /// Waiting on the busy line.
    Busy,
    /// Deep sleep entered and resources released.
    Asleep,
}

impl std::fmt::Display for PanelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanelState::Uninitialized => write!(f, "uninitialized"),
            PanelState::PoweredUp => write!(f, "powered up"),
            PanelState::Idle => write!(f, "idle"),
            PanelState::Busy => write!(f, "busy"),
            PanelState::Asleep => write!(f, "asleep"),
        }
    }
}

/// The four control lines of the panel connector.
#[derive(Debug)]
pub struct ControlLines<L> {
    pub reset: L,
    pub data_command: L,
    /// Input; high when the controller is idle.
    pub busy: L,
    pub power: L,
}

/// Which connector line a [`ControlLines`] slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Reset,
    DataCommand,
    Busy,
    Power,
}

impl LineRole {
    /// Acquisition order.
    pub const ALL: [LineRole; 4] = [
        LineRole::Reset,
        LineRole::DataCommand,
        LineRole::Busy,
        LineRole::Power,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LineRole::Reset => "reset",
            LineRole::DataCommand => "dc",
            LineRole::Busy => "busy",
            LineRole::Power => "power",
        }
    }
}

impl<L: DigitalLine> ControlLines<L> {
    /// Opens every line in [`LineRole::ALL`] order.
    ///
    /// If one fails, the lines opened before it are released, newest first,
    /// and that failure is returned.
    pub fn acquire<F>(mut open: F) -> Result<Self>
    where
        F: FnMut(LineRole) -> Result<L>,
    {
        let mut reset = open(LineRole::Reset)?;
        let mut data_command = open(LineRole::DataCommand)
            .inspect_err(|_| release_opened(&mut [(LineRole::Reset, &mut reset)]))?;
        let mut busy = open(LineRole::Busy).inspect_err(|_| {
            release_opened(&mut [
                (LineRole::DataCommand, &mut data_command),
                (LineRole::Reset, &mut reset),
            ])
        })?;
        let power = open(LineRole::Power).inspect_err(|_| {
            release_opened(&mut [
                (LineRole::Busy, &mut busy),
                (LineRole::DataCommand, &mut data_command),
                (LineRole::Reset, &mut reset),
            ])
        })?;

        Ok(Self {
            reset,
            data_command,
            busy,
            power,
        })
    }
}

fn release_opened<L: DigitalLine>(lines: &mut [(LineRole, &mut L)]) {
    for (role, line) in lines.iter_mut() {
        if let Err(e) = line.release() {
            warn!("Failed to release {} line: {}", role.name(), e);
        }
    }
}

/// Driver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub bus: BusConfig,
    /// Interval between busy line reads. Zero is raised to one millisecond.
    pub busy_poll: Duration,
    /// Give up waiting on the busy line after this long; `None` waits forever.
    pub busy_timeout: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            busy_poll: Duration::from_millis(5),
            busy_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Driver for one panel session.
///
/// A session is one-shot: after [`EpdDevice::sleep`] the bus is closed and
/// the lines are released, so a new device must be built to use the panel
/// again.
pub struct EpdDevice<B, L, D> {
    bus: B,
    lines: ControlLines<L>,
    delay: D,
    config: DriverConfig,
    state: PanelState,
}

impl<B, L, D> EpdDevice<B, L, D>
where
    B: PhysicalBus,
    L: DigitalLine,
    D: Delay,
{
    /// Creates a driver over acquired hardware. Nothing is sent until
    /// [`EpdDevice::initialize`].
    pub fn new(bus: B, lines: ControlLines<L>, delay: D, mut config: DriverConfig) -> Self {
        // Each poll must advance the busy timeout
        if config.busy_poll.is_zero() {
            warn!("Busy poll interval of zero raised to {:?}", MIN_BUSY_POLL);
            config.busy_poll = MIN_BUSY_POLL;
        }
        Self {
            bus,
            lines,
            delay,
            config,
            state: PanelState::Uninitialized,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn expect_state(&self, operation: &'static str, allowed: &[PanelState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Primitives need an open bus and a panel that is not asleep.
    fn expect_awake(&self, operation: &'static str) -> Result<()> {
        self.expect_state(
            operation,
            &[PanelState::PoweredUp, PanelState::Idle, PanelState::Busy],
        )
    }

    /// Powers the panel, opens the bus, resets the controller and sends the
    /// register setup.
    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state("initialize", &[PanelState::Uninitialized])?;
        info!("Initializing e-paper panel");

        self.lines.power.set_high()?;
        self.bus.open(self.config.bus)?;
        self.state = PanelState::PoweredUp;

        self.reset()?;
        self.wait_until_idle()?;
        self.delay.delay(POST_RESET_SETTLE);

        for step in INIT_SEQUENCE.iter() {
            self.send_command(step.command)?;
            for &value in step.data {
                self.send_data(value)?;
            }
        }
        debug!("Sent {} init commands", INIT_SEQUENCE.len());

        self.state = PanelState::Idle;
        Ok(())
    }

    /// Hardware reset pulse.
    fn reset(&mut self) -> Result<()> {
        self.lines.reset.set_high()?;
        self.delay.delay(RESET_HOLD);
        self.lines.reset.set_low()?;
        self.delay.delay(RESET_LOW);
        self.lines.reset.set_high()?;
        self.delay.delay(RESET_HOLD);
        Ok(())
    }

    /// Sends a command byte (DC low).
    pub fn send_command(&mut self, command: Command) -> Result<()> {
        self.expect_awake("send command")?;
        self.lines.data_command.set_low()?;
        self.bus.write_bytes(&[command as u8])
    }

    /// Sends a single data byte (DC high).
    pub fn send_data(&mut self, data: u8) -> Result<()> {
        self.expect_awake("send data")?;
        self.lines.data_command.set_high()?;
        self.bus.write_bytes(&[data])
    }

    /// Sends a block of data bytes (DC high).
    pub fn send_bulk_data(&mut self, data: &[u8]) -> Result<()> {
        self.expect_awake("send data")?;
        self.lines.data_command.set_high()?;
        self.bus.write_bytes(data)
    }

    /// Polls the busy line until the controller reports idle.
    pub fn wait_until_idle(&mut self) -> Result<()> {
        self.expect_awake("wait for idle")?;
        let previous = self.state;
        self.state = PanelState::Busy;

        let mut waited = Duration::ZERO;
        let mut polls: u32 = 0;
        while !self.lines.busy.read()? {
            if let Some(timeout) = self.config.busy_timeout {
                if waited >= timeout {
                    warn!("Panel still busy after {:?} ({} polls)", waited, polls);
                    return Err(Error::BusyTimeout(timeout));
                }
            }
            self.delay.delay(self.config.busy_poll);
            waited += self.config.busy_poll;
            polls += 1;
        }

        if polls > 0 {
            debug!("Panel idle after {} polls (~{:?})", polls, waited);
        }
        self.state = previous;
        Ok(())
    }

    /// Sends a full frame and refreshes the panel.
    pub fn render(&mut self, canvas: &Canvas) -> Result<()> {
        let (width, height) = canvas.dimensions();
        if (width, height) != (EPD_WIDTH, EPD_HEIGHT) {
            return Err(Error::DimensionMismatch {
                expected: (EPD_WIDTH, EPD_HEIGHT),
                actual: (width, height),
            });
        }
        let frame = pack(canvas)?;
        self.expect_state("render", &[PanelState::Idle])?;

        info!("Rendering {}x{} frame", width, height);
        self.transmit_frame(&frame)?;
        self.refresh()
    }

    /// Fills the panel with a single color.
    pub fn clear(&mut self, color: PaletteColor) -> Result<()> {
        self.expect_state("clear", &[PanelState::Idle])?;

        info!("Clearing panel to {}", color);
        let frame = solid_frame(color, FRAME_BYTES);
        self.transmit_frame(&frame)?;
        self.refresh()
    }

    fn transmit_frame(&mut self, frame: &[u8]) -> Result<()> {
        debug_assert_eq!(frame.len(), FRAME_BYTES);
        self.send_command(Command::DataStartTransmission)?;
        self.send_bulk_data(frame)?;
        debug!("Frame transmitted ({} bytes)", frame.len());
        Ok(())
    }

    /// Power on, refresh, power off; each step waits for idle.
    pub fn refresh(&mut self) -> Result<()> {
        self.expect_state("refresh", &[PanelState::Idle])?;
        debug!("Refreshing panel");
        self.send_command(Command::PowerOn)?;
        self.wait_until_idle()?;

        self.send_command(Command::DisplayRefresh)?;
        self.send_data(0x00)?;
        self.wait_until_idle()?;

        self.send_command(Command::PowerOff)?;
        self.send_data(0x00)?;
        self.wait_until_idle()?;

        info!("Panel refresh complete");
        Ok(())
    }

    /// Enters deep sleep, closes the bus and releases every line.
    ///
    /// Runs to the end even if a step fails and reports the first failure.
    /// The deep sleep command is skipped when the bus never opened.
    pub fn sleep(&mut self) -> Result<()> {
        self.expect_state(
            "sleep",
            &[
                PanelState::Uninitialized,
                PanelState::PoweredUp,
                PanelState::Idle,
                PanelState::Busy,
            ],
        )?;
        info!("Putting panel to sleep");

        let mut first_error = None;
        if self.bus.is_open() {
            let sent = self
                .send_command(Command::DeepSleep)
                .and_then(|_| self.send_data(DEEP_SLEEP_DATA));
            if sent.is_ok() {
                self.delay.delay(SLEEP_SETTLE);
            }
            keep_first(&mut first_error, sent);
            keep_first(&mut first_error, self.bus.close());
        }

        keep_first(&mut first_error, self.lines.reset.set_low());
        keep_first(&mut first_error, self.lines.data_command.set_low());
        keep_first(&mut first_error, self.lines.power.set_low());

        keep_first(&mut first_error, self.lines.reset.release());
        keep_first(&mut first_error, self.lines.data_command.release());
        keep_first(&mut first_error, self.lines.power.release());
        keep_first(&mut first_error, self.lines.busy.release());

        self.state = PanelState::Asleep;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn keep_first(slot: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        warn!("Teardown step failed: {}", e);
        slot.get_or_insert(e);
    }
}
