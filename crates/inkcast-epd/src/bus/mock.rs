//! Recording bus, lines and delay.
//!
//! Every call is appended to a shared [`Transcript`], which can be decoded
//! into the command/data stream the controller would have seen. Used by the
//! tests and by dry runs without hardware.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{BusConfig, Delay, DigitalLine, PhysicalBus};
use crate::epd::{ControlLines, DriverConfig, EpdDevice};
use crate::{Error, Result};

/// One recorded hardware interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Open(BusConfig),
    Write(Vec<u8>),
    Close,
    SetHigh(&'static str),
    SetLow(&'static str),
    Read(&'static str, bool),
    Release(&'static str),
    Delay(Duration),
}

/// Bytes as the controller sees them, split by the data/command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Command(u8),
    Data(Vec<u8>),
}

/// Shared, ordered log of transactions.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<Transaction>>>);

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, transaction: Transaction) {
        self.0.lock().unwrap().push(transaction);
    }

    /// Returns a copy of everything recorded so far.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    /// Decodes bus writes into commands and data using the level of the
    /// `dc` line at the time of each write. Consecutive data writes merge.
    pub fn wire_log(&self) -> Vec<WireEvent> {
        let mut events: Vec<WireEvent> = Vec::new();
        let mut data_mode = false;
        for transaction in self.0.lock().unwrap().iter() {
            match transaction {
                Transaction::SetHigh(line) if *line == DC => data_mode = true,
                Transaction::SetLow(line) if *line == DC => data_mode = false,
                Transaction::Write(bytes) if data_mode => match events.last_mut() {
                    Some(WireEvent::Data(data)) => data.extend_from_slice(bytes),
                    _ => events.push(WireEvent::Data(bytes.clone())),
                },
                Transaction::Write(bytes) => {
                    events.extend(bytes.iter().map(|&b| WireEvent::Command(b)));
                }
                _ => {}
            }
        }
        events
    }

    /// Returns all recorded delays in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|t| match t {
                Transaction::Delay(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    /// Total time the delays would have taken.
    pub fn elapsed(&self) -> Duration {
        self.delays().iter().sum()
    }
}

const DC: &str = "dc";

/// Recording bus.
#[derive(Debug)]
pub struct MockBus {
    transcript: Transcript,
    open: bool,
    fail_open: bool,
    fail_writes: bool,
}

impl MockBus {
    pub fn new(transcript: &Transcript) -> Self {
        Self {
            transcript: transcript.clone(),
            open: false,
            fail_open: false,
            fail_writes: false,
        }
    }

    /// A bus whose `open` always fails.
    pub fn failing_open(transcript: &Transcript) -> Self {
        Self {
            fail_open: true,
            ..Self::new(transcript)
        }
    }

    /// A bus that opens but rejects every write.
    pub fn failing_writes(transcript: &Transcript) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(transcript)
        }
    }
}

impl PhysicalBus for MockBus {
    fn open(&mut self, config: BusConfig) -> Result<()> {
        if self.fail_open {
            return Err(Error::bus(
                "open",
                io::Error::new(io::ErrorKind::NotFound, "no such device"),
            ));
        }
        self.transcript.push(Transaction::Open(config));
        self.open = true;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if !self.open || self.fail_writes {
            return Err(Error::bus(
                "write",
                io::Error::new(io::ErrorKind::BrokenPipe, "write rejected"),
            ));
        }
        self.transcript.push(Transaction::Write(data.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.transcript.push(Transaction::Close);
            self.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Recording control line.
///
/// Reads come from a script first; once it runs out every read returns the
/// fallback level.
#[derive(Debug)]
pub struct MockLine {
    name: &'static str,
    transcript: Transcript,
    reads: VecDeque<bool>,
    fallback: bool,
}

impl MockLine {
    pub fn new(name: &'static str, transcript: &Transcript) -> Self {
        Self {
            name,
            transcript: transcript.clone(),
            reads: VecDeque::new(),
            fallback: true,
        }
    }

    /// Queues levels returned by the next reads.
    pub fn with_reads(mut self, reads: impl IntoIterator<Item = bool>) -> Self {
        self.reads.extend(reads);
        self
    }

    /// Level returned once the script is exhausted.
    pub fn with_fallback(mut self, level: bool) -> Self {
        self.fallback = level;
        self
    }
}

impl DigitalLine for MockLine {
    fn set_high(&mut self) -> Result<()> {
        self.transcript.push(Transaction::SetHigh(self.name));
        Ok(())
    }

    fn set_low(&mut self) -> Result<()> {
        self.transcript.push(Transaction::SetLow(self.name));
        Ok(())
    }

    fn read(&mut self) -> Result<bool> {
        let level = self.reads.pop_front().unwrap_or(self.fallback);
        self.transcript.push(Transaction::Read(self.name, level));
        Ok(level)
    }

    fn release(&mut self) -> Result<()> {
        self.transcript.push(Transaction::Release(self.name));
        Ok(())
    }
}

/// Delay that records instead of sleeping.
#[derive(Debug)]
pub struct MockDelay {
    transcript: Transcript,
}

impl MockDelay {
    pub fn new(transcript: &Transcript) -> Self {
        Self {
            transcript: transcript.clone(),
        }
    }
}

impl Delay for MockDelay {
    fn delay(&mut self, duration: Duration) {
        self.transcript.push(Transaction::Delay(duration));
    }
}

/// Recording lines for every control signal; the busy line always reads idle.
pub fn mock_lines(transcript: &Transcript) -> ControlLines<MockLine> {
    ControlLines {
        reset: MockLine::new("reset", transcript),
        data_command: MockLine::new(DC, transcript),
        busy: MockLine::new("busy", transcript),
        power: MockLine::new("power", transcript),
    }
}

/// A complete recording device and its transcript.
pub fn mock_device(
    config: DriverConfig,
) -> (EpdDevice<MockBus, MockLine, MockDelay>, Transcript) {
    let transcript = Transcript::new();
    let device = EpdDevice::new(
        MockBus::new(&transcript),
        mock_lines(&transcript),
        MockDelay::new(&transcript),
        config,
    );
    (device, transcript)
}
