//! Panel session lifecycle.
//!
//! A session initializes the panel, runs one task against it and always puts
//! it back to sleep, whether the task finished, was cancelled, failed or
//! panicked.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::bus::{Delay, DigitalLine, PhysicalBus};
use crate::epd::{EpdDevice, PanelState};
use crate::Result;

/// Shared flag set when the user asks to stop.
///
/// Synchronous code polls [`CancelFlag::is_cancelled`]; async code can await
/// [`CancelFlag::cancelled`].
#[derive(Debug, Clone)]
pub struct CancelFlag(Arc<watch::Sender<bool>>);

impl Default for CancelFlag {
    fn default() -> Self {
        Self(Arc::new(watch::Sender::new(false)))
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once [`CancelFlag::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.0.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// Puts the panel to sleep when dropped unless it already is.
struct Session<'a, B, L, D>
where
    B: PhysicalBus,
    L: DigitalLine,
    D: Delay,
{
    device: &'a mut EpdDevice<B, L, D>,
}

impl<B, L, D> Session<'_, B, L, D>
where
    B: PhysicalBus,
    L: DigitalLine,
    D: Delay,
{
    fn teardown(&mut self) -> Result<()> {
        if self.device.state() == PanelState::Asleep {
            return Ok(());
        }
        self.device.sleep()
    }
}

impl<B, L, D> Drop for Session<'_, B, L, D>
where
    B: PhysicalBus,
    L: DigitalLine,
    D: Delay,
{
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Panel teardown failed: {}", e);
        }
    }
}

/// Runs `task` between `initialize` and `sleep`.
///
/// Cancellation is checked before and after initialization; the task is
/// expected to check `cancel` between its own steps and return
/// [`Outcome::Cancelled`] when set. If both the task and the teardown fail,
/// the task's error is returned and the teardown error is logged.
pub fn run<B, L, D, F>(device: &mut EpdDevice<B, L, D>, cancel: &CancelFlag, task: F) -> Result<Outcome>
where
    B: PhysicalBus,
    L: DigitalLine,
    D: Delay,
    F: FnOnce(&mut EpdDevice<B, L, D>, &CancelFlag) -> Result<Outcome>,
{
    let mut session = Session { device };
    let result = execute(&mut *session.device, cancel, task);
    let teardown = session.teardown();
    drop(session);

    match (result, teardown) {
        (Ok(outcome), Ok(())) => {
            if outcome == Outcome::Cancelled {
                info!("Session cancelled, panel is asleep");
            }
            Ok(outcome)
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(teardown_error)) => {
            warn!("Panel teardown also failed: {}", teardown_error);
            Err(e)
        }
    }
}

fn execute<B, L, D, F>(device: &mut EpdDevice<B, L, D>, cancel: &CancelFlag, task: F) -> Result<Outcome>
where
    B: PhysicalBus,
    L: DigitalLine,
    D: Delay,
    F: FnOnce(&mut EpdDevice<B, L, D>, &CancelFlag) -> Result<Outcome>,
{
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    device.initialize()?;
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    task(device, cancel)
}
