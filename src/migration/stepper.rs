//! Step-wise execution of long jobs.
//!
//! A [`Stepper`] maps (state, step size) to (new state, done). Any scheduler
//! can call it one step per request; [`StepDriver`] is a plain loop that
//! checks for cancellation between steps.

use super::coordinator::MigrationCoordinator;
use crate::error::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Output of one step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome<S> {
    pub state: S,
    pub done: bool,
}

/// A job that advances in bounded steps.
pub trait Stepper: Send + Sync {
    type State: Clone + Send;

    fn step(&self, state: Self::State, step_size: usize) -> Result<StepOutcome<Self::State>>;
}

/// Position of a backfill run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationCursor {
    pub offset: u64,
}

/// Backfill as a stepper: each step is one `migrate_batch`.
pub struct MigrationStepper {
    coordinator: Arc<MigrationCoordinator>,
}

impl MigrationStepper {
    pub fn new(coordinator: Arc<MigrationCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl Stepper for MigrationStepper {
    type State = MigrationCursor;

    fn step(&self, state: MigrationCursor, step_size: usize) -> Result<StepOutcome<MigrationCursor>> {
        let report = self.coordinator.migrate_batch(state.offset, step_size)?;
        Ok(StepOutcome {
            state: MigrationCursor {
                offset: state.offset + report.fetched,
            },
            done: report.status.is_terminal(),
        })
    }
}

/// Requests cancellation of a running [`StepDriver`].
#[derive(Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // A full channel already carries a cancel request
        if let Err(TrySendError::Disconnected(_)) = self.tx.try_send(()) {
            tracing::debug!("cancel requested after driver finished");
        }
    }
}

/// Observed by a [`StepDriver`] between steps.
#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// The request stays pending, so every clone of the token sees it.
    pub fn is_cancelled(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// A connected handle/token pair.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (CancelHandle { tx }, CancelToken { rx })
}

/// How a drive ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveReport<S> {
    pub state: S,
    pub steps: u64,
    /// False when cancelled before the stepper reported done.
    pub finished: bool,
}

/// Runs a stepper to completion.
pub struct StepDriver<T: Stepper> {
    stepper: T,
    step_size: usize,
    cancel: Option<CancelToken>,
    progress: Option<Sender<T::State>>,
}

impl<T: Stepper> StepDriver<T> {
    pub fn new(stepper: T, step_size: usize) -> Self {
        Self {
            stepper,
            step_size,
            cancel: None,
            progress: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Send the state after every step. Never blocks; updates that do not fit
    /// a bounded channel are dropped.
    pub fn with_progress(mut self, tx: Sender<T::State>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn run(&self, initial: T::State) -> Result<DriveReport<T::State>> {
        let mut state = initial;
        let mut steps = 0;

        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::info!(steps, "step driver cancelled");
                return Ok(DriveReport {
                    state,
                    steps,
                    finished: false,
                });
            }

            let outcome = self.stepper.step(state, self.step_size)?;
            steps += 1;
            state = outcome.state;

            if let Some(tx) = &self.progress {
                let _ = tx.try_send(state.clone());
            }

            if outcome.done {
                return Ok(DriveReport {
                    state,
                    steps,
                    finished: true,
                });
            }
        }
    }
}
