//! Historical backfill.
//!
//! - [`MigrationCoordinator`]: offset-paginated batches over eligible orders
//!   with persistent, resumable progress
//! - [`MigrationState`]: the persisted progress record
//! - [`stepper`]: the step abstraction and a cancellable driver loop

mod coordinator;
mod state;
pub mod stepper;

pub use coordinator::{BatchReport, ItemBackfillReport, MigrationCoordinator};
pub use state::{MigrationState, MigrationStatus};
pub use stepper::{
    cancellation, CancelHandle, CancelToken, DriveReport, MigrationCursor, MigrationStepper,
    StepDriver, StepOutcome, Stepper,
};
