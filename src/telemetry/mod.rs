//! Output telemetry
//!
//! Engine output state flows one way: the [`Scheduler`] steps the engine, the
//! [`TelemetryPoller`] reads the output feed and watched memory right after,
//! and publishes the result into the [`TelemetryStore`]. UI code only reads
//! from the store, either by pulling [`TelemetryStore::snapshot`] at its own
//! cadence or by subscribing to publishes.
//!
//! ```text
//! Scheduler ──step──> Engine
//!     │
//!     └──tick──> TelemetryPoller ──read_outputs / read_memory──> Engine
//!                      │
//!                      └──publish──> TelemetryStore ──snapshot──> UI
//! ```

pub mod poller;
pub mod scheduler;
pub mod store;

pub use poller::{MemoryWatch, TelemetryPoller};
pub use scheduler::{Scheduler, Stepper};
pub use store::{SubscriptionId, TelemetrySnapshot, TelemetryStore};
