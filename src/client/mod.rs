//! Device-side delivery pipeline.
//!
//! A [`DeliveryScheduler`] pulls readings from a [`ReadingSource`] and hands
//! them to the [`DeliveryCoordinator`], which seals each one, sends it through
//! a [`Transmitter`] and keeps undelivered blobs in the durable [`Outbox`].

pub mod coordinator;
pub mod outbox;
pub mod scheduler;
pub mod source;
pub mod transmitter;

pub use coordinator::{DeliveryCoordinator, DeliveryReport, DeliveryStatus, RejectPolicy};
pub use outbox::{EntryId, Outbox, OutboxEntry};
pub use scheduler::{DeliveryScheduler, SchedulerHandle};
pub use source::{JsonFileSource, ReadingSource};
pub use transmitter::{HttpTransmitter, Transmitter};
