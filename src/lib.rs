//! Appointment validation and derivation engine.
//!
//! An [`Appointment`](appointment::Appointment) binds a provider, a recipient and a list of
//! activities to a start time. Validation derives its end and price from the activity
//! catalog and checks the provider's existing appointments and blocked slots for overlap.
//! Storage is reached only through the collaborator traits in [`engine`]; [`engine::Scheduler`]
//! is a ready-made implementation backed by memory and a write-ahead log.

pub mod appointment;
pub mod catalog;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
