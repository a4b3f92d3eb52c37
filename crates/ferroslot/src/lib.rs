//! Snowflake-style IDs issued from worker slots leased through a coordination
//! service.
//!
//! A process claims one worker slot through a [`WorkerRegistry`], then
//! derives IDs locally from the slot, the clock and a sequence. The
//! [`IdGeneratorService`] ties issuance to the liveness of that lease: it
//! stops issuing as soon as connectivity is lost and resumes after the slot
//! is re-acquired.
//!
//! IDs are unique across processes and strictly increasing per instance.
//! There is no ordering guarantee between processes.

extern crate alloc;

mod algorithm;
mod bridge;
mod error;
mod id;
mod registry;
mod service;
mod time;

pub use crate::algorithm::*;
pub use crate::bridge::*;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::registry::*;
pub use crate::service::*;
pub use crate::time::*;
