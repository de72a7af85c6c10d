//! Running a call
//!
//! [`Startup`] builds the components in order and hands a [`CallCore`] to the
//! actor behind a [`CallClient`]. The UI talks to the client; the transport
//! talks to the actor's room event queue.

pub mod actor;
pub mod core;
pub mod startup;

pub use actor::{CallClient, CallCommand, CallSnapshot, collect_until_ended};
pub use self::core::{CallCore, CallFlow};
pub use startup::{Collaborators, Startup, StartupOutcome};
