//! The forge controller: approval gate, then a bounded
//! research → code → test → review → publish loop.

pub mod abort;
pub mod controller;
pub mod policy;

pub use abort::{AbortHandle, AbortRequest};
pub use controller::{Forge, ForgeStages};
pub use policy::{ForgePolicy, DEFAULT_MAX_ATTEMPTS};
