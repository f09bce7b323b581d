//! Capability Registry for Forge
//!
//! The registry is the directory of installable capability modules that the
//! assistant loads on its refresh cycle. Forge publishes approved candidates
//! into it; nothing in this crate knows how modules are generated.
//!
//! ## Guarantees
//!
//! - Names are validated identifiers (`CapabilityName`), never raw paths.
//! - `install` is all-or-nothing: a name collision or write failure leaves
//!   prior contents untouched.
//! - Check-then-write is atomic with respect to concurrent publishers.
//!
//! ## Key Components
//!
//! - `CapabilityRegistry`: backend-agnostic async trait
//! - `FsCapabilityRegistry`: one `<name>.rs` file per module
//! - `fakes::MemoryCapabilityRegistry`: in-memory double for tests

mod error;
pub mod fakes;
mod fs_registry;
pub mod registry_traits;

pub use error::RegistryError;
pub use fs_registry::FsCapabilityRegistry;
pub use registry_traits::{
    CapabilityName, CapabilityRegistry, InstallReceipt, RegistryResult, MODULE_EXTENSION,
};
