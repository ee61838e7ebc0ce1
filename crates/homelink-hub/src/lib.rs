//! Homelink Hub
//!
//! The local side of the bridge: a registry of device handles mirroring the
//! user's selected appliances, the reconciler that keeps the registry
//! aligned with the selection, and the router that dispatches stream events
//! and connection signals to the right handle.
//!
//! Failure isolation is the organizing rule here: anything that affects one
//! appliance (missing handle, driver error, unsupported type) is logged and
//! contained; only credential- or connection-level failures surface, and
//! those as observable state rather than as crashes.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod driver;
mod error;
mod generic;
mod hub;
mod reconcile;
mod registry;
mod router;

pub use config::*;
pub use driver::*;
pub use error::*;
pub use generic::*;
pub use hub::*;
pub use reconcile::*;
pub use registry::*;
pub use router::*;
