//! Homelink Platform
//!
//! The single account-wide event-stream connection and the REST funnel to
//! the appliance platform:
//!
//! - **SSE framing**: incremental parsing of the event stream into frames
//!   and platform messages.
//! - **Connection supervision**: reconnect with exponential backoff, idle
//!   re-synchronization, and rate-limit suspension, published as an
//!   observable [`ConnectionState`](homelink_core::ConnectionState).
//! - **REST funnel**: every platform call flows through [`PlatformClient`]
//!   so "refresh token and retry once" on 401 is enforced in one place.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod backoff;
mod client;
mod error;
mod sse;
mod supervisor;

pub use backoff::*;
pub use client::*;
pub use error::*;
pub use sse::*;
pub use supervisor::*;
