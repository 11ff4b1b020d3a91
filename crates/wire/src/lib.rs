//! Wire-protocol boundary
//!
//! Register-mapped exchange between controllers. Three pieces:
//! [`RegisterSurface`] exposes one driver's tags as addressable
//! registers; [`Link`] is an in-memory mailbox pair connecting two
//! independently stepped instances; [`SoftController`] bundles a
//! driver, an address map, and a link endpoint into a pollable unit.
//!
//! Exchange instructions block within one scan: the protocol layer owns
//! the buffering that makes a transfer appear synchronous even though
//! the remote side steps on its own schedule.

pub mod controller;
pub mod link;
pub mod surface;

pub use controller::SoftController;
pub use link::{Endpoint, Link};
pub use surface::RegisterSurface;
