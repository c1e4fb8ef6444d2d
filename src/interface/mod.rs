//! Module definitions for the bridgeposix interface
//!
//! ## Interface Module
//!
//! Everything that touches the host (files under the storage root, host
//! sockets, the entropy source) goes through this module, so the rest of the
//! crate only sees the narrow surface defined here.

mod comm;
pub mod errnos;
mod file;
mod misc;
mod pipe;
pub mod types;
pub use comm::*;
pub use errnos::*;
pub use file::*;
pub use misc::*;
pub use pipe::*;
pub use types::*;
