//! Holds a pseudo-terminal open for a spawned child process so other
//! processes can attach, view, or fetch recent output later.
//!
//! [`start`] spawns the session and returns a [`Holder`] handle; the
//! remaining free functions and [`peer::connect`] are the registry/client
//! half of the contract, usable independently of whether this process
//! started the session being queried.

mod client;
mod error;
mod holder;
pub mod listener;
mod log;
pub mod peer;
mod pty;

pub use error::HolderError;
pub use holder::{list_sessions, remove_session, start, Holder, StartOptions};
pub use holdpty_protocol::Mode;
pub use holdpty_registry::SessionEntry;
pub use peer::{connect as connect_peer, PeerConnection};
