//! Client-side transport for ipcmsg.
//!
//! Owns the connection lifecycle: resolve a socket path (explicit or via
//! discovery), send exactly one message, read exactly one response, and
//! classify anything that goes wrong.

pub mod socket;

pub use socket::{resolve_and_send, send_message};
