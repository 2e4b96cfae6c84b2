//! A minimal interactive terminal chat client.
//!
//! Each module focuses on one responsibility:
//!
//! - [`config`] supplies defaults and the optional `config.toml` overrides.
//! - [`protocol`] frames newline-delimited chat messages over a byte stream
//!   and tags orderly close as its own decode result.
//! - [`client`] owns the raw-mode terminal and runs the duplexed event loop
//!   that multiplexes keystrokes with server messages.
//!
//! Unit tests live alongside each module; the wire-level tests in `tests/`
//! exercise the codec against real TCP peers.

pub mod client;
pub mod config;
pub mod protocol;
