//! Client module for the chatline CLI.
//!
//! The client is a single interactive process that:
//! - Puts the terminal in raw mode behind a scoped guard
//! - Accumulates keystrokes into a bounded line editor
//! - Multiplexes server messages and terminal input in one event loop
//! - Sends completed lines to the server over the line protocol

pub mod session;
pub mod terminal;

pub use session::run;
