//! # mirror-sender: AirPlay-style mirroring sender
//!
//! Streams a pre-encoded H.264 elementary stream (a file, or stdin fed
//! by an external capture/encode process) to mirroring receivers, a
//! recording file and stdout, paced at the configured frame rate.
//!
//! ## Modes
//!
//! - **Stream** (default): handshake, then codec configuration and
//!   access units to every destination until the input ends or Ctrl-C.
//! - **Inspect** (`--inspect <recording>`): decode a recording made by
//!   the file destination and print one line per message.

pub mod config;
pub mod destinations;
pub mod inspect;
pub mod replay;
pub mod service;
