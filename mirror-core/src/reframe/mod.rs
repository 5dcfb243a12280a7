//! Annex B → length-prefixed reframing.
//!
//! Encoders emit H.264 as an Annex B byte stream: every NAL unit is
//! preceded by a start code (three or more zero bytes then `0x01`).
//! Mirroring receivers expect AVCC framing instead: a codec
//! configuration record sent once, then access units whose NAL units
//! carry a 4-byte big-endian length prefix.
//!
//! | Module        | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | `start_code`  | Start-code scanning                              |
//! | `nal`         | NAL unit header classification                   |
//! | `config`      | SPS/PPS blob → [`CodecConfigRecord`]             |
//! | `access_unit` | In-place start code → length prefix rewrite      |

pub mod access_unit;
pub mod config;
pub mod nal;
pub mod start_code;

pub use access_unit::{LengthPrefixedUnits, ReframedUnit, rewrite_access_unit};
pub use config::{CodecConfigRecord, extract_codec_config};
pub use nal::NalKind;
pub use start_code::{StartCode, StartCodes, find_start_code};
