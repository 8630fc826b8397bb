//! Framing of raw serial byte streams into discrete records.

pub mod line;

pub use line::{Framed, LineFramer, DEFAULT_MAX_RECORD_LEN};
