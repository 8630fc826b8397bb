//! Protocol module containing the JSON envelope types and their codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_request, encode_event, CodecError};
pub use messages::*;
