//! Wire codec for both transports the core speaks: the length-prefixed TCP
//! stream (auth, lobby, chat, settings) and the fixed-header UDP datagram
//! (gameplay, voice). Message-type catalogues, header framing, and payload
//! (de)serialization all live here so the stream server, datagram server,
//! and voice relay share one definition of the protocol.

pub mod auth;
pub mod datagram;
pub mod error;
pub mod game;
pub mod lobby;
pub mod stream;
pub mod voice;

pub use error::{CodecError, ErrorKind};
