//! The RCON wire protocol: frame codec (C1) and response/chat parsers
//! (C4). This crate owns no sockets and no clocks — it is pure
//! encode/decode/parse, reused identically by the `rcon` connection and
//! by anything that wants to replay a captured session.

pub mod chat;
pub mod codec;
pub mod parsers;

pub use chat::{classify, looks_like_chat, ChatClassification};
pub use codec::{decode_all, decode_packet, encode_packet, DecodeOutcome, Frame};
