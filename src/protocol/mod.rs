//! var_send wire protocol and dump parsing.
//!
//! # Wire Protocol
//!
//! One length-prefixed frame per dump: `[u32 BE length][UTF-8 body]`.
//! See [`framing`] for the codec and its error taxonomy.
//!
//! # Body Grammar
//!
//! The body is a sequence of `--- Variable #N` blocks. See [`parser`] for
//! the recognised facet lines and content block rules.

pub mod framing;
pub mod parser;

pub use framing::{encode_frame, FrameLimits, FrameReader, FramingError, RawFrame};
pub use parser::{parse_variables, VariableMetadata, VariableRecord};
