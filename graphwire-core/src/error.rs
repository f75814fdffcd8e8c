//! Error taxonomy for the reader — one variant per distinct failure the wire
//! protocol or its hooks can raise.

use crate::token::TokenCode;

/// Everything that can go wrong while pulling a graph out of a stream.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
	#[error("stream corrupted: {0}")]
	StreamCorrupted(String),

	#[error("invalid class: {0}")]
	InvalidClass(String),

	#[error("invalid object: {0}")]
	InvalidObject(String),

	#[error("class not found: {0}")]
	ClassNotFound(String),

	/// Primitive bytes were encountered where an item token was expected.
	#[error("optional data available ({remaining} bytes, end_of_block={end_of_block})")]
	OptionalData { remaining: u32, end_of_block: bool },

	#[error("operation only valid from within an active read or a read hook")]
	NotActive,

	/// Raised when an `EXCEPTION` token is processed; carries the decoded throwable subgraph.
	#[error("stream write aborted")]
	WriteAborted {
		cause: Box<crate::value::Value>,
	},

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error("malformed modified-UTF-8 sequence")]
	MalformedUtf8,
}

impl DecodeError {
	pub(crate) fn unexpected_token(found: u8, context: &str) -> Self {
		match TokenCode::from_repr(found) {
			Some(code) => DecodeError::StreamCorrupted(format!("unexpected token {code:?} while {context}")),
			None => DecodeError::StreamCorrupted(format!("unknown token byte 0x{found:02X} while {context}")),
		}
	}
}
