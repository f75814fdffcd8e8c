//! C2: Token Reader — classifies and buffers the next type-code byte.

use graphwire_derive::FromRepr;

use crate::byte_source::ByteSource;
use crate::error::DecodeError;

/// The fixed token enumeration from the wire contract.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
pub enum TokenCode {
	Null = 0x70,
	Reference = 0x71,
	ClassDesc = 0x72,
	Object = 0x73,
	String = 0x74,
	Array = 0x75,
	Class = 0x76,
	BlockData = 0x77,
	EndBlockData = 0x78,
	Reset = 0x79,
	BlockDataLong = 0x7A,
	Exception = 0x7B,
	LongString = 0x7C,
	ProxyClassDesc = 0x7D,
	Enum = 0x7E,
}

impl TokenCode {
	pub fn byte(self) -> u8 {
		self as u8
	}
}

/// Reads, buffers (one-deep pushback), and classifies the next token byte.
///
/// Invariant: `peek` is cheap and repeatable; `consume` is mandatory before any
/// byte-level read or subsequent `peek` once a token has been taken.
#[derive(Debug, Default)]
pub struct TokenReader {
	pushback: Option<u8>,
}

impl TokenReader {
	pub fn new() -> Self {
		Self { pushback: None }
	}

	/// Peeks at the next raw byte without discarding it from the pushback slot.
	pub fn peek_byte(&mut self, source: &mut ByteSource) -> Result<u8, DecodeError> {
		if let Some(byte) = self.pushback {
			return Ok(byte);
		}
		let byte = source.read_u8()?;
		self.pushback = Some(byte);
		Ok(byte)
	}

	/// Peeks at and classifies the next token.
	pub fn peek(&mut self, source: &mut ByteSource) -> Result<TokenCode, DecodeError> {
		let byte = self.peek_byte(source)?;
		TokenCode::from_repr(byte).ok_or_else(|| {
			DecodeError::StreamCorrupted(format!("unknown token byte 0x{byte:02X}"))
		})
	}

	/// Discards whatever is cached, so the next `peek`/`next` reads a fresh byte.
	pub fn consume(&mut self) {
		self.pushback = None;
	}

	/// `peek` followed by `consume`.
	pub fn next(&mut self, source: &mut ByteSource) -> Result<TokenCode, DecodeError> {
		let code = self.peek(source)?;
		self.consume();
		Ok(code)
	}

}
