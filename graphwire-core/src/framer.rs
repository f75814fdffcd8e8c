//! C3: Block-Data Framer — gates between primitive-mode and object-mode bytes.

use crate::byte_source::ByteSource;
use crate::error::DecodeError;
use crate::token::{TokenCode, TokenReader};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Mode {
	Raw,
	Block(u32),
}

/// Owns the "are the next bytes primitives or a tagged item" distinction so the
/// driver never has to mutate a loose "current input" field.
#[derive(Debug)]
pub struct BlockDataFramer {
	mode: Mode,
}

impl Default for BlockDataFramer {
	fn default() -> Self {
		Self { mode: Mode::Raw }
	}
}

impl BlockDataFramer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Bytes left in the current block frame, without touching stream position.
	pub fn available(&self) -> u32 {
		match self.mode {
			Mode::Raw => 0,
			Mode::Block(remaining) => remaining,
		}
	}

	/// Forces raw mode, used when the driver is about to swap in/out a fresh stream segment.
	pub fn reset_to_raw(&mut self) {
		self.mode = Mode::Raw;
	}

	/// Call before consuming `count` primitive bytes. Advances past BLOCKDATA/BLOCKDATALONG/RESET
	/// framing tokens as needed, invoking `on_reset` for in-band resets.
	pub fn ensure_available(
		&mut self,
		count: u32,
		tokens: &mut TokenReader,
		source: &mut ByteSource,
		mut on_reset: impl FnMut(),
	) -> Result<(), DecodeError> {
		while self.available() < count {
			if let Mode::Block(0) | Mode::Raw = self.mode {
				let byte = tokens.peek_byte(source)?;
				match TokenCode::from_repr(byte) {
					Some(TokenCode::BlockData) => {
						tokens.consume();
						let len = source.read_u8()? as u32;
						self.mode = Mode::Block(len);
					},
					Some(TokenCode::BlockDataLong) => {
						tokens.consume();
						let len = source.read_u32()?;
						self.mode = Mode::Block(len);
					},
					Some(TokenCode::Reset) => {
						tokens.consume();
						on_reset();
						self.mode = Mode::Raw;
					},
					_ => {
						return Err(DecodeError::StreamCorrupted(
							"no primitive bytes available and next token does not start a block".into(),
						));
					},
				}
			} else {
				break;
			}
		}
		Ok(())
	}

	/// Consumes exactly `count` bytes from the current block frame (caller already
	/// called `ensure_available`). Panics if the frame does not have enough left —
	/// callers are expected to call `ensure_available` first.
	pub fn consume(&mut self, count: u32) {
		match &mut self.mode {
			Mode::Block(remaining) => {
				*remaining = remaining.checked_sub(count).expect("ensure_available was not called");
			},
			Mode::Raw => unreachable!("ensure_available was not called"),
		}
	}

	/// Switches into block mode for a custom read hook; the first block header is
	/// read lazily by the first primitive access, matching `ensure_available`.
	pub fn begin_custom_hook(&mut self) {
		self.mode = Mode::Block(0);
	}

	/// Installs an already-read block frame of `len` bytes directly, used when an
	/// object-mode read discovers primitive bytes instead of a token: the bytes
	/// stay available for the next primitive read rather than being consumed.
	pub fn begin_block(&mut self, len: u32) {
		self.mode = Mode::Block(len);
	}

	/// Drains and discards exactly the current frame's remaining bytes.
	pub fn discard_current_frame(&mut self, source: &mut ByteSource) -> Result<(), DecodeError> {
		let n = self.available();
		if n > 0 {
			let mut sink = vec![0u8; n as usize];
			source.read_fully(&mut sink)?;
			self.consume(n);
		}
		Ok(())
	}
}
