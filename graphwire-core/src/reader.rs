//! C7: Graph Driver — the public facade. Owns every other component and
//! sequences header validation, nesting depth, resets, embedded exceptions,
//! and validation-queue draining.

use std::io::Read;
use std::rc::Rc;

use derivative::Derivative;

use crate::byte_source::ByteSource;
use crate::descriptor::ClassDescriptor;
use crate::error::DecodeError;
use crate::framer::BlockDataFramer;
use crate::handle::HandleTable;
use crate::hooks::{ClassResolver, DefaultHooks, ObjectHooks};
use crate::token::{TokenCode, TokenReader};
use crate::validation::{ValidationCallback, ValidationQueue};
use crate::value::{GetField, ObjectValue, Value};

const STREAM_MAGIC: u16 = 0xACED;
const STREAM_VERSION: u16 = 0x0005;

/// The descriptor level currently being read via a custom hook or a default
/// field read, i.e. whatever `readFields`/`defaultReadObject`/`registerValidation`
/// operate against.
#[derive(Debug)]
struct ActiveLevel {
	object: Rc<std::cell::RefCell<ObjectValue>>,
	level_index: usize,
	descriptor: Rc<ClassDescriptor>,
	consumed: bool,
}

/// Drives a byte stream through the token protocol and reconstructs a graph
/// of [`Value`]s. One instance per stream; not reentrant.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GraphReader {
	#[derivative(Debug = "ignore")]
	pub(crate) source: ByteSource,
	pub(crate) tokens: TokenReader,
	pub(crate) framer: BlockDataFramer,
	pub(crate) handles: HandleTable,
	#[derivative(Debug = "ignore")]
	validation: ValidationQueue,
	depth: u32,
	#[derivative(Debug = "ignore")]
	pub(crate) resolver: Option<Box<dyn ClassResolver>>,
	#[derivative(Debug = "ignore")]
	pub(crate) hooks: Option<Box<dyn ObjectHooks>>,
	resolve_object_enabled: bool,
	active_level: Option<ActiveLevel>,
}

impl GraphReader {
	/// Opens a stream with the crate's generic default hooks: every class
	/// resolves, no externalizable/custom-hook class gets special treatment.
	pub fn new(source: impl Read + 'static) -> Result<Self, DecodeError> {
		Self::with_hooks(source, DefaultHooks, DefaultHooks)
	}

	#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
	pub fn with_hooks(
		source: impl Read + 'static,
		resolver: impl ClassResolver + 'static,
		hooks: impl ObjectHooks + 'static,
	) -> Result<Self, DecodeError> {
		let mut source = ByteSource::new(source);
		let magic = source.read_u16()?;
		let version = source.read_u16()?;
		if magic != STREAM_MAGIC || version != STREAM_VERSION {
			return Err(DecodeError::StreamCorrupted(format!(
				"bad stream header: magic=0x{magic:04X} version=0x{version:04X}"
			)));
		}
		Ok(Self {
			source,
			tokens: TokenReader::new(),
			framer: BlockDataFramer::new(),
			handles: HandleTable::new(),
			validation: ValidationQueue::new(),
			depth: 0,
			resolver: Some(Box::new(resolver)),
			hooks: Some(Box::new(hooks)),
			resolve_object_enabled: false,
			active_level: None,
		})
	}

	/// Reads and returns the next item at the top level of the stream.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	pub fn read_object(&mut self) -> Result<Value, DecodeError> {
		self.read_top_level(false)
	}

	/// Like [`Self::read_object`], but the returned item is poisoned against
	/// any later `REFERENCE` back to its handle.
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	pub fn read_unshared(&mut self) -> Result<Value, DecodeError> {
		self.read_top_level(true)
	}

	fn read_top_level(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		self.depth += 1;
		let result = self.read_content(unshared);
		self.depth -= 1;
		if self.depth != 0 {
			return result;
		}
		match result {
			Ok(value) => {
				self.validation.drain()?;
				Ok(value)
			},
			Err(err) => {
				self.validation.discard();
				Err(err)
			},
		}
	}

	/// Reads whatever token introduces the next item, recursing as needed.
	/// Shared by top-level reads, array elements, and default field reads.
	pub(crate) fn read_content(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		let code = self.tokens.peek(&mut self.source)?;
		if matches!(code, TokenCode::BlockData | TokenCode::BlockDataLong) {
			self.tokens.consume();
			let len = match code {
				TokenCode::BlockData => self.source.read_u8()? as u32,
				TokenCode::BlockDataLong => self.source.read_u32()?,
				_ => unreachable!(),
			};
			self.framer.begin_block(len);
			return Err(DecodeError::OptionalData { remaining: len, end_of_block: len == 0 });
		}
		self.tokens.consume();
		match code {
			TokenCode::Null => Ok(Value::Null),
			TokenCode::Reference => {
				let handle = self.source.read_u32()?;
				self.handles.lookup(handle)
			},
			TokenCode::Class => self.read_class_literal(unshared),
			TokenCode::Array => self.read_array(unshared),
			TokenCode::Object => self.read_object_instance(unshared),
			TokenCode::String => self.read_short_string(unshared),
			TokenCode::LongString => self.read_long_string(unshared),
			TokenCode::Enum => self.read_enum(unshared),
			TokenCode::Exception => self.read_exception(),
			TokenCode::Reset => {
				self.handles.reset();
				self.read_content(unshared)
			},
			TokenCode::ClassDesc | TokenCode::ProxyClassDesc | TokenCode::EndBlockData => {
				Err(DecodeError::unexpected_token(code.byte(), "reading an item"))
			},
		}
	}

	fn read_class_literal(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		let descriptor = self.read_class_desc()?;
		let handle = self.handles.reserve();
		let value = Value::Class(descriptor);
		self.handles.register(handle, value.clone(), unshared);
		Ok(value)
	}

	fn read_exception(&mut self) -> Result<Value, DecodeError> {
		self.handles.reset();
		let cause = self.read_content(false)?;
		self.handles.reset();
		Err(DecodeError::WriteAborted { cause: Box::new(cause) })
	}

	/// Drains and discards an annotation subgraph or a custom-hook's residual
	/// block data, up to and including the terminating `ENDBLOCKDATA`.
	pub(crate) fn discard_annotations(&mut self) -> Result<(), DecodeError> {
		self.framer.discard_current_frame(&mut self.source)?;
		self.framer.reset_to_raw();
		loop {
			let code = self.tokens.peek(&mut self.source)?;
			match code {
				TokenCode::EndBlockData => {
					self.tokens.consume();
					return Ok(());
				},
				TokenCode::BlockData => {
					self.tokens.consume();
					let len = self.source.read_u8()? as usize;
					let mut sink = vec![0u8; len];
					self.source.read_fully(&mut sink)?;
				},
				TokenCode::BlockDataLong => {
					self.tokens.consume();
					let len = self.source.read_u32()? as usize;
					let mut sink = vec![0u8; len];
					self.source.read_fully(&mut sink)?;
				},
				TokenCode::Reset => {
					self.tokens.consume();
					self.handles.reset();
				},
				_ => {
					self.read_content(false)?;
				},
			}
		}
	}

	/// The generic `ObjectHooks::read_external` default calls this to discard a
	/// block-data-framed externalizable payload it has no native type to parse.
	pub fn drain_custom_hook_frame(&mut self) -> Result<(), DecodeError> {
		self.discard_annotations()
	}

	/// Resolves a value that was just registered through `resolveObject`,
	/// re-registering under the same handle if the hook changed its identity.
	pub(crate) fn maybe_resolve_object(&mut self, handle: u32, value: Value, unshared: bool) -> Result<Value, DecodeError> {
		if !self.resolve_object_enabled {
			return Ok(value);
		}
		let mut resolver = self.resolver.take().expect("resolver present between calls");
		let substituted = resolver.resolve_object(value.clone());
		self.resolver = Some(resolver);
		let substituted = substituted?;
		if !values_share_identity(&value, &substituted) {
			self.handles.register(handle, substituted.clone(), unshared);
		}
		Ok(substituted)
	}

	pub(crate) fn resolve_class_level(&mut self, descriptor: &ClassDescriptor) -> Result<crate::hooks::Resolution, DecodeError> {
		let mut resolver = self.resolver.take().expect("resolver present between calls");
		let result = resolver.resolve_class(descriptor);
		self.resolver = Some(resolver);
		result
	}

	// --- Primitive accessors, bounded by the block-data framer. ---

	fn prime_primitive(&mut self, width: u32) -> Result<(), DecodeError> {
		let Self { framer, tokens, source, handles, .. } = self;
		framer.ensure_available(width, tokens, source, || handles.reset())
	}

	pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
		self.prime_primitive(1)?;
		let v = self.source.read_bool()?;
		self.framer.consume(1);
		Ok(v)
	}

	pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
		self.prime_primitive(1)?;
		let v = self.source.read_i8()?;
		self.framer.consume(1);
		Ok(v)
	}

	pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
		self.prime_primitive(1)?;
		let v = self.source.read_u8()?;
		self.framer.consume(1);
		Ok(v)
	}

	pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
		self.prime_primitive(2)?;
		let v = self.source.read_i16()?;
		self.framer.consume(2);
		Ok(v)
	}

	pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
		self.prime_primitive(2)?;
		let v = self.source.read_u16()?;
		self.framer.consume(2);
		Ok(v)
	}

	pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
		self.prime_primitive(4)?;
		let v = self.source.read_i32()?;
		self.framer.consume(4);
		Ok(v)
	}

	pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
		self.prime_primitive(8)?;
		let v = self.source.read_i64()?;
		self.framer.consume(8);
		Ok(v)
	}

	pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
		self.prime_primitive(4)?;
		let v = self.source.read_f32()?;
		self.framer.consume(4);
		Ok(v)
	}

	pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
		self.prime_primitive(8)?;
		let v = self.source.read_f64()?;
		self.framer.consume(8);
		Ok(v)
	}

	pub fn read_utf(&mut self) -> Result<String, DecodeError> {
		let len = self.read_u16()? as usize;
		self.prime_primitive(len as u32)?;
		let text = self.source.read_utf_of_len(len)?;
		self.framer.consume(len as u32);
		Ok(text)
	}

	pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
		self.prime_primitive(buf.len() as u32)?;
		self.source.read_fully(buf)?;
		self.framer.consume(buf.len() as u32);
		Ok(())
	}

	/// Reads bytes until (and discarding) a `\n` or `\r`, matching the legacy
	/// line-oriented primitive read the wire format's data layer exposes.
	pub fn read_line(&mut self) -> Result<String, DecodeError> {
		let mut line = String::new();
		loop {
			match self.read_i8() {
				Ok(byte) => {
					let ch = byte as u8 as char;
					if ch == '\n' || ch == '\r' {
						break;
					}
					line.push(ch);
				},
				Err(DecodeError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
				Err(e) => return Err(e),
			}
		}
		Ok(line)
	}

	/// Bytes available in the current block frame without touching stream position.
	pub fn available(&self) -> u32 {
		self.framer.available()
	}

	pub fn skip(&mut self, n: u32) -> Result<u32, DecodeError> {
		let mut remaining = n;
		let mut buf = [0u8; 256];
		while remaining > 0 {
			let chunk = remaining.min(buf.len() as u32);
			self.read_fully(&mut buf[..chunk as usize])?;
			remaining -= chunk;
		}
		Ok(n)
	}

	// --- Hook-only operations. ---

	/// Only valid from within a read hook for the level currently being read.
	pub fn read_fields(&mut self) -> Result<GetField, DecodeError> {
		let (descriptor, object, level_index) = self.active_level_parts()?;
		let fields = self.read_default_fields(&descriptor)?;
		let level = crate::value::ObjectLevel { descriptor: descriptor.clone(), fields: fields.clone(), class_absent: false };
		object.borrow_mut().levels[level_index].fields = fields;
		if let Some(active) = self.active_level.as_mut() {
			active.consumed = true;
		}
		Ok(GetField::from_level(&level))
	}

	/// Only valid from within a read hook for the level currently being read.
	pub fn default_read_object(&mut self) -> Result<(), DecodeError> {
		let (descriptor, object, level_index) = self.active_level_parts()?;
		let fields = self.read_default_fields(&descriptor)?;
		object.borrow_mut().levels[level_index].fields = fields;
		if let Some(active) = self.active_level.as_mut() {
			active.consumed = true;
		}
		Ok(())
	}

	fn active_level_parts(&mut self) -> Result<(Rc<ClassDescriptor>, Rc<std::cell::RefCell<ObjectValue>>, usize), DecodeError> {
		let active = self.active_level.as_ref().ok_or(DecodeError::NotActive)?;
		if active.consumed {
			return Err(DecodeError::NotActive);
		}
		Ok((active.descriptor.clone(), active.object.clone(), active.level_index))
	}

	pub(crate) fn enter_level(&mut self, object: Rc<std::cell::RefCell<ObjectValue>>, level_index: usize, descriptor: Rc<ClassDescriptor>) {
		self.active_level = Some(ActiveLevel { object, level_index, descriptor, consumed: false });
	}

	pub(crate) fn leave_level(&mut self) {
		self.active_level = None;
	}

	/// Only valid while a read is in progress (nesting depth > 0).
	pub fn register_validation(&mut self, callback: ValidationCallback, priority: i32) -> Result<(), DecodeError> {
		if self.depth == 0 {
			return Err(DecodeError::NotActive);
		}
		self.validation.register(callback, priority);
		Ok(())
	}

	/// Returns the prior setting. Gates `resolveObject` substitution; enabling
	/// it requires a resolver that claims [`ClassResolver::resolve_object_trusted`].
	pub fn enable_resolve_object(&mut self, enable: bool) -> Result<bool, DecodeError> {
		if enable {
			let resolver = self.resolver.as_ref().expect("resolver present between calls");
			if !resolver.resolve_object_trusted() {
				return Err(DecodeError::InvalidObject(
					"resolveObject substitution requires a trusted class resolver".into(),
				));
			}
		}
		Ok(std::mem::replace(&mut self.resolve_object_enabled, enable))
	}

	pub(crate) fn read_default_fields(&mut self, descriptor: &Rc<ClassDescriptor>) -> Result<Vec<(Rc<str>, crate::value::FieldValue)>, DecodeError> {
		use crate::descriptor::FieldType;
		use crate::value::FieldValue;

		let mut fields = Vec::with_capacity(descriptor.fields().len());
		for fd in descriptor.fields().iter().filter(|f| f.kind.is_primitive()) {
			let value = match fd.kind {
				FieldType::Byte => FieldValue::Byte(self.source.read_i8()?),
				FieldType::Short => FieldValue::Short(self.source.read_i16()?),
				FieldType::Int => FieldValue::Int(self.source.read_i32()?),
				FieldType::Long => FieldValue::Long(self.source.read_i64()?),
				FieldType::Float => FieldValue::Float(self.source.read_f32()?),
				FieldType::Double => FieldValue::Double(self.source.read_f64()?),
				FieldType::Bool => FieldValue::Bool(self.source.read_bool()?),
				FieldType::Char => FieldValue::Char(self.source.read_u16()?),
				FieldType::Object | FieldType::Array => unreachable!("filtered to primitive fields"),
			};
			fields.push((Rc::from(fd.name.as_str()), value));
		}
		for fd in descriptor.fields().iter().filter(|f| f.kind.is_reference()) {
			let value = self.read_content(false)?;
			fields.push((Rc::from(fd.name.as_str()), FieldValue::Ref(value)));
		}
		Ok(fields)
	}
}

fn values_share_identity(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Null, Value::Null) => true,
		(Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y),
		(Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
		(Value::Descriptor(x), Value::Descriptor(y)) => Rc::ptr_eq(x, y),
		(Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
		(Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
		(Value::Enum(x), Value::Enum(y)) => Rc::ptr_eq(x, y),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use proptest::prelude::*;

	use super::*;

	fn reader(bytes: &[u8]) -> GraphReader {
		GraphReader::new(Cursor::new(bytes.to_vec())).unwrap()
	}

	proptest! {
		#[test]
		fn repeated_back_references_all_share_identity(repeats in 0usize..8) {
			let mut bytes = vec![0xAC, 0xED, 0x00, 0x05, 0x74, 0x00, 0x02, b'h', b'i'];
			for _ in 0..repeats {
				bytes.push(0x71); // TC_REFERENCE
				bytes.extend(crate::handle::BASE_WIRE_HANDLE.to_be_bytes());
			}
			let mut r = reader(&bytes);
			let first = r.read_object().unwrap();
			for _ in 0..repeats {
				let next = r.read_object().unwrap();
				prop_assert!(values_share_identity(&first, &next));
			}
		}

		#[test]
		fn reset_reclaims_any_number_of_prior_handles(count in 0usize..12) {
			let mut bytes = vec![0xAC, 0xED, 0x00, 0x05];
			for i in 0..count {
				let s = format!("s{i}");
				bytes.push(0x74); // TC_STRING
				bytes.extend((s.len() as u16).to_be_bytes());
				bytes.extend(s.as_bytes());
			}
			bytes.push(0x79); // TC_RESET
			bytes.push(0x70); // TC_NULL
			let mut r = reader(&bytes);
			for _ in 0..count {
				r.read_object().unwrap();
			}
			prop_assert!(r.read_object().unwrap().is_null());
			prop_assert!(r.handles.is_empty());
		}
	}

	#[test]
	fn s1_plain_string() {
		let bytes = [0xAC, 0xED, 0x00, 0x05, 0x74, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'];
		let mut r = reader(&bytes);
		match r.read_object().unwrap() {
			Value::Str(s) => assert_eq!(&*s, "hello"),
			other => panic!("expected a string, got {other:?}"),
		}
	}

	#[test]
	fn s2_back_reference_shares_identity() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x74, 0x00, 0x02, b'h', b'i',
			0x71, 0x00, 0x7E, 0x00, 0x00,
		];
		let mut r = reader(&bytes);
		let first = r.read_object().unwrap();
		let second = r.read_object().unwrap();
		assert!(values_share_identity(&first, &second));
		match first {
			Value::Str(s) => assert_eq!(&*s, "hi"),
			other => panic!("expected a string, got {other:?}"),
		}
	}

	#[test]
	fn s3_null() {
		let bytes = [0xAC, 0xED, 0x00, 0x05, 0x70];
		let mut r = reader(&bytes);
		assert!(r.read_object().unwrap().is_null());
	}

	#[test]
	fn s4_int_array() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x75, // TC_ARRAY
			0x72, 0x00, 0x02, b'[', b'I', // class name "[I"
			0xBA, 0x60, 0x26, 0x76, 0xEA, 0xB2, 0xA5, 0x02, // serialVersionUID
			0x00, // flags
			0x00, 0x00, // field count
			0x78, // TC_ENDBLOCKDATA (empty annotation)
			0x70, // TC_NULL (no superclass)
			0x00, 0x00, 0x00, 0x03, // array length = 3
			0x00, 0x00, 0x00, 0x01,
			0x00, 0x00, 0x00, 0x02,
			0x00, 0x00, 0x00, 0x03,
		];
		let mut r = reader(&bytes);
		match r.read_object().unwrap() {
			Value::Array(a) => match &*a.borrow() {
				crate::value::ArrayValue::Int(v) => assert_eq!(v, &[1, 2, 3]),
				other => panic!("expected an int array, got {other:?}"),
			},
			other => panic!("expected an array, got {other:?}"),
		}
	}

	#[test]
	fn s5_reset_then_null_at_object_boundary() {
		let bytes = [0xAC, 0xED, 0x00, 0x05, 0x79, 0x70];
		let mut r = reader(&bytes);
		assert!(r.read_object().unwrap().is_null());
		assert!(r.handles.is_empty());
	}

	#[test]
	fn s6_exception_yields_write_aborted_and_resets_handles() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x7B, // TC_EXCEPTION
			0x74, 0x00, 0x03, b'b', b'a', b'd', // the embedded throwable, here just a string
		];
		let mut r = reader(&bytes);
		match r.read_object() {
			Err(DecodeError::WriteAborted { cause }) => match *cause {
				Value::Str(s) => assert_eq!(&*s, "bad"),
				other => panic!("expected the cause to be a string, got {other:?}"),
			},
			other => panic!("expected WriteAborted, got {other:?}"),
		}
		assert!(r.handles.is_empty());
	}

	#[test]
	fn reset_invalidates_earlier_handles() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x74, 0x00, 0x01, b'x', // registers handle 0x7E0000
			0x79, // TC_RESET
			0x70, // TC_NULL
		];
		let mut r = reader(&bytes);
		let _ = r.read_object().unwrap();
		assert!(r.read_object().unwrap().is_null());
		assert!(r.handles.lookup(crate::handle::BASE_WIRE_HANDLE).is_err());
	}

	#[test]
	fn header_mismatch_is_stream_corrupted() {
		let bytes = [0x00, 0x00, 0x00, 0x00];
		assert!(matches!(
			GraphReader::new(Cursor::new(bytes.to_vec())),
			Err(DecodeError::StreamCorrupted(_))
		));
	}

	#[test]
	fn block_frame_bytes_are_available_without_advancing_past_it() {
		let bytes = [0xAC, 0xED, 0x00, 0x05, 0xAA, 0xBB];
		let mut r = reader(&bytes);
		r.framer.begin_block(4);
		assert_eq!(r.available(), 4);
		let _ = r.read_u8().unwrap();
		let _ = r.read_u8().unwrap();
		assert_eq!(r.available(), 2);
	}
}
