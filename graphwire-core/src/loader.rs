//! C5: Class Descriptor Loader — parses CLASSDESC/PROXYCLASSDESC tokens into
//! [`ClassDescriptor`]s, registering each one's handle before its annotation
//! subgraph is read so self-referential annotations resolve correctly.

use std::cell::Cell;
use std::rc::Rc;

use crate::descriptor::{normalize_signature, ClassDescriptor, DescriptorFlags, DescriptorShape, FieldDescriptor, FieldType};
use crate::error::DecodeError;
use crate::reader::GraphReader;
use crate::token::TokenCode;
use crate::value::Value;

impl GraphReader {
	/// Reads a class descriptor that must not be null (the shape naming an
	/// OBJECT/ARRAY/CLASS/ENUM item).
	#[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
	pub(crate) fn read_class_desc(&mut self) -> Result<Rc<ClassDescriptor>, DecodeError> {
		self.read_class_desc_opt()?
			.ok_or_else(|| DecodeError::InvalidClass("expected a class descriptor, found null".into()))
	}

	/// Reads a possibly-null class descriptor, used for super-descriptor chains.
	pub(crate) fn read_class_desc_opt(&mut self) -> Result<Option<Rc<ClassDescriptor>>, DecodeError> {
		let code = self.tokens.next(&mut self.source)?;
		match code {
			TokenCode::Null => Ok(None),
			TokenCode::Reference => {
				let handle = self.source.read_u32()?;
				match self.handles.lookup(handle)? {
					Value::Descriptor(d) => Ok(Some(d)),
					Value::Class(d) => Ok(Some(d)),
					other => Err(DecodeError::InvalidClass(format!(
						"handle 0x{handle:06X} does not resolve to a class descriptor: {other:?}"
					))),
				}
			},
			TokenCode::ClassDesc => self.read_ordinary_class_desc().map(Some),
			TokenCode::ProxyClassDesc => self.read_proxy_class_desc().map(Some),
			_ => Err(DecodeError::unexpected_token(code.byte(), "reading a class descriptor")),
		}
	}

	fn read_ordinary_class_desc(&mut self) -> Result<Rc<ClassDescriptor>, DecodeError> {
		let handle = self.handles.reserve();

		let name_len = self.source.read_u16()? as usize;
		let name = self.source.read_utf_of_len(name_len)?;
		if name.is_empty() {
			return Err(DecodeError::StreamCorrupted("class descriptor name is empty".into()));
		}
		let serial_version_uid = self.source.read_i64()?;
		let flags = DescriptorFlags::from_bits_truncate(self.source.read_u8()?);

		let field_count = self.source.read_u16()? as usize;
		let mut fields = Vec::with_capacity(field_count);
		for _ in 0..field_count {
			fields.push(self.read_field_descriptor()?);
		}

		// Registered with no super yet, so annotation data can reference this
		// descriptor by handle; replaced below once the super chain is known.
		let partial = Rc::new(ClassDescriptor {
			name,
			serial_version_uid,
			flags,
			shape: DescriptorShape::Ordinary { fields },
			super_descriptor: None,
			resolution: Cell::new(None),
		});
		self.handles.register(handle, Value::Descriptor(partial.clone()), false);

		self.discard_annotations()?;

		let super_descriptor = self.read_class_desc_opt()?;

		if flags.contains(DescriptorFlags::SC_ENUM) {
			let super_uid_zero = super_descriptor.as_ref().map_or(true, |s| s.serial_version_uid == 0);
			if serial_version_uid != 0 || !super_uid_zero {
				return Err(DecodeError::InvalidClass(format!(
					"enum descriptor `{}` must carry a zero serialVersionUID at every level", partial.name
				)));
			}
		}

		let complete = Rc::new(ClassDescriptor {
			name: partial.name.clone(),
			serial_version_uid,
			flags,
			shape: partial.shape.clone(),
			super_descriptor,
			resolution: Cell::new(None),
		});
		self.handles.register(handle, Value::Descriptor(complete.clone()), false);

		let resolution = self.resolve_class_level(&complete)?;
		complete.cache_resolution(resolution);

		Ok(complete)
	}

	fn read_field_descriptor(&mut self) -> Result<FieldDescriptor, DecodeError> {
		let type_byte = self.source.read_u8()?;
		let kind = FieldType::from_repr(type_byte)
			.ok_or_else(|| DecodeError::StreamCorrupted(format!("unknown field type tag 0x{type_byte:02X}")))?;
		let name_len = self.source.read_u16()? as usize;
		let name = self.source.read_utf_of_len(name_len)?;
		let signature = if kind.is_reference() {
			let signature_value = self.read_content(false)?;
			let raw = match signature_value {
				Value::Str(s) => s.to_string(),
				other => return Err(DecodeError::InvalidClass(format!(
					"field `{name}` signature must be a string, found {other:?}"
				))),
			};
			Some(normalize_signature(&raw))
		} else {
			None
		};
		Ok(FieldDescriptor { kind, name, signature })
	}

	fn read_proxy_class_desc(&mut self) -> Result<Rc<ClassDescriptor>, DecodeError> {
		let handle = self.handles.reserve();

		let count = self.source.read_u32()? as usize;
		let mut interfaces = Vec::with_capacity(count);
		for _ in 0..count {
			let len = self.source.read_u16()? as usize;
			interfaces.push(self.source.read_utf_of_len(len)?);
		}

		let partial = Rc::new(ClassDescriptor {
			name: format!("(proxy {})", interfaces.join(", ")),
			serial_version_uid: 0,
			flags: DescriptorFlags::SC_SERIALIZABLE,
			shape: DescriptorShape::Proxy { interfaces: interfaces.clone() },
			super_descriptor: None,
			resolution: Cell::new(None),
		});
		self.handles.register(handle, Value::Descriptor(partial.clone()), false);

		self.discard_annotations()?;

		let super_descriptor = self.read_class_desc_opt()?;

		let complete = Rc::new(ClassDescriptor {
			name: partial.name.clone(),
			serial_version_uid: 0,
			flags: partial.flags,
			shape: partial.shape.clone(),
			super_descriptor,
			resolution: Cell::new(None),
		});
		self.handles.register(handle, Value::Descriptor(complete.clone()), false);

		let mut resolver = self.resolver.take().expect("resolver present between calls");
		let result = resolver.resolve_proxy_class(&interfaces);
		self.resolver = Some(resolver);
		complete.cache_resolution(result?);

		Ok(complete)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use crate::error::DecodeError;

	use super::GraphReader;

	fn reader(bytes: &[u8]) -> GraphReader {
		GraphReader::new(Cursor::new(bytes.to_vec())).unwrap()
	}

	#[test]
	fn ordinary_class_desc_with_one_primitive_field() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x72, // TC_CLASSDESC
			0x00, 0x03, b'F', b'o', b'o', // name "Foo"
			0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // serialVersionUID = 1
			0x02, // flags: SC_SERIALIZABLE
			0x00, 0x01, // one field
			b'I', 0x00, 0x01, b'n', // int field "n"
			0x78, // TC_ENDBLOCKDATA (no annotation)
			0x70, // TC_NULL (no superclass)
		];
		let mut r = reader(&bytes);
		let descriptor = r.read_class_desc().unwrap();
		assert_eq!(descriptor.name, "Foo");
		assert_eq!(descriptor.serial_version_uid, 1);
		assert_eq!(descriptor.fields().len(), 1);
		assert_eq!(descriptor.fields()[0].name, "n");
	}

	#[test]
	fn empty_class_name_is_stream_corrupted() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x72, // TC_CLASSDESC
			0x00, 0x00, // empty name
		];
		let mut r = reader(&bytes);
		assert!(matches!(r.read_class_desc(), Err(DecodeError::StreamCorrupted(_))));
	}

	#[test]
	fn enum_descriptor_requires_zero_uid() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x72, // TC_CLASSDESC
			0x00, 0x03, b'B', b'a', b'r',
			0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, // non-zero UID, illegal for an enum
			0x10, // flags: SC_ENUM
			0x00, 0x00, // no fields
			0x78, // TC_ENDBLOCKDATA
			0x70, // TC_NULL superclass
		];
		let mut r = reader(&bytes);
		assert!(matches!(r.read_class_desc(), Err(DecodeError::InvalidClass(_))));
	}
}
