//! C6: Object Materializer — arrays, objects (hierarchy walk), strings, and
//! enum constants. Class descriptor parsing lives in [`crate::loader`]; the
//! top-level token dispatch lives in [`crate::reader`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::descriptor::ClassDescriptor;
use crate::error::DecodeError;
use crate::hooks::Resolution;
use crate::reader::GraphReader;
use crate::value::{ArrayValue, EnumValue, GetField, ObjectLevel, ObjectValue, Value};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ArrayElementKind {
	Byte,
	Short,
	Int,
	Long,
	Float,
	Double,
	Bool,
	Char,
	Reference,
}

/// An array's own descriptor name carries its component type tag right after
/// the leading `[`, e.g. `[I`, `[[I`, `[Ljava.lang.Object;`.
fn classify_array_element(descriptor_name: &str) -> ArrayElementKind {
	match descriptor_name.as_bytes().get(1) {
		Some(b'B') => ArrayElementKind::Byte,
		Some(b'S') => ArrayElementKind::Short,
		Some(b'I') => ArrayElementKind::Int,
		Some(b'J') => ArrayElementKind::Long,
		Some(b'F') => ArrayElementKind::Float,
		Some(b'D') => ArrayElementKind::Double,
		Some(b'Z') => ArrayElementKind::Bool,
		Some(b'C') => ArrayElementKind::Char,
		_ => ArrayElementKind::Reference,
	}
}

impl GraphReader {
	pub(crate) fn read_array(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		let descriptor = self.read_class_desc()?;
		let handle = self.handles.reserve();
		let len = self.source.read_i32()?;
		if len < 0 {
			return Err(DecodeError::StreamCorrupted(format!("negative array length {len}")));
		}
		let len = len as usize;
		let kind = classify_array_element(&descriptor.name);

		let initial = match kind {
			ArrayElementKind::Byte => ArrayValue::Byte(Vec::with_capacity(len)),
			ArrayElementKind::Short => ArrayValue::Short(Vec::with_capacity(len)),
			ArrayElementKind::Int => ArrayValue::Int(Vec::with_capacity(len)),
			ArrayElementKind::Long => ArrayValue::Long(Vec::with_capacity(len)),
			ArrayElementKind::Float => ArrayValue::Float(Vec::with_capacity(len)),
			ArrayElementKind::Double => ArrayValue::Double(Vec::with_capacity(len)),
			ArrayElementKind::Bool => ArrayValue::Bool(Vec::with_capacity(len)),
			ArrayElementKind::Char => ArrayValue::Char(Vec::with_capacity(len)),
			ArrayElementKind::Reference => {
				ArrayValue::Reference { element_class: Some(descriptor.clone()), elements: Vec::with_capacity(len) }
			},
		};
		let array = Rc::new(RefCell::new(initial));
		self.handles.register(handle, Value::Array(array.clone()), unshared);

		for _ in 0..len {
			match kind {
				ArrayElementKind::Byte => {
					let v = self.source.read_i8()?;
					if let ArrayValue::Byte(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Short => {
					let v = self.source.read_i16()?;
					if let ArrayValue::Short(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Int => {
					let v = self.source.read_i32()?;
					if let ArrayValue::Int(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Long => {
					let v = self.source.read_i64()?;
					if let ArrayValue::Long(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Float => {
					let v = self.source.read_f32()?;
					if let ArrayValue::Float(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Double => {
					let v = self.source.read_f64()?;
					if let ArrayValue::Double(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Bool => {
					let v = self.source.read_bool()?;
					if let ArrayValue::Bool(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Char => {
					let v = self.source.read_u16()?;
					if let ArrayValue::Char(vec) = &mut *array.borrow_mut() {
						vec.push(v);
					}
				},
				ArrayElementKind::Reference => {
					let v = self.read_content(false)?;
					if let ArrayValue::Reference { elements, .. } = &mut *array.borrow_mut() {
						elements.push(v);
					}
				},
			}
		}

		Ok(Value::Array(array))
	}

	pub(crate) fn read_object_instance(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		let descriptor = self.read_class_desc()?;
		let handle = self.handles.reserve();
		let object = Rc::new(RefCell::new(ObjectValue { descriptor: descriptor.clone(), levels: Vec::new() }));
		self.handles.register(handle, Value::Object(object.clone()), unshared);

		let mut levels = ClassDescriptor::chain(&descriptor);
		levels.reverse(); // root ancestor first, most-derived last
		for level_descriptor in levels {
			self.read_object_level(&object, level_descriptor)?;
		}

		self.maybe_resolve_object(handle, Value::Object(object), unshared)
	}

	fn read_object_level(&mut self, object: &Rc<RefCell<ObjectValue>>, descriptor: Rc<ClassDescriptor>) -> Result<(), DecodeError> {
		let resolution = match descriptor.cached_resolution() {
			Some(r) => r,
			None => {
				let r = self.resolve_class_level(&descriptor)?;
				descriptor.cache_resolution(r);
				r
			},
		};
		let class_absent = matches!(resolution, Resolution::Absent);

		if descriptor.is_externalizable() && class_absent {
			return Err(DecodeError::ClassNotFound(format!(
				"cannot default-read unregistered externalizable class `{}`", descriptor.name
			)));
		}

		let level_index = {
			let mut obj = object.borrow_mut();
			obj.levels.push(ObjectLevel { descriptor: descriptor.clone(), fields: Vec::new(), class_absent });
			obj.levels.len() - 1
		};
		self.enter_level(object.clone(), level_index, descriptor.clone());

		if descriptor.is_externalizable() {
			self.framer.begin_custom_hook();
			let mut hooks = self.hooks.take().expect("hooks present between calls");
			let result = hooks.read_external(self, &descriptor);
			self.hooks = Some(hooks);
			result?;
			self.discard_annotations()?;
		} else if descriptor.has_custom_read_object() && !class_absent {
			self.framer.begin_custom_hook();
			let mut hooks = self.hooks.take().expect("hooks present between calls");
			let result = hooks.read_custom(self, &descriptor);
			self.hooks = Some(hooks);
			result?;
			self.discard_annotations()?;
		} else if class_absent {
			// The class couldn't be bound locally; its declared field shape is
			// used to skip values on the wire, but they never reach the object's
			// own storage — only a detached view, via readObjectNoData.
			let fields = self.read_default_fields(&descriptor)?;
			let level = ObjectLevel { descriptor: descriptor.clone(), fields, class_absent: true };
			let view = GetField::from_level(&level);
			let mut hooks = self.hooks.take().expect("hooks present between calls");
			let result = hooks.read_object_no_data(self, &descriptor, &view);
			self.hooks = Some(hooks);
			result?;
		} else {
			self.default_read_object()?;
		}

		self.leave_level();
		Ok(())
	}

	pub(crate) fn read_short_string(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		let handle = self.handles.reserve();
		let len = self.source.read_u16()? as usize;
		let text = self.source.read_utf_of_len(len)?;
		let value = Value::Str(Rc::from(text));
		self.handles.register(handle, value.clone(), unshared);
		self.maybe_resolve_object(handle, value, unshared)
	}

	pub(crate) fn read_long_string(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		let handle = self.handles.reserve();
		let len = self.source.read_u64()?;
		let text = self.source.read_utf_of_len(len as usize)?;
		let value = Value::Str(Rc::from(text));
		self.handles.register(handle, value.clone(), unshared);
		self.maybe_resolve_object(handle, value, unshared)
	}

	pub(crate) fn read_enum(&mut self, unshared: bool) -> Result<Value, DecodeError> {
		let descriptor = self.read_class_desc()?;
		let handle = self.handles.reserve();
		let constant_value = self.read_content(false)?;
		let constant_name = match constant_value {
			Value::Str(s) => s,
			other => return Err(DecodeError::InvalidObject(format!(
				"enum constant name must be a string, found {other:?}"
			))),
		};
		let value = Value::Enum(Rc::new(RefCell::new(EnumValue { descriptor, constant_name })));
		self.handles.register(handle, value.clone(), unshared);
		Ok(value)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::*;
	use crate::value::FieldValue;

	fn reader(bytes: &[u8]) -> GraphReader {
		GraphReader::new(Cursor::new(bytes.to_vec())).unwrap()
	}

	#[test]
	fn classify_array_element_reads_the_tag_after_the_leading_bracket() {
		assert_eq!(classify_array_element("[I"), ArrayElementKind::Int);
		assert_eq!(classify_array_element("[[I"), ArrayElementKind::Reference);
		assert_eq!(classify_array_element("[Ljava.lang.Object;"), ArrayElementKind::Reference);
		assert_eq!(classify_array_element("[Z"), ArrayElementKind::Bool);
	}

	#[test]
	fn byte_array_reads_tightly_packed_elements() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x75, // TC_ARRAY
			0x72, 0x00, 0x02, b'[', b'B',
			0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
			0x00, // flags
			0x00, 0x00, // no fields
			0x78, // TC_ENDBLOCKDATA
			0x70, // TC_NULL superclass
			0x00, 0x00, 0x00, 0x02, // length 2
			0xFF, 0x01,
		];
		let mut r = reader(&bytes);
		match r.read_object().unwrap() {
			Value::Array(a) => match &*a.borrow() {
				ArrayValue::Byte(v) => assert_eq!(v, &[-1, 1]),
				other => panic!("expected a byte array, got {other:?}"),
			},
			other => panic!("expected an array, got {other:?}"),
		}
	}

	#[test]
	fn enum_constant_carries_its_descriptor_and_name() {
		let bytes = [
			0xAC, 0xED, 0x00, 0x05,
			0x7E, // TC_ENUM
			0x72, 0x00, 0x04, b'S', b'u', b'i', b't',
			0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // UID must be zero for an enum
			0x10, // flags: SC_ENUM
			0x00, 0x00, // no fields
			0x78, // TC_ENDBLOCKDATA
			0x70, // TC_NULL superclass
			0x74, 0x00, 0x04, b'C', b'L', b'U', b'B', // constant name "CLUB"
		];
		let mut r = reader(&bytes);
		match r.read_object().unwrap() {
			Value::Enum(e) => {
				let constant = e.borrow();
				assert_eq!(&*constant.constant_name, "CLUB");
				assert_eq!(constant.descriptor.name, "Suit");
			},
			other => panic!("expected an enum constant, got {other:?}"),
		}
	}

	#[test]
	fn self_referential_object_field_shares_identity_with_its_container() {
		let mut bytes = vec![0xAC, 0xED, 0x00, 0x05];
		bytes.extend([
			0x73, // TC_OBJECT
			0x72, // TC_CLASSDESC
			0x00, 0x04, b'N', b'o', b'd', b'e',
			0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // UID
			0x02, // flags: SC_SERIALIZABLE
			0x00, 0x01, // one field
			b'L', 0x00, 0x04, b's', b'e', b'l', b'f',
		]);
		bytes.extend([0x74, 0x00, 0x12]); // TC_STRING, len 18
		bytes.extend(b"Ljava/lang/Object;");
		bytes.extend([
			0x78, // TC_ENDBLOCKDATA (class annotation)
			0x70, // TC_NULL (no superclass)
			0x71, 0x00, 0x7E, 0x00, 0x02, // TC_REFERENCE to the object's own handle
		]);

		let mut r = reader(&bytes);
		match r.read_object().unwrap() {
			Value::Object(obj) => {
				let level = &obj.borrow().levels[0];
				match level.field("self") {
					Some(FieldValue::Ref(Value::Object(inner))) => assert!(Rc::ptr_eq(&obj, inner)),
					other => panic!("expected a self-referential object field, got {other:?}"),
				}
			},
			other => panic!("expected an object, got {other:?}"),
		}
	}
}
