//! C5 data model: class descriptors, field descriptors, and their flags.
//! Parsing logic lives in [`crate::loader`]; this module is just the shape.

use std::cell::Cell;
use std::rc::Rc;

use bitflags::bitflags;
use graphwire_derive::FromRepr;

use crate::hooks::Resolution;

bitflags! {
	#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
	pub struct DescriptorFlags: u8 {
		const SC_WRITE_METHOD = 0x01;
		const SC_SERIALIZABLE = 0x02;
		const SC_EXTERNALIZABLE = 0x04;
		const SC_BLOCK_DATA = 0x08;
		const SC_ENUM = 0x10;
	}
}

/// The one-character type tag preceding every field descriptor on the wire.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromRepr)]
pub enum FieldType {
	Byte = b'B',
	Short = b'S',
	Int = b'I',
	Long = b'J',
	Float = b'F',
	Double = b'D',
	Bool = b'Z',
	Char = b'C',
	Object = b'L',
	Array = b'[',
}

impl FieldType {
	pub fn is_primitive(self) -> bool {
		!matches!(self, FieldType::Object | FieldType::Array)
	}

	pub fn is_reference(self) -> bool {
		!self.is_primitive()
	}
}

/// One field in a class descriptor's field list.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
	pub kind: FieldType,
	pub name: String,
	/// Only populated for reference-typed fields (`L`/`[`): the signature string,
	/// itself read as an object reference to a `STRING` item on the wire.
	pub signature: Option<String>,
}

/// The kind of entity a class descriptor describes, distinguishing ordinary
/// classes (with a field list) from dynamic-interface proxies (with an
/// interface-name list instead).
#[derive(Debug, Clone)]
pub enum DescriptorShape {
	Ordinary { fields: Vec<FieldDescriptor> },
	Proxy { interfaces: Vec<String> },
}

/// A parsed class descriptor: name, version, flags, shape, and super chain.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
	pub name: String,
	pub serial_version_uid: i64,
	pub flags: DescriptorFlags,
	pub shape: DescriptorShape,
	pub super_descriptor: Option<Rc<ClassDescriptor>>,
	/// Filled in once, the first time the descriptor is resolved against a host
	/// binding, and reused for every instance built from it afterward.
	pub(crate) resolution: Cell<Option<Resolution>>,
}

impl ClassDescriptor {
	pub fn fields(&self) -> &[FieldDescriptor] {
		match &self.shape {
			DescriptorShape::Ordinary { fields } => fields,
			DescriptorShape::Proxy { .. } => &[],
		}
	}

	pub fn is_enum(&self) -> bool {
		self.flags.contains(DescriptorFlags::SC_ENUM)
	}

	pub fn is_externalizable(&self) -> bool {
		self.flags.contains(DescriptorFlags::SC_EXTERNALIZABLE)
	}

	pub fn has_custom_read_object(&self) -> bool {
		self.flags.contains(DescriptorFlags::SC_WRITE_METHOD)
	}

	pub fn externalizable_block_data(&self) -> bool {
		self.flags.contains(DescriptorFlags::SC_BLOCK_DATA)
	}

	pub fn cached_resolution(&self) -> Option<Resolution> {
		self.resolution.get()
	}

	pub(crate) fn cache_resolution(&self, resolution: Resolution) {
		self.resolution.set(Some(resolution));
	}

	/// Walks from the most-derived descriptor down to the root ancestor,
	/// preserving the handle of `this` as the chain's first element.
	pub fn chain(this: &Rc<Self>) -> Vec<Rc<Self>> {
		let mut chain = Vec::new();
		let mut current = Some(this.clone());
		while let Some(desc) = current {
			current = desc.super_descriptor.clone();
			chain.push(desc);
		}
		chain
	}
}

/// Collapses wire-quirk signatures of the form `[L[...;;` by stripping matching
/// `[L...;` pairs until the brackets nest straightforwardly.
pub fn normalize_signature(signature: &str) -> String {
	let mut s = signature.to_string();
	loop {
		if let Some(rest) = s.strip_prefix("[L[") {
			if let Some(stripped) = rest.strip_suffix(";;") {
				s = format!("[{stripped};");
				continue;
			}
		}
		break;
	}
	s
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalize_collapses_doubled_array_signature() {
		assert_eq!(normalize_signature("[L[Ljava.lang.Object;;"), "[Ljava.lang.Object;");
	}

	#[test]
	fn normalize_leaves_plain_signature_alone() {
		assert_eq!(normalize_signature("Ljava.lang.String;"), "Ljava.lang.String;");
	}
}
