//! The reconstructed graph's data model.
//!
//! Every non-null, non-primitive item the reader materializes (object, array,
//! string, class literal, enum constant) is owned jointly by the handle table
//! and by every referent that points back to it — a shared-ownership arena
//! (`Rc<RefCell<_>>`) rather than an index-based bump arena, since the graph
//! here is mutable and cyclic during construction.

use std::cell::RefCell;
use std::rc::Rc;

use fxhash::FxHashMap;

use crate::descriptor::{ClassDescriptor, FieldDescriptor};

/// A single item reachable from the root of the decoded graph.
#[derive(Debug, Clone)]
pub enum Value {
	Null,
	Str(Rc<str>),
	Class(Rc<ClassDescriptor>),
	/// A bare descriptor handle, registered as soon as CLASSDESC/PROXYCLASSDESC
	/// is parsed — distinct from `Class`, which is the handle a CLASS token
	/// registers for the class-literal item itself. Lets an annotation subgraph
	/// reference the descriptor that is still being parsed.
	Descriptor(Rc<ClassDescriptor>),
	Array(Rc<RefCell<ArrayValue>>),
	Object(Rc<RefCell<ObjectValue>>),
	Enum(Rc<RefCell<EnumValue>>),
}

impl Value {
	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}
}

/// One field slot inside an [`ObjectLevel`]. Primitive fields are decoded eagerly
/// (the wire packs them tightly, big-endian); reference fields recurse through
/// the normal item reader.
#[derive(Debug, Clone)]
pub enum FieldValue {
	Byte(i8),
	Short(i16),
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	Bool(bool),
	Char(u16),
	Ref(Value),
}

/// Array payload: either a tightly packed primitive run or a recursively
/// materialized reference run, allocated with `len` elements up front.
#[derive(Debug, Clone)]
pub enum ArrayValue {
	Byte(Vec<i8>),
	Short(Vec<i16>),
	Int(Vec<i32>),
	Long(Vec<i64>),
	Float(Vec<f32>),
	Double(Vec<f64>),
	Bool(Vec<bool>),
	Char(Vec<u16>),
	Reference {
		element_class: Option<Rc<ClassDescriptor>>,
		elements: Vec<Value>,
	},
}

impl ArrayValue {
	pub fn len(&self) -> usize {
		match self {
			ArrayValue::Byte(v) => v.len(),
			ArrayValue::Short(v) => v.len(),
			ArrayValue::Int(v) => v.len(),
			ArrayValue::Long(v) => v.len(),
			ArrayValue::Float(v) => v.len(),
			ArrayValue::Double(v) => v.len(),
			ArrayValue::Bool(v) => v.len(),
			ArrayValue::Char(v) => v.len(),
			ArrayValue::Reference { elements, .. } => elements.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// One descriptor level's worth of field data for an object, in declared order.
#[derive(Debug, Clone)]
pub struct ObjectLevel {
	pub descriptor: Rc<ClassDescriptor>,
	pub fields: Vec<(Rc<str>, FieldValue)>,
	/// Set when the stream named a class at this level that the host could not
	/// bind; fields were still read per the stream's declared shape instead of
	/// being treated as a hard failure.
	pub class_absent: bool,
}

impl ObjectLevel {
	pub fn field(&self, name: &str) -> Option<&FieldValue> {
		self.fields.iter().find(|(n, _)| &**n == name).map(|(_, v)| v)
	}
}

/// A materialized object: its most-derived descriptor plus one [`ObjectLevel`]
/// per descriptor in the chain, root (most general ancestor) first.
#[derive(Debug, Clone)]
pub struct ObjectValue {
	pub descriptor: Rc<ClassDescriptor>,
	pub levels: Vec<ObjectLevel>,
}

impl ObjectValue {
	pub fn level(&self, descriptor: &Rc<ClassDescriptor>) -> Option<&ObjectLevel> {
		self.levels.iter().find(|lvl| Rc::ptr_eq(&lvl.descriptor, descriptor))
	}
}

#[derive(Debug, Clone)]
pub struct EnumValue {
	pub descriptor: Rc<ClassDescriptor>,
	pub constant_name: Rc<str>,
}

/// A keyed, read-only view over one descriptor level's fields, returned by
/// `readFields()`. Owns a snapshot of the level rather than borrowing it, so a
/// read hook can hold onto it across further calls into the reader.
pub struct GetField {
	descriptor: Rc<ClassDescriptor>,
	by_name: FxHashMap<Rc<str>, FieldValue>,
}

impl GetField {
	pub fn from_level(level: &ObjectLevel) -> Self {
		let by_name = level.fields.iter().map(|(name, value)| (name.clone(), value.clone())).collect();
		Self { descriptor: level.descriptor.clone(), by_name }
	}

	pub fn defaulted(&self, name: &str) -> bool {
		!self.by_name.contains_key(name)
	}

	pub fn get_bool(&self, name: &str, default: bool) -> bool {
		match self.by_name.get(name) {
			Some(FieldValue::Bool(v)) => *v,
			_ => default,
		}
	}

	pub fn get_byte(&self, name: &str, default: i8) -> i8 {
		match self.by_name.get(name) {
			Some(FieldValue::Byte(v)) => *v,
			_ => default,
		}
	}

	pub fn get_char(&self, name: &str, default: u16) -> u16 {
		match self.by_name.get(name) {
			Some(FieldValue::Char(v)) => *v,
			_ => default,
		}
	}

	pub fn get_short(&self, name: &str, default: i16) -> i16 {
		match self.by_name.get(name) {
			Some(FieldValue::Short(v)) => *v,
			_ => default,
		}
	}

	pub fn get_int(&self, name: &str, default: i32) -> i32 {
		match self.by_name.get(name) {
			Some(FieldValue::Int(v)) => *v,
			_ => default,
		}
	}

	pub fn get_long(&self, name: &str, default: i64) -> i64 {
		match self.by_name.get(name) {
			Some(FieldValue::Long(v)) => *v,
			_ => default,
		}
	}

	pub fn get_float(&self, name: &str, default: f32) -> f32 {
		match self.by_name.get(name) {
			Some(FieldValue::Float(v)) => *v,
			_ => default,
		}
	}

	pub fn get_double(&self, name: &str, default: f64) -> f64 {
		match self.by_name.get(name) {
			Some(FieldValue::Double(v)) => *v,
			_ => default,
		}
	}

	pub fn get_object(&self, name: &str) -> Option<Value> {
		match self.by_name.get(name) {
			Some(FieldValue::Ref(v)) => Some(v.clone()),
			_ => None,
		}
	}

	pub fn descriptor(&self) -> &ClassDescriptor {
		&self.descriptor
	}

	pub fn declared_fields(&self) -> &[FieldDescriptor] {
		self.descriptor.fields()
	}
}
