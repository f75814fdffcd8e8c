//! A deserializer for a self-describing binary object-graph format: a
//! context-sensitive token protocol interleaving tagged items with raw
//! primitive payloads, a handle table for cyclic back-references, versioned
//! class descriptors, and a deferred validation queue.
//!
//! [`GraphReader`] is the entry point. Construct one over anything
//! implementing [`std::io::Read`], then call [`GraphReader::read_object`]
//! repeatedly to pull items off the stream.

mod byte_source;
mod descriptor;
mod error;
mod framer;
mod handle;
mod hooks;
mod loader;
mod materializer;
mod reader;
mod token;
mod validation;
mod value;

pub use byte_source::{decode_modified_utf8, ByteSource};
pub use descriptor::{ClassDescriptor, DescriptorFlags, DescriptorShape, FieldDescriptor, FieldType};
pub use error::DecodeError;
pub use handle::BASE_WIRE_HANDLE;
pub use hooks::{is_primitive_type_name, ClassResolver, DefaultHooks, ObjectHooks, Resolution};
pub use reader::GraphReader;
pub use token::TokenCode;
pub use validation::ValidationCallback;
pub use value::{ArrayValue, EnumValue, FieldValue, GetField, ObjectLevel, ObjectValue, Value};
