//! C9: Resolution Hooks — host-supplied class lookup, proxy fabrication, and
//! the handful of per-class reading callbacks that stand in for reflection.
//! How a host binds descriptors to native types is entirely external to this
//! crate; these traits are the seam.

use crate::descriptor::ClassDescriptor;
use crate::error::DecodeError;
use crate::reader::GraphReader;
use crate::value::{GetField, Value};

/// The nine primitive type names the default resolver maps without consulting
/// the host at all. An immutable build-time table.
const PRIMITIVE_TYPE_NAMES: &[&str] = &[
	"byte", "short", "int", "long", "boolean", "char", "float", "double", "void",
];

pub fn is_primitive_type_name(name: &str) -> bool {
	PRIMITIVE_TYPE_NAMES.contains(&name)
}

/// What a descriptor's name resolved to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Resolution {
	/// The host has (or fabricates) a local binding for this class/interface list.
	Bound,
	/// One of the nine primitive type names.
	Primitive,
	/// No local binding exists, but this is not a hard failure — the descriptor's
	/// declared field shape is used to skip values at this level instead.
	Absent,
}

/// Class lookup and proxy fabrication. The default implementation treats every
/// class as generically `Bound` (the driver reconstructs into the crate's own
/// dynamic [`crate::value::ObjectValue`] representation regardless), which is
/// enough to exercise the wire protocol; a host with real native types
/// overrides this to do actual reflection/class-loading.
pub trait ClassResolver {
	fn resolve_class(&mut self, descriptor: &ClassDescriptor) -> Result<Resolution, DecodeError> {
		if is_primitive_type_name(&descriptor.name) {
			return Ok(Resolution::Primitive);
		}
		let _ = descriptor;
		Ok(Resolution::Bound)
	}

	fn resolve_proxy_class(&mut self, interfaces: &[String]) -> Result<Resolution, DecodeError> {
		let _ = interfaces;
		Ok(Resolution::Bound)
	}

	/// Enabled only when `enableResolveObject(true)` was called; identity by default.
	fn resolve_object(&mut self, value: Value) -> Result<Value, DecodeError> {
		Ok(value)
	}

	/// Whether this resolver may enable `resolveObject` substitution. The
	/// default resolver is untrusted; a host earns trust by overriding both
	/// this and [`Self::resolve_object`] together.
	fn resolve_object_trusted(&self) -> bool {
		false
	}
}

/// Per-class-level read callbacks, invoked while walking an object's descriptor
/// chain. Defaults make every level behave as a plain "default field read"
/// level; a host overrides these to run real `readObject`/`readExternal`-style
/// logic against native types.
pub trait ObjectHooks {
	/// Called for a descriptor level with `SC_WRITE_METHOD` set, after the framer
	/// has already been switched to block-data mode. The default does nothing;
	/// the driver still drains any remaining block/annotation data through
	/// `ENDBLOCKDATA` afterward regardless of what this does.
	fn read_custom(&mut self, reader: &mut GraphReader, level: &ClassDescriptor) -> Result<(), DecodeError> {
		let _ = (reader, level);
		Ok(())
	}

	/// Called for a descriptor level with `SC_EXTERNALIZABLE` set. The default
	/// only supports the `SC_BLOCK_DATA`-framed form (drained generically, like
	/// a custom hook with no fields); legacy unframed externalizable payloads
	/// have no host-independent way to find their end and fail `ClassNotFound`.
	fn read_external(&mut self, reader: &mut GraphReader, level: &ClassDescriptor) -> Result<(), DecodeError> {
		if level.externalizable_block_data() {
			reader.drain_custom_hook_frame()
		} else {
			Err(DecodeError::ClassNotFound(format!(
				"cannot default-read unframed externalizable data for `{}`",
				level.name
			)))
		}
	}

	/// Called for a descriptor level whose class could not be bound locally
	/// (`Resolution::Absent`) and is not externalizable, in place of
	/// `read_custom`/`default_read_object`. `fields` is a detached snapshot —
	/// nothing written through it reaches the object's own level storage. The
	/// default does nothing.
	fn read_object_no_data(&mut self, reader: &mut GraphReader, level: &ClassDescriptor, fields: &GetField) -> Result<(), DecodeError> {
		let _ = (reader, level, fields);
		Ok(())
	}
}

/// The reader's built-in hook implementation: every class resolves generically,
/// no externalizable/custom-hook class gets special treatment, substitution is
/// the identity function.
#[derive(Debug, Default)]
pub struct DefaultHooks;

impl ClassResolver for DefaultHooks {}
impl ObjectHooks for DefaultHooks {}
