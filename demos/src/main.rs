use std::fs::File;
use std::io::BufReader;

use graphwire_core::{DecodeError, GraphReader, Value};

fn main() {
	tracing_subscriber::fmt::init();

	let path = std::env::args().nth(1).expect("usage: graphwire-dump <file>");
	let file = BufReader::new(File::open(&path).unwrap());
	let mut reader = GraphReader::new(file).unwrap();

	loop {
		match reader.read_object() {
			Ok(value) => print_value(&value, 0),
			Err(DecodeError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
			Err(e) => {
				eprintln!("read failed: {e}");
				break;
			},
		}
	}
}

fn print_value(value: &Value, depth: usize) {
	let indent = "  ".repeat(depth);
	match value {
		Value::Null => println!("{indent}null"),
		Value::Str(s) => println!("{indent}\"{s}\""),
		Value::Class(d) => println!("{indent}class {}", d.name),
		Value::Descriptor(d) => println!("{indent}descriptor {}", d.name),
		Value::Array(a) => println!("{indent}array[{}]", a.borrow().len()),
		Value::Object(o) => {
			let object = o.borrow();
			println!("{indent}{} {{", object.descriptor.name);
			for level in &object.levels {
				for (name, _) in &level.fields {
					println!("{indent}  {name}");
				}
			}
			println!("{indent}}}");
		},
		Value::Enum(e) => {
			let constant = e.borrow();
			println!("{indent}{}::{}", constant.descriptor.name, constant.constant_name);
		},
	}
}
