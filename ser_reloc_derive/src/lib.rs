use syn::{parse_macro_input, Data, DeriveInput};

mod fields;
mod structs;
use structs::{derive_resolve, derive_serialize};

/// Derive `ser_reloc::Serialize`.
///
/// Pointer fields are annotated with how to serialize them:
///
/// * `#[ser(push)]` - pointer to a structure which also implements
///   `Serialize`.
/// * `#[ser(push_slice = "len")]` - pointer to an array of structures which
///   implement `Serialize`, with number of elements in field `len`.
/// * `#[ser(string)]` - pointer to a NUL-terminated C string.
/// * `#[ser(null)]` - pointer which is stored as null.
///
/// Fields without an annotation are copied as plain data.
#[proc_macro_derive(Serialize, attributes(ser))]
pub fn serialize(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	match input.data {
		Data::Struct(data) => derive_serialize(data, input.ident, input.generics).into(),
		Data::Enum(_) => panic!("Deriving `Serialize` on enums not supported"),
		Data::Union(_) => panic!("Deriving `Serialize` on unions not supported"),
	}
}

/// Derive `ser_reloc::Resolve`.
///
/// Uses same `#[ser(...)]` field annotations as `#[derive(Serialize)]`.
#[proc_macro_derive(Resolve, attributes(ser))]
pub fn resolve(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	match input.data {
		Data::Struct(data) => derive_resolve(data, input.ident, input.generics).into(),
		Data::Enum(_) => panic!("Deriving `Resolve` on enums not supported"),
		Data::Union(_) => panic!("Deriving `Resolve` on unions not supported"),
	}
}
