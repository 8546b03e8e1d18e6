use proc_macro2::{Span, TokenStream, TokenTree};
use quote::quote;
use syn::{
	spanned::Spanned, Field, Fields, Generics, Ident, Index, Lit, Member, Meta, MetaList,
	MetaNameValue, NestedMeta, Type,
};

/// How a pointer field is serialized.
#[derive(Clone)]
pub enum Kind {
	Push,
	/// Pointer to an array, with length held in another field of the struct.
	PushSlice(Member),
	String,
	Null,
}

impl Kind {
	/// Whether the field points to values which are serialized recursively.
	pub fn is_push(&self) -> bool {
		matches!(self, Kind::Push | Kind::PushSlice(_))
	}
}

/// Pointer field annotated with `#[ser(...)]`.
pub struct SerField {
	/// Field name, or index for tuple structs.
	pub member: TokenStream,
	pub ty: Type,
	pub kind: Kind,
	pub span: Span,
}

/// Collect annotated fields. Unannotated fields are plain data, and ignored.
pub fn ptr_fields(fields: Fields) -> Vec<SerField> {
	let fields: Vec<Field> = match fields {
		Fields::Named(fields) => fields.named.into_iter().collect(),
		Fields::Unnamed(fields) => fields.unnamed.into_iter().collect(),
		Fields::Unit => vec![],
	};

	fields
		.into_iter()
		.enumerate()
		.filter_map(|(index, field)| {
			let kind = get_kind(&field)?;
			let member = match &field.ident {
				Some(ident) => quote! {#ident},
				None => {
					let index = Index::from(index);
					quote! {#index}
				}
			};
			Some(SerField {
				member,
				span: field.span(),
				ty: field.ty,
				kind,
			})
		})
		.collect()
}

fn get_kind(field: &Field) -> Option<Kind> {
	let attrs = field
		.attrs
		.iter()
		.filter(|attr| attr.path.is_ident("ser"))
		.collect::<Vec<_>>();

	if attrs.is_empty() {
		return None;
	}
	if attrs.len() != 1 {
		panic!("Cannot have more than 1 `#[ser]` attribute on a field");
	}

	let meta = attrs[0].parse_meta().expect("Malformed `ser` attr");
	if let Meta::List(MetaList { nested, .. }) = meta {
		let parts: Vec<NestedMeta> = nested.into_iter().collect();
		if parts.len() == 1 {
			match parts.into_iter().next() {
				Some(NestedMeta::Meta(Meta::Path(path))) => {
					if path.is_ident("push") {
						return Some(Kind::Push);
					} else if path.is_ident("string") {
						return Some(Kind::String);
					} else if path.is_ident("null") {
						return Some(Kind::Null);
					}
				}
				Some(NestedMeta::Meta(Meta::NameValue(MetaNameValue {
					path,
					lit: Lit::Str(len_field),
					..
				}))) if path.is_ident("push_slice") => {
					let len_field = len_field
						.parse::<Member>()
						.expect("`push_slice` needs a field name e.g. `#[ser(push_slice = \"len\")]`");
					return Some(Kind::PushSlice(len_field));
				}
				_ => {}
			}
		}
	}
	panic!(
		"`#[ser]` attr must be `#[ser(push)]`, `#[ser(push_slice = \"len\")]`, `#[ser(string)]` or \
		 `#[ser(null)]`"
	);
}

/// Check if `ty` mentions any of the type parameters in `generics`.
pub fn uses_type_params(ty: &Type, generics: &Generics) -> bool {
	let params: Vec<&Ident> = generics.type_params().map(|param| &param.ident).collect();
	if params.is_empty() {
		return false;
	}
	tokens_mention(quote! {#ty}, &params)
}

fn tokens_mention(tokens: TokenStream, idents: &[&Ident]) -> bool {
	tokens.into_iter().any(|tree| match tree {
		TokenTree::Ident(ident) => idents.iter().any(|param| **param == ident),
		TokenTree::Group(group) => tokens_mention(group.stream(), idents),
		_ => false,
	})
}
