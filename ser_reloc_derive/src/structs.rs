use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{parse_quote, DataStruct, Generics, Ident, WherePredicate};

use crate::fields::{ptr_fields, uses_type_params, Kind, SerField};

pub fn derive_serialize(data: DataStruct, ident: Ident, generics: Generics) -> TokenStream {
	let fields = ptr_fields(data.fields);
	let generics = add_bounds(generics, &fields, quote! {::ser_reloc::Serialize});
	let (impl_generics, type_generics, where_clause) = generics.split_for_impl();

	let field_stmts = fields.iter().map(|field| {
		let member = &field.member;
		let ty = &field.ty;
		match &field.kind {
			Kind::Push => quote_spanned! {field.span=>
				serializer.push_and_process(&self.#member, |serializer, target| {
					::ser_reloc::Serialize::serialize_fields(target, serializer)
				})?;
			},
			Kind::PushSlice(len_member) => quote_spanned! {field.span=>
				{
					let len = self.#len_member as usize;
					if serializer.push_slice(&self.#member, len)? {
						let first = ::ser_reloc::PtrField::target_addr(&self.#member)
							as *const <#ty as ::ser_reloc::PtrField>::Target;
						for index in 0..len {
							::ser_reloc::Serialize::serialize_fields(&*first.add(index), serializer)?;
						}
						serializer.pop()?;
					}
				}
			},
			Kind::String => quote_spanned! {field.span=>
				serializer.add_string(&self.#member)?;
			},
			Kind::Null => quote_spanned! {field.span=>
				serializer.set_null(&self.#member)?;
			},
		}
	});

	quote! {
		#[automatically_derived]
		impl #impl_generics ::ser_reloc::Serialize for #ident #type_generics #where_clause {
			#[allow(unused_variables)]
			unsafe fn serialize_fields(
				&self,
				serializer: &mut ::ser_reloc::Serializer,
			) -> ::ser_reloc::Result<()> {
				#(#field_stmts)*
				::core::result::Result::Ok(())
			}
		}
	}
}

pub fn derive_resolve(data: DataStruct, ident: Ident, generics: Generics) -> TokenStream {
	let fields = ptr_fields(data.fields);
	let generics = add_bounds(generics, &fields, quote! {::ser_reloc::Resolve});
	let (impl_generics, type_generics, where_clause) = generics.split_for_impl();

	let field_stmts = fields.iter().map(|field| {
		let member = &field.member;
		let ty = &field.ty;
		match &field.kind {
			Kind::Push => quote_spanned! {field.span=>
				{
					let target = ::ser_reloc::resolve_in_place(
						this,
						::core::ptr::addr_of_mut!((*this).#member),
					);
					let addr = ::ser_reloc::PtrField::target_addr(&target);
					if addr != 0 {
						<<#ty as ::ser_reloc::PtrField>::Target as ::ser_reloc::Resolve>::resolve_fields(
							addr as *mut <#ty as ::ser_reloc::PtrField>::Target,
						);
					}
				}
			},
			Kind::PushSlice(len_member) => quote_spanned! {field.span=>
				{
					let target = ::ser_reloc::resolve_in_place(
						this,
						::core::ptr::addr_of_mut!((*this).#member),
					);
					let addr = ::ser_reloc::PtrField::target_addr(&target);
					if addr != 0 {
						let len = (*this).#len_member as usize;
						let first = addr as *mut <#ty as ::ser_reloc::PtrField>::Target;
						for index in 0..len {
							<<#ty as ::ser_reloc::PtrField>::Target as ::ser_reloc::Resolve>::resolve_fields(
								first.add(index),
							);
						}
					}
				}
			},
			// Null slots resolve to null
			Kind::String | Kind::Null => quote_spanned! {field.span=>
				::ser_reloc::resolve_in_place(this, ::core::ptr::addr_of_mut!((*this).#member));
			},
		}
	});

	quote! {
		#[automatically_derived]
		impl #impl_generics ::ser_reloc::Resolve for #ident #type_generics #where_clause {
			#[allow(unused_variables)]
			unsafe fn resolve_fields(this: *mut Self) {
				#(#field_stmts)*
			}
		}
	}
}

/// Add trait bound for targets of pushed fields whose type depends on a type
/// parameter, e.g. `<*const T as PtrField>::Target: Serialize`.
///
/// Bounds are not added for concrete types. A self-referential structure
/// (e.g. linked list node) would otherwise require itself.
fn add_bounds(mut generics: Generics, fields: &[SerField], bound: TokenStream) -> Generics {
	let predicates: Vec<WherePredicate> = fields
		.iter()
		.filter(|field| field.kind.is_push() && uses_type_params(&field.ty, &generics))
		.flat_map(|field| {
			let ty = &field.ty;
			let predicates: [WherePredicate; 2] = [
				parse_quote!(#ty: ::ser_reloc::PtrField),
				parse_quote!(<#ty as ::ser_reloc::PtrField>::Target: #bound),
			];
			predicates
		})
		.collect();

	if !predicates.is_empty() {
		generics.make_where_clause().predicates.extend(predicates);
	}
	generics
}
