//! Proc-macro crate for `#[derive(FromBytes)]`.
//!
//! Emits `unsafe impl trellis_binparse::FromBytes for T {}` after checking
//! that the struct has a C layout, plus a compile-time assertion that every
//! field type implements `FromBytes`.

use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, parse_macro_input};

/// Derives `trellis_binparse::FromBytes` for a `#[repr(C)]` struct.
///
/// Enums and unions are rejected: an arbitrary discriminant byte is not a
/// valid enum value, and union fields may disagree on validity.
#[proc_macro_derive(FromBytes)]
pub fn derive_from_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    if !has_repr_c(input) {
        return Err(syn::Error::new(
            input.ident.span(),
            "FromBytes requires #[repr(C)] or #[repr(C, packed)]",
        ));
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(
            input.span(),
            "FromBytes can only be derived for structs",
        ));
    };

    let name = &input.ident;
    let field_types = data.fields.iter().map(|field| &field.ty);
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        const _: () = {
            fn assert_field_is_from_bytes<T: ::trellis_binparse::FromBytes>() {}
            #[allow(dead_code)]
            fn assert_all_fields #impl_generics () #where_clause {
                #( assert_field_is_from_bytes::<#field_types>(); )*
            }
        };

        // SAFETY: the struct has C layout and every field implements
        // FromBytes (checked above), so any bit pattern is a valid value.
        unsafe impl #impl_generics ::trellis_binparse::FromBytes for #name #ty_generics #where_clause {}
    })
}

/// Returns `true` if the item carries `#[repr(C)]`, possibly combined with
/// `packed` or `align`.
fn has_repr_c(input: &DeriveInput) -> bool {
    input
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("repr"))
        .any(|attr| {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    found = true;
                }
                if meta.input.peek(syn::token::Paren) {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let _: proc_macro2::TokenStream = content.parse()?;
                }
                Ok(())
            });
            found
        })
}
