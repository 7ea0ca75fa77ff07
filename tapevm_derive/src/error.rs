//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations,
//! plus `From` conversions for wrapping variants.
//! Replacement for `thiserror` crate.
//!
//! # Usage
//!
//! ```ignore
//! use tapevm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MyError {
//!     #[error("address {address} is outside the tape ({capacity} cells)")]
//!     OutOfBounds { address: i64, capacity: usize },
//!
//!     #[error("console failure: {0}")]
//!     Io(#[from] std::io::Error),
//!
//!     #[error("division by zero")]
//!     DivisionByZero,
//! }
//!
//! #[derive(Debug, Error)]
//! #[error("instruction {pc}: {kind}")]
//! pub struct Located {
//!     pub pc: usize,
//!     #[source]
//!     pub kind: MyError,
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args: `#[error("expected {expected}")]`
//! - Fields not mentioned in the message are ignored by `Display`
//! - `#[source]` on a field makes it the value returned by `Error::source`
//! - `#[from]` on the only field of a variant also implements `From<FieldType>`

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, Lit, Meta, parse_macro_input};

/// Derives `Display` and `Error` for an enum or struct.
///
/// Each variant must have an `#[error("...")]` attribute specifying
/// the display message. Supports field interpolation using `{0}`, `{1}`
/// for tuple fields or `{field_name}` for struct fields.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    match &input.data {
        Data::Enum(data_enum) => {
            let mut display_arms = Vec::with_capacity(data_enum.variants.len());
            let mut source_arms = Vec::new();
            let mut from_impls = Vec::new();

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let error_msg = extract_error_message(variant)?;

                let arm = match &variant.fields {
                    Fields::Unit => {
                        quote! {
                            Self::#variant_name => write!(f, #error_msg),
                        }
                    }
                    Fields::Unnamed(fields) => {
                        let count = fields.unnamed.len();
                        let format_str = convert_positional_to_named(&error_msg, count);
                        let used = referenced_names(&format_str, variant)?;
                        let bindings: Vec<_> = (0..count)
                            .map(|i| {
                                let ident = format_ident!("f{}", i);
                                if used.contains(&ident.to_string()) {
                                    quote!(#ident)
                                } else {
                                    quote!(_)
                                }
                            })
                            .collect();
                        let args: Vec<_> = (0..count)
                            .map(|i| format_ident!("f{}", i))
                            .filter(|ident| used.contains(&ident.to_string()))
                            .collect();
                        quote! {
                            Self::#variant_name(#(#bindings),*) => write!(f, #format_str, #(#args = #args),*),
                        }
                    }
                    Fields::Named(fields) => {
                        let used = referenced_names(&error_msg, variant)?;
                        let args: Vec<_> = fields
                            .named
                            .iter()
                            .filter_map(|field| field.ident.as_ref())
                            .filter(|ident| used.contains(&ident.to_string()))
                            .collect();
                        quote! {
                            Self::#variant_name { #(#args,)* .. } => write!(f, #error_msg, #(#args = #args),*),
                        }
                    }
                };
                display_arms.push(arm);

                if let Some((index, field)) = source_field(&variant.fields) {
                    let binding = format_ident!("__source");
                    let pattern = match &variant.fields {
                        Fields::Named(_) => {
                            let ident = &field.ident;
                            quote!(Self::#variant_name { #ident: #binding, .. })
                        }
                        _ => {
                            let skipped = (0..index).map(|_| quote!(_));
                            quote!(Self::#variant_name(#(#skipped,)* #binding, ..))
                        }
                    };
                    source_arms.push(quote! {
                        #pattern => ::std::option::Option::Some(#binding as &(dyn ::std::error::Error + 'static)),
                    });
                }

                if let Some(field) = from_field(variant)? {
                    let ty = &field.ty;
                    let construct = match &field.ident {
                        Some(ident) => quote!(Self::#variant_name { #ident: value }),
                        None => quote!(Self::#variant_name(value)),
                    };
                    from_impls.push(quote! {
                        impl #impl_generics ::std::convert::From<#ty> for #name #ty_generics #where_clause {
                            fn from(value: #ty) -> Self {
                                #construct
                            }
                        }
                    });
                }
            }

            let error_impl = if source_arms.is_empty() {
                quote! {
                    impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
                }
            } else {
                quote! {
                    impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
                        fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                            #[allow(unreachable_patterns)]
                            match self {
                                #(#source_arms)*
                                _ => ::std::option::Option::None,
                            }
                        }
                    }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #(#display_arms)*
                        }
                    }
                }

                #error_impl

                #(#from_impls)*
            })
        }
        Data::Struct(data_struct) => {
            let error_msg = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;

            let display_body = match &data_struct.fields {
                Fields::Unit => {
                    quote! {
                        write!(f, #error_msg)
                    }
                }
                Fields::Named(fields) => {
                    let used = referenced_names(&error_msg, &input.ident)?;
                    let field_names: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|field| field.ident.as_ref())
                        .filter(|ident| used.contains(&ident.to_string()))
                        .collect();
                    quote! {
                        write!(f, #error_msg, #(#field_names = self.#field_names),*)
                    }
                }
                Fields::Unnamed(fields) => {
                    let format_str = convert_positional_to_named(&error_msg, fields.unnamed.len());
                    let used = referenced_names(&format_str, &input.ident)?;
                    let count = fields.unnamed.len();
                    let (field_idents, field_indices): (Vec<_>, Vec<_>) = (0..count)
                        .map(|i| (format_ident!("f{}", i), syn::Index::from(i)))
                        .filter(|(ident, _)| used.contains(&ident.to_string()))
                        .unzip();
                    quote! {
                        write!(f, #format_str, #(#field_idents = self.#field_indices),*)
                    }
                }
            };

            let error_impl = match source_field(&data_struct.fields) {
                Some((index, field)) => {
                    let member = match &field.ident {
                        Some(ident) => quote!(#ident),
                        None => syn::Index::from(index).into_token_stream(),
                    };
                    quote! {
                        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
                            fn source(&self) -> ::std::option::Option<&(dyn ::std::error::Error + 'static)> {
                                ::std::option::Option::Some(&self.#member as &(dyn ::std::error::Error + 'static))
                            }
                        }
                    }
                }
                None => quote! {
                    impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
                },
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        #display_body
                    }
                }

                #error_impl
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

/// Extracts the error message from a variant's `#[error("...")]` attribute.
fn extract_error_message(variant: &syn::Variant) -> syn::Result<String> {
    let variant_name = variant.ident.to_string();
    extract_error_message_from_attrs(
        &variant.attrs,
        &variant.ident,
        &format!("variant `{}`", variant_name),
    )
}

/// Extracts the error message from attributes.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if attr.path().is_ident("error") {
            if let Meta::List(meta_list) = &attr.meta {
                let tokens = meta_list.tokens.clone();
                let lit = syn::parse2::<Lit>(tokens).map_err(|_| {
                    syn::Error::new_spanned(
                        &attr.meta,
                        "failed to parse #[error] attribute; expected a string literal like #[error(\"unknown label: {0}\")]",
                    )
                })?;

                if let Lit::Str(lit_str) = lit {
                    return Ok(lit_str.value());
                }

                return Err(syn::Error::new_spanned(
                    &attr.meta,
                    "invalid #[error] attribute: message must be a string literal, e.g. #[error(\"division by zero\")]",
                ));
            }

            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        }
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {}; every error variant must declare a display message",
            target_desc
        ),
    ))
}

/// Returns the field marked `#[source]` or `#[from]`, with its position.
fn source_field(fields: &Fields) -> Option<(usize, &Field)> {
    fields
        .iter()
        .enumerate()
        .find(|(_, field)| has_attr(field, "source") || has_attr(field, "from"))
}

/// Returns the field marked `#[from]`, which must be the only one in its variant.
fn from_field(variant: &syn::Variant) -> syn::Result<Option<&Field>> {
    let Some(field) = variant.fields.iter().find(|field| has_attr(field, "from")) else {
        return Ok(None);
    };
    if variant.fields.len() != 1 {
        return Err(syn::Error::new_spanned(
            variant,
            "#[from] is only supported on variants with exactly one field",
        ));
    }
    Ok(Some(field))
}

fn has_attr(field: &Field, name: &str) -> bool {
    field.attrs.iter().any(|attr| attr.path().is_ident(name))
}

/// Collects the argument names a format string interpolates.
///
/// `{{` escapes are skipped and format specs after `:` are ignored. Implicit
/// positional arguments (`{}`) are rejected since there is nothing to bind them to.
fn referenced_names<T: ToTokens>(format_str: &str, target: &T) -> syn::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut chars = format_str.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            continue;
        }

        let mut name = String::new();
        for c in chars.by_ref() {
            if c == '}' || c == ':' {
                break;
            }
            name.push(c);
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(syn::Error::new_spanned(
                target,
                "implicit `{}` arguments are not supported in #[error]; name the field or use `{0}`",
            ));
        }
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    Ok(names)
}

/// Converts positional format args `{0}`, `{1}` to named args `{f0}`, `{f1}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{}}}", i), &format!("{{f{}}}", i))
            .replace(&format!("{{{}:", i), &format!("{{f{}:", i));
    }
    result
}
