//! # Pickler Derive Macro
//!
//! This crate provides `#[derive(Pickle)]`, which implements the
//! `pickler::Reflect` reflection capability for structs and a
//! `From<T> for pickler::Value` conversion for structs and fieldless
//! enums.
//!
//! ## Member selection
//!
//! The type-level `#[pickle(...)]` attribute picks one of three
//! strategies:
//! 1. **`contract`**: only fields marked `#[pickle(member)]` are encoded;
//!    `name = "..."` on a member renames it, `name = "..."` on the type
//!    overrides the class tag.
//! 2. **`serializable`**: every named field except those marked
//!    `#[pickle(skip)]`.
//! 3. **default**: the `pub` fields.
//!
//! `#[pickle(anonymous)]` suppresses the class tag entirely.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, LitStr, Visibility};

/// Derives `Reflect` (structs) or a `Value` conversion (fieldless enums).
#[proc_macro_derive(Pickle, attributes(pickle))]
pub fn derive_pickle(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    match input.data {
        Data::Struct(data) => expand_struct(name, &input.attrs, data),
        Data::Enum(data) => expand_enum(name, data),
        Data::Union(_) => syn::Error::new(name.span(), "Pickle does not support unions")
            .to_compile_error()
            .into(),
    }
}

// --- Internal Data Structures ---

#[derive(Clone, Copy, PartialEq)]
enum Strategy {
    Contract,
    Serializable,
    PublicProperties,
}

struct TypeAttrs {
    strategy: Strategy,
    name: Option<String>,
    anonymous: bool,
}

struct FieldAttrs {
    member: bool,
    skip: bool,
    name: Option<String>,
}

// --- Parsing Logic (Syn 2.0) ---

/// Parses the type-level `#[pickle(...)]` attribute.
fn parse_type_attrs(attrs: &[Attribute]) -> syn::Result<TypeAttrs> {
    let mut parsed = TypeAttrs {
        strategy: Strategy::PublicProperties,
        name: None,
        anonymous: false,
    };

    for attr in attrs {
        if attr.path().is_ident("pickle") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("contract") {
                    parsed.strategy = Strategy::Contract;
                    return Ok(());
                }
                if meta.path.is_ident("serializable") {
                    parsed.strategy = Strategy::Serializable;
                    return Ok(());
                }
                if meta.path.is_ident("anonymous") {
                    parsed.anonymous = true;
                    return Ok(());
                }
                if meta.path.is_ident("name") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    parsed.name = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown pickle attribute key"))
            })?;
        }
    }
    Ok(parsed)
}

/// Parses a field-level `#[pickle(...)]` attribute.
fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs {
        member: false,
        skip: false,
        name: None,
    };

    for attr in attrs {
        if attr.path().is_ident("pickle") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("member") {
                    parsed.member = true;
                    return Ok(());
                }
                if meta.path.is_ident("skip") {
                    parsed.skip = true;
                    return Ok(());
                }
                if meta.path.is_ident("name") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    parsed.name = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown pickle attribute key"))
            })?;
        }
    }
    Ok(parsed)
}

// --- Generator: structs ---

fn expand_struct(name: syn::Ident, attrs: &[Attribute], data: syn::DataStruct) -> TokenStream {
    let type_attrs = match parse_type_attrs(attrs) {
        Ok(parsed) => parsed,
        Err(e) => return e.to_compile_error().into(),
    };

    let fields = match data.fields {
        Fields::Named(named) => named.named.into_iter().collect::<Vec<_>>(),
        Fields::Unit => Vec::new(),
        Fields::Unnamed(_) => {
            return syn::Error::new(name.span(), "Pickle requires named fields")
                .to_compile_error()
                .into()
        }
    };

    // Select fields according to the strategy.
    let mut selected = Vec::new();
    for field in fields {
        let field_attrs = match parse_field_attrs(&field.attrs) {
            Ok(parsed) => parsed,
            Err(e) => return e.to_compile_error().into(),
        };
        let keep = match type_attrs.strategy {
            Strategy::Contract => field_attrs.member,
            Strategy::Serializable => !field_attrs.skip,
            Strategy::PublicProperties => matches!(field.vis, Visibility::Public(_)),
        };
        if keep {
            let ident = field.ident.clone().expect("named field");
            let emitted = field_attrs.name.unwrap_or_else(|| ident.to_string());
            selected.push((ident, emitted));
        }
    }

    let strategy = match type_attrs.strategy {
        Strategy::Contract => quote! { pickler::FieldStrategy::Contract },
        Strategy::Serializable => quote! { pickler::FieldStrategy::Serializable },
        Strategy::PublicProperties => quote! { pickler::FieldStrategy::PublicProperties },
    };

    let class_name = if type_attrs.anonymous {
        quote! { ::core::option::Option::None }
    } else if let Some(tag) = type_attrs.name {
        quote! { ::core::option::Option::Some(::std::borrow::Cow::Borrowed(#tag)) }
    } else {
        quote! {
            ::core::option::Option::Some(::std::borrow::Cow::Borrowed(
                ::core::concat!(::core::module_path!(), "::", ::core::stringify!(#name))))
        }
    };

    let field_snapshots = selected.iter().map(|(ident, emitted)| {
        quote! {
            (::std::borrow::Cow::Borrowed(#emitted),
             pickler::Value::from(self.#ident.clone()))
        }
    });

    let expanded = quote! {
        impl pickler::Reflect for #name {
            fn class_name(&self) -> ::core::option::Option<::std::borrow::Cow<'static, str>> {
                #class_name
            }

            fn strategy(&self) -> pickler::FieldStrategy {
                #strategy
            }

            fn fields(&self) -> pickler::Result<
                ::std::vec::Vec<(::std::borrow::Cow<'static, str>, pickler::Value)>>
            {
                ::core::result::Result::Ok(::std::vec![ #(#field_snapshots),* ])
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }
        }

        impl ::core::convert::From<#name> for pickler::Value {
            fn from(value: #name) -> pickler::Value {
                pickler::Value::Object(::std::rc::Rc::new(value))
            }
        }
    };

    TokenStream::from(expanded)
}

// --- Generator: fieldless enums ---

fn expand_enum(name: syn::Ident, data: syn::DataEnum) -> TokenStream {
    let mut arms = Vec::new();
    let mut hashable_arms = Vec::new();

    for variant in data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return syn::Error::new(
                variant.ident.span(),
                "Pickle only supports fieldless enum variants",
            )
            .to_compile_error()
            .into();
        }
        let attrs = match parse_field_attrs(&variant.attrs) {
            Ok(parsed) => parsed,
            Err(e) => return e.to_compile_error().into(),
        };
        let ident = variant.ident;
        let label = attrs.name.unwrap_or_else(|| ident.to_string());
        arms.push(quote! {
            #name::#ident => pickler::Value::Enum(#label.to_owned())
        });
        hashable_arms.push(quote! {
            #name::#ident => pickler::HashableValue::Enum(#label.to_owned())
        });
    }

    let expanded = quote! {
        impl ::core::convert::From<#name> for pickler::Value {
            fn from(value: #name) -> pickler::Value {
                match value { #(#arms),* }
            }
        }

        impl ::core::convert::From<#name> for pickler::HashableValue {
            fn from(value: #name) -> pickler::HashableValue {
                match value { #(#hashable_arms),* }
            }
        }
    };

    TokenStream::from(expanded)
}
