//! `#[derive(Event)]` implementation.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, Index, LitStr, Member, Token, parse::Parse,
    parse_macro_input, punctuated::Punctuated,
};

/// Type-level `#[event(..)]` arguments.
#[derive(Default)]
struct EventArgs {
    name: Option<LitStr>,
    interfaces: Vec<LitStr>,
}

impl EventArgs {
    fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut args = Self::default();
        for attr in attrs.iter().filter(|attr| attr.path().is_ident("event")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    args.name = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("interfaces") {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let list: Punctuated<LitStr, Token![,]> =
                        content.parse_terminated(<LitStr as Parse>::parse, Token![,])?;
                    args.interfaces.extend(list);
                    Ok(())
                } else {
                    Err(meta.error("unknown event attribute, expected `name` or `interfaces`"))
                }
            })?;
        }
        Ok(args)
    }
}

/// Field markers found on the struct.
#[derive(Default)]
struct FieldRoles {
    parent: Option<Member>,
    propagation: Option<Member>,
}

impl FieldRoles {
    fn from_fields(fields: &Fields) -> syn::Result<Self> {
        let mut roles = Self::default();
        for (index, field) in fields.iter().enumerate() {
            let member = match &field.ident {
                Some(ident) => Member::Named(ident.clone()),
                None => Member::Unnamed(Index {
                    index: index as u32,
                    span: Span::call_site(),
                }),
            };

            for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("event")) {
                attr.parse_nested_meta(|meta| {
                    let slot = if meta.path.is_ident("parent") {
                        &mut roles.parent
                    } else if meta.path.is_ident("propagation") {
                        &mut roles.propagation
                    } else {
                        return Err(meta.error("expected `parent` or `propagation`"));
                    };
                    if slot.is_some() {
                        return Err(meta.error("marker used on more than one field"));
                    }
                    *slot = Some(member.clone());
                    Ok(())
                })?;
            }
        }
        Ok(roles)
    }
}

/// Implementation of `#[derive(Event)]`.
pub fn derive_event_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "`#[derive(Event)]` supports structs only",
        ));
    };

    let ident = &input.ident;
    let args = EventArgs::from_attrs(&input.attrs)?;
    let roles = FieldRoles::from_fields(&data.fields)?;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let name = args
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
    let interfaces = &args.interfaces;

    let declared = (!interfaces.is_empty()).then(|| {
        quote! {
            fn declared_interfaces(&self) -> &'static [&'static str] {
                &[#(#interfaces),*]
            }
        }
    });

    let parent = roles.parent.map(|member| {
        quote! {
            fn parent(&self) -> ::core::option::Option<&dyn ::tessera::Event> {
                ::core::option::Option::Some(&self.#member)
            }

            fn parent_mut(&mut self) -> ::core::option::Option<&mut dyn ::tessera::Event> {
                ::core::option::Option::Some(&mut self.#member)
            }
        }
    });

    let propagation = roles.propagation.map(|member| {
        quote! {
            fn propagation(&self) -> ::core::option::Option<&::tessera::Propagation> {
                ::core::option::Option::Some(&self.#member)
            }

            fn propagation_mut(&mut self) -> ::core::option::Option<&mut ::tessera::Propagation> {
                ::core::option::Option::Some(&mut self.#member)
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::tessera::Event for #ident #ty_generics #where_clause {
            fn event_name(&self) -> &'static str {
                <Self as ::tessera::NamedEvent>::NAME
            }

            #declared
            #parent
            #propagation
        }

        impl #impl_generics ::tessera::NamedEvent for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
        }
    })
}
