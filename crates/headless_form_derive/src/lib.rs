use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Generates a `{Name}Fields` accessor whose methods return the
/// `FieldPath` of each named field. `#[form(rename = "...")]` overrides
/// the path segment of a single field.
#[proc_macro_derive(FormFields, attributes(form))]
pub fn derive_form_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormFields derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormFields derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormFields derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let headless_form = headless_form_path();
    let mut fields_methods = Vec::new();
    let mut field_names = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_name = match renamed(&field.attrs) {
            Ok(Some(name)) => name,
            Ok(None) => field_ident.to_string(),
            Err(error) => return error.to_compile_error().into(),
        };

        fields_methods.push(quote! {
            pub fn #field_ident(&self) -> #headless_form::FieldPath {
                #headless_form::FieldPath::new(#field_name)
            }
        });
        field_names.push(field_name);
    }

    quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #headless_form::FormFields for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn field_names() -> &'static [&'static str] {
                &[#(#field_names),*]
            }
        }
    }
    .into()
}

fn renamed(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut name = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `rename`"))
            }
        })?;
    }
    Ok(name)
}

fn headless_form_path() -> TokenStream2 {
    match crate_name("headless_form") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::headless_form),
    }
}
