use crate::{prelude::*, utils::extract_named_fields};
use syn::ext::IdentExt;

#[derive(FromAttributes)]
#[darling(attributes(model))]
struct ModelAttributes {
    #[darling(default)]
    collection: Option<LitStr>,
    #[darling(default)]
    embedded: bool,
    #[darling(default)]
    parse_doc_with_default_factories: bool,
}

#[derive(FromAttributes)]
#[darling(attributes(field))]
struct FieldAttributes {
    #[darling(default)]
    key: Option<LitStr>,
    #[darling(default)]
    primary: bool,
    #[darling(default)]
    default: Option<DefaultExpr>,
    #[darling(default)]
    default_factory: Option<Path>,
}

/// Default value expression, taken as written. String literals stay literals.
struct DefaultExpr(Expr);

impl FromMeta for DefaultExpr {
    fn from_expr(expr: &Expr) -> darling::Result<Self> {
        Ok(Self(expr.clone()))
    }
}

struct FieldConfig {
    ident: Ident,
    name: LitStr,
    ty: Type,
    attributes: FieldAttributes,
}

pub fn derive_model(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "generic models are not supported",
        ));
    }

    let attributes = ModelAttributes::from_attributes(&input.attrs)?;

    if attributes.embedded && attributes.collection.is_some() {
        return Err(Error::new_spanned(
            &input.ident,
            "embedded models have no collection",
        ));
    }

    let fields = {
        let fields_named = extract_named_fields(input.span(), input.data)?;

        let mut names = HashSet::new();
        let mut fields = vec![];

        for field in fields_named.named {
            let attributes = FieldAttributes::from_attributes(&field.attrs)?;

            extract!(field.ident, Some(ident), "expected named field");
            let name = ident.unraw().to_string();

            if !names.insert(name.clone()) {
                return Err(Error::new_spanned(&ident, "duplicate field"));
            }

            fields.push(FieldConfig {
                name: LitStr::new(&name, ident.span()),
                ident,
                ty: field.ty,
                attributes,
            });
        }

        fields
    };

    let output = build(&input.vis, &input.ident, &attributes, &fields);

    Ok(output)
}

fn build(
    vis: &Visibility,
    ident: &Ident,
    attributes: &ModelAttributes,
    fields: &[FieldConfig],
) -> TokenStream {
    let krate = krate();

    let name = LitStr::new(&ident.unraw().to_string(), ident.span());
    let mod_ident = Ident::new(&ident.unraw().to_string().to_snake_case(), Span::call_site());

    let model_options = {
        let embedded = attributes.embedded.then(|| quote! { .embedded() });
        let collection = attributes
            .collection
            .as_ref()
            .map(|collection| quote! { .collection(#collection) });
        let parse_doc_with_default_factories = attributes
            .parse_doc_with_default_factories
            .then(|| quote! { .parse_doc_with_default_factories(true) });

        quote! { #embedded #collection #parse_doc_with_default_factories }
    };

    let field_specs = fields.iter().map(|field| {
        let FieldConfig { name, ty, .. } = field;

        let key = field
            .attributes
            .key
            .as_ref()
            .map(|key| quote! { .key(#key) });

        let primary = field.attributes.primary.then(|| quote! { .primary() });

        let default = field.attributes.default.as_ref().map(|DefaultExpr(expr)| {
            quote! {
                .default(#krate::types::default_value::<#ty>(
                    <Self as #krate::Model>::NAME,
                    #name,
                    #expr,
                )?)
            }
        });

        let default_factory = field.attributes.default_factory.as_ref().map(|path| {
            quote! {
                .try_default_factory(|| {
                    #krate::types::factory_value::<#ty>(#path())
                })
            }
        });

        quote! {
            .field(
                #krate::FieldSpec::new(
                    #name,
                    <#ty as #krate::FieldValue>::field_type(registry)?,
                )
                #key
                #primary
                #default
                #default_factory
            )
        }
    });

    let field_idents = fields.iter().map(|field| &field.ident).collect_vec();
    let field_names = fields.iter().map(|field| &field.name).collect_vec();
    let field_types = fields.iter().map(|field| &field.ty).collect_vec();

    let field_value_impl = attributes.embedded.then(|| {
        quote! {
            impl #krate::FieldValue for #ident {
                fn field_type(
                    registry: &#krate::SchemaRegistry,
                ) -> ::std::result::Result<#krate::FieldType, #krate::SchemaError> {
                    #krate::types::embedded_field_type::<Self>(registry)
                }

                fn into_value(self) -> #krate::Result<#krate::Value> {
                    #krate::types::embedded_into_value(self)
                }

                fn from_value(value: &#krate::Value) -> #krate::Result<Self> {
                    #krate::types::embedded_from_value(value)
                }
            }
        }
    });

    quote! {
        impl #krate::Model for #ident {
            const NAME: &'static str = #name;

            fn declare(
                registry: &#krate::SchemaRegistry,
            ) -> ::std::result::Result<#krate::SchemaBuilder, #krate::SchemaError> {
                ::std::result::Result::Ok(
                    #krate::SchemaBuilder::new(<Self as #krate::Model>::NAME)
                        #model_options
                        #( #field_specs )*
                )
            }

            fn into_fields(
                self,
            ) -> #krate::Result<::std::vec::Vec<(&'static str, #krate::Value)>> {
                ::std::result::Result::Ok(::std::vec![
                    #(
                        (#field_names, #krate::FieldValue::into_value(self.#field_idents)?)
                    ),*
                ])
            }

            fn from_instance(instance: &#krate::Instance) -> #krate::Result<Self> {
                ::std::result::Result::Ok(Self {
                    #(
                        #field_idents: instance.get_as::<#field_types>(#field_names)?
                    ),*
                })
            }
        }

        #field_value_impl

        #krate::__declare_model!(#ident);

        #[allow(dead_code)]
        #vis mod #mod_ident {
            use super::*;

            #(
                pub fn #field_idents() -> #krate::Result<#krate::Field<#field_types>> {
                    #krate::Field::resolve::<#ident>(#field_names)
                }
            )*

            #[allow(unused_macros)]
            macro_rules! filter {
                ($( $input: tt )*) => {
                   #krate::construct_filter!(#mod_ident, $( $input )*)
                };
            }

            #[allow(unused_imports)]
            pub(crate) use filter;
        }
    }
}
