#[warn(clippy::pedantic)]
#[allow(clippy::too_many_lines)]
mod derive_model;
mod func_construct_filter;
mod prelude;
mod utils;

fn expand<F: FnOnce(proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream>>(
    fun: F,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    fun(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[proc_macro_derive(Model, attributes(model, field))]
pub fn model(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(derive_model::derive_model, input)
}

#[proc_macro]
pub fn construct_filter(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(func_construct_filter::func_construct_filter, input)
}
