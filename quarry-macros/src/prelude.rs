pub(crate) use crate::utils::{extract, krate};
pub use darling::{FromAttributes, FromMeta};
pub use heck::ToSnakeCase;
pub use itertools::Itertools;
pub use proc_macro2::{Span, TokenStream};
pub use quote::quote;
pub use std::collections::HashSet;
pub use syn::{
    Data, DeriveInput, Error, Expr, Fields, FieldsNamed, Ident, LitStr, Path, Result, Token, Type,
    Visibility,
    parse::{Parse, ParseStream},
    parse2,
    punctuated::Punctuated,
    spanned::Spanned,
};
