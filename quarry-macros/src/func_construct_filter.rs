use crate::prelude::*;

const OPERATORS: [(&str, &str); 9] = [
    ("Eq", "eq"),
    ("Ne", "ne"),
    ("Gt", "gt"),
    ("Gte", "gte"),
    ("Lt", "lt"),
    ("Lte", "lte"),
    ("In", "in_"),
    ("Nin", "not_in"),
    ("Regex", "regex"),
];

struct Input {
    module: Ident,
    fields: Punctuated<Field, Token![,]>,
}

impl Parse for Input {
    fn parse(input: ParseStream) -> Result<Self> {
        let module = input.parse()?;
        input.parse::<Token![,]>()?;
        let fields = Punctuated::parse_terminated(input)?;
        Ok(Self { module, fields })
    }
}

struct Field {
    ident: Ident,
    method: Ident,
    value: Expr,
}

impl Parse for Field {
    fn parse(input: ParseStream) -> Result<Self> {
        let ident = input.parse()?;
        input.parse::<Token![:]>()?;

        let operator_or_value = input.parse::<Expr>()?;

        let mut method_and_operand = None;

        if let Expr::Call(expr_call) = &operator_or_value {
            if let Expr::Path(expr_path) = expr_call.func.as_ref() {
                if let Some(ident) = expr_path.path.get_ident() {
                    let method = OPERATORS
                        .iter()
                        .find(|(operator, _)| ident == operator)
                        .map(|(_, method)| Ident::new(method, ident.span()));

                    if let Some(method) = method {
                        if expr_call.args.len() != 1 {
                            return Err(Error::new_spanned(
                                expr_call,
                                "operators take a single operand",
                            ));
                        }

                        method_and_operand = Some((method, expr_call.args[0].clone()));
                    }
                }
            }
        }

        let (method, value) = method_and_operand
            .unwrap_or_else(|| (Ident::new("eq", Span::call_site()), operator_or_value));

        Ok(Self {
            ident,
            method,
            value,
        })
    }
}

pub fn func_construct_filter(input: TokenStream) -> Result<TokenStream> {
    let input = parse2::<Input>(input)?;

    let output = build(&input);

    Ok(output)
}

fn build(input: &Input) -> TokenStream {
    let krate = krate();
    let module = &input.module;

    let comparisons = input.fields.iter().map(|field| {
        let Field {
            ident,
            method,
            value,
        } = field;

        quote! {
            #module::#ident()?.#method(#value)?
        }
    });

    quote! {
        (|| -> #krate::Result<#krate::QueryExpression> {
            ::std::result::Result::Ok(#krate::build_query(::std::vec![
                #( #comparisons ),*
            ]))
        })()
    }
}
