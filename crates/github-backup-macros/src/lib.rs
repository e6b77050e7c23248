use proc_macro::TokenStream;

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Expr, ExprLit, ItemStruct, Lit, Meta, Token, parse::Parser, spanned::Spanned,
};

/// Declares a node of the backup tree.
///
/// ```ignore
/// #[Section(token = "ISSUES", kind = "group", label = "Issues")]
/// pub struct IssuesSection;
/// ```
///
/// Keys:
/// - `token`: checkpoint segment appended to the parent id (required)
/// - `kind`: `"group"`, `"scope"` or `"step"` (required)
/// - `cost`: remote accesses charged on admission (required unless `kind = "group"`)
/// - `label`: human readable name (required)
#[proc_macro_attribute]
#[allow(non_snake_case)]
pub fn Section(attr: TokenStream, item: TokenStream) -> TokenStream {
    section_impl(attr.into(), item.into())
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn lit_str(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.value()),
        _ => Err(syn::Error::new(expr.span(), "expected string literal")),
    }
}

fn lit_u32(expr: &Expr) -> syn::Result<u32> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(i), ..
        }) => i.base10_parse::<u32>(),
        _ => Err(syn::Error::new(expr.span(), "expected integer literal")),
    }
}

fn drop_our_attrs(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs
        .iter()
        .filter(|a| {
            let Meta::Path(p) = &a.meta else {
                return true;
            };
            let Some(ident) = p.get_ident() else {
                return true;
            };
            ident != "Section"
        })
        .cloned()
        .collect()
}

fn valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

struct SectionMeta {
    token: String,
    kind: String,
    cost: u32,
    label: String,
}

fn section_impl(attr: TokenStream2, item: TokenStream2) -> syn::Result<TokenStream2> {
    let mut st: ItemStruct = syn::parse2(item)?;
    st.attrs = drop_our_attrs(&st.attrs);
    let struct_ident = st.ident.clone();

    let parser = syn::punctuated::Punctuated::<Meta, Token![,]>::parse_terminated;
    let metas = parser.parse2(attr)?;

    let mut token: Option<String> = None;
    let mut kind: Option<String> = None;
    let mut cost: Option<u32> = None;
    let mut label: Option<String> = None;

    for m in metas {
        let Meta::NameValue(nv) = m else {
            return Err(syn::Error::new(m.span(), "expected key = value"));
        };
        let Some(key) = nv.path.get_ident().map(|i| i.to_string()) else {
            return Err(syn::Error::new(nv.path.span(), "expected ident key"));
        };
        let v = &nv.value;
        match key.as_str() {
            "token" => {
                let t = lit_str(v)?;
                if !valid_token(&t) {
                    return Err(syn::Error::new(
                        v.span(),
                        "Section: token must be non-empty [A-Z0-9_]",
                    ));
                }
                token = Some(t);
            }
            "kind" => kind = Some(lit_str(v)?),
            "cost" => cost = Some(lit_u32(v)?),
            "label" => label = Some(lit_str(v)?),
            other => {
                return Err(syn::Error::new(
                    nv.path.span(),
                    format!("unknown Section attribute key '{other}'"),
                ));
            }
        }
    }

    let kind = kind.ok_or_else(|| syn::Error::new(struct_ident.span(), "Section: missing kind"))?;
    let cost = match (kind.as_str(), cost) {
        ("group", None) | ("group", Some(0)) => 0,
        ("group", Some(_)) => {
            return Err(syn::Error::new(
                struct_ident.span(),
                "Section: a group is structural and must not declare a cost",
            ));
        }
        ("scope", Some(c)) | ("step", Some(c)) if c >= 1 => c,
        ("scope", _) | ("step", _) => {
            return Err(syn::Error::new(
                struct_ident.span(),
                "Section: scope and step nodes need cost >= 1",
            ));
        }
        (other, _) => {
            return Err(syn::Error::new(
                struct_ident.span(),
                format!("Section: unknown kind '{other}' (expected group, scope or step)"),
            ));
        }
    };

    let meta = SectionMeta {
        token: token
            .ok_or_else(|| syn::Error::new(struct_ident.span(), "Section: missing token"))?,
        kind,
        cost,
        label: label
            .ok_or_else(|| syn::Error::new(struct_ident.span(), "Section: missing label"))?,
    };

    let token_lit = meta.token;
    let cost_lit = meta.cost;
    let label_lit = meta.label;
    let kind_variant = match meta.kind.as_str() {
        "group" => quote! { crate::sections::NodeKind::Group },
        "scope" => quote! { crate::sections::NodeKind::Scope },
        _ => quote! { crate::sections::NodeKind::Step },
    };

    let expanded = quote! {
        #st

        impl #struct_ident {
            pub const TOKEN: &'static str = #token_lit;
            pub const KIND: crate::sections::NodeKind = #kind_variant;
            pub const COST: u32 = #cost_lit;
            pub const LABEL: &'static str = #label_lit;

            pub fn id(parent: &crate::checkpoint::CheckpointId) -> crate::checkpoint::CheckpointId {
                parent.child(Self::TOKEN)
            }
        }

        impl crate::sections::SectionInfo for #struct_ident {
            fn token(&self) -> &'static str {
                Self::TOKEN
            }

            fn kind(&self) -> crate::sections::NodeKind {
                Self::KIND
            }

            fn cost(&self) -> u32 {
                Self::COST
            }

            fn label(&self) -> &'static str {
                Self::LABEL
            }
        }
    };

    Ok(expanded)
}
