use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use proc_macro_error::{abort, abort_call_site, proc_macro_error};
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, LitStr};

const DATA_NODE: &str = "data_node";
const CONSTRUCT: &str = "construct";
const BASE_FIELD: &str = "base";

/// Attributes collected from `#[data_node(...)]`.
struct NodeAttrs {
    path: LitStr,
    parents: Vec<LitStr>,
    context_key: bool,
}

fn parse_node_attrs(input: &DeriveInput) -> NodeAttrs {
    let mut path: Option<LitStr> = None;
    let mut parents = Vec::new();
    let mut context_key = false;

    for attr in &input.attrs {
        if !attr.path().is_ident(DATA_NODE) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("path") {
                path = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("parent") {
                parents.push(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("context_key") {
                context_key = true;
                Ok(())
            } else {
                Err(meta.error("expected `path`, `parent` or `context_key`"))
            }
        })
        .unwrap_or_else(|e| abort!(e.span(), "Failed to parse data_node attributes: {}", e));
    }

    let path = path.unwrap_or_else(|| {
        abort_call_site!("DataNode derive requires #[data_node(path = \"...\")]")
    });
    if path.value().trim().is_empty() {
        abort!(path, "data_node path cannot be empty");
    }

    NodeAttrs {
        path,
        parents,
        context_key,
    }
}

fn is_skipped(field: &Field) -> bool {
    let mut skip = false;
    for attr in &field.attrs {
        if !attr.path().is_ident(CONSTRUCT) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("expected `skip`"))
            }
        })
        .unwrap_or_else(|e| abort!(e.span(), "Failed to parse construct attribute: {}", e));
    }
    skip
}

/// Derives `dac::node::DataNode` and `dac::node::DataNodeType` for a struct
/// with named fields.
///
/// The struct must hold its identity in a field named `base` of type
/// `dac::node::NodeBase`. Every other field goes into the construct config
/// through serde unless marked `#[construct(skip)]`, which is how bulk
/// payload (sample vectors and the like) is kept out of persisted projects.
///
/// ```ignore
/// #[derive(Debug, Clone, DataNode)]
/// #[data_node(path = "dac.modules.timedata.TimeData", parent = "dac.core.data.DataBase")]
/// pub struct TimeData {
///     base: NodeBase,
///     #[construct(skip)]
///     pub y: Vec<f64>,
///     pub dt: f64,
/// }
/// ```
#[proc_macro_derive(DataNode, attributes(data_node, construct))]
#[proc_macro_error]
pub fn derive_data_node(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = &input.ident;
    let NodeAttrs {
        path,
        parents,
        context_key,
    } = parse_node_attrs(&input);

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => abort!(ident, "DataNode can only be derived for structs with named fields"),
        },
        _ => abort!(ident, "DataNode can only be derived for structs"),
    };

    let mut has_base = false;
    let mut inserts: Vec<TokenStream2> = Vec::new();
    let mut applies: Vec<TokenStream2> = Vec::new();

    for field in fields {
        let Some(name) = &field.ident else { continue };
        if name == BASE_FIELD {
            has_base = true;
            continue;
        }
        if is_skipped(field) {
            continue;
        }
        let key = name.to_string();
        inserts.push(quote! {
            config.insert(#key.to_string(), ::dac::node::to_config_value(&self.#name));
        });
        applies.push(quote! {
            if let Some(value) = config.get(#key) {
                self.#name = ::dac::node::from_config_value(#path, #key, value)?;
            }
        });
    }

    if !has_base {
        abort!(ident, "DataNode requires a `base: NodeBase` field");
    }

    let expanded = quote! {
        impl ::dac::node::DataNode for #ident {
            fn base(&self) -> &::dac::node::NodeBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut ::dac::node::NodeBase {
                &mut self.base
            }

            fn type_path(&self) -> &'static str {
                #path
            }

            #[allow(unused_mut)]
            fn construct_config(&self) -> ::dac::node::ConstructConfig {
                let mut config = ::dac::node::ConstructConfig::new();
                #(#inserts)*
                config
            }

            fn apply_construct_config(
                &mut self,
                config: &::dac::node::ConstructConfig,
            ) -> ::dac::Result<()> {
                let _ = config;
                #(#applies)*
                Ok(())
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
        }

        impl ::dac::node::DataNodeType for #ident {
            const TYPE_PATH: &'static str = #path;
            const PARENTS: &'static [&'static str] = &[#(#parents),*];
            const CONTEXT_KEY: bool = #context_key;
        }
    };

    TokenStream::from(expanded)
}
