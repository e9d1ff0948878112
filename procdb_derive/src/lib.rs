use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{
    Attribute, Data, DeriveInput, Fields, FnArg, GenericArgument, Ident, ItemTrait, LitStr, Pat,
    PathArguments, ReturnType, TraitItem, Type, parse_macro_input, spanned::Spanned,
};

/// Implements `procdb::Entity` and `procdb::FromRow` for a struct with named fields.
///
/// Fields are exposed under their lower-camel code names (`customer_name` ->
/// `customerName`); `#[entity(rename = "...")]` overrides a field's code name
/// and `#[entity(name = "...")]` on the struct overrides the shape name.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Turns a trait of stored-procedure methods into a typed proxy.
///
/// Every method takes `&mut self` and returns `Result<()>`, `Result<Option<T>>`,
/// `Result<Vec<T>>` or `Result<Cursor<'_, T>>`. Parameters may carry one of
/// `#[lower_case]`, `#[upper_case]`, `#[like_prefix]`, `#[timestamp]` or
/// `#[bit_mask]`.
#[proc_macro_attribute]
pub fn stored_procedures(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = match parse_interface_options(attr.into()) {
        Ok(options) => options,
        Err(err) => return err.to_compile_error().into(),
    };

    let input = parse_macro_input!(item as ItemTrait);
    match expand_stored_procedures(options, input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// `customer_name` -> `customerName`. Each `_`-separated word is lower-cased.
fn to_lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, word) in name.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lowered = word.to_lowercase();
        if i == 0 {
            out.push_str(&lowered);
            continue;
        }
        let mut chars = lowered.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// `customerName` -> `customer_name`, the way the runtime derives column and
/// procedure names.
fn to_lower_snake(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, ch) in camel.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

/// Name recorded in the declaration for a Rust identifier. Lower camel case
/// when that maps back onto the same database name, the identifier as
/// written otherwise (`x_1` would turn into `x1`).
fn declared_name(ident: &str) -> String {
    let camel = to_lower_camel(ident);
    if to_lower_snake(&camel) == ident.to_lowercase() {
        camel
    } else {
        ident.to_string()
    }
}

// ============================================================================
// #[derive(Entity)]
// ============================================================================

fn expand_entity(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Entity does not support generic structs",
        ));
    }

    let shape_name = parse_entity_name(&input.attrs)?.unwrap_or_else(|| struct_name.to_string());

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Entity requires a struct with named fields",
            ));
        }
    };

    let mut columns = Vec::new();
    let mut assignments = Vec::new();
    for (index, field) in named_fields.named.iter().enumerate() {
        let Some(ident) = field.ident.as_ref() else {
            return Err(syn::Error::new(field.span(), "Entity fields must be named"));
        };
        let ty = &field.ty;
        let code_name = parse_field_rename(&field.attrs)?
            .unwrap_or_else(|| declared_name(&ident.unraw().to_string()));
        let index = syn::Index::from(index);

        columns.push(quote! {
            ::procdb::Column::new(#code_name, <#ty as ::procdb::FromValue>::DATA_TYPE)
                .nullable(<#ty as ::procdb::FromValue>::NULLABLE)
        });
        assignments.push(quote! {
            #ident: row.take(#index)?
        });
    }

    Ok(quote! {
        impl ::procdb::Entity for #struct_name {
            fn shape() -> &'static ::procdb::EntityShape {
                static SHAPE: ::std::sync::OnceLock<::procdb::EntityShape> =
                    ::std::sync::OnceLock::new();
                SHAPE.get_or_init(|| {
                    ::procdb::EntityShape::record(#shape_name, ::std::vec![#(#columns),*])
                })
            }
        }

        impl ::procdb::FromRow for #struct_name {
            #[allow(unused_mut, unused_variables)]
            fn from_row(mut row: ::procdb::MappedRow) -> ::procdb::Result<Self> {
                ::std::result::Result::Ok(Self {
                    #(#assignments),*
                })
            }
        }
    })
}

fn parse_entity_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut name = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                name = Some(lit.value());
                return Ok(());
            }
            Err(meta.error("Unsupported #[entity(...)] option on a struct. Supported: name = \"...\""))
        })?;
    }
    Ok(name)
}

fn parse_field_rename(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                rename = Some(lit.value());
                return Ok(());
            }
            Err(meta.error("Unsupported #[entity(...)] option on a field. Supported: rename = \"...\""))
        })?;
    }
    Ok(rename)
}

// ============================================================================
// #[stored_procedures]
// ============================================================================

#[derive(Default)]
struct InterfaceOptions {
    name: Option<String>,
}

fn parse_interface_options(attr: TokenStream2) -> syn::Result<InterfaceOptions> {
    let mut options = InterfaceOptions::default();
    if attr.is_empty() {
        return Ok(options);
    }

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("name") {
            let lit: LitStr = meta.value()?.parse()?;
            options.name = Some(lit.value());
            return Ok(());
        }
        Err(meta.error("Unsupported #[stored_procedures(...)] option. Supported: name = \"...\""))
    });
    syn::parse::Parser::parse2(parser, attr)?;
    Ok(options)
}

const PREPROCESSOR_TAGS: &[(&str, &str)] = &[
    ("lower_case", "LowerCase"),
    ("upper_case", "UpperCase"),
    ("like_prefix", "LikePrefix"),
    ("timestamp", "Timestamp"),
    ("bit_mask", "BitMask"),
];

enum ReturnKind {
    Void,
    Single(Type),
    List(Type),
    Cursor(Type),
}

struct ProcedureParam {
    ident: Ident,
    ty: Type,
    tags: Vec<Ident>,
}

struct ProcedureMethod {
    sig: syn::Signature,
    params: Vec<ProcedureParam>,
    returns: ReturnKind,
}

fn expand_stored_procedures(options: InterfaceOptions, mut item: ItemTrait) -> syn::Result<TokenStream2> {
    let trait_name = item.ident.clone();
    let vis = item.vis.clone();
    let proxy_name = format_ident!("{}Proxy", trait_name);
    let interface_name = options.name.unwrap_or_else(|| trait_name.to_string());

    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[stored_procedures] does not support generic traits",
        ));
    }
    if !item.supertraits.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.supertraits,
            "#[stored_procedures] traits cannot have supertraits",
        ));
    }

    let mut methods = Vec::new();
    for trait_item in item.items.iter_mut() {
        let method = match trait_item {
            TraitItem::Fn(method) => method,
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "#[stored_procedures] traits may only declare methods",
                ));
            }
        };
        if let Some(body) = &method.default {
            return Err(syn::Error::new(
                body.span(),
                "stored procedure methods cannot have a default body",
            ));
        }
        methods.push(parse_procedure_method(&mut method.sig)?);
    }

    let mut procedure_decls = Vec::new();
    let mut proxy_methods = Vec::new();
    for (index, method) in methods.iter().enumerate() {
        let code_name = declared_name(&method.sig.ident.unraw().to_string());

        let params = method.params.iter().map(|param| {
            let param_name = declared_name(&param.ident.unraw().to_string());
            let ty = &param.ty;
            let tags = param.tags.iter().map(|tag| {
                quote!(.preprocessor(::procdb::Preprocessor::#tag))
            });
            quote! {
                .param(
                    ::procdb::ParamDecl::new(#param_name, <#ty as ::procdb::SqlParam>::DATA_TYPE)
                        #(#tags)*
                )
            }
        });

        let returns = match &method.returns {
            ReturnKind::Void => quote!(::procdb::ReturnShape::Void),
            ReturnKind::Single(entity) => {
                quote!(::procdb::ReturnShape::Single(<#entity as ::procdb::Entity>::shape().clone()))
            }
            ReturnKind::List(entity) => {
                quote!(::procdb::ReturnShape::List(<#entity as ::procdb::Entity>::shape().clone()))
            }
            ReturnKind::Cursor(entity) => {
                quote!(::procdb::ReturnShape::Cursor(<#entity as ::procdb::Entity>::shape().clone()))
            }
        };

        procedure_decls.push(quote! {
            .procedure(
                ::procdb::ProcedureDecl::new(#code_name)
                    #(#params)*
                    .returns(#returns)
            )
        });

        let sig = &method.sig;
        let index = syn::Index::from(index);
        let args = method.params.iter().map(|param| {
            let ident = &param.ident;
            quote!(::procdb::SqlParam::into_value(#ident))
        });
        let call = match &method.returns {
            ReturnKind::Void => quote!(execute),
            ReturnKind::Single(entity) => quote!(single::<#entity>),
            ReturnKind::List(entity) => quote!(list::<#entity>),
            ReturnKind::Cursor(entity) => quote!(cursor::<#entity>),
        };

        proxy_methods.push(quote! {
            #sig {
                self.implementation
                    .procedure_at(#index)?
                    .#call(&mut *self.session, ::std::vec![#(#args),*])
            }
        });
    }

    Ok(quote! {
        #item

        /// Session-bound implementation generated by `#[stored_procedures]`.
        #vis struct #proxy_name<'s> {
            session: &'s mut ::procdb::Session,
            implementation: ::std::sync::Arc<::procdb::Implementation>,
        }

        #[allow(dead_code)]
        impl<'s> #proxy_name<'s> {
            pub fn implementation(&self) -> &::procdb::Implementation {
                &self.implementation
            }

            pub fn session(&mut self) -> &mut ::procdb::Session {
                &mut *self.session
            }
        }

        impl ::procdb::ProcedureInterface for dyn #trait_name {
            type Proxy<'s> = #proxy_name<'s>;

            fn declaration() -> ::procdb::InterfaceDecl {
                ::procdb::InterfaceDecl::new(#interface_name)
                    #(#procedure_decls)*
            }

            fn bind<'s>(
                implementation: ::std::sync::Arc<::procdb::Implementation>,
                session: &'s mut ::procdb::Session,
            ) -> Self::Proxy<'s> {
                #proxy_name { session, implementation }
            }
        }

        impl #trait_name for #proxy_name<'_> {
            #(#proxy_methods)*
        }
    })
}

/// Validates one method signature and strips the pre-processor tags from its parameters.
fn parse_procedure_method(sig: &mut syn::Signature) -> syn::Result<ProcedureMethod> {
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "stored procedure methods cannot be generic",
        ));
    }
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new(
            asyncness.span(),
            "stored procedure methods cannot be async",
        ));
    }

    let mut inputs = sig.inputs.iter_mut();
    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_some() => {}
        _ => {
            return Err(syn::Error::new(
                sig.ident.span(),
                "stored procedure methods must take `&mut self`",
            ));
        }
    }

    let mut params = Vec::new();
    for input in inputs {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new(input.span(), "unexpected receiver"));
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(syn::Error::new(
                pat_type.pat.span(),
                "stored procedure parameters must be plain identifiers",
            ));
        };

        let mut tags = Vec::new();
        let mut kept = Vec::new();
        for attr in pat_type.attrs.drain(..) {
            match PREPROCESSOR_TAGS
                .iter()
                .find(|(tag, _)| attr.path().is_ident(tag))
            {
                Some((_, variant)) => {
                    attr.meta.require_path_only()?;
                    tags.push(Ident::new(variant, attr.span()));
                }
                None => kept.push(attr),
            }
        }
        pat_type.attrs = kept;

        params.push(ProcedureParam {
            ident: pat_ident.ident.clone(),
            ty: (*pat_type.ty).clone(),
            tags,
        });
    }

    let returns = parse_return_kind(&sig.output)?;

    Ok(ProcedureMethod {
        sig: sig.clone(),
        params,
        returns,
    })
}

const RETURN_HINT: &str =
    "stored procedure methods must return Result<()>, Result<Option<T>>, Result<Vec<T>> or Result<Cursor<'_, T>>";

fn parse_return_kind(output: &ReturnType) -> syn::Result<ReturnKind> {
    let ReturnType::Type(_, ty) = output else {
        return Err(syn::Error::new(output.span(), RETURN_HINT));
    };
    let inner = single_type_argument(ty, "Result")
        .ok_or_else(|| syn::Error::new(ty.span(), RETURN_HINT))?;

    if let Type::Tuple(tuple) = inner {
        if tuple.elems.is_empty() {
            return Ok(ReturnKind::Void);
        }
    }
    if let Some(entity) = single_type_argument(inner, "Option") {
        return Ok(ReturnKind::Single(entity.clone()));
    }
    if let Some(entity) = single_type_argument(inner, "Vec") {
        return Ok(ReturnKind::List(entity.clone()));
    }
    if let Some(entity) = single_type_argument(inner, "Cursor") {
        return Ok(ReturnKind::Cursor(entity.clone()));
    }

    Err(syn::Error::new(inner.span(), RETURN_HINT))
}

/// First type argument of `ty` when its last path segment is `wrapper`.
fn single_type_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}
