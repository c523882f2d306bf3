//! Interpose Derive Macros: Interception Seams and Reflect Impls
//!
//! Rust cannot patch a function at runtime, so a mockable function carries
//! its own seam: `#[mockable]` moves the original body into a hidden
//! function and makes the visible one ask the seam table for a substitute
//! first. Without an installed mock the only cost is one atomic load.
//!
//! # Available Macros
//!
//! - [`macro@mockable`] - Add an interception seam to a function or to the
//!   methods of an inherent impl block
//! - [`Reflect`] - Describe a user type so it can cross a mocked signature
//!
//! # Example
//!
//! ```ignore
//! use interpose::{mockable, Reflect};
//!
//! #[derive(Debug, Clone, PartialEq, Default, Reflect)]
//! struct Config {
//!     retries: u32,
//! }
//!
//! #[mockable]
//! fn load(path: &str) -> Option<Config> {
//!     std::fs::read_to_string(path).ok().map(|_| Config { retries: 3 })
//! }
//!
//! // Generated alongside `load`:
//! // fn load_target() -> interpose::FunctionTarget
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote, ToTokens};
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, FnArg, GenericParam, Ident,
    ImplItem, ImplItemFn, Item, ItemFn, ItemImpl, Pat, PatIdent, PatType, ReturnType, Signature,
    Type,
};

/// Add an interception seam to a free function or an inherent impl block.
///
/// For a free function `f` this generates a sibling `f_target()` returning
/// an `interpose::FunctionTarget`. Inside an impl block, every method with
/// a `&self` or `&mut self` receiver gets `Type::m_target()` returning an
/// `interpose::MethodTarget`; associated functions without a receiver get
/// a `FunctionTarget`. Methods taking `self` by value are left untouched.
///
/// # Supported signatures
///
/// - Parameters: owned `T`, `&T` (recorded as `T`) and `&str` (recorded as
///   `String`), where `T: interpose::Reflect`
/// - Returns: nothing, a single `T`, or a tuple with one output per element
///
/// `&mut` parameters, `impl Trait`, type or const generics, `async`,
/// `const` and `unsafe` functions and reference returns are rejected.
///
/// # Example
///
/// ```ignore
/// #[mockable]
/// impl Greeter {
///     pub fn greet(&self, name: &str) -> String {
///         format!("{}, {name}", self.greeting)
///     }
/// }
///
/// let mock = scope.mock_method(Some(&greeter), Some(&Greeter::greet_target()));
/// ```
#[proc_macro_attribute]
pub fn mockable(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let attr = TokenStream2::from(attr);
        return syn::Error::new_spanned(attr, "#[mockable] takes no arguments")
            .into_compile_error()
            .into();
    }
    let item = parse_macro_input!(item as Item);
    let expanded = match item {
        Item::Fn(function) => expand_fn(function),
        Item::Impl(block) => expand_impl(block),
        other => Err(syn::Error::new_spanned(
            other,
            "#[mockable] applies to functions and inherent impl blocks",
        )),
    };
    expanded
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive `interpose::Reflect` for a struct or enum.
///
/// The zero value is `Default::default()`, so the type must implement
/// `Default` as well as `Clone`, `PartialEq` and `Debug`.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Default, Reflect)]
/// enum Mode {
///     #[default]
///     Fast,
///     Safe,
/// }
/// ```
#[proc_macro_derive(Reflect)]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    reflect_impl(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn reflect_impl(mut input: DeriveInput) -> syn::Result<TokenStream2> {
    let kind = match &input.data {
        Data::Struct(_) => quote!(Struct),
        Data::Enum(_) => quote!(Enum),
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Reflect cannot be derived for unions",
            ))
        }
    };
    for param in &mut input.generics.params {
        if let GenericParam::Type(ty) = param {
            ty.bounds.push(parse_quote!(::interpose::Reflect));
        }
    }
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::interpose::Reflect for #name #ty_generics #where_clause {
            const KIND: ::interpose::TypeKind = ::interpose::TypeKind::#kind;

            fn zero() -> Self {
                ::std::default::Default::default()
            }
        }
    })
}

/// How a parameter crosses the seam
#[derive(Debug, Clone)]
enum ParamKind {
    /// `T`, recorded as `T`
    Owned(Type),
    /// `&T`, recorded as a clone of `T`
    Ref(Type),
    /// `&str`, recorded as `String`
    Str,
}

impl ParamKind {
    fn classify(ty: &Type) -> syn::Result<Self> {
        match ty {
            Type::Reference(reference) => {
                if reference.mutability.is_some() {
                    return Err(syn::Error::new_spanned(
                        ty,
                        "#[mockable] cannot record `&mut` parameters",
                    ));
                }
                if is_str(&reference.elem) {
                    Ok(Self::Str)
                } else {
                    check_recordable(&reference.elem)?;
                    Ok(Self::Ref((*reference.elem).clone()))
                }
            }
            other => {
                check_recordable(other)?;
                Ok(Self::Owned(other.clone()))
            }
        }
    }

    /// Type recorded in the target descriptor
    fn recorded(&self) -> Type {
        match self {
            Self::Owned(ty) | Self::Ref(ty) => ty.clone(),
            Self::Str => parse_quote!(::std::string::String),
        }
    }

    /// Expression turning the wrapper argument into a `Value`
    fn capture(&self, arg: &Ident) -> TokenStream2 {
        match self {
            Self::Owned(_) => quote!(::interpose::Value::of(::std::clone::Clone::clone(&#arg))),
            Self::Ref(_) => quote!(::interpose::Value::of(::std::clone::Clone::clone(#arg))),
            Self::Str => quote!(::interpose::Value::of(::std::string::ToString::to_string(#arg))),
        }
    }

    /// Expression rebuilding the argument from the value list
    fn restore(&self, index: usize) -> TokenStream2 {
        let recorded = self.recorded();
        let value = quote! {
            ::interpose::interceptor::seam::arg::<#recorded>(
                __interpose_id,
                __interpose_values,
                #index,
            )
        };
        match self {
            Self::Owned(_) => value,
            Self::Ref(_) => quote!(&#value),
            Self::Str => quote!(&*#value),
        }
    }
}

fn is_str(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.qself.is_none() && path.path.is_ident("str"))
}

fn check_recordable(ty: &Type) -> syn::Result<()> {
    match ty {
        Type::ImplTrait(_) => Err(syn::Error::new_spanned(
            ty,
            "#[mockable] cannot record `impl Trait` types",
        )),
        Type::Reference(_) => Err(syn::Error::new_spanned(
            ty,
            "#[mockable] records `&T` and `&str` only; nested references are not supported",
        )),
        Type::Paren(inner) => check_recordable(&inner.elem),
        Type::Group(inner) => check_recordable(&inner.elem),
        _ => Ok(()),
    }
}

/// Output shape of a mockable function
#[derive(Debug, Clone)]
enum Outputs {
    Unit,
    Single(Type),
    Tuple(Vec<Type>),
}

impl Outputs {
    fn classify(output: &ReturnType) -> syn::Result<Self> {
        let ty = match output {
            ReturnType::Default => return Ok(Self::Unit),
            ReturnType::Type(_, ty) => ty.as_ref(),
        };
        match ty {
            Type::Tuple(tuple) if tuple.elems.is_empty() => Ok(Self::Unit),
            Type::Tuple(tuple) => {
                for elem in &tuple.elems {
                    check_output(elem)?;
                }
                Ok(Self::Tuple(tuple.elems.iter().cloned().collect()))
            }
            other => {
                check_output(other)?;
                Ok(Self::Single(other.clone()))
            }
        }
    }

    fn types(&self) -> Vec<Type> {
        match self {
            Self::Unit => Vec::new(),
            Self::Single(ty) => vec![ty.clone()],
            Self::Tuple(types) => types.clone(),
        }
    }

    /// Statements turning `__interpose_out` into a `Vec<Value>`
    fn pack(&self) -> TokenStream2 {
        match self {
            Self::Unit => quote! {
                let _: () = __interpose_out;
                ::std::vec::Vec::new()
            },
            Self::Single(_) => quote! {
                ::std::vec![::interpose::Value::of(__interpose_out)]
            },
            Self::Tuple(types) => {
                let parts: Vec<Ident> = (0..types.len())
                    .map(|i| format_ident!("__interpose_out{}", i))
                    .collect();
                quote! {
                    let (#(#parts,)*) = __interpose_out;
                    ::std::vec![#(::interpose::Value::of(#parts)),*]
                }
            }
        }
    }

    /// Expression converting `__interpose_iter` back into the return type
    fn unpack(&self) -> TokenStream2 {
        let take = |ty: &Type| {
            quote! {
                ::interpose::interceptor::seam::output::<#ty>(__interpose_id, &mut __interpose_iter)
            }
        };
        match self {
            Self::Unit => quote!(()),
            Self::Single(ty) => take(ty),
            Self::Tuple(types) => {
                let parts = types.iter().map(take);
                quote!((#(#parts,)*))
            }
        }
    }
}

fn check_output(ty: &Type) -> syn::Result<()> {
    match ty {
        Type::Reference(_) => Err(syn::Error::new_spanned(
            ty,
            "#[mockable] cannot return references; return an owned value",
        )),
        Type::ImplTrait(_) => Err(syn::Error::new_spanned(
            ty,
            "#[mockable] cannot return `impl Trait`",
        )),
        _ => Ok(()),
    }
}

/// Receiver of a method, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiver {
    None,
    Shared,
    Unique,
    ByValue,
}

impl Receiver {
    fn of(sig: &Signature) -> Self {
        match sig.receiver() {
            None => Self::None,
            Some(receiver) if receiver.reference.is_none() => Self::ByValue,
            Some(receiver) if receiver.mutability.is_some() => Self::Unique,
            Some(_) => Self::Shared,
        }
    }
}

/// Everything needed to generate a seam for one signature
struct Seam {
    params: Vec<(Ident, ParamKind)>,
    outputs: Outputs,
}

impl Seam {
    fn analyze(sig: &Signature) -> syn::Result<Self> {
        check_signature(sig)?;
        let mut params = Vec::new();
        for input in &sig.inputs {
            if let FnArg::Typed(PatType { ty, .. }) = input {
                let ident = format_ident!("__interpose_arg{}", params.len());
                params.push((ident, ParamKind::classify(ty)?));
            }
        }
        Ok(Self {
            params,
            outputs: Outputs::classify(&sig.output)?,
        })
    }

    /// Wrapper signature: same types, generated parameter names
    fn wrapper_sig(&self, sig: &Signature) -> Signature {
        let mut wrapper = sig.clone();
        let mut names = self.params.iter().map(|(ident, _)| ident);
        for input in &mut wrapper.inputs {
            if let FnArg::Typed(typed) = input {
                if let Some(ident) = names.next() {
                    typed.pat = Box::new(Pat::Ident(PatIdent {
                        attrs: Vec::new(),
                        by_ref: None,
                        mutability: None,
                        ident: ident.clone(),
                        subpat: None,
                    }));
                }
            }
        }
        wrapper
    }

    /// `callee(arg0, arg1, ..)` with the wrapper's own arguments
    fn direct_args(&self) -> Vec<&Ident> {
        self.params.iter().map(|(ident, _)| ident).collect()
    }

    fn restored_args(&self) -> Vec<TokenStream2> {
        self.params
            .iter()
            .enumerate()
            .map(|(index, (_, kind))| kind.restore(index))
            .collect()
    }

    fn captures(&self) -> Vec<TokenStream2> {
        self.params
            .iter()
            .map(|(ident, kind)| kind.capture(ident))
            .collect()
    }

    /// Wrapper body consulting the seam before calling `real`
    fn wrapper_body(
        &self,
        id: &TokenStream2,
        receiver: &TokenStream2,
        real: &TokenStream2,
    ) -> TokenStream2 {
        let captures = self.captures();
        let restored = self.restored_args();
        let direct = self.direct_args();
        let pack = self.outputs.pack();
        let unpack = self.outputs.unpack();
        quote! {
            {
                let __interpose_id: &'static str = ::interpose::interceptor::seam::id_of(&#id);
                let __interpose_receiver = #receiver;
                let __interpose_outputs = ::interpose::interceptor::seam::intercept(
                    __interpose_id,
                    __interpose_receiver,
                    || ::std::vec![#(#captures),*],
                    &mut |__interpose_values: &[::interpose::Value]| -> ::std::vec::Vec<::interpose::Value> {
                        let __interpose_out = #real(#(#restored),*);
                        #pack
                    },
                );
                match __interpose_outputs {
                    ::std::option::Option::Some(__interpose_values) => {
                        #[allow(unused_mut, unused_variables)]
                        let mut __interpose_iter = __interpose_values.into_iter();
                        #unpack
                    }
                    ::std::option::Option::None => #real(#(#direct),*),
                }
            }
        }
    }

    /// `TargetDescriptor` builder chain for this signature
    fn descriptor(&self, id: &TokenStream2) -> TokenStream2 {
        let params = self.params.iter().map(|(_, kind)| kind.recorded());
        let returns = self.outputs.types();
        quote! {
            ::interpose::TargetDescriptor::new(::interpose::TargetId::from_static(
                ::interpose::interceptor::seam::id_of(&#id),
            ))
            #(.with_param::<#params>())*
            #(.with_return::<#returns>())*
        }
    }

    /// Body of a `*_target()` function returning a `FunctionTarget`
    fn function_target(&self, id: &TokenStream2, real: &TokenStream2) -> TokenStream2 {
        let descriptor = self.descriptor(id);
        let restored = self.restored_args();
        let pack = self.outputs.pack();
        quote! {
            let __interpose_id: &'static str = ::interpose::interceptor::seam::id_of(&#id);
            ::interpose::FunctionTarget::from_fn(
                #descriptor,
                move |__interpose_values: &[::interpose::Value]| -> ::std::vec::Vec<::interpose::Value> {
                    let __interpose_out = #real(#(#restored),*);
                    #pack
                },
            )
        }
    }
}

fn check_signature(sig: &Signature) -> syn::Result<()> {
    if let Some(token) = &sig.asyncness {
        return Err(syn::Error::new_spanned(token, "#[mockable] does not support async functions"));
    }
    if let Some(token) = &sig.constness {
        return Err(syn::Error::new_spanned(token, "#[mockable] does not support const functions"));
    }
    if let Some(token) = &sig.unsafety {
        return Err(syn::Error::new_spanned(token, "#[mockable] does not support unsafe functions"));
    }
    if let Some(variadic) = &sig.variadic {
        return Err(syn::Error::new_spanned(variadic, "#[mockable] does not support variadics"));
    }
    if let Some(param) = sig
        .generics
        .params
        .iter()
        .find(|param| !matches!(param, GenericParam::Lifetime(_)))
    {
        return Err(syn::Error::new_spanned(
            param,
            "#[mockable] does not support type or const generics",
        ));
    }
    Ok(())
}

/// Attributes copied onto the hidden real implementation
fn real_attrs(attrs: &[Attribute]) -> Vec<&Attribute> {
    attrs
        .iter()
        .filter(|attr| !attr.path().is_ident("doc") && !attr.path().is_ident("must_use"))
        .collect()
}

/// `cfg` attributes, which the generated target function must share
fn cfg_attrs(attrs: &[Attribute]) -> Vec<&Attribute> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("cfg"))
        .collect()
}

fn expand_fn(function: ItemFn) -> syn::Result<TokenStream2> {
    let seam = Seam::analyze(&function.sig)?;
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = &function;
    let name = &sig.ident;
    let real_name = format_ident!("__interpose_real_{}", name);
    let target_name = format_ident!("{}_target", name);

    let mut real_sig = sig.clone();
    real_sig.ident = real_name.clone();
    let real_attrs = real_attrs(attrs);
    let cfg_attrs = cfg_attrs(attrs);

    let id = quote!(#name);
    let real = quote!(#real_name);
    let wrapper_sig = seam.wrapper_sig(sig);
    let body = seam.wrapper_body(&id, &quote!(::std::option::Option::None), &real);
    let target_body = seam.function_target(&id, &real);
    let target_doc = format!("Mock target for [`{name}`]");

    Ok(quote! {
        #(#real_attrs)*
        #[doc(hidden)]
        #[allow(clippy::too_many_arguments)]
        #real_sig #block

        #(#attrs)*
        #vis #wrapper_sig #body

        #(#cfg_attrs)*
        #[doc = #target_doc]
        #[allow(dead_code)]
        #vis fn #target_name() -> ::interpose::FunctionTarget {
            #target_body
        }
    })
}

fn expand_impl(mut block: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &block.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[mockable] applies to inherent impl blocks only",
        ));
    }
    if !block.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &block.generics,
            "#[mockable] does not support generic impl blocks",
        ));
    }

    let mut generated: Vec<ImplItem> = Vec::new();
    for item in std::mem::take(&mut block.items) {
        match item {
            ImplItem::Fn(method) => generated.extend(expand_method(method)?),
            other => generated.push(other),
        }
    }
    block.items = generated;
    Ok(block.into_token_stream())
}

/// Seam for one method; methods taking `self` by value are kept as they are
fn expand_method(method: ImplItemFn) -> syn::Result<Vec<ImplItem>> {
    let receiver = Receiver::of(&method.sig);
    if receiver == Receiver::ByValue {
        return Ok(vec![ImplItem::Fn(method)]);
    }
    let seam = Seam::analyze(&method.sig)?;
    let ImplItemFn {
        attrs,
        vis,
        defaultness,
        sig,
        block,
    } = &method;
    let name = &sig.ident;
    let real_name = format_ident!("__interpose_real_{}", name);
    let target_name = format_ident!("{}_target", name);

    let mut real_sig = sig.clone();
    real_sig.ident = real_name.clone();
    let real_attrs = real_attrs(attrs);
    let cfg_attrs = cfg_attrs(attrs);

    let id = quote!(Self::#name);
    let wrapper_sig = seam.wrapper_sig(sig);
    let target_doc = format!("Mock target for [`Self::{name}`]");

    let (body, target): (TokenStream2, TokenStream2) = match receiver {
        Receiver::None => {
            let real = quote!(Self::#real_name);
            let target_body = seam.function_target(&id, &real);
            (
                seam.wrapper_body(&id, &quote!(::std::option::Option::None), &real),
                quote! {
                    #(#cfg_attrs)*
                    #[doc = #target_doc]
                    #[allow(dead_code)]
                    #vis fn #target_name() -> ::interpose::FunctionTarget {
                        #target_body
                    }
                },
            )
        }
        _ => {
            let real = quote!(self.#real_name);
            let instance = quote! {
                ::std::option::Option::Some(::interpose::InstanceId::of(&*self))
            };
            let descriptor = seam.descriptor(&id);
            (
                seam.wrapper_body(&id, &instance, &real),
                quote! {
                    #(#cfg_attrs)*
                    #[doc = #target_doc]
                    #[allow(dead_code)]
                    #vis fn #target_name() -> ::interpose::MethodTarget {
                        ::interpose::MethodTarget::new(#descriptor.with_receiver::<Self>())
                    }
                },
            )
        }
    };

    let real_item: ImplItem = syn::parse2(quote! {
        #(#real_attrs)*
        #[doc(hidden)]
        #[allow(clippy::too_many_arguments)]
        #real_sig #block
    })?;
    let wrapper_item: ImplItem = syn::parse2(quote! {
        #(#attrs)*
        #vis #defaultness #wrapper_sig #body
    })?;
    let target_item: ImplItem = syn::parse2(target)?;
    Ok(vec![real_item, wrapper_item, target_item])
}
