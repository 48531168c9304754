use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{
    Data, DeriveInput, Fields, GenericArgument, Lit, PathArguments, Type, parse_macro_input,
};

/// Check if a field has a specific attribute
fn has_attr(field: &syn::Field, attr_name: &str) -> bool {
    field
        .attrs
        .iter()
        .any(|attr| attr.path().is_ident(attr_name))
}

/// Check if a field has #[column(skip)]
fn has_column_skip(field: &syn::Field) -> bool {
    for attr in &field.attrs {
        if attr.path().is_ident("column") {
            let mut skip = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                } else if meta.input.peek(syn::Token![=]) {
                    meta.value()?.parse::<Lit>()?;
                }
                Ok(())
            });
            if skip {
                return true;
            }
        }
    }
    false
}

/// Parse `name = "..."` style string values from a single attribute
fn get_attr_string(field: &syn::Field, attr_name: &str, key: &str) -> syn::Result<Option<String>> {
    let mut value = None;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident(attr_name)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                let lit: Lit = meta.value()?.parse()?;
                match lit {
                    Lit::Str(s) => value = Some(s.value()),
                    other => return Err(syn::Error::new_spanned(other, "expected a string literal")),
                }
            } else if meta.input.peek(syn::Token![=]) {
                meta.value()?.parse::<Lit>()?;
            }
            Ok(())
        })?;
    }
    Ok(value)
}

/// Get custom column name from #[column(name = "...")] or None
fn get_column_name(field: &syn::Field) -> syn::Result<Option<String>> {
    get_attr_string(field, "column", "name")
}

/// Parse `insertable = false` / `updatable = false` from #[column(...)]
fn get_column_flag(field: &syn::Field, key: &str) -> syn::Result<bool> {
    let mut flag = true;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("column")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident(key) {
                let lit: Lit = meta.value()?.parse()?;
                match lit {
                    Lit::Bool(b) => flag = b.value,
                    other => return Err(syn::Error::new_spanned(other, "expected true or false")),
                }
            } else if meta.input.peek(syn::Token![=]) {
                meta.value()?.parse::<Lit>()?;
            }
            Ok(())
        })?;
    }
    Ok(flag)
}

/// Parse #[enumerated(ordinal)] / #[enumerated(name)]; a bare #[enumerated] means ordinal
fn get_enum_mode(field: &syn::Field) -> syn::Result<Option<TokenStream2>> {
    let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("enumerated")) else {
        return Ok(None);
    };
    let mut mode = quote! { ::sql_mapper::EnumMode::Ordinal };
    if matches!(attr.meta, syn::Meta::List(_)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                mode = quote! { ::sql_mapper::EnumMode::Name };
                Ok(())
            } else if meta.path.is_ident("ordinal") {
                mode = quote! { ::sql_mapper::EnumMode::Ordinal };
                Ok(())
            } else {
                Err(meta.error("expected `ordinal` or `name`"))
            }
        })?;
    }
    Ok(Some(mode))
}

/// Parse #[convert(with = path::ToConverter)]
fn get_converter(field: &syn::Field) -> syn::Result<Option<syn::Path>> {
    let mut converter = None;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("convert")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("with") {
                converter = Some(meta.value()?.parse::<syn::Path>()?);
                Ok(())
            } else {
                Err(meta.error("expected `with = Converter`"))
            }
        })?;
    }
    Ok(converter)
}

/// Parse #[table(name = "...")] attribute and return table name
fn parse_table_attr(input: &DeriveInput) -> syn::Result<Option<String>> {
    for attr in &input.attrs {
        if attr.path().is_ident("table") {
            let mut table_name = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let lit: Lit = meta.value()?.parse()?;
                    if let Lit::Str(s) = lit {
                        table_name = Some(s.value());
                    }
                    Ok(())
                } else {
                    Err(meta.error("expected `name = \"...\"`"))
                }
            })?;
            return Ok(table_name);
        }
    }
    Ok(None)
}

/// `T` for `Option<T>`, otherwise the type itself
fn option_inner(ty: &Type) -> &Type {
    if let Type::Path(type_path) = ty {
        if type_path.qself.is_none() {
            if let Some(segment) = type_path.path.segments.last() {
                if segment.ident == "Option" {
                    if let PathArguments::AngleBracketed(args) = &segment.arguments {
                        if let Some(GenericArgument::Type(inner)) = args.args.first() {
                            return inner;
                        }
                    }
                }
            }
        }
    }
    ty
}

fn is_transient(field: &syn::Field) -> bool {
    has_attr(field, "transient") || has_column_skip(field)
}

/// Builder chain describing one persistent field
fn field_descriptor(field: &syn::Field, field_str: &str) -> syn::Result<TokenStream2> {
    let ty = &field.ty;
    let inner = option_inner(ty);
    let mut modifiers = Vec::new();

    if let Some(column) = get_column_name(field)? {
        modifiers.push(quote! { .column(#column) });
    }
    if let Some(table) = get_attr_string(field, "column", "table")? {
        modifiers.push(quote! { .table(#table) });
    }
    if has_attr(field, "id") {
        modifiers.push(quote! { .id() });
    }
    if has_attr(field, "generated") {
        modifiers.push(quote! { .generated() });
    }
    if has_attr(field, "version") {
        modifiers.push(quote! { .version() });
    }
    if !get_column_flag(field, "insertable")? {
        modifiers.push(quote! { .insertable(false) });
    }
    if !get_column_flag(field, "updatable")? {
        modifiers.push(quote! { .updatable(false) });
    }
    if let Some(mode) = get_enum_mode(field)? {
        modifiers.push(quote! {
            .enumerated(#mode, <#inner as ::sql_mapper::MappedEnum>::VARIANTS)
        });
    }
    if let Some(converter) = get_converter(field)? {
        modifiers.push(quote! {
            .converter(::std::sync::Arc::new(<#converter as ::core::default::Default>::default()))
        });
    }
    if has_attr(field, "join_column") {
        let column = get_attr_string(field, "join_column", "name")?
            .unwrap_or_else(|| format!("{}_id", field_str));
        modifiers.push(quote! {
            .join_column(
                #column,
                ::sql_mapper::JoinTarget::of::<<#inner as ::sql_mapper::JoinColumnTarget>::Target>(),
            )
        });
    }

    Ok(quote! {
        ::sql_mapper::FieldDescriptor::new(#field_str, <#ty as ::sql_mapper::FieldValue>::KIND)
            #(#modifiers)*
    })
}

/// Derive macro for the `Entity` trait
///
/// Generates the persistence descriptor (fields in declaration order) and
/// explicit by-name field accessors. Instances are created through `Default`.
///
/// ## Type attributes
/// - `#[table(name = "...")]` - table name (default: lower-cased type name)
///
/// ## Field attributes
/// - `#[id]`, `#[generated]` - identifier column, optionally database-generated
/// - `#[version]` - optimistic-locking version (integer field)
/// - `#[transient]` or `#[column(skip)]` - not persisted
/// - `#[column(name = "...", table = "...", insertable = false, updatable = false)]`
/// - `#[enumerated(ordinal)]` / `#[enumerated(name)]` - enum storage form
/// - `#[convert(with = Converter)]` - `AttributeConverter + Default` type
/// - `#[join_column(name = "...")]` - self-referencing key (`JoinKey<Self>`)
///
/// ## Example
///
/// ```text
/// #[derive(Entity, Default)]
/// #[table(name = "products")]
/// pub struct Product {
///     #[id]
///     #[generated]
///     pub id: i64,
///     #[enumerated(name)]
///     pub product_type: ProductType,
///     pub product_code: String,
/// }
/// ```
#[proc_macro_derive(
    Entity,
    attributes(table, id, generated, version, transient, column, enumerated, convert, join_column)
)]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Entity only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Entity only supports structs")),
    };

    let type_name = name.unraw().to_string();
    let table_name = parse_table_attr(input)?.unwrap_or_else(|| type_name.to_lowercase());

    let mut descriptors = Vec::new();
    let mut get_arms = Vec::new();
    let mut set_arms = Vec::new();

    for field in fields.iter() {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let field_str = field_ident.unraw().to_string();

        if is_transient(field) {
            descriptors.push(quote! { ::sql_mapper::FieldDescriptor::transient(#field_str) });
            continue;
        }

        let ty = &field.ty;
        descriptors.push(field_descriptor(field, &field_str)?);
        get_arms.push(quote! {
            #field_str => ::core::result::Result::Ok(
                <#ty as ::sql_mapper::FieldValue>::to_value(&self.#field_ident)
            )
        });
        set_arms.push(quote! {
            #field_str => {
                self.#field_ident = <#ty as ::sql_mapper::FieldValue>::from_value(value)?;
                ::core::result::Result::Ok(())
            }
        });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::sql_mapper::Entity for #name #ty_generics #where_clause {
            fn descriptor() -> ::sql_mapper::EntityDescriptor {
                ::sql_mapper::EntityDescriptor::new::<Self>(#table_name)
                    #(.field(#descriptors))*
            }

            fn instantiate() -> ::core::result::Result<Self, ::sql_mapper::MapperError> {
                ::core::result::Result::Ok(<Self as ::core::default::Default>::default())
            }

            fn get_field(
                &self,
                field: &str,
            ) -> ::core::result::Result<::sql_mapper::Value, ::sql_mapper::MapperError> {
                match field {
                    #(#get_arms,)*
                    other => ::core::result::Result::Err(
                        ::sql_mapper::MapperError::unknown_column(#type_name, other)
                    ),
                }
            }

            fn set_field(
                &mut self,
                field: &str,
                value: ::sql_mapper::Value,
            ) -> ::core::result::Result<(), ::sql_mapper::MapperError> {
                match field {
                    #(#set_arms,)*
                    other => {
                        let _ = value;
                        ::core::result::Result::Err(
                            ::sql_mapper::MapperError::unknown_column(#type_name, other)
                        )
                    }
                }
            }
        }
    })
}

/// Derive macro for `MappedEnum` (and `FieldValue`) on unit enums
///
/// Ordinals follow declaration order. Stored names default to the variant
/// name and can be overridden with `#[mapped(rename = "...")]`.
#[proc_macro_derive(MappedEnum, attributes(mapped))]
pub fn derive_mapped_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_mapped_enum(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.to_compile_error()),
    }
}

fn expand_mapped_enum(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(name, "MappedEnum only supports enums"));
    };
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(name, "MappedEnum needs at least one variant"));
    }

    let type_name = name.unraw().to_string();
    let mut idents = Vec::new();
    let mut names = Vec::new();
    let mut ordinals = Vec::new();

    for (ordinal, variant) in data.variants.iter().enumerate() {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "MappedEnum only supports unit variants",
            ));
        }
        let mut stored = variant.ident.unraw().to_string();
        for attr in variant.attrs.iter().filter(|a| a.path().is_ident("mapped")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let lit: Lit = meta.value()?.parse()?;
                    if let Lit::Str(s) = lit {
                        stored = s.value();
                    }
                    Ok(())
                } else {
                    Err(meta.error("expected `rename = \"...\"`"))
                }
            })?;
        }
        idents.push(&variant.ident);
        names.push(stored);
        ordinals.push(ordinal as u32);
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::sql_mapper::MappedEnum for #name #ty_generics #where_clause {
            const VARIANTS: &'static [&'static str] = &[#(#names),*];

            fn ordinal(&self) -> u32 {
                match self {
                    #(Self::#idents => #ordinals,)*
                }
            }

            fn from_ordinal(ordinal: u32) -> ::core::option::Option<Self> {
                match ordinal {
                    #(#ordinals => ::core::option::Option::Some(Self::#idents),)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl #impl_generics ::sql_mapper::FieldValue for #name #ty_generics #where_clause {
            const KIND: ::sql_mapper::FieldKind = ::sql_mapper::FieldKind::Enum;

            fn to_value(&self) -> ::sql_mapper::Value {
                match self {
                    #(Self::#idents => ::sql_mapper::Value::Enum(::sql_mapper::EnumValue {
                        ordinal: #ordinals,
                        name: #names,
                    }),)*
                }
            }

            fn from_value(
                value: ::sql_mapper::Value,
            ) -> ::core::result::Result<Self, ::sql_mapper::CoercionError> {
                match value {
                    ::sql_mapper::Value::Enum(variant) => {
                        <Self as ::sql_mapper::MappedEnum>::from_ordinal(variant.ordinal).ok_or_else(|| {
                            ::sql_mapper::CoercionError::UnknownEnumKey {
                                key: variant.name.to_string(),
                                column: #type_name.to_string(),
                            }
                        })
                    }
                    ::sql_mapper::Value::String(stored) => match stored.as_str() {
                        #(#names => ::core::result::Result::Ok(Self::#idents),)*
                        _ => ::core::result::Result::Err(::sql_mapper::CoercionError::UnknownEnumKey {
                            key: stored.clone(),
                            column: #type_name.to_string(),
                        }),
                    },
                    other => ::core::result::Result::Err(::sql_mapper::CoercionError::unsupported(
                        other,
                        ::sql_mapper::FieldKind::Enum,
                    )),
                }
            }
        }
    })
}
