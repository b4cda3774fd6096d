use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Lit, parse_macro_input};

/// Convert snake_case to camelCase
fn to_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

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

/// Get custom column name from #[column(name = "...")] or None
fn get_column_name(field: &syn::Field) -> Option<String> {
    for attr in &field.attrs {
        if attr.path().is_ident("column") {
            let mut name = None;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    meta.input.parse::<syn::Token![=]>()?;
                    let lit: Lit = meta.input.parse()?;
                    if let Lit::Str(s) = lit {
                        name = Some(s.value());
                    }
                }
                Ok(())
            });
            if name.is_some() {
                return name;
            }
        }
    }
    None
}

/// Map Rust type to generic SQL type name
fn rust_type_to_sql_type(ty: &syn::Type) -> &'static str {
    let type_str = quote::quote!(#ty).to_string();
    // Remove spaces for easier matching
    let type_str = type_str.replace(' ', "");

    // Check for Option<T> - extract inner type
    let inner_type = if type_str.starts_with("Option<") && type_str.ends_with('>') {
        &type_str[7..type_str.len() - 1]
    } else {
        type_str.as_str()
    };

    match inner_type {
        // Datetime types
        s if s.contains("StorageDatetime") => "datetime",
        s if s.contains("DateTime") => "datetime",
        s if s.ends_with("Uuid") => "uuid",
        s if s.ends_with("Value") => "json",
        // Integer types
        "u64" | "i64" => "bigint",
        "u32" | "i32" | "usize" | "isize" => "integer",
        "i16" | "u16" => "smallint",
        // Boolean
        "bool" => "boolean",
        // Default to text for String and everything else
        _ => "text",
    }
}

/// Parse #[storable(table = "...")] attribute and return table name
fn parse_storable_attr(input: &DeriveInput) -> Option<String> {
    for attr in &input.attrs {
        if attr.path().is_ident("storable") {
            let mut table_name = None;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    meta.input.parse::<syn::Token![=]>()?;
                    let lit: Lit = meta.input.parse()?;
                    if let Lit::Str(s) = lit {
                        table_name = Some(s.value());
                    }
                }
                Ok(())
            });
            return table_name;
        }
    }
    None
}

fn compile_error(span: proc_macro2::Span, message: &str) -> TokenStream {
    TokenStream::from(syn::Error::new(span, message).to_compile_error())
}

/// Derive macro for the Storable trait.
///
/// Requires `#[storable(table = "...")]` on the struct. Field attributes:
///
/// - `#[identity]` - database-generated `i64` key. Skipped on INSERT; the
///   generated value is written back with `set_identity()`.
/// - `#[key]` - primary key used for UPDATE when the row has no identity.
/// - `#[column(skip)]` - not stored.
/// - `#[column(name = "...")]` - override the column name.
///
/// Column names are the Rust field names (snake_case). JSON keys are the
/// camelCase field names, so rows are expected to carry
/// `#[serde(rename_all = "camelCase")]`.
///
/// ## Example
///
/// ```text
/// #[derive(Clone, Serialize, Deserialize, Storable)]
/// #[storable(table = "content_version")]
/// #[serde(rename_all = "camelCase")]
/// pub struct ContentVersionRow {
///     #[identity]
///     pub id: i64,
///     pub node_id: i64,
///     pub version_id: Uuid,
///     pub version_date: StorageDatetime,
/// }
/// ```
#[proc_macro_derive(Storable, attributes(storable, identity, key, column))]
pub fn derive_storable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return compile_error(
                    name.span(),
                    "Storable only supports structs with named fields",
                );
            }
        },
        _ => return compile_error(name.span(), "Storable only supports structs"),
    };

    let Some(table_name) = parse_storable_attr(&input) else {
        return compile_error(name.span(), "Missing #[storable(table = \"...\")] attribute");
    };

    let identity_field = fields.iter().find(|f| has_attr(f, "identity"));
    let key_field = fields
        .iter()
        .find(|f| has_attr(f, "key"))
        .or(identity_field);

    // Collect column names, types, and JSON keys for all non-skipped fields
    let mut column_names: Vec<String> = Vec::new();
    let mut column_types: Vec<&'static str> = Vec::new();
    let mut json_keys: Vec<String> = Vec::new();
    let mut identity_column: Option<String> = None;
    let mut key_column: Option<String> = None;

    for field in fields.iter() {
        if has_column_skip(field) {
            continue;
        }

        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let col_name = get_column_name(field).unwrap_or_else(|| field_name.to_string());
        let col_type = rust_type_to_sql_type(&field.ty);
        let json_key = to_camel_case(&field_name.to_string());

        if identity_field.is_some_and(|f| f.ident.as_ref() == Some(field_name)) {
            identity_column = Some(col_name.clone());
        }
        if key_field.is_some_and(|f| f.ident.as_ref() == Some(field_name)) {
            key_column = Some(col_name.clone());
        }

        column_names.push(col_name);
        column_types.push(col_type);
        json_keys.push(json_key);
    }

    // INSERT SQL leaves the identity column to the database
    let insert_columns: Vec<&str> = column_names
        .iter()
        .map(|s| s.as_str())
        .filter(|c| Some(*c) != identity_column.as_deref())
        .collect();
    let placeholders: Vec<String> = (1..=insert_columns.len())
        .map(|i| format!("${}", i))
        .collect();
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_name,
        insert_columns.join(", "),
        placeholders.join(", ")
    );

    let column_count = column_names.len();
    let column_literals: Vec<_> = column_names.iter().map(|s| s.as_str()).collect();
    let column_type_literals: Vec<_> = column_types.to_vec();
    let json_key_literals: Vec<_> = json_keys.iter().map(|s| s.as_str()).collect();

    let identity_column_tokens = match &identity_column {
        Some(col) => quote! { Some(#col) },
        None => quote! { None },
    };
    let key_column_tokens = match &key_column {
        Some(col) => quote! { Some(#col) },
        None => quote! { None },
    };

    let key_value_body = match key_field.and_then(|f| f.ident.as_ref()) {
        Some(field_name) => quote! {
            Some(content_store::Value::from(self.#field_name.clone()))
        },
        None => quote! { None },
    };

    let set_identity_body = match identity_field.and_then(|f| f.ident.as_ref()) {
        Some(field_name) => quote! { self.#field_name = id; },
        None => quote! { let _ = id; },
    };

    let expanded = quote! {
        impl content_store::Storable for #name {
            fn table_name() -> &'static str {
                #table_name
            }

            fn columns() -> &'static [&'static str] {
                &[#(#column_literals),*]
            }

            fn column_types() -> &'static [&'static str] {
                &[#(#column_type_literals),*]
            }

            fn json_keys() -> &'static [&'static str] {
                &[#(#json_key_literals),*]
            }

            fn insert_sql() -> &'static str {
                #insert_sql
            }

            fn column_count() -> usize {
                #column_count
            }

            fn identity_column() -> Option<&'static str> {
                #identity_column_tokens
            }

            fn key_column() -> Option<&'static str> {
                #key_column_tokens
            }

            fn key_value(&self) -> Option<content_store::Value> {
                #key_value_body
            }

            fn set_identity(&mut self, id: i64) {
                #set_identity_body
            }
        }
    };

    TokenStream::from(expanded)
}
