//! `#[orm(...)]` attribute grammar.
//!
//! Struct level:
//!
//! - `#[orm(table = "posts")]`
//!
//! Field level (any number of items, in one or several attributes):
//!
//! - `column(name = "..", ty = "..", length = 255, nullable, unique, default = "..",
//!   default_expr = "CURRENT_TIMESTAMP", enum_options = "a,b", precision = 10, scale = 2,
//!   primary_key, auto_increment = false)`
//! - `many_to_one(target = "User", inversed_by = "posts")`
//! - `one_to_many(target = "Comment", mapped_by = "post")`
//! - `many_to_many(target = "Tag", inversed_by = "posts")` or `mapped_by = ".."`
//! - `join_column(name = "author_id", referenced_column = "id", nullable = false, on_delete = "CASCADE")`
//! - `join_table(name = "post_tag", join_column(name = "post_id"), inverse_join_column(name = "tag_id"))`
//!
//! Boolean flags accept both `flag` and `flag = true|false`.

use syn::meta::ParseNestedMeta;
use syn::{Attribute, Field, GenericArgument, Lit, LitBool, LitInt, LitStr, PathArguments, Type};
use tabula_db_schema::{Column, ColumnType, DefaultValue, ReferentialAction};

use crate::discovery::ATTR_NAMESPACE;
use crate::{Error, Result};

/// Column marker contents.
#[derive(Debug, Clone, Default)]
pub(crate) struct ColumnAttr {
    pub name: Option<String>,
    pub ty: Option<String>,
    pub length: Option<u32>,
    pub nullable: Option<bool>,
    pub unique: bool,
    pub default: Option<DefaultValue>,
    pub enum_options: Vec<String>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub primary_key: bool,
    pub auto_increment: Option<bool>,
}

/// A relationship declaration. Only the schema reader sees these: they are
/// resolved into plain columns, foreign keys and pivot tables.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Relation {
    ManyToOne {
        target: String,
        inversed_by: Option<String>,
    },
    OneToMany {
        target: String,
        mapped_by: String,
    },
    ManyToMany {
        target: String,
        inversed_by: Option<String>,
        mapped_by: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct JoinColumnAttr {
    pub name: Option<String>,
    pub referenced_column: Option<String>,
    pub nullable: Option<bool>,
    pub on_delete: Option<ReferentialAction>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct JoinTableAttr {
    pub name: Option<String>,
    pub join_column: Option<JoinColumnAttr>,
    pub inverse_join_column: Option<JoinColumnAttr>,
}

/// Everything declared on one struct field.
#[derive(Debug, Clone)]
pub(crate) struct FieldMeta {
    pub name: String,
    pub ty: Type,
    pub column: Option<ColumnAttr>,
    pub relation: Option<Relation>,
    pub join_column: Option<JoinColumnAttr>,
    pub join_table: Option<JoinTableAttr>,
}

fn orm_attrs(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|a| a.path().is_ident(ATTR_NAMESPACE))
}

fn attribute_error(entity: &str, e: syn::Error) -> Error {
    Error::Attribute {
        entity: entity.to_string(),
        message: e.to_string(),
    }
}

/// Read the table name from `#[orm(table = "...")]`.
pub(crate) fn table_name(entity: &str, attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table = None;
    for attr in orm_attrs(attrs) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let name = string_value(&meta)?;
                if name.trim().is_empty() {
                    return Err(meta.error("table name cannot be empty"));
                }
                table = Some(name);
                Ok(())
            } else {
                Err(meta.error(format!(
                    "unsupported entity attribute `{}`",
                    path_name(&meta)
                )))
            }
        })
        .map_err(|e| attribute_error(entity, e))?;
    }
    Ok(table)
}

impl FieldMeta {
    pub(crate) fn parse(entity: &str, field: &Field) -> Result<Option<Self>> {
        let Some(ident) = &field.ident else {
            return Ok(None);
        };

        let mut meta = FieldMeta {
            name: ident.to_string(),
            ty: field.ty.clone(),
            column: None,
            relation: None,
            join_column: None,
            join_table: None,
        };

        for attr in orm_attrs(&field.attrs) {
            attr.parse_nested_meta(|item| meta.parse_item(item))
                .map_err(|e| attribute_error(entity, e))?;
        }

        Ok(Some(meta))
    }

    fn parse_item(&mut self, item: ParseNestedMeta<'_>) -> syn::Result<()> {
        let key = path_name(&item);
        match key.as_str() {
            "column" => {
                let mut column = ColumnAttr::default();
                if item.input.peek(syn::token::Paren) {
                    item.parse_nested_meta(|m| column.parse_item(m))?;
                }
                set_once(&mut self.column, column, &item)
            }
            "many_to_one" => {
                let mut target = None;
                let mut inversed_by = None;
                item.parse_nested_meta(|m| match path_name(&m).as_str() {
                    "target" => set_once(&mut target, string_value(&m)?, &m),
                    "inversed_by" => set_once(&mut inversed_by, string_value(&m)?, &m),
                    other => Err(m.error(format!("unsupported many_to_one option `{other}`"))),
                })?;
                let relation = Relation::ManyToOne {
                    target: required(target, &item, "target")?,
                    inversed_by,
                };
                set_once(&mut self.relation, relation, &item)
            }
            "one_to_many" => {
                let mut target = None;
                let mut mapped_by = None;
                item.parse_nested_meta(|m| match path_name(&m).as_str() {
                    "target" => set_once(&mut target, string_value(&m)?, &m),
                    "mapped_by" => set_once(&mut mapped_by, string_value(&m)?, &m),
                    other => Err(m.error(format!("unsupported one_to_many option `{other}`"))),
                })?;
                let relation = Relation::OneToMany {
                    target: required(target, &item, "target")?,
                    mapped_by: required(mapped_by, &item, "mapped_by")?,
                };
                set_once(&mut self.relation, relation, &item)
            }
            "many_to_many" => {
                let mut target = None;
                let mut inversed_by = None;
                let mut mapped_by = None;
                item.parse_nested_meta(|m| match path_name(&m).as_str() {
                    "target" => set_once(&mut target, string_value(&m)?, &m),
                    "inversed_by" => set_once(&mut inversed_by, string_value(&m)?, &m),
                    "mapped_by" => set_once(&mut mapped_by, string_value(&m)?, &m),
                    other => Err(m.error(format!("unsupported many_to_many option `{other}`"))),
                })?;
                let relation = Relation::ManyToMany {
                    target: required(target, &item, "target")?,
                    inversed_by,
                    mapped_by,
                };
                set_once(&mut self.relation, relation, &item)
            }
            "join_column" => {
                let join_column = parse_join_column(&item)?;
                set_once(&mut self.join_column, join_column, &item)
            }
            "join_table" => {
                let mut join_table = JoinTableAttr::default();
                item.parse_nested_meta(|m| match path_name(&m).as_str() {
                    "name" => set_once(&mut join_table.name, string_value(&m)?, &m),
                    "join_column" => {
                        let jc = parse_join_column(&m)?;
                        set_once(&mut join_table.join_column, jc, &m)
                    }
                    "inverse_join_column" => {
                        let jc = parse_join_column(&m)?;
                        set_once(&mut join_table.inverse_join_column, jc, &m)
                    }
                    other => Err(m.error(format!("unsupported join_table option `{other}`"))),
                })?;
                set_once(&mut self.join_table, join_table, &item)
            }
            other => Err(item.error(format!("unsupported field attribute `{other}`"))),
        }
    }
}

impl ColumnAttr {
    fn parse_item(&mut self, m: ParseNestedMeta<'_>) -> syn::Result<()> {
        match path_name(&m).as_str() {
            "name" => set_once(&mut self.name, string_value(&m)?, &m),
            "ty" => set_once(&mut self.ty, string_value(&m)?, &m),
            "length" => set_once(&mut self.length, u32_value(&m)?, &m),
            "nullable" => set_once(&mut self.nullable, flag_value(&m)?, &m),
            "unique" => {
                self.unique = flag_value(&m)?;
                Ok(())
            }
            "default" => set_once(&mut self.default, default_value(&m)?, &m),
            "default_expr" => {
                let expr = DefaultValue::Expression(string_value(&m)?);
                set_once(&mut self.default, expr, &m)
            }
            "enum_options" => {
                self.enum_options = tabula_sql::split_list(&string_value(&m)?);
                Ok(())
            }
            "precision" => set_once(&mut self.precision, u32_value(&m)?, &m),
            "scale" => set_once(&mut self.scale, u32_value(&m)?, &m),
            "primary_key" => {
                self.primary_key = flag_value(&m)?;
                Ok(())
            }
            "auto_increment" => set_once(&mut self.auto_increment, flag_value(&m)?, &m),
            other => Err(m.error(format!("unsupported column option `{other}`"))),
        }
    }

    /// Build the column for a field, inferring what was not spelled out.
    pub(crate) fn to_column(&self, entity: &str, field: &str, rust_type: &Type) -> Result<Column> {
        let inferred = infer_column_type(rust_type);

        let column_type = match (&self.ty, inferred) {
            (Some(ty), _) => ty.parse::<ColumnType>()?,
            (None, Some((ty, _))) => ty,
            (None, None) => {
                return Err(Error::UnsupportedType {
                    entity: entity.to_string(),
                    field: field.to_string(),
                });
            }
        };
        let optional = inferred.is_some_and(|(_, optional)| optional);

        let mut column = Column::typed(
            self.name.clone().unwrap_or_else(|| field.to_string()),
            column_type,
        )
        .nullable(self.nullable.unwrap_or(optional))
        .unique(self.unique)
        .primary_key(self.primary_key)
        .auto_increment(
            self.auto_increment
                .unwrap_or(self.primary_key && column_type.is_integer()),
        )
        .enum_options(self.enum_options.iter().cloned());

        column.length = self.length;
        column.precision = self.precision;
        column.scale = self.scale;
        column.default = self.default.clone();
        Ok(column)
    }
}

fn parse_join_column(meta: &ParseNestedMeta<'_>) -> syn::Result<JoinColumnAttr> {
    let mut jc = JoinColumnAttr::default();
    meta.parse_nested_meta(|m| match path_name(&m).as_str() {
        "name" => set_once(&mut jc.name, string_value(&m)?, &m),
        "referenced_column" => set_once(&mut jc.referenced_column, string_value(&m)?, &m),
        "nullable" => set_once(&mut jc.nullable, flag_value(&m)?, &m),
        "on_delete" => {
            let lit: LitStr = m.value()?.parse()?;
            let action = lit
                .value()
                .parse::<ReferentialAction>()
                .map_err(|e| syn::Error::new(lit.span(), e))?;
            set_once(&mut jc.on_delete, action, &m)
        }
        other => Err(m.error(format!("unsupported join column option `{other}`"))),
    })?;
    Ok(jc)
}

fn path_name(meta: &ParseNestedMeta<'_>) -> String {
    meta.path
        .get_ident()
        .map(|i| i.to_string())
        .unwrap_or_else(|| {
            meta.path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect::<Vec<_>>()
                .join("::")
        })
}

fn set_once<T>(slot: &mut Option<T>, value: T, meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
    if slot.is_some() {
        return Err(meta.error(format!("`{}` is given more than once", path_name(meta))));
    }
    *slot = Some(value);
    Ok(())
}

fn required<T>(value: Option<T>, meta: &ParseNestedMeta<'_>, key: &str) -> syn::Result<T> {
    value.ok_or_else(|| meta.error(format!("`{}` requires `{key}`", path_name(meta))))
}

fn string_value(meta: &ParseNestedMeta<'_>) -> syn::Result<String> {
    let lit: LitStr = meta.value()?.parse()?;
    Ok(lit.value())
}

fn u32_value(meta: &ParseNestedMeta<'_>) -> syn::Result<u32> {
    let lit: LitInt = meta.value()?.parse()?;
    lit.base10_parse()
}

fn flag_value(meta: &ParseNestedMeta<'_>) -> syn::Result<bool> {
    if meta.input.peek(syn::Token![=]) {
        let lit: LitBool = meta.value()?.parse()?;
        Ok(lit.value)
    } else {
        Ok(true)
    }
}

fn default_value(meta: &ParseNestedMeta<'_>) -> syn::Result<DefaultValue> {
    let input = meta.value()?;
    let negative = input.peek(syn::Token![-]);
    if negative {
        input.parse::<syn::Token![-]>()?;
    }
    let lit: Lit = input.parse()?;
    let sign = if negative { "-" } else { "" };
    match lit {
        Lit::Int(i) => Ok(DefaultValue::Number(format!("{sign}{}", i.base10_digits()))),
        Lit::Float(f) => Ok(DefaultValue::Number(format!("{sign}{}", f.base10_digits()))),
        Lit::Str(s) if !negative => Ok(DefaultValue::Text(s.value())),
        Lit::Bool(b) if !negative => Ok(DefaultValue::Bool(b.value)),
        other => Err(syn::Error::new(
            other.span(),
            "default must be a string, number or boolean literal",
        )),
    }
}

/// Map a Rust field type to a logical column type.
///
/// Returns the type and whether the field was an `Option`.
pub(crate) fn infer_column_type(ty: &Type) -> Option<(ColumnType, bool)> {
    if let Some(inner) = generic_argument(ty, "Option") {
        return infer_column_type(inner).map(|(t, _)| (t, true));
    }

    if let Type::Reference(r) = ty {
        return match &*r.elem {
            Type::Path(p) if p.path.is_ident("str") => Some((ColumnType::String, false)),
            Type::Slice(s) if is_named(&s.elem, "u8") => Some((ColumnType::Blob, false)),
            _ => None,
        };
    }

    if let Some(inner) = generic_argument(ty, "Vec") {
        let ty = if is_named(inner, "u8") {
            ColumnType::Blob
        } else {
            ColumnType::Array
        };
        return Some((ty, false));
    }

    let Type::Path(p) = ty else {
        return None;
    };
    let last = p.path.segments.last()?.ident.to_string();
    let column_type = match last.as_str() {
        "i8" | "u8" | "i16" => ColumnType::SmallInt,
        "u16" | "i32" => ColumnType::Integer,
        "u32" | "i64" | "u64" | "isize" | "usize" => ColumnType::BigInt,
        "f32" => ColumnType::SmallFloat,
        "f64" => ColumnType::Float,
        "bool" => ColumnType::Boolean,
        "String" => ColumnType::String,
        "Decimal" | "BigDecimal" => ColumnType::Decimal,
        "Uuid" => ColumnType::Uuid,
        "NaiveDate" | "Date" => ColumnType::Date,
        "NaiveDateTime" | "PrimitiveDateTime" => ColumnType::DateTime,
        "DateTime" | "OffsetDateTime" | "Timestamp" | "Zoned" => ColumnType::DateTimeTz,
        "NaiveTime" | "Time" => ColumnType::Time,
        "Value" | "Json" | "JsonValue" | "Jsonb" => ColumnType::Json,
        _ => return None,
    };
    Some((column_type, false))
}

/// If `ty` is `Name<T>`, return `T`.
fn generic_argument<'a>(ty: &'a Type, name: &str) -> Option<&'a Type> {
    let Type::Path(p) = ty else {
        return None;
    };
    let segment = p.path.segments.last()?;
    if segment.ident != name {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

fn is_named(ty: &Type, name: &str) -> bool {
    matches!(ty, Type::Path(p) if p.path.is_ident(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn field(f: syn::FieldsNamed) -> Field {
        f.named.into_iter().next().unwrap()
    }

    #[test]
    fn test_table_name() {
        let item: syn::ItemStruct = parse_quote! {
            #[orm(table = "posts")]
            struct Post {}
        };
        assert_eq!(
            table_name("Post", &item.attrs).unwrap().as_deref(),
            Some("posts")
        );

        let item: syn::ItemStruct = parse_quote! {
            #[orm(table = "posts", engine = "innodb")]
            struct Post {}
        };
        let err = table_name("Post", &item.attrs).unwrap_err();
        assert!(err.to_string().contains("engine"), "{err}");
    }

    #[test]
    fn test_parse_column() {
        let f = field(parse_quote! {{
            #[orm(column(name = "price", ty = "decimal", precision = 10, scale = 2, default = 0))]
            price: rust_decimal::Decimal
        }});
        let meta = FieldMeta::parse("Product", &f).unwrap().unwrap();
        let column = meta
            .column
            .unwrap()
            .to_column("Product", &meta.name, &meta.ty)
            .unwrap();
        assert_eq!(column.name, "price");
        assert_eq!(column.column_type, ColumnType::Decimal);
        assert_eq!(column.precision, Some(10));
        assert_eq!(column.scale, Some(2));
        assert_eq!(column.default, Some(DefaultValue::Number("0".into())));
        assert!(!column.nullable);
    }

    #[test]
    fn test_column_inference() {
        let f = field(parse_quote! {{
            #[orm(column(primary_key))]
            id: i32
        }});
        let meta = FieldMeta::parse("User", &f).unwrap().unwrap();
        let column = meta
            .column
            .unwrap()
            .to_column("User", &meta.name, &meta.ty)
            .unwrap();
        assert_eq!(column.name, "id");
        assert_eq!(column.column_type, ColumnType::Integer);
        assert!(column.primary_key);
        assert!(column.auto_increment);
        assert!(!column.nullable);

        let f = field(parse_quote! {{
            #[orm(column)]
            bio: Option<String>
        }});
        let meta = FieldMeta::parse("User", &f).unwrap().unwrap();
        let column = meta
            .column
            .unwrap()
            .to_column("User", &meta.name, &meta.ty)
            .unwrap();
        assert_eq!(column.column_type, ColumnType::String);
        assert!(column.nullable);
    }

    #[test]
    fn test_uninferable_type() {
        let f = field(parse_quote! {{
            #[orm(column)]
            location: geo::Point
        }});
        let meta = FieldMeta::parse("Shop", &f).unwrap().unwrap();
        let err = meta
            .column
            .unwrap()
            .to_column("Shop", &meta.name, &meta.ty)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
    }

    #[test]
    fn test_parse_relations() {
        let f = field(parse_quote! {{
            #[orm(many_to_one(target = "User", inversed_by = "posts"))]
            #[orm(join_column(name = "writer_id", nullable = false, on_delete = "set null"))]
            author: User
        }});
        let meta = FieldMeta::parse("Post", &f).unwrap().unwrap();
        assert_eq!(
            meta.relation,
            Some(Relation::ManyToOne {
                target: "User".into(),
                inversed_by: Some("posts".into())
            })
        );
        assert_eq!(
            meta.join_column,
            Some(JoinColumnAttr {
                name: Some("writer_id".into()),
                referenced_column: None,
                nullable: Some(false),
                on_delete: Some(ReferentialAction::SetNull),
            })
        );

        let f = field(parse_quote! {{
            #[orm(
                many_to_many(target = "Tag"),
                join_table(
                    name = "post_tag",
                    join_column(name = "post_id"),
                    inverse_join_column(name = "tag_id")
                )
            )]
            tags: Vec<Tag>
        }});
        let meta = FieldMeta::parse("Post", &f).unwrap().unwrap();
        let join_table = meta.join_table.unwrap();
        assert_eq!(join_table.name.as_deref(), Some("post_tag"));
        assert_eq!(
            join_table.inverse_join_column.unwrap().name.as_deref(),
            Some("tag_id")
        );
    }

    #[test]
    fn test_one_to_many_requires_mapped_by() {
        let f = field(parse_quote! {{
            #[orm(one_to_many(target = "Comment"))]
            comments: Vec<Comment>
        }});
        let err = FieldMeta::parse("Post", &f).unwrap_err();
        assert!(err.to_string().contains("mapped_by"), "{err}");
    }

    #[test]
    fn test_two_relations_on_one_field() {
        let f = field(parse_quote! {{
            #[orm(many_to_one(target = "User"), many_to_many(target = "Tag"))]
            odd: User
        }});
        assert!(FieldMeta::parse("Post", &f).is_err());
    }

    #[test]
    fn test_negative_default() {
        let f = field(parse_quote! {{
            #[orm(column(default = -1))]
            rank: i64
        }});
        let meta = FieldMeta::parse("Player", &f).unwrap().unwrap();
        assert_eq!(
            meta.column.unwrap().default,
            Some(DefaultValue::Number("-1".into()))
        );
    }
}
