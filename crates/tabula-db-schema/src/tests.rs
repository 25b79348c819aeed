use super::*;

#[test]
fn test_column_new_accepts_registered_types() {
    for ty in ColumnType::ALL {
        let col = Column::new("c", ty.as_str()).unwrap();
        assert_eq!(col.column_type, ty);
    }
    let col = Column::new("flag", "BOOLEAN").unwrap();
    assert_eq!(col.column_type, ColumnType::Boolean);
}

#[test]
fn test_column_new_rejects_unknown_type() {
    let err = Column::new("title", "varchar2").unwrap_err();
    match &err {
        ValidationError::UnknownType { given, valid } => {
            assert_eq!(given, "varchar2");
            assert_eq!(valid.len(), ColumnType::ALL.len());
            assert!(valid.contains(&"string".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("'varchar2'"));
    assert!(message.contains("datetime_tz"));
}

#[test]
fn test_wants_auto_increment() {
    let id = Column::typed("id", ColumnType::Integer)
        .primary_key(true)
        .auto_increment(true);
    assert!(id.wants_auto_increment());

    let not_pk = Column::typed("counter", ColumnType::Integer).auto_increment(true);
    assert!(!not_pk.wants_auto_increment());

    let uuid_pk = Column::typed("id", ColumnType::Uuid)
        .primary_key(true)
        .auto_increment(true);
    assert!(!uuid_pk.wants_auto_increment());
}

#[test]
fn test_referential_action_parse() {
    assert_eq!("CASCADE".parse::<ReferentialAction>(), Ok(ReferentialAction::Cascade));
    assert_eq!("set null".parse::<ReferentialAction>(), Ok(ReferentialAction::SetNull));
    assert_eq!("SET_NULL".parse::<ReferentialAction>(), Ok(ReferentialAction::SetNull));
    assert_eq!("No  Action".parse::<ReferentialAction>(), Ok(ReferentialAction::NoAction));
    assert!("explode".parse::<ReferentialAction>().is_err());
}

#[test]
fn test_default_value_to_sql() {
    assert_eq!(DefaultValue::Null.to_sql(), "NULL");
    assert_eq!(DefaultValue::Bool(true).to_sql(), "TRUE");
    assert_eq!(DefaultValue::Number("1.5".into()).to_sql(), "1.5");
    assert_eq!(DefaultValue::Text("it's".into()).to_sql(), "'it''s'");
    assert_eq!(
        DefaultValue::Expression("CURRENT_TIMESTAMP".into()).to_sql(),
        "CURRENT_TIMESTAMP"
    );
}

#[test]
fn test_set_columns_rejects_duplicates() {
    let mut table = Table::new("users");
    let err = table
        .set_columns(vec![
            Column::typed("id", ColumnType::Integer),
            Column::typed("id", ColumnType::BigInt),
        ])
        .unwrap_err();
    assert_eq!(
        err,
        ValidationError::DuplicateColumn {
            table: "users".into(),
            column: "id".into()
        }
    );
    assert!(table.is_empty());
}

#[test]
fn test_add_foreign_key_requires_local_column() {
    let mut table = Table::new("posts");
    table
        .set_columns(vec![Column::typed("author_id", ColumnType::Integer)])
        .unwrap();

    table
        .add_foreign_key(ForeignKey::new(
            "fk_posts_author_id",
            "author_id",
            "users",
            "id",
        ))
        .unwrap();

    let err = table
        .add_foreign_key(ForeignKey::new("fk_posts_editor_id", "editor_id", "users", "id"))
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnknownColumn { .. }));
    assert_eq!(table.foreign_keys.len(), 1);
}

#[test]
fn test_schema_table_names_unique() {
    let mut schema = Schema::new();
    schema.insert_table(Table::new("users")).unwrap();
    assert!(schema.insert_table(Table::new("users")).is_err());
    assert!(!schema.insert_if_absent(Table::new("users")));
    assert!(schema.insert_if_absent(Table::new("posts")));
    assert_eq!(
        schema.iter_tables().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        vec!["users", "posts"]
    );
}

#[test]
fn test_foreign_key_same_target_ignores_name() {
    let a = ForeignKey::new("fk_posts_author_id", "author_id", "users", "id");
    let b = ForeignKey::new("posts_ibfk_1", "author_id", "users", "id");
    assert!(a.same_target(&b));
    assert_ne!(a, b);

    let c = b.clone().on_delete(Some(ReferentialAction::Cascade));
    assert!(!a.same_target(&c));
}

#[test]
fn test_schemas_compare_by_value() {
    let build = || {
        let mut users = Table::new("users");
        users
            .set_columns(vec![
                Column::typed("id", ColumnType::Integer)
                    .primary_key(true)
                    .auto_increment(true),
                Column::typed("email", ColumnType::String)
                    .length(255)
                    .unique(true),
            ])
            .unwrap();
        Schema::from_iter([users])
    };
    assert_eq!(build(), build());
}
