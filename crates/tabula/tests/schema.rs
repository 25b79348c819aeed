use std::fs;
use std::path::Path;

use tabula::{
    CatalogConnection, CatalogRow, ColumnType, EntityDiscovery, EntitySchemaReader, Error,
    Introspector, MySqlIntrospector, ReferentialAction, ScanMode, SchemaDiffExt,
};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, source: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, source).unwrap();
}

const USERS: &str = r#"
#[orm(table = "users")]
pub struct User {
    #[orm(column(primary_key))]
    id: i32,
    #[orm(column(length = 180, unique))]
    email: String,
}
"#;

const POSTS: &str = r#"
#[orm(table = "posts")]
pub struct Post {
    #[orm(column(primary_key))]
    id: i32,
    #[orm(column)]
    title: String,
    #[orm(many_to_one(target = "User", inversed_by = "posts"))]
    author: Option<User>,
    #[orm(many_to_many(target = "Tag", inversed_by = "posts"))]
    tags: Vec<Tag>,
}
"#;

const TAGS: &str = r#"
#[orm(table = "tags")]
pub struct Tag {
    #[orm(column(primary_key))]
    id: i32,
    #[orm(column(length = 50))]
    label: String,
    #[orm(many_to_many(target = "Post", mapped_by = "tags"))]
    posts: Vec<Post>,
}
"#;

fn blog() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "users.rs", USERS);
    write(dir.path(), "blog/posts.rs", POSTS);
    write(dir.path(), "blog/tags.rs", TAGS);
    write(dir.path(), "blog/mod.rs", "pub struct Helper;\n");
    dir
}

#[test]
fn test_discover_missing_root() {
    let discovery = EntityDiscovery::default();
    assert!(discovery.discover("/definitely/not/here").unwrap().is_empty());

    let empty = TempDir::new().unwrap();
    assert!(discovery.discover(empty.path()).unwrap().is_empty());
}

#[test]
fn test_discover_entities() {
    let dir = blog();
    let ids = EntityDiscovery::default().discover(dir.path()).unwrap();
    // Helper has no table marker.
    assert_eq!(ids, vec!["blog::posts::Post", "blog::tags::Tag", "users::User"]);
}

#[test]
fn test_many_to_one_column() {
    let dir = blog();
    let schema = EntitySchemaReader::default().read(dir.path()).unwrap();

    let posts = schema.get_table("posts").expect("posts table");
    let author = posts.column("author_id").expect("author_id column");
    assert_eq!(author.column_type, ColumnType::Integer);
    assert!(author.nullable);

    assert_eq!(posts.foreign_keys.len(), 1);
    let fk = &posts.foreign_keys[0];
    assert_eq!(fk.column, "author_id");
    assert_eq!(fk.references_table, "users");
    assert_eq!(fk.references_column, "id");
}

#[test]
fn test_many_to_many_pivot() {
    let dir = blog();
    let schema = EntitySchemaReader::default().read(dir.path()).unwrap();

    let names: Vec<&str> = schema.iter_tables().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["posts", "tags", "users", "posts_tags"]);

    let pivot = schema.get_table("posts_tags").unwrap();
    assert_eq!(pivot.primary_key_columns(), vec!["posts_id", "tags_id"]);
    for column in &pivot.columns {
        assert_eq!(column.column_type, ColumnType::Integer);
        assert!(!column.nullable);
    }
    let targets: Vec<(&str, &str, Option<ReferentialAction>)> = pivot
        .foreign_keys
        .iter()
        .map(|fk| (fk.column.as_str(), fk.references_table.as_str(), fk.on_delete))
        .collect();
    assert_eq!(
        targets,
        vec![
            ("posts_id", "posts", Some(ReferentialAction::Cascade)),
            ("tags_id", "tags", Some(ReferentialAction::Cascade)),
        ]
    );

    // The inverse side contributes neither a column nor a pivot.
    let tags = schema.get_table("tags").unwrap();
    assert_eq!(tags.columns.len(), 2);
    assert!(schema.get_table("tags_posts").is_none());
}

#[test]
fn test_one_to_many_join_column() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "users.rs", USERS);
    write(
        dir.path(),
        "teams.rs",
        r#"
        #[orm(table = "teams")]
        pub struct Team {
            #[orm(column(primary_key))]
            id: i64,
            #[orm(
                one_to_many(target = "User", mapped_by = "team"),
                join_column(name = "captain", nullable = false, on_delete = "SET NULL")
            )]
            members: Vec<User>,
        }
        "#,
    );

    let schema = EntitySchemaReader::default().read(dir.path()).unwrap();
    let teams = schema.get_table("teams").unwrap();
    let captain = teams.column("captain").unwrap();
    assert!(!captain.nullable);
    assert_eq!(teams.foreign_keys[0].name, "fk_teams_captain");
    assert_eq!(teams.foreign_keys[0].on_delete, Some(ReferentialAction::SetNull));
}

#[test]
fn test_lenient_skips_broken_entities() {
    let dir = blog();
    write(
        dir.path(),
        "shop.rs",
        r#"
        #[orm(table = "shops")]
        pub struct Shop {
            #[orm(many_to_one(target = "Owner"))]
            owner: Owner,
        }
        "#,
    );
    write(dir.path(), "broken.rs", "pub struct {");

    let report = EntitySchemaReader::new(ScanMode::Lenient)
        .read_report(dir.path())
        .unwrap();
    assert!(report.schema.get_table("shops").is_none());
    assert!(report.schema.get_table("posts").is_some());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].entity, "shop::Shop");
    assert!(matches!(report.skipped[0].error, Error::UnknownTarget { .. }));
}

#[test]
fn test_strict_fails_on_broken_entity() {
    let dir = blog();
    write(
        dir.path(),
        "shop.rs",
        r#"
        #[orm(table = "shops")]
        pub struct Shop {
            #[orm(column(colour = "red"))]
            name: String,
        }
        "#,
    );

    let err = EntitySchemaReader::new(ScanMode::Strict)
        .read(dir.path())
        .unwrap_err();
    assert!(matches!(err, Error::Attribute { ref entity, .. } if entity == "shop::Shop"), "{err}");
}

#[test]
fn test_missing_table_marker_is_fatal() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "posts.rs",
        r#"
        pub struct Category {
            id: i32,
        }

        #[orm(table = "posts")]
        pub struct Post {
            #[orm(column(primary_key))]
            id: i32,
            #[orm(many_to_one(target = "Category"))]
            category: Category,
        }
        "#,
    );

    let err = EntitySchemaReader::new(ScanMode::Lenient)
        .read(dir.path())
        .unwrap_err();
    assert!(matches!(err, Error::MissingTableMarker { ref entity } if entity == "posts::Category"));
}

#[cfg(unix)]
#[test]
fn test_discovery_skips_symlinked_directories() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "users.rs", USERS);
    std::os::unix::fs::symlink(dir.path(), dir.path().join("again")).unwrap();

    let ids = EntityDiscovery::default().discover(dir.path()).unwrap();
    assert_eq!(ids, vec!["users::User"]);

    let report = EntitySchemaReader::default().read_report(dir.path()).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.schema.len(), 1);
}

#[test]
fn test_entity_shadows_plain_struct_of_same_name() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "users.rs", USERS);
    write(dir.path(), "dto.rs", "pub struct User {\n    name: String,\n}\n");
    write(
        dir.path(),
        "posts.rs",
        r#"
        #[orm(table = "posts")]
        pub struct Post {
            #[orm(column(primary_key))]
            id: i32,
            #[orm(many_to_one(target = "User"))]
            author: User,
        }
        "#,
    );

    let report = EntitySchemaReader::default().read_report(dir.path()).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    let posts = report.schema.get_table("posts").expect("posts table");
    assert_eq!(posts.foreign_keys[0].references_table, "users");
}

#[test]
fn test_declared_table_wins_over_pivot() {
    let dir = blog();
    write(
        dir.path(),
        "blog/posts_tags.rs",
        r#"
        #[orm(table = "posts_tags")]
        pub struct PostTag {
            #[orm(column(primary_key))]
            id: i32,
            #[orm(column)]
            note: Option<String>,
        }
        "#,
    );

    let schema = EntitySchemaReader::default().read(dir.path()).unwrap();
    let pivot = schema.get_table("posts_tags").unwrap();
    let columns: Vec<&str> = pivot.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "note"]);
    assert!(pivot.foreign_keys.is_empty());
}

#[test]
fn test_skipped_entity_contributes_no_pivot() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "tags.rs", TAGS);
    write(
        dir.path(),
        "posts.rs",
        r#"
        #[orm(table = "posts")]
        pub struct Post {
            #[orm(column(primary_key))]
            id: i32,
            #[orm(many_to_many(target = "Tag"))]
            tags: Vec<Tag>,
            #[orm(many_to_one(target = "Owner"))]
            owner: Owner,
        }
        "#,
    );

    let report = EntitySchemaReader::new(ScanMode::Lenient)
        .read_report(dir.path())
        .unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert!(report.schema.get_table("posts").is_none());
    assert!(report.schema.get_table("posts_tags").is_none());
    assert!(report.schema.get_table("tags").is_some());
}

/// Canned MySQL catalog describing the blog schema as a database would.
struct BlogCatalog;

fn row(pairs: &[(&str, Option<&str>)]) -> CatalogRow {
    pairs.iter().map(|(k, v)| (*k, v.map(str::to_string))).collect()
}

fn column(field: &str, ty: &str, null: &str, key: &str, extra: &str) -> CatalogRow {
    row(&[
        ("Field", Some(field)),
        ("Type", Some(ty)),
        ("Null", Some(null)),
        ("Key", Some(key)),
        ("Default", None),
        ("Extra", Some(extra)),
    ])
}

impl CatalogConnection for BlogCatalog {
    fn query(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> Result<Vec<CatalogRow>, tabula::introspect::CatalogError> {
        let rows = if sql == "SHOW TABLES" {
            ["migrations", "posts", "users", "legacy"]
                .iter()
                .map(|t| row(&[("Tables_in_blog", Some(t))]))
                .collect()
        } else if sql.ends_with("`posts`") {
            vec![
                column("id", "int(11)", "NO", "PRI", "auto_increment"),
                column("title", "varchar(255)", "NO", "", ""),
                column("author_id", "int(11)", "YES", "MUL", ""),
            ]
        } else if sql.ends_with("`users`") {
            vec![
                column("id", "int(11)", "NO", "PRI", "auto_increment"),
                column("email", "varchar(120)", "NO", "UNI", ""),
            ]
        } else if sql.ends_with("`legacy`") {
            vec![column("id", "int(11)", "NO", "PRI", "auto_increment")]
        } else if sql.contains("REFERENTIAL_CONSTRAINTS") && params == ["posts"] {
            vec![row(&[
                ("CONSTRAINT_NAME", Some("posts_ibfk_1")),
                ("COLUMN_NAME", Some("author_id")),
                ("REFERENCED_TABLE_NAME", Some("users")),
                ("REFERENCED_COLUMN_NAME", Some("id")),
                ("DELETE_RULE", Some("RESTRICT")),
            ])]
        } else {
            Vec::new()
        };
        Ok(rows)
    }
}

#[test]
fn test_diff_declared_against_database() {
    let dir = blog();
    let declared = EntitySchemaReader::default().read(dir.path()).unwrap();
    let current = MySqlIntrospector::new(BlogCatalog).introspect().unwrap();

    assert!(current.get_table("migrations").is_none());

    let diff = declared.diff(&current);
    insta::assert_snapshot!(diff.to_string().trim_end(), @r"
    tags:
      + table tags
    posts_tags:
      + table posts_tags
    legacy:
      - table legacy
    users:
      ~ email: string(120) -> string(180)
    ");
}
