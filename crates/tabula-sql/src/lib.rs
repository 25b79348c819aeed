//! SQL text helpers shared by the tabula crates.
//!
//! Nothing in here knows about a particular database engine: quoting takes
//! the quote character as a parameter, and the naming helpers encode the
//! conventions used when tabula synthesizes constraints and pivot tables.

use std::fmt;

/// A SQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use tabula_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A SQL identifier wrapper with a dialect-chosen quote character.
///
/// Display writes the identifier surrounded by the quote character, doubling
/// any embedded occurrence of it.
///
/// # Example
/// ```
/// use tabula_sql::Ident;
/// assert_eq!(format!("{}", Ident::ansi("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident::new("or`der", '`')), "`or``der`");
/// ```
pub struct Ident<T: AsRef<str>> {
    pub name: T,
    pub quote: char,
}

impl<T: AsRef<str>> Ident<T> {
    pub fn new(name: T, quote: char) -> Self {
        Self { name, quote }
    }

    /// Standard SQL double-quoted identifier.
    pub fn ansi(name: T) -> Self {
        Self::new(name, '"')
    }
}

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.quote)?;
        for c in self.name.as_ref().chars() {
            if c == self.quote {
                write!(f, "{}{}", c, c)?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "{}", self.quote)
    }
}

/// Quote an identifier with the given quote character.
pub fn quote_ident_with(name: &str, quote: char) -> String {
    format!("{}", Ident::new(name, quote))
}

/// Quote an identifier with standard SQL double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident::ansi(name))
}

/// Remove one level of quoting (`"x"`, `` `x` `` or `'x'`), undoubling
/// embedded quote characters. Unquoted input is returned trimmed.
///
/// # Examples
///
/// ```
/// assert_eq!(tabula_sql::unquote("`posts`"), "posts");
/// assert_eq!(tabula_sql::unquote("'it''s'"), "it's");
/// assert_eq!(tabula_sql::unquote(" id "), "id");
/// ```
pub fn unquote(s: &str) -> String {
    let s = s.trim();
    for quote in ['"', '`', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            let inner = &s[1..s.len() - 1];
            let doubled: String = [quote, quote].iter().collect();
            return inner.replace(&doubled, &quote.to_string());
        }
    }
    s.to_string()
}

/// Generate the standard foreign key constraint name for a table column.
///
/// # Examples
///
/// ```
/// assert_eq!(tabula_sql::foreign_key_name("posts", "author_id"), "fk_posts_author_id");
/// ```
pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("fk_{}_{}", table, column)
}

/// Generate the default pivot table name for a many-to-many relationship.
///
/// # Examples
///
/// ```
/// assert_eq!(tabula_sql::pivot_table_name("posts", "tags"), "posts_tags");
/// ```
pub fn pivot_table_name(owner: &str, target: &str) -> String {
    format!("{}_{}", owner, target)
}

/// Generate the default join column name for a field or table.
///
/// # Examples
///
/// ```
/// assert_eq!(tabula_sql::join_column_name("Author"), "author_id");
/// assert_eq!(tabula_sql::join_column_name("posts"), "posts_id");
/// ```
pub fn join_column_name(prefix: &str) -> String {
    format!("{}_id", prefix.to_lowercase())
}

/// Join already-rendered items with `", "`.
pub fn comma_list<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
///
/// Entries may be quoted, in which case commas inside quotes do not split.
///
/// # Examples
///
/// ```
/// assert_eq!(tabula_sql::split_list("draft, published"), vec!["draft", "published"]);
/// assert_eq!(tabula_sql::split_list("'a,b','c'"), vec!["a,b", "c"]);
/// assert!(tabula_sql::split_list(" ").is_empty());
/// ```
pub fn split_list(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quote: Option<char> = None;

    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match in_quote {
            Some(q) if c == q => {
                // Doubled quote is an escaped quote, keep both for `unquote`.
                if chars.peek() == Some(&q) {
                    current.push(c);
                    current.push(q);
                    chars.next();
                } else {
                    current.push(c);
                    in_quote = None;
                }
            }
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' || c == '`' => {
                current.push(c);
                in_quote = Some(c);
            }
            None if c == ',' => {
                out.push(std::mem::take(&mut current));
            }
            None => current.push(c),
        }
    }
    out.push(current);

    out.iter()
        .map(|entry| unquote(entry))
        .filter(|entry| !entry.is_empty())
        .collect()
}
