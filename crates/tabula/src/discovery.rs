//! Entity discovery.
//!
//! Walks a source tree, parses every source file with `syn` and lists the
//! struct declarations it finds. A declaration is an entity when it carries
//! the table marker:
//!
//! ```ignore
//! #[orm(table = "posts")]
//! pub struct Post {
//!     #[orm(column(primary_key))]
//!     pub id: i32,
//! }
//! ```
//!
//! Declarations are identified by their module path relative to the scanned
//! root, so `blog/post.rs` declaring `Post` yields `blog::post::Post`.

use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use proc_macro2::TokenTree;
use syn::{Item, ItemStruct};

use crate::config::ScanMode;
use crate::{Error, Result};

/// Attribute namespace for every entity marker.
pub const ATTR_NAMESPACE: &str = "orm";

/// A struct declaration found in the scanned tree.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Fully-qualified identifier, e.g. `blog::post::Post`.
    pub id: String,
    /// Source file the struct was found in.
    pub path: Utf8PathBuf,
    /// The parsed struct.
    pub item: ItemStruct,
    /// Whether the struct carries `#[orm(table = ...)]`.
    pub has_table_marker: bool,
}

impl Declaration {
    /// The bare struct name.
    pub fn name(&self) -> String {
        self.item.ident.to_string()
    }
}

/// Finds entity declarations in a source tree.
#[derive(Debug, Clone)]
pub struct EntityDiscovery {
    mode: ScanMode,
    extension: String,
}

impl Default for EntityDiscovery {
    fn default() -> Self {
        Self::new(ScanMode::default())
    }
}

impl EntityDiscovery {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            extension: "rs".to_string(),
        }
    }

    /// Only consider files with this extension (default `rs`).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Fully-qualified identifiers of every entity under `root`.
    pub fn discover(&self, root: impl AsRef<Path>) -> Result<Vec<String>> {
        Ok(self
            .declarations(root)?
            .into_iter()
            .filter(|d| d.has_table_marker)
            .map(|d| d.id)
            .collect())
    }

    /// Every struct declaration under `root`, entities or not.
    ///
    /// A missing root is not an error: it simply contains nothing.
    pub fn declarations(&self, root: impl AsRef<Path>) -> Result<Vec<Declaration>> {
        let root = root.as_ref();
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "scan root is not a directory");
            return Ok(Vec::new());
        }
        let Some(root) = Utf8Path::from_path(root) else {
            tracing::warn!(root = %root.display(), "scan root is not valid UTF-8, skipping");
            return Ok(Vec::new());
        };

        let mut files = Vec::new();
        self.collect_files(root, &mut files)?;

        let mut declarations = Vec::new();
        for file in files {
            match load_file(&file) {
                Ok(syntax) => {
                    let relative = file.strip_prefix(root).unwrap_or(&file);
                    let module = module_path(relative);
                    collect_structs(&syntax.items, &module, &file, &mut declarations);
                }
                Err(e) => self.skip(e)?,
            }
        }

        for decl in declarations.iter().filter(|d| d.has_table_marker) {
            tracing::debug!(entity = %decl.id, path = %decl.path, "discovered entity");
        }

        Ok(declarations)
    }

    fn collect_files(&self, dir: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(source) => {
                return self.skip(Error::Io {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };

        let mut paths: Vec<(Utf8PathBuf, fs::FileType)> = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    self.skip(Error::Io {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                    continue;
                }
            };
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(source) => {
                    self.skip(Error::Io {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                    continue;
                }
            };
            match Utf8PathBuf::from_path_buf(entry.path()) {
                Ok(path) => paths.push((path, file_type)),
                Err(path) => {
                    tracing::warn!(path = %path.display(), "skipping non UTF-8 path");
                }
            }
        }
        paths.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, file_type) in paths {
            // Symlinked directories are never entered.
            if file_type.is_dir() {
                self.collect_files(&path, files)?;
            } else if file_type.is_symlink() && path.is_dir() {
                tracing::debug!(path = %path, "skipping symlinked directory");
            } else if path.is_file() && path.extension() == Some(self.extension.as_str()) {
                files.push(path);
            }
        }
        Ok(())
    }

    /// Lenient mode logs and swallows the error, strict mode returns it.
    fn skip(&self, error: Error) -> Result<()> {
        match self.mode {
            ScanMode::Lenient => {
                tracing::warn!(%error, "skipping unreadable source");
                Ok(())
            }
            ScanMode::Strict => Err(error),
        }
    }
}

fn load_file(path: &Utf8Path) -> Result<syn::File> {
    let source = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    syn::parse_file(&source).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Module path of a file relative to the scan root.
///
/// `mod.rs`, `lib.rs` and `main.rs` name their parent module.
fn module_path(relative: &Utf8Path) -> Vec<String> {
    let mut segments: Vec<String> = relative
        .parent()
        .map(|p| p.components().map(|c| c.as_str().to_string()).collect())
        .unwrap_or_default();
    if let Some(stem) = relative.file_stem()
        && !matches!(stem, "mod" | "lib" | "main")
    {
        segments.push(stem.to_string());
    }
    segments
}

fn collect_structs(items: &[Item], module: &[String], path: &Utf8Path, out: &mut Vec<Declaration>) {
    for item in items {
        match item {
            Item::Struct(item) => {
                let mut segments = module.to_vec();
                segments.push(item.ident.to_string());
                out.push(Declaration {
                    id: segments.join("::"),
                    path: path.to_path_buf(),
                    has_table_marker: has_table_marker(&item.attrs),
                    item: item.clone(),
                });
            }
            Item::Mod(m) => {
                if let Some((_, inner)) = &m.content {
                    let mut nested = module.to_vec();
                    nested.push(m.ident.to_string());
                    collect_structs(inner, &nested, path, out);
                }
            }
            _ => {}
        }
    }
}

/// Whether the attributes contain `#[orm(table ...)]`.
///
/// Only the top-level tokens are inspected so that a malformed marker still
/// counts as a marker; reading it properly is the schema reader's job.
pub fn has_table_marker(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| {
        if !attr.path().is_ident(ATTR_NAMESPACE) {
            return false;
        }
        let Ok(list) = attr.meta.require_list() else {
            return false;
        };
        list.tokens
            .clone()
            .into_iter()
            .any(|tt| matches!(tt, TokenTree::Ident(ident) if ident == "table"))
    })
}
