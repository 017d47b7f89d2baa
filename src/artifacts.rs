//! Artifact store: uploaded files on local disk, one directory per category.
//!
//! Writes are first-write-wins. A `(category, filename)` pair is written at
//! most once; a second upload of the same name is a no-op reported as
//! `written = false`. The check and the write are a single
//! `create_new` open, so concurrent sessions racing on one name cannot both
//! win and no lock is needed.
//!
//! ```text
//! uploaded_code/          ← Category::Code
//!   driver.c
//!   driver.h
//! uploaded_docs/          ← Category::Doc
//!   datasheet.pdf
//! ```

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CategoriesConfig;
use crate::error::{Error, Result};

/// Kind of uploaded artifact. Each category has its own directory and
/// its own knowledge source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Code,
    Doc,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Code => "code",
            Category::Doc => "doc",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "code" => Ok(Category::Code),
            "doc" | "docs" => Ok(Category::Doc),
            other => Err(format!("unknown category '{}': expected code or doc", other)),
        }
    }
}

/// Result of a single [`ArtifactStore::store`] call.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    pub category: Category,
    pub filename: String,
    pub path: PathBuf,
    /// False when the name already existed and nothing was written.
    pub written: bool,
}

struct Area {
    category: Category,
    dir: PathBuf,
    globs: GlobSet,
}

pub struct ArtifactStore {
    areas: Vec<Area>,
}

impl ArtifactStore {
    pub fn new(categories: &CategoriesConfig) -> anyhow::Result<Self> {
        let mut areas = Vec::new();
        for (category, cfg) in categories.iter() {
            let mut builder = GlobSetBuilder::new();
            for pattern in &cfg.include_globs {
                builder.add(
                    Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?,
                );
            }
            areas.push(Area {
                category,
                dir: cfg.dir.clone(),
                globs: builder.build()?,
            });
        }
        Ok(Self { areas })
    }

    /// Configured categories in fixed order.
    pub fn categories(&self) -> Vec<Category> {
        self.areas.iter().map(|a| a.category).collect()
    }

    pub fn dir(&self, category: Category) -> Option<&Path> {
        self.area(category).ok().map(|a| a.dir.as_path())
    }

    fn area(&self, category: Category) -> Result<&Area> {
        self.areas
            .iter()
            .find(|a| a.category == category)
            .ok_or_else(|| Error::precondition(format!("uploads of {} are not accepted here", category)))
    }

    /// Whether `filename` matches the category's accepted globs.
    pub fn accepts(&self, category: Category, filename: &str) -> bool {
        self.area(category)
            .map(|a| a.globs.is_match(filename))
            .unwrap_or(false)
    }

    /// Persist an upload unless the name already exists.
    pub fn store(&self, category: Category, filename: &str, bytes: &[u8]) -> Result<StoreOutcome> {
        let area = self.area(category)?;
        let filename = validate_filename(filename)?;
        if !area.globs.is_match(filename) {
            return Err(Error::precondition(format!(
                "unsupported file type for {} upload: {}",
                category, filename
            )));
        }

        fs::create_dir_all(&area.dir).map_err(|e| Error::filesystem(&area.dir, e))?;
        let path = area.dir.join(filename);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(%category, filename, "artifact exists, keeping first write");
                return Ok(StoreOutcome {
                    category,
                    filename: filename.to_string(),
                    path,
                    written: false,
                });
            }
            Err(e) => return Err(Error::filesystem(&path, e)),
        };

        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            // A truncated file would shadow every later upload of this name.
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(Error::filesystem(&path, e));
        }

        Ok(StoreOutcome {
            category,
            filename: filename.to_string(),
            path,
            written: true,
        })
    }

    /// Accepted filenames in the category directory, sorted. Missing dir is empty.
    pub fn list(&self, category: Category) -> Result<Vec<String>> {
        let area = self.area(category)?;
        let entries = match fs::read_dir(&area.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::filesystem(&area.dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::filesystem(&area.dir, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if area.globs.is_match(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn count(&self, category: Category) -> Result<usize> {
        Ok(self.list(category)?.len())
    }

    /// Remove the whole category directory.
    pub fn clear(&self, category: Category) -> Result<()> {
        let area = self.area(category)?;
        remove_tree(&area.dir).map_err(|e| Error::filesystem(&area.dir, e))
    }
}

/// Accept only a single, plain path component.
pub fn validate_filename(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::precondition(format!("invalid filename: {:?}", name)));
    }
    Ok(trimmed)
}

/// Recursively delete `path`, tolerating read-only entries and absence.
///
/// On a first failure every entry is made writable and the delete is
/// retried once.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(());
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(path = %path.display(), error = %first, "delete failed, retrying as writable");
            make_writable(path);
            match fs::remove_dir_all(path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path) {
    for entry in walkdir::WalkDir::new(path).into_iter().flatten() {
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                perms.set_readonly(false);
                let _ = fs::set_permissions(entry.path(), perms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryConfig;
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> ArtifactStore {
        ArtifactStore::new(&CategoriesConfig {
            code: Some(CategoryConfig {
                dir: tmp.path().join("uploaded_code"),
                include_globs: vec!["*.c".into(), "*.h".into()],
            }),
            doc: Some(CategoryConfig {
                dir: tmp.path().join("uploaded_docs"),
                include_globs: vec!["*.pdf".into(), "*.md".into()],
            }),
        })
        .unwrap()
    }

    #[test]
    fn first_write_wins() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let first = store.store(Category::Code, "driver.c", b"int a;").unwrap();
        assert!(first.written);
        let second = store.store(Category::Code, "driver.c", b"int b;").unwrap();
        assert!(!second.written);

        let content = fs::read_to_string(first.path).unwrap();
        assert_eq!(content, "int a;");
        assert_eq!(store.list(Category::Code).unwrap(), vec!["driver.c"]);
    }

    #[test]
    fn same_name_in_other_category_is_independent() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(&CategoriesConfig {
            code: Some(CategoryConfig {
                dir: tmp.path().join("code"),
                include_globs: vec!["*".into()],
            }),
            doc: Some(CategoryConfig {
                dir: tmp.path().join("docs"),
                include_globs: vec!["*".into()],
            }),
        })
        .unwrap();
        assert!(store.store(Category::Code, "notes.txt", b"a").unwrap().written);
        assert!(store.store(Category::Doc, "notes.txt", b"b").unwrap().written);
    }

    #[test]
    fn rejects_path_components_and_wrong_extension() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        for bad in ["../escape.c", "a/b.c", "..", "", "  "] {
            assert!(matches!(
                store.store(Category::Code, bad, b"x"),
                Err(Error::Precondition(_))
            ));
        }
        assert!(matches!(
            store.store(Category::Code, "script.py", b"x"),
            Err(Error::Precondition(_))
        ));
        assert!(!tmp.path().join("escape.c").exists());
    }

    #[test]
    fn list_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(store.list(Category::Code).unwrap().is_empty());

        store.store(Category::Code, "b.h", b"").unwrap();
        store.store(Category::Code, "a.c", b"").unwrap();
        fs::write(tmp.path().join("uploaded_code/stray.o"), b"").unwrap();

        assert_eq!(store.list(Category::Code).unwrap(), vec!["a.c", "b.h"]);
        assert_eq!(store.count(Category::Code).unwrap(), 2);
    }

    #[test]
    fn clear_tolerates_missing_and_readonly() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store.clear(Category::Doc).unwrap();

        let out = store.store(Category::Doc, "spec.md", b"# spec").unwrap();
        let mut perms = fs::metadata(&out.path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&out.path, perms).unwrap();

        store.clear(Category::Doc).unwrap();
        assert!(!tmp.path().join("uploaded_docs").exists());
    }

    #[test]
    fn category_parses_aliases() {
        assert_eq!("docs".parse::<Category>().unwrap(), Category::Doc);
        assert_eq!("CODE".parse::<Category>().unwrap(), Category::Code);
        assert!("image".parse::<Category>().is_err());
    }
}
