//! Writing generated code under a page's output directory.
//!
//! A save moves through three states:
//!
//! ```text
//! SaveRequest ──validate()──▶ ValidatedSave ──write()──▶ SavedFile
//!  (raw names)               (sanitized, contained)      (file on disk)
//! ```
//!
//! Validation has no side effects. Every write creates a new file named
//! `<stem>_<YYYYmmdd_HHMMSS><ext>`; a collision within the same second gets
//! a `_1`, `_2`, ... suffix. Existing files are never overwritten.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use chrono::Local;
use serde_json::{json, Value};

const MAX_SUFFIX: u32 = 1000;

/// Replace every character outside `[A-Za-z0-9_-]` (Unicode letters and
/// digits included) with `_`. Blank input becomes `untitled`.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

pub struct SaveRequest<'a> {
    root: &'a Path,
    subdirs: Vec<&'a str>,
    stem: &'a str,
    extension: &'a str,
    contents: &'a str,
}

impl<'a> SaveRequest<'a> {
    pub fn new(root: &'a Path, stem: &'a str, extension: &'a str, contents: &'a str) -> Self {
        Self {
            root,
            subdirs: Vec::new(),
            stem,
            extension,
            contents,
        }
    }

    /// Nest the file one directory deeper. Applied in call order.
    pub fn subdir(mut self, name: &'a str) -> Self {
        self.subdirs.push(name);
        self
    }

    pub fn validate(self) -> io::Result<ValidatedSave<'a>> {
        let mut dir = self.root.to_path_buf();
        for sub in &self.subdirs {
            dir.push(sanitize_component(sub));
        }
        // Sanitized components cannot climb, but the root itself must not either.
        if !dir.starts_with(self.root)
            || dir
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to write outside {}", self.root.display()),
            ));
        }
        Ok(ValidatedSave {
            dir,
            stem: sanitize_component(self.stem),
            extension: self.extension,
            contents: self.contents,
        })
    }
}

pub struct ValidatedSave<'a> {
    dir: PathBuf,
    stem: String,
    extension: &'a str,
    contents: &'a str,
}

impl ValidatedSave<'_> {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(self) -> io::Result<SavedFile> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.write_stamped(&stamp)
    }

    fn write_stamped(self, stamp: &str) -> io::Result<SavedFile> {
        fs::create_dir_all(&self.dir)?;
        for n in 0..MAX_SUFFIX {
            let name = if n == 0 {
                format!("{}_{}{}", self.stem, stamp, self.extension)
            } else {
                format!("{}_{}_{}{}", self.stem, stamp, n, self.extension)
            };
            let path = self.dir.join(name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };
            if let Err(e) = file.write_all(self.contents.as_bytes()) {
                drop(file);
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            return Ok(SavedFile { path });
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free filename for {} in {}", self.stem, self.dir.display()),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedFile {
    pub path: PathBuf,
}

impl SavedFile {
    /// `{status, filepath, message}` as returned to the model.
    pub fn report(&self, what: &str) -> Value {
        json!({
            "status": "success",
            "filepath": self.path.display().to_string(),
            "message": format!("{} saved successfully to {}", what, self.path.display()),
        })
    }
}
