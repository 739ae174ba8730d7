//! Directory scanning utilities for discovering slideshow images and sorting
//! them into recency strata by the year found in their path.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions (lowercase, without dot) the slideshow is able to show.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// One discoverable image together with the year parsed from its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaFile {
    path: PathBuf,
    year: Option<i32>,
}

impl MediaFile {
    /// Build a media file, deriving the year from the path components.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        let year = extract_year(&path);
        Self { path, year }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn year(&self) -> Option<i32> {
        self.year
    }

    /// Path shown in the caption: relative to `root` when possible.
    #[must_use]
    pub fn display_path(&self, root: &Path) -> String {
        self.path
            .strip_prefix(root)
            .unwrap_or(&self.path)
            .display()
            .to_string()
    }
}

/// All images below a root, plus the two recency pools used for sampling.
///
/// A file lands in at most one of `recent_two_years` and `last_five_years`,
/// and always in `all`.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub all: Vec<MediaFile>,
    pub recent_two_years: Vec<MediaFile>,
    pub last_five_years: Vec<MediaFile>,
}

impl Catalog {
    /// Stratify `files` relative to `current_year`.
    pub fn from_files(files: impl IntoIterator<Item = MediaFile>, current_year: i32) -> Self {
        let mut catalog = Self::default();
        for file in files {
            match file.year() {
                Some(year) if year == current_year || year == current_year - 1 => {
                    catalog.recent_two_years.push(file.clone());
                }
                Some(year) if (current_year - 4..=current_year).contains(&year) => {
                    catalog.last_five_years.push(file.clone());
                }
                _ => {}
            }
            catalog.all.push(file);
        }
        catalog
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Return the first path component made of exactly four ASCII digits.
#[must_use]
pub fn extract_year(path: &Path) -> Option<i32> {
    path.iter()
        .filter_map(OsStr::to_str)
        .find(|part| part.len() == 4 && part.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|part| part.parse().ok())
}

/// Return `true` if `path` has one of the [`SUPPORTED_EXTENSIONS`].
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Recursively collect supported images below `root`.
///
/// Unreadable entries and subtrees are logged and skipped; the scan itself
/// never fails.
pub fn scan(root: &Path, current_year: i32) -> Catalog {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    path = ?err.path(),
                    error = %err,
                    "skipping unreadable entry"
                );
                continue;
            }
        };
        if entry.file_type().is_file() && is_supported_image(entry.path()) {
            files.push(MediaFile::new(entry.into_path()));
        }
    }
    debug!(root = %root.display(), discovered = files.len(), "scan complete");
    Catalog::from_files(files, current_year)
}
