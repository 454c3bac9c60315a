// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sibling file collection for dynamic prompts

use std::path::Path;
use tracing::debug;

use crate::{NewfilesError, Result};

/// Text returned when a dynamic prompt has nothing to reference
pub const NO_REFERENCE_FILES: &str = "No reference files found.";

/// A sibling file used as context for generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    pub filename: String,
    pub content: String,
}

/// Collect readable files in `directory` sharing `extension`, skipping `exclude_filename`.
///
/// Only direct entries are scanned. Files that are not valid UTF-8 text are
/// left out silently. Results follow directory enumeration order.
pub fn collect(directory: &Path, extension: &str, exclude_filename: &str) -> Result<Vec<ReferenceFile>> {
    let suffix = if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{}", extension)
    };

    let entries = std::fs::read_dir(directory).map_err(|source| NewfilesError::DirectoryUnavailable {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut references = Vec::new();
    for entry in entries.flatten() {
        let filename = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };

        if !filename.ends_with(&suffix) || filename == exclude_filename {
            continue;
        }

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => references.push(ReferenceFile { filename, content }),
            Err(e) => debug!("Skipping reference {:?}: {}", path, e),
        }
    }

    debug!("Collected {} reference files from {:?}", references.len(), directory);
    Ok(references)
}

/// Render references as `--- name ---` blocks for prompt substitution
pub fn format_reference_files(references: &[ReferenceFile]) -> String {
    if references.is_empty() {
        return NO_REFERENCE_FILES.to_string();
    }

    references
        .iter()
        .map(|r| format!("\n--- {} ---\n{}\n", r.filename, r.content))
        .collect()
}
