// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! newfiles: AI content for new empty files
//!
//! Watches a directory and fills newly created empty files with content
//! generated from a per-extension prompt template.

pub mod config;
pub mod error;
pub mod generator;
pub mod logging;
pub mod openai;
pub mod processor;
pub mod reference;
pub mod watcher;

pub use config::Settings;
pub use error::{NewfilesError, Result};
