//! Content source files.

use std::fs;
use std::path::{Path, PathBuf};

use pulldown_cmark::Options;

use crate::codeblock::{extract_code_blocks, CodeBlock};
use crate::frontmatter::{extract_frontmatter, Frontmatter, FrontmatterError};

/// Format of a content body, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Markdown,
    Html,
    Other,
}

impl BodyFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "md" | "markdown" | "mkd" | "mkdn" | "mdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            _ => Self::Other,
        }
    }
}

/// A content file: front matter plus body.
#[derive(Debug, Clone)]
pub struct ContentUnit {
    /// Source path
    pub path: PathBuf,

    /// Parsed front matter (if present)
    pub front_matter: Option<Frontmatter>,

    /// Detected body format
    pub format: BodyFormat,

    source: String,
    body_start: usize,
}

/// Errors that can occur when loading content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Front matter error in {path}: {source}")]
    Frontmatter {
        path: String,
        source: FrontmatterError,
    },
}

impl ContentUnit {
    /// Read and parse a content file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ContentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(path, source)
    }

    /// Parse already-read file contents.
    pub fn parse(path: impl Into<PathBuf>, source: String) -> Result<Self, ContentError> {
        let path = path.into();
        let (front_matter, body) =
            extract_frontmatter(&source).map_err(|source| ContentError::Frontmatter {
                path: path.display().to_string(),
                source,
            })?;
        let body_start = source.len() - body.len();

        Ok(Self {
            format: BodyFormat::from_path(&path),
            path,
            front_matter,
            source,
            body_start,
        })
    }

    /// Raw file contents.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Body text after the front matter.
    pub fn body(&self) -> &str {
        &self.source[self.body_start..]
    }

    /// Code blocks in the body. Ranges are relative to [`ContentUnit::body`].
    pub fn code_blocks(&self, options: Options) -> Vec<CodeBlock> {
        match self.format {
            BodyFormat::Markdown => extract_code_blocks(self.body(), options),
            _ => Vec::new(),
        }
    }
}
