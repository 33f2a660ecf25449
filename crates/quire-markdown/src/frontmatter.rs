//! Front matter extraction.
//!
//! Posts open with a YAML block fenced by `---` lines. The keys belong to the
//! site generator, so the mapping is kept opaque here.

use serde_yaml::{Mapping, Value};

/// Parsed front matter of a content file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    values: Mapping,
}

impl Frontmatter {
    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a top-level key holding a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw mapping.
    pub fn as_mapping(&self) -> &Mapping {
        &self.values
    }
}

/// Extract front matter from a content file.
///
/// Returns the parsed front matter and the body that follows the closing
/// fence. The opening fence must be the first line of the file; the closing
/// fence is a `---` or `...` line.
pub fn extract_frontmatter(source: &str) -> Result<(Option<Frontmatter>, &str), FrontmatterError> {
    let mut lines = source.split_inclusive('\n');

    let Some(first) = lines.next() else {
        return Ok((None, source));
    };
    if first.trim_end() != "---" {
        return Ok((None, source));
    }

    let mut offset = first.len();
    for line in lines {
        let marker = line.trim_end();
        if marker == "---" || marker == "..." {
            let yaml = &source[first.len()..offset];
            let body = &source[offset + line.len()..];
            return Ok((Some(parse_yaml(yaml)?), body));
        }
        offset += line.len();
    }

    Err(FrontmatterError::Unclosed)
}

fn parse_yaml(yaml: &str) -> Result<Frontmatter, FrontmatterError> {
    if yaml.trim().is_empty() {
        return Ok(Frontmatter::default());
    }

    let value: Value =
        serde_yaml::from_str(yaml).map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;

    match value {
        Value::Mapping(values) => Ok(Frontmatter { values }),
        Value::Null => Ok(Frontmatter::default()),
        _ => Err(FrontmatterError::NotAMapping),
    }
}

/// Errors that can occur when parsing front matter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Unclosed front matter block - missing closing ---")]
    Unclosed,

    #[error("Invalid YAML in front matter: {0}")]
    InvalidYaml(String),

    #[error("Front matter must be a YAML mapping")]
    NotAMapping,
}
