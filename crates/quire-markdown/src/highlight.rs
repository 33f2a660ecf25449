//! Syntax highlighting with syntect.
//!
//! Output is class-based (`<span class="source python">`), so the site
//! stylesheet owns the colors.

use serde::Deserialize;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

/// Language token used when no lexer applies.
pub const PLAINTEXT: &str = "plaintext";

const PLAINTEXT_ALIASES: &[&str] = &["plaintext", "plain", "text", "txt"];

/// Which highlighter backs the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum HighlighterKind {
    /// syntect with the bundled syntax definitions
    #[default]
    #[serde(rename = "syntect", alias = "rouge")]
    Syntect,

    /// Escape only, never colorize
    #[serde(rename = "none")]
    Disabled,
}

/// Why a block was rendered as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// No lexer is registered for the tag
    Unknown(String),
    /// The tag contains characters a language name cannot have
    Malformed(String),
    /// The lexer failed part way through
    LexerError(String),
}

/// Result of highlighting a piece of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    /// Resolved language token, or [`PLAINTEXT`]
    pub language: String,

    /// Token-annotated, HTML-escaped code
    pub html: String,

    /// Set when a requested language could not be used
    pub fallback: Option<Fallback>,
}

/// Highlights code for a language tag.
pub struct Highlighter {
    syntaxes: SyntaxSet,
    colorize: bool,
}

impl Highlighter {
    /// Create a highlighter loaded with syntect's default syntaxes.
    pub fn new() -> Self {
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
            colorize: true,
        }
    }

    /// Create a highlighter that resolves tags but only escapes.
    pub fn disabled() -> Self {
        Self {
            colorize: false,
            ..Self::new()
        }
    }

    pub fn for_kind(kind: HighlighterKind) -> Self {
        match kind {
            HighlighterKind::Syntect => Self::new(),
            HighlighterKind::Disabled => Self::disabled(),
        }
    }

    /// Highlight `code`. Never fails; anything unusable degrades to plain text.
    pub fn highlight(&self, code: &str, tag: Option<&str>) -> Highlighted {
        let Some(raw) = tag.map(str::trim).filter(|t| !t.is_empty()) else {
            return plain(code, None);
        };

        let Some(tag) = normalize_tag(raw) else {
            return plain(code, Some(Fallback::Malformed(raw.to_string())));
        };

        if PLAINTEXT_ALIASES.contains(&tag.as_str()) {
            return plain(code, None);
        }

        let Some(syntax) = self.syntaxes.find_syntax_by_token(&tag) else {
            return plain(code, Some(Fallback::Unknown(tag)));
        };

        if !self.colorize {
            return Highlighted {
                html: escape_html(&with_newline(code)),
                language: tag,
                fallback: None,
            };
        }

        match classed_html(&self.syntaxes, syntax, code) {
            Ok(html) => Highlighted {
                language: tag,
                html,
                fallback: None,
            },
            Err(e) => plain(code, Some(Fallback::LexerError(e.to_string()))),
        }
    }

    /// Whether a tag resolves to a real lexer.
    pub fn supports(&self, tag: &str) -> bool {
        normalize_tag(tag).is_some_and(|tag| self.syntaxes.find_syntax_by_token(&tag).is_some())
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Highlighter")
            .field("colorize", &self.colorize)
            .finish()
    }
}

fn classed_html(
    syntaxes: &SyntaxSet,
    syntax: &SyntaxReference,
    code: &str,
) -> Result<String, syntect::Error> {
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, syntaxes, ClassStyle::Spaced);
    for line in LinesWithEndings::from(&with_newline(code)) {
        generator.parse_html_for_line_which_includes_newline(line)?;
    }
    Ok(generator.finalize())
}

fn plain(code: &str, fallback: Option<Fallback>) -> Highlighted {
    Highlighted {
        language: PLAINTEXT.to_string(),
        html: escape_html(&with_newline(code)),
        fallback,
    }
}

/// The newline-terminated syntaxes expect every line to end in `\n`.
fn with_newline(code: &str) -> String {
    let mut code = code.to_string();
    if !code.ends_with('\n') {
        code.push('\n');
    }
    code
}

/// Lowercase a tag and reject anything that is not a plausible language name.
fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim().to_lowercase();
    let valid = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '#' | '.' | '-'));
    valid.then_some(tag)
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
