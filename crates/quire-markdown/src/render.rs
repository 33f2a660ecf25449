//! Code block rendering.
//!
//! Every block, however it was authored, becomes
//!
//! ```html
//! <figure class="highlight"><pre><code class="language-L" data-lang="L">…</code></pre></figure>
//! ```

use crate::codeblock::CodeBlock;
use crate::highlight::{Fallback, Highlighter, HighlighterKind};

/// HTML produced for one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFragment {
    /// Language token used for the class and data attribute
    pub language: String,

    /// Complete figure markup
    pub html: String,
}

/// Turns code blocks into HTML fragments.
pub trait CodeBlockRenderer: Send + Sync {
    /// Render a block. Implementations must not fail; degrade instead.
    fn render(&self, block: &CodeBlock) -> RenderedFragment;
}

/// Default renderer backed by the syntax highlighter.
#[derive(Debug)]
pub struct HighlightRenderer {
    highlighter: Highlighter,
}

impl HighlightRenderer {
    pub fn new(highlighter: Highlighter) -> Self {
        Self { highlighter }
    }

    pub fn for_kind(kind: HighlighterKind) -> Self {
        Self::new(Highlighter::for_kind(kind))
    }
}

impl CodeBlockRenderer for HighlightRenderer {
    fn render(&self, block: &CodeBlock) -> RenderedFragment {
        let highlighted = self
            .highlighter
            .highlight(&block.code, block.language.as_deref());

        match &highlighted.fallback {
            Some(Fallback::Unknown(tag)) => {
                tracing::warn!(language = %tag, "no lexer for language, rendering as plain text");
            }
            Some(Fallback::Malformed(tag)) => {
                tracing::warn!(language = %tag, "malformed language tag, rendering as plain text");
            }
            Some(Fallback::LexerError(message)) => {
                tracing::warn!(
                    language = ?block.language,
                    error = %message,
                    "highlighting failed, rendering as plain text"
                );
            }
            None => {}
        }

        RenderedFragment {
            html: wrap_fragment(&highlighted.language, &highlighted.html),
            language: highlighted.language,
        }
    }
}

/// Wrap highlighted markup in the figure/pre/code container.
///
/// `language` must already be a sanitized token.
pub fn wrap_fragment(language: &str, inner: &str) -> String {
    format!(
        r#"<figure class="highlight"><pre><code class="language-{lang}" data-lang="{lang}">{inner}</code></pre></figure>"#,
        lang = language,
        inner = inner,
    )
}
