//! Markdown conversion for blog content.
//!
//! Parses content files (front matter + markdown body) and converts the body
//! to HTML. Fenced code blocks and legacy `{% highlight %}` directives are both
//! rendered through a [`CodeBlockRenderer`] into one fixed HTML shape.

pub mod codeblock;
pub mod content;
pub mod converter;
pub mod frontmatter;
pub mod highlight;
pub mod render;

pub use codeblock::{extract_code_blocks, BlockSyntax, CodeBlock};
pub use content::{BodyFormat, ContentError, ContentUnit};
pub use converter::{ConverterOptions, InputMode, MarkdownConverter};
pub use frontmatter::{Frontmatter, FrontmatterError};
pub use highlight::{Highlighted, Highlighter, HighlighterKind, PLAINTEXT};
pub use render::{CodeBlockRenderer, HighlightRenderer, RenderedFragment};
