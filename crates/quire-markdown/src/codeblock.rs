//! Code block extraction.
//!
//! Blog posts author highlighted code two ways: CommonMark fences and the
//! legacy `{% highlight <lang> %}` ... `{% endhighlight %}` directive. Both
//! end up as a [`CodeBlock`] so the renderer cannot tell them apart.

use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;

static LEGACY_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*\{%-?[ \t]*highlight[ \t]+([^\s%]+)[^%]*%\}").expect("valid regex")
});

static LEGACY_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{%-?[ \t]*endhighlight[ \t]*-?%\}").expect("valid regex"));

/// Authoring syntax a code block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSyntax {
    /// Triple-backtick or tilde fence
    Fenced,
    /// Four-space indented block
    Indented,
    /// `{% highlight %}` directive
    Legacy,
}

/// A code block found in a content body.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    /// Language tag as written by the author, if any
    pub language: Option<String>,

    /// Code text with leading and trailing newlines removed
    pub code: String,

    /// Byte range the block occupies in the body
    pub range: Range<usize>,

    /// Syntax the block was written in
    pub syntax: BlockSyntax,
}

impl CodeBlock {
    /// Create a new code block.
    pub fn new(
        language: Option<&str>,
        code: &str,
        range: Range<usize>,
        syntax: BlockSyntax,
    ) -> Self {
        Self {
            language: language
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            code: code.trim_matches(|c| c == '\n' || c == '\r').to_string(),
            range,
            syntax,
        }
    }

    /// Create a block from a fence info string such as `python` or `rust,ignore`.
    pub fn fenced(info: &str, code: &str, range: Range<usize>) -> Self {
        Self::new(language_from_info(info), code, range, BlockSyntax::Fenced)
    }
}

/// Parse the language tag from a code fence info string.
///
/// Accepts `python`, `python title="x"`, `rust,ignore` and kramdown's `{.python}`.
pub fn language_from_info(info: &str) -> Option<&str> {
    let token = info.split_whitespace().next()?;
    let token = token.trim_start_matches('{').trim_end_matches('}');
    let token = token.trim_start_matches('.');
    let token = token.split(',').next().unwrap_or("");
    (!token.is_empty()).then_some(token)
}

/// Extract every code block from a markdown body, ordered by position.
pub fn extract_code_blocks(body: &str, options: Options) -> Vec<CodeBlock> {
    let legacy = scan_legacy(body);
    let overlaps_legacy =
        |range: &Range<usize>| legacy.iter().any(|l| range.start < l.range.end && l.range.start < range.end);

    let mut blocks: Vec<CodeBlock> = collect_markdown_blocks(body, options)
        .into_iter()
        .filter(|b| !overlaps_legacy(&b.range))
        .collect();

    blocks.extend(legacy);
    blocks.sort_by_key(|b| b.range.start);
    blocks
}

/// Collect fenced and indented code blocks with pulldown-cmark.
fn collect_markdown_blocks(body: &str, options: Options) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(Option<String>, String, Range<usize>)> = None;

    for (event, range) in Parser::new_ext(body, options).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let info = match kind {
                    CodeBlockKind::Fenced(info) => Some(info.to_string()),
                    CodeBlockKind::Indented => None,
                };
                current = Some((info, String::new(), range));
            }
            Event::Text(text) => {
                if let Some((_, ref mut code, _)) = current {
                    code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((info, code, range)) = current.take() {
                    blocks.push(match info {
                        Some(info) => CodeBlock::fenced(&info, &code, range),
                        None => CodeBlock::new(None, &code, range, BlockSyntax::Indented),
                    });
                }
            }
            _ => {}
        }
    }

    blocks
}

/// Find legacy highlight directives that sit outside fenced code.
///
/// Directives inside a fence are sample text and stay untouched, as do
/// directives missing their `endhighlight`.
pub(crate) fn scan_legacy(body: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut fence: Option<Fence> = None;
    let mut open: Option<(usize, String, usize)> = None; // (start, language, code start)
    let mut offset = 0;

    for line in body.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if open.is_none() {
            let trimmed = line.trim_start_matches(' ');
            if line.len() - trimmed.len() >= 4 {
                continue;
            }

            if let Some(marker) = Fence::parse(trimmed) {
                fence = match fence {
                    None => Some(marker),
                    Some(current) if current.closed_by(&marker) => None,
                    unchanged => unchanged,
                };
                continue;
            }
            if fence.is_some() {
                continue;
            }

            let Some(caps) = LEGACY_OPEN.captures(line) else {
                continue;
            };
            let tag_end = caps.get(0).map_or(0, |m| m.end());
            open = Some((line_start, caps[1].to_string(), line_start + tag_end));
        }

        // The closing tag may share a line with the opening tag.
        if let Some((start, language, code_start)) = open.take() {
            let search_from = code_start.max(line_start);
            match LEGACY_CLOSE.find(&body[search_from..offset]) {
                Some(close) => {
                    let code = &body[code_start..search_from + close.start()];
                    let end = search_from + close.end();
                    blocks.push(CodeBlock::new(
                        Some(&language),
                        code,
                        start..end,
                        BlockSyntax::Legacy,
                    ));
                }
                None => open = Some((start, language, code_start)),
            }
        }
    }

    blocks
}

/// An opening or closing code fence line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
    bare: bool,
}

impl Fence {
    fn parse(line: &str) -> Option<Self> {
        let marker = line.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = line.chars().take_while(|c| *c == marker).count();
        if len < 3 {
            return None;
        }
        let rest = &line[len..];
        if marker == '`' && rest.contains('`') {
            return None;
        }
        Some(Self {
            marker,
            len,
            bare: rest.trim().is_empty(),
        })
    }

    fn closed_by(&self, other: &Fence) -> bool {
        other.marker == self.marker && other.len >= self.len && other.bare
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_language_from_info() {
        assert_eq!(language_from_info("python"), Some("python"));
        assert_eq!(language_from_info("rust,ignore"), Some("rust"));
        assert_eq!(language_from_info("js title=\"app.js\""), Some("js"));
        assert_eq!(language_from_info("{.ruby}"), Some("ruby"));
        assert_eq!(language_from_info(""), None);
        assert_eq!(language_from_info("   "), None);
    }

    #[test]
    fn trims_surrounding_newlines() {
        let block = CodeBlock::new(Some("sh"), "\n\nls\n\n", 0..4, BlockSyntax::Legacy);

        assert_eq!(block.code, "ls");
        assert_eq!(block.language.as_deref(), Some("sh"));
    }

    #[test]
    fn extracts_fenced_and_legacy_blocks_in_order() {
        let body = "Intro\n\n```python\nprint(1)\n```\n\n{% highlight ruby %}\nputs 1\n{% endhighlight %}\n\n    indented\n";

        let blocks = extract_code_blocks(body, Options::empty());

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].syntax, BlockSyntax::Fenced);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[0].code, "print(1)");
        assert_eq!(blocks[1].syntax, BlockSyntax::Legacy);
        assert_eq!(blocks[1].language.as_deref(), Some("ruby"));
        assert_eq!(blocks[1].code, "puts 1");
        assert_eq!(blocks[2].syntax, BlockSyntax::Indented);
        assert_eq!(blocks[2].language, None);
    }

    #[test]
    fn legacy_range_covers_the_directive() {
        let body = "a\n{% highlight c %}\nint x;\n{% endhighlight %}\nb\n";

        let blocks = scan_legacy(body);

        assert_eq!(blocks.len(), 1);
        assert_eq!(
            &body[blocks[0].range.clone()],
            "{% highlight c %}\nint x;\n{% endhighlight %}"
        );
    }

    #[test]
    fn legacy_on_single_line() {
        let blocks = scan_legacy("{% highlight sh %}echo hi{% endhighlight %}\n");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].code, "echo hi");
    }

    #[test]
    fn legacy_with_options_and_trim_markers() {
        let blocks = scan_legacy("{%- highlight python linenos -%}\nx = 1\n{%- endhighlight -%}\n");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("python"));
        assert_eq!(blocks[0].code, "x = 1");
    }

    #[test]
    fn ignores_directive_inside_fence() {
        let body = "````markdown\n{% highlight ruby %}\nputs 1\n{% endhighlight %}\n````\n";

        assert!(scan_legacy(body).is_empty());

        let blocks = extract_code_blocks(body, Options::empty());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("markdown"));
    }

    #[test]
    fn ignores_unclosed_directive() {
        assert!(scan_legacy("{% highlight ruby %}\nputs 1\n").is_empty());
    }

    #[test]
    fn fence_closing_rules() {
        let open = Fence::parse("````rust").unwrap();

        assert!(!open.closed_by(&Fence::parse("```").unwrap()));
        assert!(open.closed_by(&Fence::parse("`````").unwrap()));
        assert!(!open.closed_by(&Fence::parse("~~~~").unwrap()));
        assert!(Fence::parse("``").is_none());
        assert!(Fence::parse("``` a`b").is_none());
    }
}
