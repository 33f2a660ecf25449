//! Markdown to HTML conversion.
//!
//! The converter is the hook the site generator calls for each content file.
//! Code blocks never go through pulldown-cmark's default `<pre><code>` output;
//! the configured [`CodeBlockRenderer`] produces them instead.

use std::ops::Range;

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use serde::Deserialize;

use crate::codeblock::{scan_legacy, BlockSyntax, CodeBlock};
use crate::content::{BodyFormat, ContentUnit};
use crate::highlight::HighlighterKind;
use crate::render::{CodeBlockRenderer, HighlightRenderer};

/// Markdown dialect accepted by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum InputMode {
    /// GitHub-flavored markdown
    #[default]
    #[serde(rename = "gfm", alias = "GFM")]
    Gfm,

    /// kramdown extensions: footnotes, heading attributes, smart quotes
    #[serde(rename = "kramdown")]
    Kramdown,

    /// Plain CommonMark
    #[serde(rename = "commonmark", alias = "CommonMark")]
    CommonMark,
}

/// Options recognized by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ConverterOptions {
    #[serde(default)]
    pub input: InputMode,

    #[serde(default)]
    pub highlighter: HighlighterKind,
}

impl ConverterOptions {
    /// Resolve to pulldown-cmark parser options.
    pub fn parser_options(&self) -> Options {
        match self.input {
            InputMode::Gfm => {
                Options::ENABLE_TABLES
                    | Options::ENABLE_FOOTNOTES
                    | Options::ENABLE_STRIKETHROUGH
                    | Options::ENABLE_TASKLISTS
            }
            InputMode::Kramdown => {
                Options::ENABLE_TABLES
                    | Options::ENABLE_FOOTNOTES
                    | Options::ENABLE_HEADING_ATTRIBUTES
                    | Options::ENABLE_SMART_PUNCTUATION
            }
            InputMode::CommonMark => Options::empty(),
        }
    }
}

/// Converts markdown bodies to HTML.
///
/// Construct once per process; conversion itself holds no mutable state.
pub struct MarkdownConverter {
    options: ConverterOptions,
    parser_options: Options,
    renderer: Box<dyn CodeBlockRenderer>,
}

impl MarkdownConverter {
    /// Create a converter with the default highlighting renderer.
    pub fn new(options: ConverterOptions) -> Self {
        Self::with_renderer(
            options,
            Box::new(HighlightRenderer::for_kind(options.highlighter)),
        )
    }

    /// Create a converter with a custom code block renderer.
    pub fn with_renderer(options: ConverterOptions, renderer: Box<dyn CodeBlockRenderer>) -> Self {
        Self {
            parser_options: options.parser_options(),
            options,
            renderer,
        }
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Convert a markdown body to HTML.
    pub fn convert(&self, body: &str) -> String {
        let (source, offsets, fragments) = self.substitute_legacy(body);

        let mut events = Vec::new();
        let mut current: Option<(Option<String>, String, Range<usize>)> = None;

        for (event, range) in Parser::new_ext(&source, self.parser_options).into_offset_iter() {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let info = match kind {
                        CodeBlockKind::Fenced(info) => Some(info.to_string()),
                        CodeBlockKind::Indented => None,
                    };
                    current = Some((info, String::new(), range));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((info, code, range)) = current.take() {
                        let range = offsets.to_body(range.start)..offsets.to_body(range.end);
                        let block = match info {
                            Some(info) => CodeBlock::fenced(&info, &code, range),
                            None => CodeBlock::new(None, &code, range, BlockSyntax::Indented),
                        };
                        let fragment = self.renderer.render(&block);
                        events.push(Event::Html(format!("{}\n", fragment.html).into()));
                    }
                }
                Event::Text(text) if current.is_some() => {
                    if let Some((_, ref mut code, _)) = current {
                        code.push_str(&text);
                    }
                }
                other => events.push(other),
            }
        }

        let mut output = String::with_capacity(source.len() * 2);
        html::push_html(&mut output, events.into_iter());

        restore_fragments(&mut output, &fragments);
        output
    }

    /// Convert a content unit. Non-markdown bodies pass through unchanged.
    pub fn convert_unit(&self, unit: &ContentUnit) -> String {
        match unit.format {
            BodyFormat::Markdown => self.convert(unit.body()),
            _ => unit.body().to_string(),
        }
    }

    /// Render legacy directives up front and leave a comment placeholder
    /// where each one stood.
    fn substitute_legacy(&self, body: &str) -> (String, OffsetMap, Vec<String>) {
        let legacy = scan_legacy(body);
        let mut source = String::with_capacity(body.len());
        let mut offsets = OffsetMap::default();
        let mut fragments = Vec::with_capacity(legacy.len());
        let mut last = 0;

        for block in &legacy {
            source.push_str(&body[last..block.range.start]);
            if !source.is_empty() && !source.ends_with('\n') {
                source.push('\n');
            }
            // Keep the directive's indentation so it stays inside list items.
            let rest = &body[block.range.start..];
            let indent = rest.len() - rest.trim_start_matches([' ', '\t']).len();
            source.push_str(&rest[..indent]);
            source.push_str(&placeholder(fragments.len()));
            source.push('\n');
            offsets.push(source.len(), block.range.end);

            fragments.push(self.renderer.render(block).html);
            last = block.range.end;
        }
        source.push_str(&body[last..]);

        (source, offsets, fragments)
    }
}

impl std::fmt::Debug for MarkdownConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownConverter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn placeholder(index: usize) -> String {
    format!("<!-- quire:highlight:{} -->", index)
}

fn restore_fragments(html: &mut String, fragments: &[String]) {
    for (i, fragment) in fragments.iter().enumerate() {
        let marker = placeholder(i);
        if let Some(pos) = html.find(&marker) {
            html.replace_range(pos..pos + marker.len(), fragment);
        }
    }
}

/// Maps offsets in the placeholder-substituted text back to the body.
#[derive(Debug)]
struct OffsetMap {
    /// (substituted offset, body offset) pairs where the two align again
    anchors: Vec<(usize, usize)>,
}

impl Default for OffsetMap {
    fn default() -> Self {
        Self {
            anchors: vec![(0, 0)],
        }
    }
}

impl OffsetMap {
    fn push(&mut self, substituted: usize, body: usize) {
        self.anchors.push((substituted, body));
    }

    fn to_body(&self, offset: usize) -> usize {
        let (substituted, body) = self
            .anchors
            .iter()
            .rev()
            .find(|(s, _)| *s <= offset)
            .copied()
            .unwrap_or((0, 0));
        body + (offset - substituted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::PLAINTEXT;
    use crate::render::{wrap_fragment, RenderedFragment};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn converter() -> MarkdownConverter {
        MarkdownConverter::new(ConverterOptions::default())
    }

    /// Records every block it is handed.
    struct Recording(Arc<Mutex<Vec<CodeBlock>>>);

    impl CodeBlockRenderer for Recording {
        fn render(&self, block: &CodeBlock) -> RenderedFragment {
            self.0.lock().unwrap().push(block.clone());
            RenderedFragment {
                language: PLAINTEXT.to_string(),
                html: "<figure>stub</figure>".to_string(),
            }
        }
    }

    #[test]
    fn renders_fenced_block_with_fixed_shape() {
        let html = converter().convert("```python\nprint(\"hi\")\n```\n");

        assert!(html.contains(
            r#"<figure class="highlight"><pre><code class="language-python" data-lang="python">"#
        ));
        assert!(!html.contains("<pre><code class=\"language-python\">"));
        assert!(html.contains("print"));
    }

    #[test]
    fn fenced_and_legacy_render_identically() {
        let conv = converter();
        let fenced = conv.convert("```ruby\nputs \"<hi>\"\n```\n");
        let legacy = conv.convert("{% highlight ruby %}\nputs \"<hi>\"\n{% endhighlight %}\n");

        assert_eq!(fenced.trim(), legacy.trim());
    }

    #[test]
    fn legacy_block_with_blank_lines_stays_intact() {
        let body = "Before\n\n{% highlight python %}\ndef f():\n\n    return 1\n{% endhighlight %}\n\nAfter\n";

        let html = converter().convert(body);

        assert!(html.contains("<p>Before</p>"));
        assert!(html.contains("<p>After</p>"));
        assert!(html.contains(r#"data-lang="python""#));
        assert!(!html.contains("endhighlight"));
        assert!(!html.contains("quire:highlight"));
    }

    #[test]
    fn legacy_block_in_list_item_stays_in_the_item() {
        let body = "- item\n\n  {% highlight ruby %}\n  puts 1\n  {% endhighlight %}\n";

        let html = converter().convert(body);

        let figure = html.find("<figure").unwrap();
        let item_end = html.find("</li>").unwrap();
        assert!(figure < item_end, "figure rendered outside the list item:\n{}", html);
        assert_eq!(html.matches("<ul>").count(), 1);
    }

    #[test]
    fn unknown_language_falls_back_to_plaintext() {
        let html = converter().convert("```klingon\nQapla' <b>\n```\n");

        assert!(html.contains(&wrap_fragment(PLAINTEXT, "Qapla&#39; &lt;b&gt;\n")));
    }

    #[test]
    fn indented_block_is_plaintext() {
        let html = converter().convert("para\n\n    a && b\n");

        assert!(html.contains(r#"<code class="language-plaintext" data-lang="plaintext">a &amp;&amp; b"#));
    }

    #[test]
    fn renderer_sees_body_ranges() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let conv = MarkdownConverter::with_renderer(
            ConverterOptions::default(),
            Box::new(Recording(Arc::clone(&seen))),
        );
        let body = "{% highlight sh %}\nls\n{% endhighlight %}\n\ntext\n\n```c\nint x;\n```\n";

        let html = conv.convert(body);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].syntax, BlockSyntax::Legacy);
        assert_eq!(seen[1].syntax, BlockSyntax::Fenced);
        assert!(body[seen[1].range.clone()].starts_with("```c\nint x;\n```"));
        assert_eq!(html.matches("<figure>stub</figure>").count(), 2);
    }

    #[test]
    fn keeps_other_markdown() {
        let html = converter().convert("# Title\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n");

        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn options_resolve_idempotently() {
        let options: ConverterOptions =
            serde_yaml::from_str("input: GFM\nhighlighter: rouge").unwrap();

        assert_eq!(options.input, InputMode::Gfm);
        assert_eq!(options.highlighter, HighlighterKind::Syntect);
        assert_eq!(options.parser_options(), options.parser_options());
        assert_eq!(
            ConverterOptions::default().parser_options(),
            converter().options().parser_options()
        );
    }

    #[test]
    fn converts_example_post() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("2025-01-01-example.md");
        std::fs::write(
            &path,
            "---\nlayout: post\ntitle: Example\n---\n\n```python\nprint(\"hi\")\n```\n",
        )
        .unwrap();

        let unit = ContentUnit::load(&path).unwrap();
        let html = converter().convert_unit(&unit);

        assert!(html.contains(r#"class="language-python""#));
        assert!(html.contains(r#"data-lang="python""#));
        assert!(html.contains("print"));
        assert!(!html.contains("print(\"hi\")"));
        assert!(!html.contains("layout: post"));
    }

    #[test]
    fn html_units_pass_through() {
        let unit = ContentUnit::parse("about.html", "---\n---\n<p>hi</p>\n".to_string()).unwrap();

        assert_eq!(converter().convert_unit(&unit), "<p>hi</p>\n");
    }
}
