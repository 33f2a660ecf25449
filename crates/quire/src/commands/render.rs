//! Converter entry point for the site generator.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use quire_markdown::{ContentUnit, MarkdownConverter};

use crate::config::Config;

/// Convert a content file, or markdown on stdin, to HTML on stdout.
pub fn run(config: &Config, file: Option<PathBuf>) -> Result<()> {
    let converter = MarkdownConverter::new(config.markdown);

    let html = match file {
        Some(path) => {
            let unit = ContentUnit::load(&path)?;
            converter.convert_unit(&unit)
        }
        None => {
            let mut body = String::new();
            io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read markdown from stdin")?;
            converter.convert(&body)
        }
    };

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(html.as_bytes())
        .and_then(|()| stdout.flush())
        .context("Failed to write HTML")?;
    Ok(())
}
