//! Script bundler.
//!
//! Concatenates the scripts in one directory and minifies the bundle with oxc.

use std::fs;
use std::path::{Path, PathBuf};

use oxc::allocator::Allocator;
use oxc::ast::ast::Program;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use serde::Deserialize;

use crate::output::{collect_sources, extension, AssetError, CompileReport, Destinations};

const TASK: &str = "script";

/// Script bundler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    /// File name of the bundle under `js/`
    #[serde(default = "default_bundle")]
    pub bundle: String,

    /// Minify the bundle
    #[serde(default = "default_true")]
    pub minify: bool,
}

fn default_bundle() -> String {
    "main.js".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            bundle: default_bundle(),
            minify: true,
        }
    }
}

/// Bundles every `.js` file directly inside a directory.
#[derive(Debug, Clone)]
pub struct ScriptCompiler {
    source_dir: PathBuf,
    destinations: Destinations,
    config: ScriptConfig,
}

impl ScriptCompiler {
    pub fn new(source_dir: PathBuf, destinations: Destinations, config: ScriptConfig) -> Self {
        Self {
            source_dir,
            destinations,
            config,
        }
    }

    /// Path of the bundle relative to each destination root.
    pub fn artifact(&self) -> PathBuf {
        Path::new("js").join(&self.config.bundle)
    }

    /// Build the bundle.
    pub fn compile(&self) -> Result<CompileReport, AssetError> {
        let mut report = CompileReport::default();
        let sources = collect_sources(&self.source_dir, false, |p| extension(p) == "js");

        let mut bundle = String::new();
        let mut kept = 0;
        for path in &sources {
            let source = match fs::read_to_string(path) {
                Ok(source) => source,
                Err(e) => {
                    report.skip(TASK, path, e.to_string());
                    continue;
                }
            };
            let allocator = Allocator::default();
            if let Err(message) = parse(&allocator, &source) {
                report.skip(TASK, path, message);
                continue;
            }

            bundle.push_str(&source);
            if !bundle.ends_with('\n') {
                bundle.push('\n');
            }
            kept += 1;
        }

        // Nothing usable: the last good bundle stays in place.
        if kept == 0 {
            tracing::debug!(task = TASK, files = sources.len(), "no bundle to write");
            return Ok(report);
        }

        if self.config.minify {
            match minify(&bundle) {
                Ok(minified) => bundle = minified,
                Err(message) => {
                    tracing::warn!(task = TASK, "writing unminified bundle: {}", message)
                }
            }
        }

        report.record(self.destinations.write(&self.artifact(), bundle.as_bytes())?);
        tracing::debug!(task = TASK, files = kept, "bundled scripts");
        Ok(report)
    }
}

/// Parse a script as a module, failing on the first syntax error.
fn parse<'a>(allocator: &'a Allocator, source: &'a str) -> Result<Program<'a>, String> {
    let parsed = Parser::new(allocator, source, SourceType::mjs()).parse();
    match parsed.errors.first() {
        Some(error) => Err(format!("JS syntax error: {}", error)),
        None => Ok(parsed.program),
    }
}

/// Compress, mangle and print the bundle without comments.
fn minify(bundle: &str) -> Result<String, String> {
    let allocator = Allocator::default();
    let mut program = parse(&allocator, bundle)?;

    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let scoping = Minifier::new(options).minify(&allocator, &mut program).scoping;

    let printed = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(scoping)
        .build(&program);
    Ok(printed.code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, ScriptCompiler) {
        let temp = tempdir().unwrap();
        let src = temp.path().join("scripts");
        fs::create_dir_all(&src).unwrap();
        for (name, body) in files {
            fs::write(src.join(name), body).unwrap();
        }
        let compiler = ScriptCompiler::new(
            src,
            Destinations::new([temp.path().join("site"), temp.path().join("assets")]),
            ScriptConfig::default(),
        );
        (temp, compiler)
    }

    #[test]
    fn bundles_and_minifies() {
        let (temp, compiler) = setup(&[
            ("a.js", "function greet(name) {\n  // say hi\n  console.log('hi ' + name);\n}\n"),
            ("b.js", "greet('world');\n"),
        ]);

        let report = compiler.compile().unwrap();

        assert_eq!(report.written, 1);
        let js = fs::read_to_string(temp.path().join("site/js/main.js")).unwrap();
        assert!(js.contains("console.log"));
        assert!(!js.contains("say hi"));
        assert_eq!(js, fs::read_to_string(temp.path().join("assets/js/main.js")).unwrap());
    }

    #[test]
    fn keeps_source_order_unminified() {
        let (temp, mut compiler) = setup(&[("b.js", "var second = 2;"), ("a.js", "var first = 1;")]);
        compiler.config.minify = false;

        compiler.compile().unwrap();

        let js = fs::read_to_string(temp.path().join("site/js/main.js")).unwrap();
        assert_eq!(js, "var first = 1;\nvar second = 2;\n");
    }

    #[test]
    fn skips_file_with_syntax_error() {
        let (temp, compiler) = setup(&[("a.js", "var ok = 1;"), ("b.js", "function (")]);

        let report = compiler.compile().unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("b.js"));
        assert!(temp.path().join("site/js/main.js").exists());
    }

    #[test]
    fn broken_edit_keeps_last_good_bundle() {
        let (temp, compiler) = setup(&[("app.js", "console.log('ok');\n")]);
        compiler.compile().unwrap();
        let good = fs::read_to_string(temp.path().join("site/js/main.js")).unwrap();

        fs::write(temp.path().join("scripts/app.js"), "function (").unwrap();
        let report = compiler.compile().unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.written, 0);
        assert!(good.contains("console.log"));
        for root in ["site", "assets"] {
            let js = fs::read_to_string(temp.path().join(root).join("js/main.js")).unwrap();
            assert_eq!(js, good);
        }
    }

    #[test]
    fn minifier_failure_writes_unminified_bundle() {
        // A hashbang is only valid at the start of a file, not mid-bundle.
        let (temp, compiler) = setup(&[
            ("a.js", "var a = 1;\n"),
            ("b.js", "#!/usr/bin/env node\nvar b = 2;\n"),
        ]);

        let report = compiler.compile().unwrap();

        assert!(report.skipped.is_empty());
        let js = fs::read_to_string(temp.path().join("site/js/main.js")).unwrap();
        assert_eq!(js, "var a = 1;\n#!/usr/bin/env node\nvar b = 2;\n");
    }

    #[test]
    fn missing_directory_writes_nothing() {
        let temp = tempdir().unwrap();
        let compiler = ScriptCompiler::new(
            temp.path().join("scripts"),
            Destinations::new([temp.path().join("site")]),
            ScriptConfig::default(),
        );

        let report = compiler.compile().unwrap();

        assert_eq!(report, CompileReport::default());
        assert!(!temp.path().join("site/js/main.js").exists());
    }

    #[test]
    fn ignores_nested_directories() {
        let (temp, compiler) = setup(&[("a.js", "var top = 1;")]);
        let nested = temp.path().join("scripts/vendor");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("lib.js"), "var nestedLib = 1;").unwrap();

        compiler.compile().unwrap();

        let js = fs::read_to_string(temp.path().join("site/js/main.js")).unwrap();
        assert!(!js.contains("nestedLib"));
    }

    #[test]
    fn second_run_is_idempotent() {
        let (temp, compiler) = setup(&[("a.js", "let x = [1, 2, 3].map(n => n * 2);\n")]);

        compiler.compile().unwrap();
        let first = fs::read(temp.path().join("site/js/main.js")).unwrap();
        let report = compiler.compile().unwrap();

        assert_eq!(first, fs::read(temp.path().join("site/js/main.js")).unwrap());
        assert_eq!(report.unchanged, 1);
    }
}
