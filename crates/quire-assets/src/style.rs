//! Stylesheet compiler.
//!
//! Concatenates every `.css` source, expands breakpoint macros, adds vendor
//! prefixes for the configured browsers and optionally minifies, using
//! lightningcss.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::output::{collect_sources, extension, AssetError, CompileReport, Destinations};

const TASK: &str = "style";

static BREAKPOINT_MACRO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+(above|below|between)\(\s*([^,()]+?)\s*(?:,\s*([^,()]+?)\s*)?\)")
        .expect("valid regex")
});

/// Style compiler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StyleConfig {
    /// File name of the compiled stylesheet under `css/`
    #[serde(default = "default_bundle")]
    pub bundle: String,

    /// Compress the output
    #[serde(default = "default_true")]
    pub minify: bool,

    /// Named breakpoints usable in `+above(name)` and friends
    #[serde(default = "default_breakpoints")]
    pub breakpoints: BTreeMap<String, String>,

    /// Oldest browser versions to prefix for
    #[serde(default = "default_targets")]
    pub targets: BTreeMap<String, String>,
}

fn default_bundle() -> String {
    "main.css".to_string()
}
fn default_true() -> bool {
    true
}
fn default_breakpoints() -> BTreeMap<String, String> {
    [
        ("xs", "400px"),
        ("s", "600px"),
        ("m", "800px"),
        ("l", "1050px"),
        ("xl", "1800px"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
fn default_targets() -> BTreeMap<String, String> {
    [
        ("chrome", "109"),
        ("edge", "109"),
        ("firefox", "115"),
        ("safari", "13"),
        ("ios_saf", "13"),
        ("samsung", "20"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            bundle: default_bundle(),
            minify: true,
            breakpoints: default_breakpoints(),
            targets: default_targets(),
        }
    }
}

/// Compiles a directory of stylesheets into a single file.
#[derive(Debug, Clone)]
pub struct StyleCompiler {
    source_dir: PathBuf,
    destinations: Destinations,
    config: StyleConfig,
    browsers: Browsers,
}

impl StyleCompiler {
    /// Create a compiler. Fails if a browser target cannot be parsed.
    pub fn new(
        source_dir: PathBuf,
        destinations: Destinations,
        config: StyleConfig,
    ) -> Result<Self, AssetError> {
        let browsers = parse_browsers(&config.targets)?;
        Ok(Self {
            source_dir,
            destinations,
            config,
            browsers,
        })
    }

    /// Path of the artifact relative to each destination root.
    pub fn artifact(&self) -> PathBuf {
        Path::new("css").join(&self.config.bundle)
    }

    /// Compile all sources.
    pub fn compile(&self) -> Result<CompileReport, AssetError> {
        let mut report = CompileReport::default();
        let sources = collect_sources(&self.source_dir, true, |p| extension(p) == "css");

        let mut combined = String::new();
        let mut kept = 0;
        for path in &sources {
            let source = match fs::read_to_string(path) {
                Ok(source) => source,
                Err(e) => {
                    report.skip(TASK, path, e.to_string());
                    continue;
                }
            };

            let expanded = expand_breakpoints(&source, &self.config.breakpoints);
            let normalized = match normalize(&expanded, path) {
                Ok(css) => css,
                Err(message) => {
                    report.skip(TASK, path, message);
                    continue;
                }
            };

            combined.push_str(&normalized);
            if !combined.ends_with('\n') {
                combined.push('\n');
            }
            kept += 1;
        }

        // Nothing usable: the last good stylesheet stays in place.
        if kept == 0 {
            tracing::debug!(task = TASK, files = sources.len(), "no stylesheet to write");
            return Ok(report);
        }

        let css = match self.print(&combined) {
            Ok(css) => css,
            Err(message) => {
                // Every file parsed on its own; fall back to the plain concatenation.
                tracing::warn!(task = TASK, "processing combined stylesheet failed: {}", message);
                combined
            }
        };

        report.record(self.destinations.write(&self.artifact(), css.as_bytes())?);
        tracing::debug!(task = TASK, files = sources.len(), "compiled stylesheet");
        Ok(report)
    }

    fn print(&self, css: &str) -> Result<String, String> {
        let mut stylesheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: self.config.bundle.clone(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| format!("CSS parse error: {}", e))?;

        stylesheet
            .minify(MinifyOptions {
                targets: Targets::from(self.browsers),
                ..MinifyOptions::default()
            })
            .map_err(|e| format!("CSS transform error: {}", e))?;

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: self.config.minify,
                targets: Targets::from(self.browsers),
                ..PrinterOptions::default()
            })
            .map_err(|e| format!("CSS print error: {}", e))?;

        Ok(printed.code)
    }
}

/// Parse and reprint a single source.
///
/// Malformed files are caught here before they poison the bundle, and
/// blocks left open at end of file are closed.
fn normalize(css: &str, path: &Path) -> Result<String, String> {
    let stylesheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: path.display().to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| format!("CSS parse error: {}", e))?;

    stylesheet
        .to_css(PrinterOptions::default())
        .map(|printed| printed.code)
        .map_err(|e| format!("CSS print error: {}", e))
}

/// Expand `+above(x)`, `+below(x)` and `+between(x, y)` into media features.
///
/// `x` is a named breakpoint or a length; bare numbers are pixels.
pub fn expand_breakpoints(css: &str, breakpoints: &BTreeMap<String, String>) -> String {
    let length = |raw: &str| -> String {
        let raw = raw.trim();
        if let Some(named) = breakpoints.get(raw) {
            named.clone()
        } else if raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
            format!("{}px", raw)
        } else {
            raw.to_string()
        }
    };

    BREAKPOINT_MACRO
        .replace_all(css, |caps: &Captures| {
            let first = length(&caps[2]);
            match (&caps[1], caps.get(3)) {
                ("above", None) => format!("(min-width: {})", first),
                ("below", None) => format!("(max-width: {})", first),
                ("between", Some(second)) => format!(
                    "(min-width: {}) and (max-width: {})",
                    first,
                    length(second.as_str())
                ),
                // Wrong arity: leave as written so validation reports it.
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Turn `{ "safari": "13.1" }` into lightningcss browser targets.
fn parse_browsers(targets: &BTreeMap<String, String>) -> Result<Browsers, AssetError> {
    let mut browsers = Browsers::default();

    for (browser, version) in targets {
        let encoded = encode_version(version).ok_or_else(|| AssetError::InvalidTarget {
            browser: browser.clone(),
            version: version.clone(),
        })?;
        let slot = match browser.as_str() {
            "android" => &mut browsers.android,
            "chrome" => &mut browsers.chrome,
            "edge" => &mut browsers.edge,
            "firefox" => &mut browsers.firefox,
            "ie" => &mut browsers.ie,
            "ios_saf" | "ios" => &mut browsers.ios_saf,
            "opera" => &mut browsers.opera,
            "safari" => &mut browsers.safari,
            "samsung" => &mut browsers.samsung,
            _ => {
                return Err(AssetError::InvalidTarget {
                    browser: browser.clone(),
                    version: version.clone(),
                })
            }
        };
        *slot = Some(encoded);
    }

    Ok(browsers)
}

/// Encode `major[.minor[.patch]]` the way lightningcss expects.
fn encode_version(version: &str) -> Option<u32> {
    let mut parts = version.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() || major > 0xff || minor > 0xff || patch > 0xff {
        return None;
    }
    Some((major << 16) | (minor << 8) | patch)
}
