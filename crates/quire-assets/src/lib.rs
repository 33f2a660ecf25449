//! Asset compilers for the blog build.
//!
//! Each compiler reads one source directory and writes its artifacts under
//! every configured destination root, touching files only when their bytes
//! change.

pub mod image;
pub mod output;
pub mod preview;
pub mod script;
pub mod style;

pub use image::{ImageCompiler, ImageConfig};
pub use output::{write_if_changed, AssetError, CompileReport, Destinations, Skipped};
pub use preview::{fit_preview, is_preview, PreviewCompiler, PreviewConfig};
pub use script::{ScriptCompiler, ScriptConfig};
pub use style::{expand_breakpoints, StyleCompiler, StyleConfig};
