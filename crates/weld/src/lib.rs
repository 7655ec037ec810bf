//! Weld: merge two script modules into one self-contained HTML page
//!
//! The primary module's code is renamed into the host scope; the isolated
//! module is wrapped so that only one exported entry is visible to the host.
//! Both modules read one shared entity table through a namespace map that
//! bridges their field-naming conventions.

pub mod composer;
pub mod config;
pub mod emitter;
pub mod error;
pub mod extractor;
pub mod isolator;
pub mod lexer;
pub mod namespace_map;
pub mod pipeline;
pub mod renamer;
pub mod shell;
pub mod source;
pub mod symbols;
pub mod types;

pub use config::Config;
pub use emitter::BuildReport;
pub use error::{Result, WeldError};
pub use pipeline::Pipeline;
