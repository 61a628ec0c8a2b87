//! Package discovery: which third-party names a project uses, and through
//! which channel.
//!
//! - [`ImportScanner`] reads `import` lines from a source directory
//! - [`ManifestParser`] reads the conda and pip blocks of an environment file
//! - [`InstalledRegistry`] / [`Classifier`] assign scanned names to a channel
//! - [`StdlibFilter`] removes names that are not third-party

pub mod imports;
pub mod installed;
pub mod manifest;
pub mod stdlib;

pub use imports::{scan_line, ImportMatching, ImportScanner};
pub use installed::{Classifier, InstalledRegistry};
pub use manifest::{ManifestCandidates, ManifestParser};
pub use stdlib::{StdlibFilter, PYTHON_STDLIB_VERSION};
