//! Search an extension marketplace and download packages with live progress.
//!
//! - [`marketplace`] queries the gallery and normalizes results into [`extension::Extension`]
//! - [`download`] runs transfers with bounded parallelism and publishes progress events
//! - [`session`] ties both together for a presentation layer

pub mod config;
pub mod download;
pub mod extension;
pub mod logger;
pub mod marketplace;
pub mod session;
#[cfg(test)]
mod test_support;

pub use extension::Extension;
pub use session::Session;
