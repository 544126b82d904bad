//! Tools for OverDrive audiobook loans
//!
//! - [`api`]: Audible catalog and Audnex clients used to look up chapters
//! - [`chapters`]: chapter timestamps, `chapters.txt` files and the
//!   interactive chapter extractor
//! - [`odm`]: parsing of `.odm` license-request documents and license acquisition
//! - [`download`]: sequential download of the audio parts of a loan

pub mod api;
pub mod chapters;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod logging;
pub mod odm;

pub use config::Config;
pub use error::{OverdriveError, Result};
