//! Monocular depth estimation as a serverless job handler.
//!
//! A job names an image URL; the image is downloaded, run through a
//! Depth-Anything SavedModel, normalized to 8-bit grayscale and returned as
//! a base64 PNG inside a [`JobOutput`] record.

pub mod config;
pub mod depth;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod job;
pub mod model;
pub mod preprocess;
pub mod timer;

pub use config::Config;
pub use depth::DepthField;
pub use error::{DepthError, Result};
pub use job::{DepthEstimator, Job, JobInput, JobOutput, Timings};
pub use timer::Timer;
