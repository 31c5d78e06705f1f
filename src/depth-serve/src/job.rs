use image::RgbImage;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::depth::DepthField;
use crate::encode;
use crate::error::{DepthError, Result};
use crate::fetch::{HttpFetcher, ImageSource};
use crate::model::{DepthModel, TfDepthModel};
use crate::preprocess;
use crate::timer::Timer;

#[derive(Clone, Debug, Default)]
pub struct JobInput {
    pub image_url: Option<String>,
}

/// One request as delivered by the serverless runtime
#[derive(Clone, Debug, Default)]
pub struct Job {
    /// Runtime-assigned identifier, only used for logging
    pub id: Option<String>,

    pub input: JobInput,
}

impl Job {
    pub fn from_url(url: &str) -> Self {
        Job {
            id: None,
            input: JobInput {
                image_url: Some(url.to_owned()),
            },
        }
    }

    /// Interpret an arbitrary JSON event as a job. A missing or non-object
    /// `input` yields a job without URL, which fails at validation.
    pub fn from_value(value: Value) -> Self {
        let id = match value.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let image_url = value
            .get("input")
            .and_then(|input| input.get("image_url"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        Job {
            id,
            input: JobInput { image_url },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Timings {
    /// Time spent fetching and decoding the image, retries included
    pub download_ms: i64,

    /// Time spent preparing the tensor, running the model and upsampling
    pub inference_ms: i64,

    /// Time spent normalizing and encoding the depth image
    pub encoding_ms: i64,
}

/// Result record returned for every job
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobOutput {
    Success {
        depth_map_base64: String,
        width: u32,
        height: u32,
        processing_time_ms: i64,
        timings: Timings,
    },
    Failed {
        error: String,
        processing_time_ms: i64,
    },
}

impl JobOutput {
    pub fn failed(error: &DepthError, processing_time_ms: i64) -> Self {
        JobOutput::Failed {
            error: error.to_string(),
            processing_time_ms,
        }
    }

    /// Record for a job whose worker died before producing a result
    pub fn aborted(reason: &str, processing_time_ms: i64) -> Self {
        JobOutput::failed(&DepthError::Aborted(reason.to_owned()), processing_time_ms)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutput::Success { .. })
    }
}

struct Estimate {
    depth_map_base64: String,
    width: u32,
    height: u32,
    timings: Timings,
}

/// Depth estimation service: owns the loaded model and the image fetcher,
/// and turns jobs into result records.
pub struct DepthEstimator {
    source: Box<dyn ImageSource>,
    model: Box<dyn DepthModel>,
}

impl DepthEstimator {
    /// Load the configured SavedModel and set up the HTTP fetcher
    pub fn new(config: &Config) -> Result<Self> {
        info!("Loading depth model from {}", config.model.export_dir.display());
        let model = TfDepthModel::load(config.model.clone())?;
        info!("Model loaded successfully");

        Ok(Self::with_parts(
            Box::new(HttpFetcher::new(config.fetch.clone())),
            Box::new(model),
        ))
    }

    pub fn with_parts(source: Box<dyn ImageSource>, model: Box<dyn DepthModel>) -> Self {
        DepthEstimator { source, model }
    }

    /// Depth field of `image` at the image's own resolution
    pub fn estimate(&self, image: &RgbImage) -> Result<DepthField> {
        let mut t = Timer::new_start("Preparing image");
        let input = preprocess::prepare(image, self.model.input_size(), self.model.layout());
        t.stop();

        let depth = self.model.predict(&input)?;

        let mut t = Timer::new_start("Upsampling depth");
        let depth = depth.resize_bilinear(image.width(), image.height());
        t.stop();

        Ok(depth)
    }

    fn run(&self, url: &str) -> Result<Estimate> {
        let mut t = Timer::new_start(&format!("Fetching image from {}", url));
        let image = self.source.fetch(url)?;
        let download_ms = t.stop();
        info!(
            "Image downloaded in {}ms - Size: {}x{}",
            download_ms,
            image.width(),
            image.height()
        );

        let mut t = Timer::new_start("Depth inference");
        let depth = self.estimate(&image)?;
        let inference_ms = t.stop();

        let mut t = Timer::new_start("Encoding depth map");
        let depth_map_base64 = encode::depth_to_base64_png(&depth)?;
        let encoding_ms = t.stop();

        Ok(Estimate {
            depth_map_base64,
            width: image.width(),
            height: image.height(),
            timings: Timings {
                download_ms,
                inference_ms,
                encoding_ms,
            },
        })
    }

    /// Process one job. Every failure is folded into `JobOutput::Failed`.
    pub fn handle(&self, job: &Job) -> JobOutput {
        let mut total = Timer::new_start("Handling job");
        let tag = job.id.as_deref().unwrap_or("-");

        let url = match job.input.image_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => {
                let err = DepthError::MissingImageUrl;
                error!("[{}] {}", tag, err);
                return JobOutput::failed(&err, total.stop());
            }
        };

        info!("[{}] Processing image: {}", tag, url);

        match self.run(url) {
            Ok(estimate) => {
                let processing_time_ms = total.stop();
                info!("[{}] Total processing time: {}ms", tag, processing_time_ms);
                info!("  - Download: {}ms", estimate.timings.download_ms);
                info!("  - Inference: {}ms", estimate.timings.inference_ms);
                info!("  - Encoding: {}ms", estimate.timings.encoding_ms);

                JobOutput::Success {
                    depth_map_base64: estimate.depth_map_base64,
                    width: estimate.width,
                    height: estimate.height,
                    processing_time_ms,
                    timings: estimate.timings,
                }
            }
            Err(err) => {
                let processing_time_ms = total.stop();
                error!("[{}] Error after {}ms: {}", tag, processing_time_ms, err);
                JobOutput::failed(&err, processing_time_ms)
            }
        }
    }
}
