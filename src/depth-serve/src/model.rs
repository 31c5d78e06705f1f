use log::{debug, info, warn};
use tensorflow::{Graph, SavedModelBundle, Session, SessionOptions, SessionRunArgs, Tensor};

use crate::config::ModelConfig;
use crate::depth::DepthField;
use crate::error::{DepthError, Result};
use crate::preprocess::{ModelInput, TensorLayout};
use crate::timer::Timer;

/// A monocular depth network. Loaded once, then shared read-only by every job.
pub trait DepthModel: Send + Sync {
    /// Side length the network was trained at
    fn input_size(&self) -> u32;

    /// Memory order the network expects its input in
    fn layout(&self) -> TensorLayout;

    /// Run the network on one prepared image. The returned field has the
    /// model's own resolution.
    fn predict(&self, input: &ModelInput) -> Result<DepthField>;
}

/// Depth-Anything exported as a TensorFlow SavedModel
pub struct TfDepthModel {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,

    config: ModelConfig,
}

impl TfDepthModel {
    pub fn load(config: ModelConfig) -> Result<Self> {
        let mut t = Timer::new_start("Loading session");

        let load_error = |reason: String| DepthError::ModelLoad {
            dir: config.export_dir.display().to_string(),
            reason,
        };

        let mut graph = Graph::new();
        let session = SavedModelBundle::load(
            &SessionOptions::new(),
            [config.tag.as_str()],
            &mut graph,
            &config.export_dir,
        )
        .map_err(|status| load_error(status.to_string()))?
        .session;

        for name in [&config.input_op, &config.output_op] {
            graph
                .operation_by_name_required(name)
                .map_err(|status| load_error(status.to_string()))?;
        }

        t.stop();

        match session.device_list() {
            Ok(devices) => {
                let accelerated = devices.iter().any(|d| d.device_type != "CPU");
                for d in &devices {
                    debug!("Device {} ({}), {} bytes", d.name, d.device_type, d.memory_bytes);
                }
                if accelerated {
                    info!("Model loaded with accelerator support");
                } else {
                    info!("No accelerator found, running on CPU");
                }
            }
            Err(status) => warn!("Could not list compute devices: {}", status),
        }

        Ok(TfDepthModel {
            graph,
            session,
            config,
        })
    }
}

/// Strip the batch and channel axes from a depth output
fn spatial_dims(dims: &[u64]) -> Result<(u32, u32)> {
    let mut dims = dims.to_vec();
    while dims.len() > 2 && dims[0] == 1 {
        dims.remove(0);
    }
    while dims.len() > 2 && dims[dims.len() - 1] == 1 {
        dims.pop();
    }

    match dims[..] {
        [h, w] if h > 0 && w > 0 => Ok((w as u32, h as u32)),
        _ => Err(DepthError::Model(format!(
            "unexpected depth output shape {:?}",
            dims
        ))),
    }
}

impl DepthModel for TfDepthModel {
    fn input_size(&self) -> u32 {
        self.config.input_size
    }

    fn layout(&self) -> TensorLayout {
        self.config.layout
    }

    fn predict(&self, input: &ModelInput) -> Result<DepthField> {
        let mut t = Timer::new_start("Running session");

        let tensor = Tensor::new(&input.dims()).with_values(&input.data)?;

        let mut args = SessionRunArgs::new();

        args.add_feed(
            &self
                .graph
                .operation_by_name_required(&self.config.input_op)?,
            0,
            &tensor,
        );

        let result = args.request_fetch(
            &self
                .graph
                .operation_by_name_required(&self.config.output_op)?,
            0,
        );

        self.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(result)?;

        t.stop();

        let (width, height) = spatial_dims(output.dims())?;
        DepthField::new(width, height, output.to_vec())
    }
}
