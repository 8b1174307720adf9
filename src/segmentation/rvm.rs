use super::preprocess::Preprocessor;
use super::types::{Mask, SegmentationModel};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};
use ort::value::Tensor;
use std::path::Path;

const STATE_INPUTS: [&str; 4] = ["r1i", "r2i", "r3i", "r4i"];
const STATE_OUTPUTS: [&str; 4] = ["r1o", "r2o", "r3o", "r4o"];

/// Recurrent state tensor kept between frames.
#[derive(Debug, Clone)]
struct Recurrent {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Recurrent {
    /// The network accepts a 1x1x1x1 zero tensor as "no history".
    fn empty() -> Self {
        Self {
            shape: vec![1, 1, 1, 1],
            data: vec![0.0],
        }
    }

    fn to_tensor(&self) -> Result<Tensor<f32>> {
        Tensor::from_array((self.shape.clone(), self.data.clone().into_boxed_slice()))
            .context("failed to create recurrent state tensor")
    }
}

/// RobustVideoMatting segmentation model.
///
/// Hidden states (r1-r4) are carried between frames for temporal
/// consistency and cleared by `reset_state`.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
    states: Option<[Recurrent; 4]>,
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Load from an ONNX file. Runs at 512x512 with hidden states at a
    /// quarter of that.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set optimization level")?
            .with_intra_threads(4)
            .context("failed to set intra threads")?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;
        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            states: None,
            downsample_ratio: 0.25,
        })
    }
}

fn extract_state(outputs: &SessionOutputs<'_>, name: &str) -> Result<Recurrent> {
    let (shape, data) = outputs[name]
        .try_extract_tensor::<f32>()
        .with_context(|| format!("failed to extract {name}"))?;
    let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    Ok(Recurrent {
        shape,
        data: data.to_vec(),
    })
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let states = self
            .states
            .take()
            .unwrap_or_else(|| std::array::from_fn(|_| Recurrent::empty()));

        let src = Tensor::from_array(self.preprocessor.preprocess(frame))
            .context("failed to create RVM input tensor")?;
        let ratio = Tensor::from_array(([1usize], vec![self.downsample_ratio].into_boxed_slice()))
            .context("failed to create downsample ratio tensor")?;
        let [r1, r2, r3, r4] = &states;

        let infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                "src" => src,
                STATE_INPUTS[0] => r1.to_tensor()?,
                STATE_INPUTS[1] => r2.to_tensor()?,
                STATE_INPUTS[2] => r3.to_tensor()?,
                STATE_INPUTS[3] => r4.to_tensor()?,
                "downsample_ratio" => ratio
            ])
            .context("Failed to run inference")?;
        drop(infer_span);

        // pha: [1, 1, H, W]
        let (shape, pha) = outputs["pha"]
            .try_extract_tensor::<f32>()
            .context("failed to extract alpha matte")?;
        if shape.len() != 4 {
            bail!("unexpected matte shape {:?}", shape);
        }
        let matte_height = shape[2].max(0) as u32;
        let matte_width = shape[3].max(0) as u32;

        let next = [
            extract_state(&outputs, STATE_OUTPUTS[0])?,
            extract_state(&outputs, STATE_OUTPUTS[1])?,
            extract_state(&outputs, STATE_OUTPUTS[2])?,
            extract_state(&outputs, STATE_OUTPUTS[3])?,
        ];

        let (frame_width, frame_height) = frame.dimensions();
        let mask = Preprocessor::postprocess_matte(pha, matte_width, matte_height, frame_width, frame_height)?;
        self.states = Some(next);
        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::debug!("Resetting RVM hidden states");
        self.states = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
