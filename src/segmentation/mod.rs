mod luma_key;
#[cfg(feature = "onnx")]
mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
pub mod types;

pub use luma_key::LumaKeySegmenter;
#[cfg(feature = "onnx")]
pub use preprocess::Preprocessor;
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use types::{Mask, SegmentationModel};

/// RVM when a model path is given, otherwise the luma keyer.
pub fn create_default_model(model_path: Option<&str>) -> anyhow::Result<Box<dyn SegmentationModel>> {
    match model_path {
        #[cfg(feature = "onnx")]
        Some(path) => Ok(Box::new(RobustVideoMatting::new(path)?)),
        #[cfg(not(feature = "onnx"))]
        Some(path) => anyhow::bail!("cannot load {path}: built without the onnx feature"),
        None => Ok(Box::new(LumaKeySegmenter::default())),
    }
}
