mod adapter;
#[cfg(feature = "rvm")]
mod preprocess;
#[cfg(feature = "rvm")]
mod rvm;
pub mod types;

pub use adapter::SegmentationAdapter;
#[cfg(feature = "rvm")]
pub use preprocess::Preprocessor;
#[cfg(feature = "rvm")]
pub use rvm::RobustVideoMatting;
pub use types::{Matte, MatteImage, SegmentationProvider};

/// Create the default ONNX provider (RVM)
#[cfg(feature = "rvm")]
pub fn create_default_provider(
    model_path: &str,
    quality: crate::config::Quality,
) -> anyhow::Result<Box<dyn SegmentationProvider>> {
    let model = RobustVideoMatting::new(model_path, quality)?;
    Ok(Box::new(model))
}
