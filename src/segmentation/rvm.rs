use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationProvider};
use crate::config::Quality;
use crate::frame::FrameView;
use anyhow::{Context, Result};
use ndarray::{Array1, Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// RobustVideoMatting segmentation provider
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    downsample_ratio: f32,

    // Recurrent hidden states
    // These are updated after each inference and fed back in the next frame
    state: RecurrentState,
}

/// The four recurrent tensors (r1-r4), replaced together only after a
/// successful inference.
#[derive(Debug, Default)]
struct RecurrentState {
    tensors: Option<[Array4<f32>; 4]>,
}

impl RecurrentState {
    /// Current tensors, seeded with the 1x1x1x1 zero tensors the exported
    /// graph accepts as "no history".
    fn get_or_init(&mut self) -> &[Array4<f32>; 4] {
        self.tensors.get_or_insert_with(|| {
            tracing::debug!("Initializing RVM hidden states");
            std::array::from_fn(|_| Array4::zeros((1, 1, 1, 1)))
        })
    }

    fn replace(&mut self, tensors: [Array4<f32>; 4]) {
        self.tensors = Some(tensors);
    }

    fn clear(&mut self) {
        self.tensors = None;
    }
}

impl RobustVideoMatting {
    /// Load an RVM model from an ONNX file at the given quality.
    pub fn new<P: AsRef<Path>>(model_path: P, quality: Quality) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let edge = quality.input_edge();
        Ok(Self {
            session,
            preprocessor: Preprocessor::new(edge, edge),
            downsample_ratio: quality.downsample_ratio(),
            state: RecurrentState::default(),
        })
    }
}

impl SegmentationProvider for RobustVideoMatting {
    fn segment(&mut self, frame: &FrameView<'_>) -> Result<Matte> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let input_tensor = self.preprocessor.preprocess(frame)?;
        let ratio = Array1::from_elem(1, self.downsample_ratio);

        // RVM expects: src, r1i, r2i, r3i, r4i, downsample_ratio
        let _infer_span = tracing::debug_span!("inference").entered();
        let [r1, r2, r3, r4] = self.state.get_or_init();
        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(&input_tensor)?,
                TensorRef::from_array_view(r1)?,
                TensorRef::from_array_view(r2)?,
                TensorRef::from_array_view(r3)?,
                TensorRef::from_array_view(r4)?,
                TensorRef::from_array_view(&ratio)?
            ])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Outputs: fgr, pha, r1o, r2o, r3o, r4o. Only the matte and state are kept.
        let pha = outputs[1].try_extract_array::<f32>()?;
        let shape = pha.shape().to_vec();
        if shape.len() != 4 {
            anyhow::bail!("Unexpected matte shape {:?}", shape);
        }
        let (matte_height, matte_width) = (shape[2] as u32, shape[3] as u32);
        let values: Vec<f32> = pha.iter().copied().collect();
        // Left at model resolution; the mask post-processor rescales.
        let matte = Matte::new(matte_width, matte_height, values).context("Matte size does not match its shape")?;

        let recurrent = |index: usize| -> Result<Array4<f32>> {
            Ok(outputs[index].try_extract_array::<f32>()?.into_dimensionality::<Ix4>()?.to_owned())
        };
        let next = [recurrent(2)?, recurrent(3)?, recurrent(4)?, recurrent(5)?];
        self.state.replace(next);

        Ok(matte)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.state.clear();
    }

    fn set_quality(&mut self, quality: Quality) {
        let edge = quality.input_edge();
        self.preprocessor = Preprocessor::new(edge, edge);
        self.downsample_ratio = quality.downsample_ratio();
    }

    fn name(&self) -> &str {
        "rvm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_states_start_as_zero_placeholders() {
        let mut state = RecurrentState::default();
        let tensors = state.get_or_init();
        assert!(tensors.iter().all(|t| t.shape() == [1, 1, 1, 1] && t.iter().all(|&v| v == 0.0)));
    }

    #[test]
    fn hidden_states_survive_a_step_without_replacement() {
        let mut state = RecurrentState::default();
        state.get_or_init();
        let carried: [Array4<f32>; 4] = std::array::from_fn(|i| Array4::from_elem((1, 2, 3, 4), i as f32 + 1.0));
        state.replace(carried.clone());

        // A failed inference borrows the tensors and never calls `replace`.
        let borrowed = state.get_or_init();
        assert_eq!(borrowed, &carried);
        assert_eq!(state.get_or_init(), &carried);
    }

    #[test]
    fn clearing_drops_history() {
        let mut state = RecurrentState::default();
        state.replace(std::array::from_fn(|_| Array4::from_elem((1, 2, 2, 2), 0.5)));
        state.clear();
        assert!(state.get_or_init().iter().all(|t| t.shape() == [1, 1, 1, 1]));
    }
}
