use thiserror::Error;

/// Per-frame failure taxonomy.
///
/// Every variant is recovered locally by the filter: the frame is skipped and
/// the source passes through unmodified. None of them is fatal.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Pool or sized resource creation failed; retried on the next tick.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// Render target could not be staged into a pooled buffer.
    #[error("capture failed: {0}")]
    Capture(String),

    /// Processed buffer could not be written back to the render texture.
    #[error("writeback failed: {0}")]
    Writeback(String),

    /// Provider reported an error or returned no mask.
    #[error("segmentation failed: {0}")]
    Segmentation(String),

    /// A compositing stage produced no output.
    #[error("composite failed: {0}")]
    Composite(String),
}

impl FilterError {
    /// Short stable name, used as a logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterError::Allocation(_) => "allocation",
            FilterError::Capture(_) => "capture",
            FilterError::Writeback(_) => "writeback",
            FilterError::Segmentation(_) => "segmentation",
            FilterError::Composite(_) => "composite",
        }
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
