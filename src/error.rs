//! Pipeline error taxonomy
//!
//! Stage errors bubble up unmodified; the orchestrator is the single point
//! that rewrites user-facing text (see `pipeline::surface_error`).

use thiserror::Error;

use crate::gemini::GeminiError;

/// Fixed message shown when a call fails with an authorization error
pub const PERMISSION_DENIED_MESSAGE: &str =
    "The selected API key is not authorized for image generation. Please select a key with access and try again.";

/// Errors raised by the pipeline stages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A remote call failed after exhausting its retries
    #[error(transparent)]
    Remote(#[from] GeminiError),

    /// The model returned no textual content
    #[error("the model returned an empty response")]
    EmptyResponse,

    /// The model stopped abnormally without producing text
    #[error("generation stopped early ({0})")]
    GenerationStopped(String),

    /// The extracted JSON substring did not parse as poster data
    #[error("the model returned output that could not be parsed")]
    MalformedOutput(#[source] serde_json::Error),

    /// The render response carried no candidates or content parts
    #[error("the model returned no image candidates")]
    NoImageGenerated,

    /// No content part carried inline image data
    #[error("the model response contained no image data")]
    NoImageData,
}
