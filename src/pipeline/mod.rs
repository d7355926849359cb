//! Poster generation pipeline
//!
//! Two sequential remote calls per run:
//! 1. Prompt engineering: the text/vision model turns raw input into
//!    structured poster data (title, subtitle, visual prompt)
//! 2. Image generation: the image model renders the poster from the
//!    visual prompt
//!
//! The orchestrator owns all mutable run state: the current status (exposed
//! to the UI through a watch channel) and the analysis cache that lets a
//! retry with unchanged inputs skip straight to the render call.

pub mod image;
pub mod prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, PERMISSION_DENIED_MESSAGE};
use crate::gemini::GeminiClient;
use crate::keys::KeyProvider;
use crate::policy::PosterPolicy;
use crate::retry::RetryPolicy;

/// Requested poster aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectRatio {
    /// Wire value for the image config
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Tall => "9:16",
            AspectRatio::Wide => "16:9",
        }
    }
}

/// Requested output resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSizeTier {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSizeTier {
    /// Wire value for the image config
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSizeTier::OneK => "1K",
            ImageSizeTier::TwoK => "2K",
            ImageSizeTier::FourK => "4K",
        }
    }
}

/// One poster submission
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInput {
    #[serde(default)]
    pub text: String,
    /// Reference image as a data URL, if one was uploaded
    #[serde(default)]
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub image_size: ImageSizeTier,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en-US".to_string()
}

/// A web citation backing a live-data claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

/// Structured prompt data produced by the analysis stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineeredPrompt {
    pub poster_title: String,
    pub poster_subtitle: String,
    pub visual_prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grounding_sources: Vec<GroundingSource>,
}

/// Final output of one pipeline run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub image_data_url: String,
    pub prompt: EngineeredPrompt,
}

/// Current phase of the run state machine, visible to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RunStatus {
    Idle,
    Analyzing,
    GeneratingImage,
    Success,
    Error { message: String },
}

/// A failed run, carrying the user-facing message
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RunError {
    pub message: String,
}

/// Inputs and result of the last successful analysis call
#[derive(Debug, Clone)]
struct AnalysisRecord {
    text: String,
    image_data_url: Option<String>,
    prompt: EngineeredPrompt,
}

/// The pipeline orchestrator
pub struct Pipeline {
    gemini: Arc<GeminiClient>,
    keys: Arc<dyn KeyProvider>,
    policy: PosterPolicy,
    text_model: String,
    image_model: String,
    analyze_retry: RetryPolicy,
    render_retry: RetryPolicy,
    analysis: RwLock<Option<AnalysisRecord>>,
    status_tx: watch::Sender<RunStatus>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        gemini: Arc<GeminiClient>,
        keys: Arc<dyn KeyProvider>,
        policy: PosterPolicy,
    ) -> Self {
        let (status_tx, _status_rx) = watch::channel(RunStatus::Idle);
        Self {
            gemini,
            keys,
            policy,
            text_model: config.gemini.text_model.clone(),
            image_model: config.gemini.image_model.clone(),
            analyze_retry: RetryPolicy::new(
                config.retry.max_attempts,
                config.retry.analyze_base_delay_ms,
            ),
            render_retry: RetryPolicy::new(
                config.retry.max_attempts,
                config.retry.render_base_delay_ms,
            ),
            analysis: RwLock::new(None),
            status_tx,
        }
    }

    /// Current run status
    pub fn status(&self) -> RunStatus {
        self.status_tx.borrow().clone()
    }

    /// Whether the remote client has an API key
    pub fn is_configured(&self) -> bool {
        self.gemini.is_configured()
    }

    /// Execute one run: analyze (unless inputs are unchanged), then render.
    ///
    /// The caller is responsible for not submitting while a run is active;
    /// the API layer enforces that with a busy gate.
    pub async fn run(
        &self,
        input: UserInput,
        force_reanalysis: bool,
    ) -> Result<PipelineResult, RunError> {
        let run_id = Uuid::new_v4();

        // Best-effort gate: ask for a key if none is selected, but proceed
        // regardless of the outcome.
        if !self.keys.has_key() {
            self.keys.request_key();
        }

        match self.run_inner(run_id, &input, force_reanalysis).await {
            Ok(result) => {
                info!(%run_id, "pipeline run succeeded");
                self.set_status(RunStatus::Success);
                Ok(result)
            }
            Err(err) => {
                warn!(%run_id, "pipeline run failed: {}", err);
                let message = surface_error(&err, self.keys.as_ref());
                self.set_status(RunStatus::Error {
                    message: message.clone(),
                });
                Err(RunError { message })
            }
        }
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        input: &UserInput,
        force_reanalysis: bool,
    ) -> Result<PipelineResult, PipelineError> {
        let cached = {
            let analysis = self.analysis.read().await;
            if needs_analysis(analysis.as_ref(), input, force_reanalysis) {
                None
            } else {
                analysis.as_ref().map(|record| record.prompt.clone())
            }
        };

        let prompt = match cached {
            Some(prompt) => {
                debug!(%run_id, "inputs unchanged, skipping analysis");
                prompt
            }
            None => {
                self.set_status(RunStatus::Analyzing);
                info!(%run_id, "analyzing input");
                let prompt = prompt::engineer_prompt(
                    &self.gemini,
                    &self.policy,
                    self.analyze_retry,
                    &self.text_model,
                    &input.text,
                    input.image_data_url.as_deref(),
                    &input.locale,
                )
                .await?;
                *self.analysis.write().await = Some(AnalysisRecord {
                    text: input.text.clone(),
                    image_data_url: input.image_data_url.clone(),
                    prompt: prompt.clone(),
                });
                prompt
            }
        };

        self.set_status(RunStatus::GeneratingImage);
        info!(%run_id, "generating poster image");
        let image_data_url = image::generate_poster_image(
            &self.gemini,
            &self.policy,
            self.render_retry,
            &self.image_model,
            &prompt.visual_prompt,
            input.aspect_ratio,
            input.image_size,
            input.image_data_url.as_deref(),
        )
        .await?;

        Ok(PipelineResult {
            image_data_url,
            prompt,
        })
    }

    fn set_status(&self, status: RunStatus) {
        self.status_tx.send_replace(status);
    }
}

/// Analysis is skipped only when a prior result exists, the text and image
/// are byte-identical to the last analyzed inputs, and the caller didn't
/// force a re-run.
fn needs_analysis(record: Option<&AnalysisRecord>, input: &UserInput, force: bool) -> bool {
    if force {
        return true;
    }
    match record {
        Some(record) => {
            record.text != input.text || record.image_data_url != input.image_data_url
        }
        None => true,
    }
}

/// Map a stage error to the user-facing message. Authorization failures get
/// a fixed message and re-trigger the key selection flow.
fn surface_error(err: &PipelineError, keys: &dyn KeyProvider) -> String {
    let message = err.to_string();
    if message.contains("403") || message.to_lowercase().contains("permission") {
        keys.request_key();
        return PERMISSION_DENIED_MESSAGE.to_string();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GeminiError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingKeys {
        requests: AtomicUsize,
    }

    impl CountingKeys {
        fn new() -> Self {
            Self {
                requests: AtomicUsize::new(0),
            }
        }
    }

    impl KeyProvider for CountingKeys {
        fn has_key(&self) -> bool {
            true
        }

        fn request_key(&self) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn input(text: &str, image: Option<&str>) -> UserInput {
        UserInput {
            text: text.to_string(),
            image_data_url: image.map(String::from),
            aspect_ratio: AspectRatio::default(),
            image_size: ImageSizeTier::default(),
            locale: default_locale(),
        }
    }

    fn record(text: &str, image: Option<&str>) -> AnalysisRecord {
        AnalysisRecord {
            text: text.to_string(),
            image_data_url: image.map(String::from),
            prompt: EngineeredPrompt {
                poster_title: "T".to_string(),
                poster_subtitle: "S".to_string(),
                visual_prompt: "V".to_string(),
                grounding_sources: Vec::new(),
            },
        }
    }

    #[test]
    fn test_needs_analysis_without_prior_record() {
        assert!(needs_analysis(None, &input("A", None), false));
    }

    #[test]
    fn test_skips_analysis_for_identical_inputs() {
        let record = record("A", None);
        assert!(!needs_analysis(Some(&record), &input("A", None), false));
    }

    #[test]
    fn test_needs_analysis_when_text_changes() {
        let record = record("A", None);
        assert!(needs_analysis(Some(&record), &input("B", None), false));
    }

    #[test]
    fn test_needs_analysis_when_image_changes() {
        let record = record("A", Some("data:image/png;base64,AAAA"));
        assert!(needs_analysis(Some(&record), &input("A", None), false));
        assert!(needs_analysis(
            Some(&record),
            &input("A", Some("data:image/png;base64,BBBB")),
            false
        ));
    }

    #[test]
    fn test_forced_reanalysis() {
        let record = record("A", None);
        assert!(needs_analysis(Some(&record), &input("A", None), true));
    }

    #[test]
    fn test_surface_error_passes_message_verbatim() {
        let keys = CountingKeys::new();
        let err = PipelineError::EmptyResponse;
        assert_eq!(
            surface_error(&err, &keys),
            "the model returned an empty response"
        );
        assert_eq!(keys.requests.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_surface_error_rewrites_403() {
        let keys = CountingKeys::new();
        let err = PipelineError::Remote(GeminiError::Api {
            status: 403,
            message: "caller lacks access".to_string(),
        });
        assert_eq!(surface_error(&err, &keys), PERMISSION_DENIED_MESSAGE);
        assert_eq!(keys.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_surface_error_rewrites_permission_text() {
        let keys = CountingKeys::new();
        let err = PipelineError::Remote(GeminiError::Api {
            status: 400,
            message: "Permission denied on resource".to_string(),
        });
        assert_eq!(surface_error(&err, &keys), PERMISSION_DENIED_MESSAGE);
        assert_eq!(keys.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_aspect_ratio_wire_values() {
        let ratio: AspectRatio = serde_json::from_str("\"9:16\"").unwrap();
        assert_eq!(ratio, AspectRatio::Tall);
        assert_eq!(ratio.as_str(), "9:16");

        let size: ImageSizeTier = serde_json::from_str("\"4K\"").unwrap();
        assert_eq!(size, ImageSizeTier::FourK);
        assert_eq!(size.as_str(), "4K");
    }

    #[test]
    fn test_run_status_serialization() {
        let status = RunStatus::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["message"], "boom");

        let json = serde_json::to_value(RunStatus::GeneratingImage).unwrap();
        assert_eq!(json["state"], "generatingImage");
    }
}
