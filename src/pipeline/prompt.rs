//! Prompt engineering stage
//!
//! Sends the user's raw input to the text/vision model and parses the
//! structured poster prompt out of the reply. The reply is free text that
//! should contain a JSON object; extraction tolerates surrounding prose by
//! slicing from the first `{` to the last `}`.

use serde::Deserialize;
use tracing::error;

use crate::error::PipelineError;
use crate::gemini::{
    Content, GeminiClient, GeminiError, GenerateContentRequest, GenerateContentResponse, Part,
    Tool,
};
use crate::media;
use crate::pipeline::{EngineeredPrompt, GroundingSource};
use crate::policy::PosterPolicy;
use crate::retry::{with_retry, RetryPolicy};

/// Finish reasons that are not abnormal termination
const NORMAL_FINISH_REASONS: [&str; 2] = ["STOP", "MAX_TOKENS"];

/// Run the analysis call and parse its structured result
pub async fn engineer_prompt(
    gemini: &GeminiClient,
    policy: &PosterPolicy,
    retry: RetryPolicy,
    model: &str,
    text: &str,
    image_data_url: Option<&str>,
    locale: &str,
) -> Result<EngineeredPrompt, PipelineError> {
    let request = build_request(policy, text, image_data_url, locale);

    let response = with_retry(
        "prompt engineering",
        retry,
        GeminiError::is_retryable,
        || gemini.generate_content(model, &request),
    )
    .await?;

    let reply = match response.text() {
        Some(reply) => reply,
        None => {
            if let Some(reason) = abnormal_finish_reason(&response) {
                return Err(PipelineError::GenerationStopped(reason));
            }
            return Err(PipelineError::EmptyResponse);
        }
    };

    let mut prompt = parse_engineered_prompt(&reply)?;
    prompt.grounding_sources = grounding_sources(&response);
    Ok(prompt)
}

/// Assemble the analysis request: inline image first (when present), then
/// the task text, with the search tool always enabled.
pub(crate) fn build_request(
    policy: &PosterPolicy,
    text: &str,
    image_data_url: Option<&str>,
    locale: &str,
) -> GenerateContentRequest {
    let mut parts = Vec::new();
    if let Some(data_url) = image_data_url {
        let image = media::decode_data_url(data_url);
        parts.push(Part::inline(image.mime_type, image.data));
    }
    parts.push(Part::text(task_text(
        policy,
        text,
        image_data_url.is_some(),
        locale,
    )));

    GenerateContentRequest {
        contents: vec![Content::user(parts)],
        system_instruction: Some(Content::text_only(policy.system_instruction.clone())),
        tools: vec![Tool::google_search()],
        generation_config: None,
    }
}

/// The task text carries the language-priority inputs (user text, image
/// presence, locale); the priority order itself is enforced by the system
/// instruction. Inputs that ask for live data get an explicit rewrite
/// directing the model at the search tool.
fn task_text(policy: &PosterPolicy, text: &str, has_image: bool, locale: &str) -> String {
    let mut task = if policy.wants_live_data(text) {
        format!(
            "Use the real-time search tool to look up the current, factual answer and embed the \
exact retrieved value in the poster fields.\n\nUser input: {}",
            text
        )
    } else {
        format!("User input: {}", text)
    };

    if has_image {
        task.push_str("\nA reference image is attached.");
    } else {
        task.push_str("\nNo reference image was provided.");
    }
    task.push_str(&format!("\nUser locale: {}", locale));
    task
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFields {
    poster_title: String,
    poster_subtitle: String,
    visual_prompt: String,
}

/// Extract the `{...}` substring from the reply and parse it as poster data.
/// The raw reply is logged on failure, never surfaced to the user.
pub(crate) fn parse_engineered_prompt(reply: &str) -> Result<EngineeredPrompt, PipelineError> {
    let slice = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply,
    };

    let fields: PromptFields = serde_json::from_str(slice).map_err(|err| {
        error!("failed to parse prompt stage output: {}; raw text: {}", err, reply);
        PipelineError::MalformedOutput(err)
    })?;

    Ok(EngineeredPrompt {
        poster_title: fields.poster_title,
        poster_subtitle: fields.poster_subtitle,
        visual_prompt: fields.visual_prompt,
        grounding_sources: Vec::new(),
    })
}

/// Finish reason of the first candidate when it indicates abnormal termination
fn abnormal_finish_reason(response: &GenerateContentResponse) -> Option<String> {
    let reason = response.finish_reason()?;
    if NORMAL_FINISH_REASONS.contains(&reason) {
        None
    } else {
        Some(reason.to_string())
    }
}

/// Map grounding citations to (title, uri) pairs. Citations without a web
/// reference are dropped; duplicates keep their first occurrence.
fn grounding_sources(response: &GenerateContentResponse) -> Vec<GroundingSource> {
    let Some(candidate) = response.candidates.first() else {
        return Vec::new();
    };
    let Some(metadata) = &candidate.grounding_metadata else {
        return Vec::new();
    };

    let mut sources: Vec<GroundingSource> = Vec::new();
    for chunk in &metadata.grounding_chunks {
        let Some(web) = &chunk.web else { continue };
        let Some(uri) = web.uri.clone() else { continue };
        if sources.iter().any(|source| source.uri == uri) {
            continue;
        }
        let title = web.title.clone().unwrap_or_else(|| uri.clone());
        sources.push(GroundingSource { title, uri });
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PosterPolicy {
        PosterPolicy::isometric_miniature()
    }

    #[test]
    fn test_parse_tolerates_surrounding_prose() {
        let reply = "Here is the result: {\"posterTitle\":\"X\",\"posterSubtitle\":\"Y\",\"visualPrompt\":\"Z\"} Thanks!";
        let prompt = parse_engineered_prompt(reply).unwrap();
        assert_eq!(prompt.poster_title, "X");
        assert_eq!(prompt.poster_subtitle, "Y");
        assert_eq!(prompt.visual_prompt, "Z");
    }

    #[test]
    fn test_parse_failure_is_malformed_output() {
        let result = parse_engineered_prompt("I could not produce the poster data.");
        assert!(matches!(result, Err(PipelineError::MalformedOutput(_))));
    }

    #[test]
    fn test_live_data_rewrite() {
        let request = build_request(&policy(), "What's the weather in Tokyo", None, "en-US");
        let task = request.contents[0].parts[0].text.as_deref().unwrap();
        assert!(task.contains("real-time search"));
        assert!(task.contains("exact retrieved value"));
        assert!(task.contains("What's the weather in Tokyo"));
    }

    #[test]
    fn test_plain_input_is_not_rewritten() {
        let request = build_request(&policy(), "a cozy ramen shop", None, "en-US");
        let task = request.contents[0].parts[0].text.as_deref().unwrap();
        assert!(!task.contains("real-time search"));
        assert!(task.contains("User locale: en-US"));
        assert!(task.contains("No reference image was provided."));
    }

    #[test]
    fn test_image_part_precedes_task_text() {
        let request = build_request(
            &policy(),
            "make it a poster",
            Some("data:image/png;base64,AAAA"),
            "ja-JP",
        );
        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 2);
        let inline = parts[0].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, "AAAA");
        let task = parts[1].text.as_deref().unwrap();
        assert!(task.contains("A reference image is attached."));
        // Search capability is always on
        assert_eq!(request.tools.len(), 1);
        assert!(request.system_instruction.is_some());
    }

    #[test]
    fn test_abnormal_finish_reason() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]}"#,
        )
        .unwrap();
        assert_eq!(abnormal_finish_reason(&response).as_deref(), Some("SAFETY"));

        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]}"#,
        )
        .unwrap();
        assert_eq!(abnormal_finish_reason(&response), None);
    }

    #[test]
    fn test_grounding_sources_filter_and_dedupe() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {"parts": [{"text": "{}"}]},
                    "groundingMetadata": {
                        "groundingChunks": [
                            {"web": {"uri": "https://a.example", "title": "A"}},
                            {"web": null},
                            {"web": {"uri": "https://b.example"}},
                            {"web": {"uri": "https://a.example", "title": "A again"}}
                        ]
                    }
                }]
            }"#,
        )
        .unwrap();

        let sources = grounding_sources(&response);
        assert_eq!(
            sources,
            vec![
                GroundingSource {
                    title: "A".to_string(),
                    uri: "https://a.example".to_string()
                },
                GroundingSource {
                    title: "https://b.example".to_string(),
                    uri: "https://b.example".to_string()
                },
            ]
        );
    }
}
