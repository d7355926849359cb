//! Image generation stage
//!
//! Renders the poster from the engineered visual prompt. The layout
//! constraint block is embedded verbatim in every render prompt; a reference
//! image switches the prefix from scene synthesis to subject extraction.

use crate::error::PipelineError;
use crate::gemini::{
    Content, GeminiClient, GeminiError, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, ImageConfig, Part,
};
use crate::media;
use crate::pipeline::{AspectRatio, ImageSizeTier};
use crate::policy::PosterPolicy;
use crate::retry::{with_retry, RetryPolicy};

/// Run the render call and return the poster as a data URL
#[allow(clippy::too_many_arguments)]
pub async fn generate_poster_image(
    gemini: &GeminiClient,
    policy: &PosterPolicy,
    retry: RetryPolicy,
    model: &str,
    visual_prompt: &str,
    aspect_ratio: AspectRatio,
    image_size: ImageSizeTier,
    reference_image: Option<&str>,
) -> Result<String, PipelineError> {
    let request = build_request(policy, visual_prompt, aspect_ratio, image_size, reference_image);

    let response = with_retry(
        "image generation",
        retry,
        GeminiError::is_retryable,
        || gemini.generate_content(model, &request),
    )
    .await?;

    extract_image(&response)
}

/// Assemble the render request. The prompt is always
/// `<prefix>\n\n<layout constraints>\n\n<visual prompt>`; with a reference
/// image the inline part comes first and the prefix tells the model to
/// extract the subject rather than synthesize a scene.
pub(crate) fn build_request(
    policy: &PosterPolicy,
    visual_prompt: &str,
    aspect_ratio: AspectRatio,
    image_size: ImageSizeTier,
    reference_image: Option<&str>,
) -> GenerateContentRequest {
    let prefix = if reference_image.is_some() {
        &policy.reference_instruction
    } else {
        &policy.scratch_instruction
    };

    let mut parts = Vec::new();
    if let Some(data_url) = reference_image {
        let image = media::decode_data_url(data_url);
        parts.push(Part::inline(image.mime_type, image.data));
    }
    parts.push(Part::text(format!(
        "{}\n\n{}\n\n{}",
        prefix, policy.layout_constraints, visual_prompt
    )));

    GenerateContentRequest {
        contents: vec![Content::user(parts)],
        generation_config: Some(GenerationConfig {
            response_modalities: vec!["IMAGE".to_string()],
            image_config: Some(ImageConfig {
                aspect_ratio: aspect_ratio.as_str().to_string(),
                image_size: image_size.as_str().to_string(),
            }),
        }),
        ..Default::default()
    }
}

/// Pull the first inline image out of the response and encode it as a data
/// URL using its reported MIME type.
fn extract_image(response: &GenerateContentResponse) -> Result<String, PipelineError> {
    let has_content = response
        .candidates
        .iter()
        .any(|candidate| {
            candidate
                .content
                .as_ref()
                .is_some_and(|content| !content.parts.is_empty())
        });
    if !has_content {
        return Err(PipelineError::NoImageGenerated);
    }

    let image = response
        .first_inline_data()
        .ok_or(PipelineError::NoImageData)?;
    Ok(media::encode_data_url(&image.mime_type, &image.data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PosterPolicy {
        PosterPolicy::isometric_miniature()
    }

    #[test]
    fn test_request_without_reference() {
        let request = build_request(
            &policy(),
            "a tiny ramen shop at dusk",
            AspectRatio::Wide,
            ImageSizeTier::TwoK,
            None,
        );

        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 1);
        let prompt = parts[0].text.as_deref().unwrap();
        assert!(prompt.starts_with(&policy().scratch_instruction));
        assert!(prompt.contains("negative space"));
        assert!(prompt.ends_with("a tiny ramen shop at dusk"));

        let config = request.generation_config.as_ref().unwrap();
        assert_eq!(config.response_modalities, vec!["IMAGE"]);
        let image_config = config.image_config.as_ref().unwrap();
        assert_eq!(image_config.aspect_ratio, "16:9");
        assert_eq!(image_config.image_size, "2K");
    }

    #[test]
    fn test_request_with_reference() {
        let request = build_request(
            &policy(),
            "the subject on a floating base",
            AspectRatio::Square,
            ImageSizeTier::OneK,
            Some("data:image/webp;base64,UklG"),
        );

        let parts = &request.contents[0].parts;
        assert_eq!(parts.len(), 2);
        let inline = parts[0].inline_data.as_ref().unwrap();
        assert_eq!(inline.mime_type, "image/webp");
        assert_eq!(inline.data, "UklG");
        let prompt = parts[1].text.as_deref().unwrap();
        assert!(prompt.starts_with(&policy().reference_instruction));
        assert!(prompt.contains("negative space"));
    }

    #[test]
    fn test_extract_image() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {"parts": [
                        {"inlineData": {"mimeType": "image/png", "data": "iVBOR"}}
                    ]}
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(
            extract_image(&response).unwrap(),
            "data:image/png;base64,iVBOR"
        );
    }

    #[test]
    fn test_no_candidates_is_no_image_generated() {
        let response: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(matches!(
            extract_image(&response),
            Err(PipelineError::NoImageGenerated)
        ));

        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": []}}]}"#).unwrap();
        assert!(matches!(
            extract_image(&response),
            Err(PipelineError::NoImageGenerated)
        ));
    }

    #[test]
    fn test_text_only_response_is_no_image_data() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "sorry, no image"}]}}]}"#,
        )
        .unwrap();

        assert!(matches!(
            extract_image(&response),
            Err(PipelineError::NoImageData)
        ));
    }
}
