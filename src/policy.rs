//! Prompt policies
//!
//! All natural-language text sent to the models lives here as swappable
//! configuration: the system instruction for the analysis call, the layout
//! constraint block for the render call, the with/without-reference prefix
//! instructions, and the live-data keyword list. Visual variants are policy
//! values, not forked code paths.

use std::collections::HashMap;

/// A poster generation policy
#[derive(Debug, Clone)]
pub struct PosterPolicy {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// System instruction for the prompt engineering call
    pub system_instruction: String,
    /// Composition rules embedded verbatim in every render prompt
    pub layout_constraints: String,
    /// Render prefix when a reference image is attached
    pub reference_instruction: String,
    /// Render prefix when composing from the description alone
    pub scratch_instruction: String,
    /// Lowercase substrings that trigger the live-search rewrite
    pub live_data_keywords: Vec<String>,
}

impl PosterPolicy {
    /// Default policy: 3D isometric miniature poster
    pub fn isometric_miniature() -> Self {
        Self {
            id: "isometric-miniature".to_string(),
            name: "Isometric Miniature".to_string(),
            system_instruction: "You are an art director for stylized 3D isometric miniature posters. \
Convert the user's input into poster data. Respond with a single JSON object with exactly these fields: \
\"posterTitle\" (a short, punchy title), \"posterSubtitle\" (one supporting line), and \"visualPrompt\" \
(a detailed visual description of the miniature scene: subject, materials, props, lighting, color palette, mood). \
Resolve the output language in this strict priority order: (1) the language of the user's text, if any text was \
provided; (2) the language of any legible text visible in the reference image; (3) the user's locale; \
otherwise English. Respond with ONLY the JSON object, no explanations or preamble."
                .to_string(),
            layout_constraints: "Composition rules: reserve a clean horizontal band of negative space across \
the top fifth of the frame for a large title and across the bottom tenth for a subtitle; never place scene \
elements in those bands. Center the subject in the middle of the frame. Use a full-bleed, uniform, softly lit \
studio backdrop with no borders, frames, or vignettes. Render the scene as a miniature diorama with a \
tilt-shift photography look: shallow depth of field, slightly exaggerated proportions, crisp toy-like detail."
                .to_string(),
            reference_instruction: "A reference image is attached. Extract only the main subject from it, \
ignoring the original background, lighting, and camera angle, and recompose that subject onto a new isometric \
miniature base."
                .to_string(),
            scratch_instruction: "No reference image is provided. Synthesize a self-contained isometric \
miniature scene entirely from the description below."
                .to_string(),
            live_data_keywords: default_live_data_keywords(),
        }
    }

    /// Clay diorama variant (hand-sculpted look)
    pub fn clay_diorama() -> Self {
        Self {
            id: "clay-diorama".to_string(),
            name: "Clay Diorama".to_string(),
            system_instruction: "You are an art director for hand-sculpted clay diorama posters. \
Convert the user's input into poster data. Respond with a single JSON object with exactly these fields: \
\"posterTitle\", \"posterSubtitle\", and \"visualPrompt\" (a detailed description of a scene built from \
modeling clay: visible fingerprints, soft rounded shapes, matte surfaces, warm studio lighting). \
Resolve the output language in this strict priority order: (1) the language of the user's text, if any text was \
provided; (2) the language of any legible text visible in the reference image; (3) the user's locale; \
otherwise English. Respond with ONLY the JSON object, no explanations or preamble."
                .to_string(),
            layout_constraints: "Composition rules: reserve a clean horizontal band of negative space across \
the top fifth of the frame for a large title and across the bottom tenth for a subtitle; never place scene \
elements in those bands. Center the subject in the middle of the frame. Use a full-bleed, uniform, softly lit \
studio backdrop with no borders, frames, or vignettes. Render the scene as a hand-sculpted clay diorama: \
matte plasticine textures, rounded edges, gentle tilt-shift miniature feel."
                .to_string(),
            reference_instruction: "A reference image is attached. Extract only the main subject from it, \
ignoring the original background, lighting, and camera angle, and rebuild that subject in modeling clay on a \
new diorama base."
                .to_string(),
            scratch_instruction: "No reference image is provided. Sculpt a self-contained clay diorama scene \
entirely from the description below."
                .to_string(),
            live_data_keywords: default_live_data_keywords(),
        }
    }

    /// Whether the input asks for real-time data (case-insensitive substring match)
    pub fn wants_live_data(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.live_data_keywords
            .iter()
            .any(|keyword| lower.contains(keyword.as_str()))
    }
}

fn default_live_data_keywords() -> Vec<String> {
    [
        "price",
        "cost",
        "weather",
        "temperature",
        "forecast",
        "news",
        "headline",
        "score",
        "stock",
        "exchange rate",
        "today",
        "latest",
        "current",
        "right now",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Registry of available policies
pub struct PolicyRegistry {
    policies: HashMap<String, PosterPolicy>,
}

impl PolicyRegistry {
    /// Create a new registry with built-in policies
    pub fn new() -> Self {
        let mut policies = HashMap::new();

        let isometric = PosterPolicy::isometric_miniature();
        let clay = PosterPolicy::clay_diorama();

        policies.insert(isometric.id.clone(), isometric);
        policies.insert(clay.id.clone(), clay);

        Self { policies }
    }

    /// Get a policy by ID, falling back to isometric-miniature
    pub fn get(&self, id: &str) -> PosterPolicy {
        self.policies
            .get(id)
            .cloned()
            .unwrap_or_else(PosterPolicy::isometric_miniature)
    }

    /// List all available policies
    pub fn list(&self) -> Vec<&PosterPolicy> {
        self.policies.values().collect()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Default policy ID
pub const DEFAULT_POLICY_ID: &str = "isometric-miniature";
