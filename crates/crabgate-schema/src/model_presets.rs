use serde::Serialize;

/// A known model preset.
#[derive(Debug, Clone, Serialize)]
pub struct ModelPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
}

pub const MODEL_PRESETS: &[ModelPreset] = &[
    ModelPreset {
        id: "claude-opus-4-1-20250805",
        name: "Claude Opus 4.1",
        provider: "anthropic",
    },
    ModelPreset {
        id: "claude-sonnet-4-5-20250929",
        name: "Claude Sonnet 4.5",
        provider: "anthropic",
    },
    ModelPreset {
        id: "claude-sonnet-4-20250514",
        name: "Claude Sonnet 4",
        provider: "anthropic",
    },
    ModelPreset {
        id: "claude-haiku-4-5-20251001",
        name: "Claude Haiku 4.5",
        provider: "anthropic",
    },
    ModelPreset {
        id: "claude-3-5-haiku-20241022",
        name: "Claude 3.5 Haiku",
        provider: "anthropic",
    },
];

/// Resolve a model id to its display name, falling back to the raw id for
/// models the catalog does not know about.
pub fn display_name(id: &str) -> &str {
    MODEL_PRESETS
        .iter()
        .find(|preset| preset.id == id)
        .map(|preset| preset.name)
        .unwrap_or(id)
}
