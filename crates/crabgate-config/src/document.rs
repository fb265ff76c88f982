//! Typed view of the per-profile gateway configuration document.
//!
//! Only the fields this manager interprets are modeled; everything else the
//! external `clawd` binary writes is captured in `extra` maps so a
//! read-modify-write cycle never drops it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crabgate_schema::model_presets;

use crate::merge::merge_values;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewaySection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<AgentsSection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channels: BTreeMap<String, ChannelConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsSection {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(
        rename = "apiKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<AgentDefaults>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelPolicy>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(
        rename = "botToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowlist: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Channel selection submitted with a setup or connect request.
#[derive(Debug, Clone)]
pub struct ChannelChoice {
    pub kind: String,
    pub token: Option<String>,
    pub allowlist: Vec<String>,
}

/// Inputs for generating a fresh document during setup.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub port: u16,
    pub api_key: Option<String>,
    pub model_id: String,
    pub channel: Option<ChannelChoice>,
}

impl GatewayConfig {
    /// Build the document a setup request asks for: the listening port, one
    /// catalog model entry under its provider, the matching primary
    /// reference, and the chosen channel enabled.
    pub fn generate(params: &GenerateParams) -> Self {
        let provider = provider_for(&params.model_id);

        let mut providers = BTreeMap::new();
        providers.insert(
            provider.to_string(),
            ProviderConfig {
                api_key: params.api_key.clone(),
                models: vec![ModelEntry {
                    id: params.model_id.clone(),
                    extra: Map::new(),
                }],
                extra: Map::new(),
            },
        );

        let mut channels = BTreeMap::new();
        if let Some(choice) = &params.channel {
            channels.insert(
                choice.kind.clone(),
                ChannelConfig {
                    enabled: true,
                    bot_token: choice.token.clone(),
                    allowlist: choice.allowlist.clone(),
                    extra: Map::new(),
                },
            );
        }

        Self {
            gateway: Some(GatewaySection {
                port: Some(params.port),
                extra: Map::new(),
            }),
            models: Some(ModelsSection {
                providers,
                extra: Map::new(),
            }),
            agents: Some(AgentsSection {
                defaults: Some(AgentDefaults {
                    model: Some(ModelPolicy {
                        primary: Some(format!("{provider}/{}", params.model_id)),
                        extra: Map::new(),
                    }),
                    extra: Map::new(),
                }),
                extra: Map::new(),
            }),
            channels,
            extra: Map::new(),
        }
    }

    /// An overlay that swaps the configured model: one catalog entry under
    /// the provider (replacing the old list wholesale on merge) plus the
    /// primary reference. Credentials on the provider survive the merge.
    pub fn model_overlay(model_id: &str) -> Self {
        Self::generate(&GenerateParams {
            port: 0,
            api_key: None,
            model_id: model_id.to_string(),
            channel: None,
        })
        .without_gateway()
    }

    fn without_gateway(mut self) -> Self {
        self.gateway = None;
        self
    }

    /// Right-biased recursive merge; the overlay wins every scalar or array
    /// conflict. See [`merge_values`].
    pub fn merge(base: &Self, overlay: &Self) -> Self {
        let base_val = serde_json::to_value(base).unwrap_or(Value::Null);
        let overlay_val = serde_json::to_value(overlay).unwrap_or(Value::Null);
        let merged = merge_values(&base_val, &overlay_val);
        serde_json::from_value(merged).unwrap_or_else(|err| {
            tracing::warn!("merged config no longer parses ({err}), starting from overlay");
            overlay.clone()
        })
    }

    pub fn port(&self) -> Option<u16> {
        self.gateway.as_ref().and_then(|g| g.port)
    }

    pub fn primary_model(&self) -> Option<&str> {
        self.agents
            .as_ref()
            .and_then(|a| a.defaults.as_ref())
            .and_then(|d| d.model.as_ref())
            .and_then(|m| m.primary.as_deref())
    }

    /// The configured model id, taken from the primary reference
    /// (`provider/model-id`) or, failing that, the first provider entry.
    pub fn model_id(&self) -> Option<String> {
        if let Some(primary) = self.primary_model() {
            let id = primary.split_once('/').map(|(_, id)| id).unwrap_or(primary);
            return Some(id.to_string());
        }
        self.models
            .as_ref()?
            .providers
            .values()
            .flat_map(|p| p.models.iter())
            .next()
            .map(|entry| entry.id.clone())
    }

    pub fn first_enabled_channel(&self) -> Option<&str> {
        self.channels
            .iter()
            .find(|(_, channel)| channel.enabled)
            .map(|(kind, _)| kind.as_str())
    }

    /// Targeted post-condition repair: the onboarding subprocess is known to
    /// leave the freshly configured channel disabled.
    pub fn force_channel_enabled(&mut self, kind: &str) {
        self.channels
            .entry(kind.to_string())
            .or_default()
            .enabled = true;
    }
}

fn provider_for(model_id: &str) -> &'static str {
    model_presets::MODEL_PRESETS
        .iter()
        .find(|preset| preset.id == model_id)
        .map(|preset| preset.provider)
        .unwrap_or("anthropic")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> GenerateParams {
        GenerateParams {
            port: 18790,
            api_key: Some("sk-ant-test".into()),
            model_id: "claude-sonnet-4-5-20250929".into(),
            channel: Some(ChannelChoice {
                kind: "telegram".into(),
                token: Some("123:abc".into()),
                allowlist: vec!["@me".into()],
            }),
        }
    }

    #[test]
    fn generate_sets_port_model_and_channel() {
        let config = GatewayConfig::generate(&sample_params());
        assert_eq!(config.port(), Some(18790));
        assert_eq!(
            config.primary_model(),
            Some("anthropic/claude-sonnet-4-5-20250929")
        );
        assert_eq!(config.model_id().as_deref(), Some("claude-sonnet-4-5-20250929"));
        assert_eq!(config.first_enabled_channel(), Some("telegram"));

        let provider = &config.models.as_ref().unwrap().providers["anthropic"];
        assert_eq!(provider.models.len(), 1);
        assert_eq!(provider.api_key.as_deref(), Some("sk-ant-test"));
    }

    #[test]
    fn merge_keeps_unknown_fields_from_disk() {
        let disk: GatewayConfig = serde_json::from_value(serde_json::json!({
            "gateway": { "port": 18789, "bindAddress": "0.0.0.0" },
            "wizard": { "completedAt": "2026-01-01" }
        }))
        .unwrap();

        let merged = GatewayConfig::merge(&disk, &GatewayConfig::generate(&sample_params()));
        assert_eq!(merged.port(), Some(18790));
        assert_eq!(merged.extra["wizard"]["completedAt"], "2026-01-01");
        assert_eq!(
            merged.gateway.as_ref().unwrap().extra["bindAddress"],
            "0.0.0.0"
        );
    }

    #[test]
    fn model_overlay_replaces_model_list_but_keeps_key() {
        let base = GatewayConfig::generate(&sample_params());
        let overlay = GatewayConfig::model_overlay("claude-opus-4-1-20250805");
        let merged = GatewayConfig::merge(&base, &overlay);

        let provider = &merged.models.as_ref().unwrap().providers["anthropic"];
        assert_eq!(provider.models.len(), 1);
        assert_eq!(provider.models[0].id, "claude-opus-4-1-20250805");
        assert_eq!(provider.api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(
            merged.primary_model(),
            Some("anthropic/claude-opus-4-1-20250805")
        );
        assert_eq!(merged.port(), Some(18790));
    }

    #[test]
    fn force_channel_enabled_flips_existing_entry() {
        let mut config = GatewayConfig::generate(&sample_params());
        config.channels.get_mut("telegram").unwrap().enabled = false;
        config.force_channel_enabled("telegram");
        assert!(config.channels["telegram"].enabled);
        assert_eq!(
            config.channels["telegram"].bot_token.as_deref(),
            Some("123:abc")
        );
    }
}
