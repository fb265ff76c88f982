pub mod document;
pub mod merge;
pub mod store;

pub use document::{
    AgentDefaults, AgentsSection, ChannelChoice, ChannelConfig, GatewayConfig, GatewaySection,
    GenerateParams, ModelEntry, ModelPolicy, ModelsSection, ProviderConfig,
};
pub use merge::merge_values;
pub use store::{config_path, profile_dir, profile_name_from_dir, read, write, CONFIG_FILE};
