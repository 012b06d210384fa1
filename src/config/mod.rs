mod settings;

pub use settings::{
    DebateSettings, PROJECT_CONFIG_FILE, ProviderSettings, RetrySettings, Settings,
};
