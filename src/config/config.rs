use serde::Deserialize;

pub const PLACEHOLDER_API_KEY: &str = "YOUR_OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "parlor.duckdb".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Keys accepted by the HTTP API. Empty disables the check.
    pub api_keys: Vec<String>,
}

/// Account used by the local identity provider.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct IdentityConfig {
    pub uid: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            default_model: "gpt-3.5-turbo".to_string(),
            max_tokens: 150,
            temperature: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub openai: Option<OpenAiConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            openai: Some(OpenAiConfig::default()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub max_history_messages: usize,
    pub system_prompt: String,
    pub apology_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_messages: 10,
            system_prompt: "You are a helpful and friendly virtual assistant. Answer clearly and \
                            concisely. You specialise in general questions, programming and \
                            technology. Keep a professional but approachable tone."
                .to_string(),
            apology_message:
                "Sorry, there was a problem processing your message. Please try again."
                    .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub identity: IdentityConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PARLOR").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Secrets may be written as ${VAR} in the file
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.database.path = expand_env(&app_config.database.path);

        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
            openai.api_base = expand_env(&openai.api_base);
        }
        if let Some(ref mut uid) = app_config.identity.uid {
            *uid = expand_env(uid);
        }

        Ok(app_config)
    }
}

pub fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}
