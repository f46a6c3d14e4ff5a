use crate::ConfigError;
use std::{collections::HashMap, env, str::FromStr};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub inference: InferenceConfig,
    pub search: SearchConfig,
    pub chat: ChatConfig,
    pub quota: QuotaConfig,
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            inference: InferenceConfig::from_env()?,
            search: SearchConfig::from_env()?,
            chat: ChatConfig::from_env()?,
            quota: QuotaConfig::from_env()?,
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn parse_value<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var, value })
}

fn required_parsed<T: FromStr>(var: &'static str) -> Result<T, ConfigError> {
    parse_value(var, required(var)?)
}

fn parsed_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => parse_value(var, value),
        Err(_) => Ok(default),
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: usize,
}

impl DatabaseConfig {
    /// Create a connection URL for this database configuration
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: required("DATABASE_HOST")?,
            port: required_parsed("DATABASE_PORT")?,
            database: required("DATABASE_NAME")?,
            username: required("DATABASE_USERNAME")?,
            password: required("DATABASE_PASSWORD")?,
            max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 5)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_or("SERVER_PORT", 3000)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging Configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        for (var, module) in [
            ("LOG_MODULE_API", "api"),
            ("LOG_MODULE_SERVICES", "services"),
            ("LOG_MODULE_DATABASE", "database"),
        ] {
            if let Ok(level) = env::var(var) {
                modules.insert(module.to_string(), level);
            }
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        })
    }

    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn filter_directive(&self) -> String {
        let mut directive = self.level.clone();
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();
        for (module, level) in modules {
            directive.push_str(&format!(",{module}={level}"));
        }
        directive
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("api".to_string(), "debug".to_string());
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Treat the bearer token as the user id itself. Development and tests only.
    pub mock: bool,
}

impl AuthConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            mock: parsed_or("AUTH_MOCK", false)?,
        })
    }
}

/// Generation engine (OpenAI-compatible chat completions endpoint)
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Label attached to source parts produced by this engine
    pub provider_name: String,
    pub timeout_seconds: u64,
}

impl InferenceConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required("INFERENCE_BASE_URL")?,
            api_key: env::var("INFERENCE_API_KEY").ok(),
            model: required("INFERENCE_MODEL")?,
            provider_name: env::var("INFERENCE_PROVIDER_NAME")
                .unwrap_or_else(|_| "openai-compatible".to_string()),
            timeout_seconds: parsed_or("INFERENCE_TIMEOUT_SECONDS", 30)?,
        })
    }
}

pub const DEFAULT_SERPER_URL: &str = "https://google.serper.dev/search";

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_key: String,
    pub base_url: String,
    pub result_count: usize,
    pub timeout_seconds: u64,
}

impl SearchConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: required("SERPER_API_KEY")?,
            base_url: env::var("SERPER_BASE_URL").unwrap_or_else(|_| DEFAULT_SERPER_URL.into()),
            result_count: parsed_or("SEARCH_RESULT_COUNT", 10)?,
            timeout_seconds: parsed_or("SEARCH_TIMEOUT_SECONDS", 15)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Maximum engine calls in one turn
    pub step_budget: usize,
    /// Wall-clock bound on a whole turn, streaming included
    pub request_timeout_seconds: u64,
}

impl ChatConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            step_budget: parsed_or("CHAT_STEP_BUDGET", 10)?,
            request_timeout_seconds: parsed_or("CHAT_REQUEST_TIMEOUT_SECONDS", 60)?,
        })
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            step_budget: 10,
            request_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub daily_request_limit: i64,
}

impl QuotaConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            daily_request_limit: parsed_or("QUOTA_DAILY_REQUEST_LIMIT", 10)?,
        })
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_request_limit: 10,
        }
    }
}
