/// Service configuration, read from the environment once at startup.
/// Missing required values fail fast before the server accepts traffic.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub jwt_issuer: Option<String>,
    /// When absent, chat endpoints respond with `agent_not_configured`.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub port: u16,
}

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = require_env("DATABASE_URL")?;
        let jwt_secret = require_env("JWT_SECRET")?;

        Ok(Config {
            database_url,
            jwt_secret,
            jwt_audience: optional_env("JWT_AUDIENCE"),
            jwt_issuer: optional_env("JWT_ISSUER"),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            gemini_model: optional_env("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            port: optional_env("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        })
    }
}

fn require_env(name: &str) -> Result<String, String> {
    optional_env(name).ok_or_else(|| format!("{name} must be set"))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
