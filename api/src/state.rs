use std::sync::Arc;

use sqlx::PgPool;

use crate::agent::AgentService;
use crate::agent::gemini::GeminiClient;
use crate::auth::JwtVerifier;

/// Application state shared across handlers. The JWT verifier and agent
/// service are constructed once at startup from configuration and injected
/// here — no lazily-initialized globals.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt: Arc<JwtVerifier>,
    /// None when GEMINI_API_KEY is not configured; chat endpoints then
    /// report `agent_not_configured` instead of failing mid-request.
    pub agent: Option<Arc<AgentService<GeminiClient>>>,
}
