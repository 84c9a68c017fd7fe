use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod agent;
mod auth;
mod config;
mod error;
mod middleware;
mod routes;
mod state;
mod store;

use agent::AgentService;
use agent::gemini::GeminiClient;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Taskdeck API",
        version = "0.1.0",
        description = "Multi-user task management API with a conversational AI assistant."
    ),
    paths(
        routes::health::health_check,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::tasks::create_task,
        routes::tasks::list_tasks,
        routes::tasks::get_task,
        routes::tasks::update_task,
        routes::tasks::toggle_complete,
        routes::tasks::delete_task,
        routes::chat::create_conversation,
        routes::chat::list_conversations,
        routes::chat::get_conversation,
        routes::chat::delete_conversation,
        routes::chat::list_messages,
        routes::chat::send_message,
        routes::chat::quick_message,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::auth::RegisterRequest,
        routes::auth::UserResponse,
        routes::auth::LoginRequest,
        routes::auth::TokenResponse,
        routes::chat::QuickMessageRequest,
        auth::AuthenticatedUser,
        taskdeck_core::error::ApiError,
        taskdeck_core::tasks::Task,
        taskdeck_core::tasks::CreateTaskRequest,
        taskdeck_core::tasks::UpdateTaskRequest,
        taskdeck_core::tasks::TaskListResponse,
        taskdeck_core::chat::MessageRole,
        taskdeck_core::chat::Conversation,
        taskdeck_core::chat::Message,
        taskdeck_core::chat::CreateConversationRequest,
        taskdeck_core::chat::ConversationListResponse,
        taskdeck_core::chat::ChatMessageRequest,
        taskdeck_core::chat::ChatResponse,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskdeck_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("configuration error: {message}");
            std::process::exit(1);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let jwt = Arc::new(auth::JwtVerifier::new(
        &config.jwt_secret,
        config.jwt_audience.clone(),
        config.jwt_issuer.clone(),
    ));

    let agent = config.gemini_api_key.clone().map(|api_key| {
        Arc::new(AgentService::new(GeminiClient::new(
            api_key,
            config.gemini_model.clone(),
        )))
    });
    if agent.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; chat endpoints will report agent_not_configured");
    }

    let app_state = state::AppState {
        db: pool,
        jwt,
        agent,
    };

    let cors_layer = middleware::cors::build_cors_layer();

    // Router with per-endpoint rate limiting on auth routes
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::auth::register_router().layer(middleware::rate_limit::register_layer()))
        .merge(routes::auth::login_router().layer(middleware::rate_limit::login_layer()))
        .merge(routes::auth::me_router())
        .merge(routes::tasks::router())
        .merge(routes::chat::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Taskdeck API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
