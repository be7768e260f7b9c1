//! Loremaster DM server - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod infrastructure;
mod use_cases;

use app::{App, AppConfig};
use infrastructure::provider::ProviderConfig;
use infrastructure::resilient::{ResilientBackend, RetryConfig};
use infrastructure::speech::OpenAiSpeech;
use infrastructure::store::{AdventureStore, RulesStore};
use use_cases::state::SkipPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine is usually run from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loremaster_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Loremaster DM server");

    // Load configuration
    let provider_config = ProviderConfig::from_env()?;
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into());
    let audio_cache_dir = std::env::var("AUDIO_CACHE_DIR").unwrap_or_else(|_| "audio_cache".into());
    let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "onyx".into());
    let server_host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let server_port: u16 = std::env::var("SERVER_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "8000".into())
        .parse()
        .unwrap_or(8000);

    // Wrap the configured backend with retry/backoff
    let retry_config = RetryConfig::from_env();
    tracing::info!(
        provider = provider_config.provider.as_str(),
        model = %provider_config.model,
        max_retries = retry_config.max_retries,
        base_delay_ms = retry_config.base_delay_ms,
        "AI backend configured"
    );
    let backend = Arc::new(ResilientBackend::new(
        provider_config.create_backend()?,
        retry_config,
    ));

    // TTS runs off the OpenAI key regardless of the narrative provider,
    // and TTS_ENABLED=false turns it off even when a key is present.
    let tts_env_enabled = std::env::var("TTS_ENABLED")
        .map(|v| !matches!(v.trim(), "false" | "0" | "no"))
        .unwrap_or(true);
    let tts_key = if tts_env_enabled {
        std::env::var("OPENAI_API_KEY").ok()
    } else {
        None
    };
    let speech = Arc::new(OpenAiSpeech::new(tts_key, tts_voice, &audio_cache_dir));
    let tts_enabled = speech.is_enabled();
    tracing::info!(enabled = tts_enabled, cache_dir = %audio_cache_dir, "TTS configured");

    // Stores
    let mut adventure_store = AdventureStore::new(&data_dir);
    if let Ok(dir) = std::env::var("ADVENTURES_DIR") {
        adventure_store = adventure_store.with_adventures_dir(dir);
    }
    let store = Arc::new(adventure_store);
    let rules = Arc::new(RulesStore::new(&data_dir));

    // Create application
    let config = AppConfig {
        provider: provider_config.provider,
        model: provider_config.model,
        base_url: provider_config.base_url,
        tts_enabled,
        skip_policy: SkipPolicy::from_env(),
    };
    let app = Arc::new(App::new(store, rules, backend, speech, config));

    // Build router; HTTP and WebSocket share the App state
    let mut router = api::http::routes()
        .route("/ws/session/{id}", get(api::websocket::ws_handler))
        .with_state(app)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer_from_env() {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{server_host}:{server_port}").parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer_from_env() -> Option<CorsLayer> {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let Some(allowed_origins) = allowed_origins else {
        return None;
    };

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            return None;
        }

        cors = cors.allow_origin(origins);
    }

    Some(cors)
}
