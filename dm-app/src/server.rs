//! dmpilot server: state construction and the axum serve loop.

use crate::access::AccessFilter;
use crate::config::{AppConfig, ProviderId};
use crate::orchestrator::ResponseOrchestrator;
use crate::pipeline::MessagePipeline;
use crate::routes;
use crate::store::Store;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use dm_channels::{DmChannel, InstagramGraphApi};
use dm_llm::{CompletionProvider, GeminiClient, OpenAiCompatClient};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com";
const XAI_API_BASE: &str = "https://api.x.ai/v1";
const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Shared request state: everything the routes need, built once at startup
/// and passed by reference — no ambient singletons, so tests can substitute
/// a fake channel and a fixed provider chain.
pub struct AppState {
    cfg: AppConfig,
    pub store: Store,
    pub pipeline: MessagePipeline,
}

impl AppState {
    pub fn new(
        cfg: AppConfig,
        store: Store,
        channel: Arc<dyn DmChannel>,
        providers: Vec<Arc<dyn CompletionProvider>>,
    ) -> Self {
        let access = AccessFilter::new(cfg.allowed_username(), Arc::clone(&channel));
        let orchestrator =
            ResponseOrchestrator::new(cfg.assistant.clone(), providers, store.clone());
        let pipeline = MessagePipeline::new(store.clone(), channel, access, orchestrator);
        Self {
            cfg,
            store,
            pipeline,
        }
    }

    pub fn verify_token(&self) -> &str {
        self.cfg.webhook.verify_token.trim()
    }

    pub fn app_secret(&self) -> &str {
        self.cfg.webhook.app_secret.trim()
    }
}

/// The application router with shared state attached. Middleware layers are
/// added by `serve`; tests drive this router directly.
pub fn router(state: Arc<AppState>) -> axum::Router {
    routes::router().layer(Extension(state))
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AppConfig::load(config_path).await?;
    let addr: SocketAddr = cfg
        .server
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server.bind_addr {:?}: {e}", cfg.server.bind_addr))?;

    let providers = build_providers(&cfg);
    let provider_names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    tracing::info!(
        bind_addr = %addr,
        db_path = %cfg.storage.db_path,
        providers = ?provider_names,
        allow_list_configured = cfg.allowed_username().is_some(),
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        "server configuration loaded"
    );
    if providers.is_empty() {
        tracing::warn!(
            "no generation providers configured; every reply will be the apology fallback"
        );
    }

    let listener = preflight_bind_listener(addr).await?;

    let store = Store::open(&cfg.storage.db_path)?;
    let channel = build_channel(&cfg)?;
    let state = Arc::new(AppState::new(cfg.clone(), store, channel, providers));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = router(state)
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.http_max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(cfg.server.http_timeout_seconds),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let shutdown = CancellationToken::new();
    tracing::info!(%addr, "dmpilot serving");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;
    tracing::info!("http server shutdown completed");
    shutdown.cancel();

    Ok(())
}

/// Validate the configuration and log the resolved provider chain without
/// binding the server.
pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = AppConfig::load(config_path).await?;
    let providers = build_providers(&cfg);
    let provider_names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    tracing::info!(
        bind_addr = %cfg.server.bind_addr,
        db_path = %cfg.storage.db_path,
        providers = ?provider_names,
        allow_list_configured = cfg.allowed_username().is_some(),
        history_window = cfg.assistant.history_window,
        "config ok"
    );
    Ok(())
}

/// One-shot outbound send, bypassing the pipeline.
pub async fn send_one_shot(
    config_path: Option<PathBuf>,
    recipient: &str,
    message: &str,
) -> Result<()> {
    let cfg = AppConfig::load(config_path).await?;
    let channel = build_channel(&cfg)?;
    channel.send_text(recipient, message).await?;
    Ok(())
}

fn build_channel(cfg: &AppConfig) -> Result<Arc<dyn DmChannel>> {
    let mut api = InstagramGraphApi::new(&cfg.instagram.access_token)?;
    if let Some(base) = cfg
        .instagram
        .api_base
        .as_deref()
        .map(str::trim)
        .filter(|base| !base.is_empty())
    {
        api = api.with_api_base(base);
    }
    Ok(Arc::new(api))
}

/// Instantiate the startup-computed provider priority chain.
fn build_providers(cfg: &AppConfig) -> Vec<Arc<dyn CompletionProvider>> {
    cfg.provider_priority()
        .into_iter()
        .map(|cred| match cred.id {
            ProviderId::Groq => Arc::new(OpenAiCompatClient::new(
                "groq",
                GROQ_API_BASE,
                cred.api_key,
                cred.model,
            )) as Arc<dyn CompletionProvider>,
            ProviderId::Gemini => Arc::new(GeminiClient::new(cred.api_key, cred.model)),
            ProviderId::Deepseek => Arc::new(OpenAiCompatClient::new(
                "deepseek",
                DEEPSEEK_API_BASE,
                cred.api_key,
                cred.model,
            )),
            ProviderId::Grok => Arc::new(OpenAiCompatClient::new(
                "grok",
                XAI_API_BASE,
                cred.api_key,
                cred.model,
            )),
            ProviderId::Openrouter => Arc::new(
                OpenAiCompatClient::new(
                    "openrouter",
                    OPENROUTER_API_BASE,
                    cred.api_key,
                    cred.model,
                )
                .with_title_header("dmpilot"),
            ),
        })
        .collect()
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
    shutdown.cancel();
}
