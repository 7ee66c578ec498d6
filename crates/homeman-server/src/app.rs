//! Command dispatch and process lifecycle.

use std::future::Future;
use std::sync::Arc;

use homeman_api::AppState;
use homeman_auth::TokenService;
use homeman_bootstrap::{Dependency, DependencyBootstrapper};
use homeman_core::{Principal, Result};
use homeman_redis::{MemoryTaskQueue, RedisConnector, RedisTaskQueue};
use homeman_storage::{MemoryStore, PostgresConnector, PostgresStore};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::cli::{CliArgs, Command};
use crate::config::{HomemanConfig, token_ttl};
use crate::config_handlers;

// ============================================================================
// Logging
// ============================================================================

/// Initialise tracing-based logging.
///
/// Uses `RUST_LOG` env var if set, otherwise defaults based on verbosity flags.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // A subscriber may already be installed (tests).
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// Dispatch
// ============================================================================

/// Run the CLI with the given arguments.
pub async fn run(args: CliArgs) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    match args.command {
        Some(Command::Serve { in_memory, port }) => {
            let mut config = HomemanConfig::load(args.config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, in_memory).await
        }
        Some(Command::Token {
            subject,
            privileged,
            ttl_minutes,
        }) => {
            let config = HomemanConfig::load(args.config.as_deref())?;
            let token = issue_token(&config, subject, privileged, ttl_minutes)?;
            println!("{token}");
            Ok(())
        }
        Some(Command::Config(config_cmd)) => {
            config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
        }
        Some(Command::Version) => {
            println!("homeman {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            println!("homeman {}: use --help for usage", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Issues a token offline with the configured secret.
pub fn issue_token(
    config: &HomemanConfig,
    subject: Uuid,
    privileged: bool,
    ttl_minutes: Option<i64>,
) -> Result<String> {
    config.validate()?;
    let tokens = TokenService::new(config.token_settings()?);
    let principal = Principal {
        subject_id: subject,
        is_privileged: privileged,
    };
    let token = match ttl_minutes {
        Some(minutes) => tokens.issue(&principal, token_ttl(minutes)?)?,
        None => tokens.issue_default(&principal)?,
    };
    Ok(token.into_string())
}

// ============================================================================
// Serve
// ============================================================================

/// Bootstraps dependencies and assembles the shared request state.
///
/// Degraded dependencies do not fail this call; requests that need them
/// answer 503 until the process is restarted.
pub async fn build_state(config: &HomemanConfig, in_memory: bool) -> Result<AppState> {
    config.validate()?;
    let tokens = Arc::new(TokenService::new(config.token_settings()?));

    if in_memory {
        info!("using in-memory store and task queue");
        let bootstrap = DependencyBootstrapper::new(config.backoff_policy());
        return Ok(AppState::new(
            tokens,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryTaskQueue::new()),
            Arc::new(bootstrap),
        ));
    }

    let db = Arc::new(Dependency::new(PostgresConnector::new(
        config.postgres.url.clone(),
        config.postgres.max_connections,
    )));
    let broker = Arc::new(Dependency::new(RedisConnector::new(config.redis.url.clone())));
    let bootstrap = DependencyBootstrapper::new(config.backoff_policy())
        .with_dependency(db.clone())
        .with_dependency(broker.clone());

    let report = bootstrap.start().await;
    if !report.all_connected() {
        warn!(degraded = ?report.degraded(), "starting with degraded dependencies");
    }

    Ok(AppState::new(
        tokens,
        Arc::new(PostgresStore::new(db)),
        Arc::new(RedisTaskQueue::new(broker, config.redis.health_queue.clone())),
        Arc::new(bootstrap),
    ))
}

async fn serve(config: HomemanConfig, in_memory: bool) -> Result<()> {
    let state = build_state(&config, in_memory).await?;
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(address = %listener.local_addr()?, prefix = %config.server.api_prefix, "listening");

    serve_on(listener, state, &config.server.api_prefix, shutdown_signal()).await
}

/// Serves on `listener` until `shutdown` resolves, then shuts the
/// dependencies down in reverse connection order.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    api_prefix: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bootstrap = Arc::clone(&state.bootstrap);
    let app = homeman_api::router(state, api_prefix);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    bootstrap.shutdown().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("shutdown signal received");
}

// ============================================================================
// Tests
// ============================================================================
