//! AutoCAD HTTP bridge
//!
//! This binary serves the REST API that turns drawing requests into AutoLISP
//! and runs it inside AutoCAD over COM automation.
//!
//! Architecture:
//! - Main thread: tokio multi-thread runtime with the hyper accept loop
//! - One OS thread per AutoCAD session, owned by the session registry

use acad_mcp::config::parse_origins;
use acad_mcp::server::OriginCheckService;
use acad_mcp::{default_backend, router, AppState, Environment, SessionRegistry, Settings};
use clap::{Args, Parser, Subcommand};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "acad-mcp", version, about = "AutoCAD automation HTTP bridge")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve(ServeArgs),
    /// Connect once, print the active document and optionally run AutoLISP
    Probe(ProbeArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Bind address (e.g., 127.0.0.1:5000). Overrides HOST and PORT.
    #[arg(long)]
    bind: Option<String>,
    /// Configuration profile. Overrides APP_ENV.
    #[arg(long, value_enum)]
    env: Option<Environment>,
    /// Allowed Origin values (comma-separated). Overrides ALLOWED_ORIGINS.
    #[arg(long, value_delimiter = ',')]
    allow_origin: Vec<String>,
}

#[derive(Args)]
struct ProbeArgs {
    /// Session key to connect under
    #[arg(long, default_value = "default")]
    instance_id: String,
    /// AutoLISP file to load after connecting
    #[arg(long)]
    lisp_file: Option<PathBuf>,
    /// AutoLISP expression to run after connecting
    #[arg(long)]
    lisp: Option<String>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve(ServeArgs::default()));
    let env_override = match &command {
        Command::Serve(args) => args.env,
        Command::Probe(_) => None,
    };
    let settings = load_settings(env_override)?;
    let _log_guard = init_tracing(&settings)?;

    match command {
        Command::Serve(args) => run_server(settings, args),
        Command::Probe(args) => run_probe(settings, args),
    }
}

fn load_settings(env: Option<Environment>) -> anyhow::Result<Settings> {
    let settings = match env {
        Some(env) => Settings::from_lookup(|key| {
            if key == "APP_ENV" {
                Some(env.as_str().to_string())
            } else {
                std::env::var(key).ok()
            }
        })?,
        None => Settings::from_env()?,
    };
    Ok(settings)
}

/// Log to stderr, and to `settings.log_file` when set. The returned guard
/// flushes the file writer on drop.
fn init_tracing(settings: &Settings) -> anyhow::Result<Option<WorkerGuard>> {
    let level = &settings.log_level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("acad_mcp={level},tower_http={level}")));

    let (file_layer, guard) = match &settings.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    Ok(guard)
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sigquit.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to create tokio runtime: {e}"))
}

fn run_server(mut settings: Settings, args: ServeArgs) -> anyhow::Result<()> {
    if !args.allow_origin.is_empty() {
        settings.allowed_origins = parse_origins(&args.allow_origin.join(","));
    }
    let bind = args.bind.unwrap_or_else(|| settings.bind_addr());
    let bind_addr: SocketAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {bind}: {e}"))?;

    info!(
        environment = settings.environment.as_str(),
        application = %settings.automation.application_name,
        lisp_path = %settings.automation.lisp_path.display(),
        "Starting AutoCAD HTTP bridge"
    );

    let registry = Arc::new(SessionRegistry::new(
        default_backend(),
        settings.automation.clone(),
    ));
    let origins = settings.allowed_origins.clone();
    let state = AppState::new(registry.clone(), Arc::new(settings));
    let service = OriginCheckService::new(router(state), origins);

    let rt = build_runtime()?;
    let result = rt.block_on(async move {
        let cancel = tokio_util::sync::CancellationToken::new();
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| anyhow::anyhow!("bind failed: {e}"))?;
        info!("HTTP server listening on http://{bind_addr}");

        let cancel_for_shutdown = cancel.clone();
        tokio::spawn(async move {
            if wait_for_shutdown_signal().await.is_ok() {
                info!("Shutdown signal received");
                cancel_for_shutdown.cancel();
            } else {
                warn!("Shutdown signal handler failed; server will continue running");
            }
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("HTTP server shutting down");
                    break;
                }
                res = listener.accept() => {
                    let (stream, _) = match res {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    let svc = service.clone();
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let conn = http1::Builder::new()
                            .serve_connection(io, TowerToHyperService::new(svc));
                        if let Err(err) = conn.await {
                            error!("http connection error: {err}");
                        }
                    });
                }
            }
        }

        let closed = registry.disconnect_all().await;
        info!(sessions = closed, "Sessions closed");
        Ok::<_, anyhow::Error>(())
    });
    if let Err(err) = &result {
        error!("HTTP server error: {err}");
    }

    info!("Server stopped");
    result
}

fn run_probe(settings: Settings, args: ProbeArgs) -> anyhow::Result<()> {
    info!("Starting AutoCAD bridge (probe mode)");
    let registry = SessionRegistry::new(default_backend(), settings.automation);

    let rt = build_runtime()?;
    rt.block_on(async move {
        let outcome = probe(&registry, &args).await;
        registry.disconnect(&args.instance_id).await;
        outcome
    })
}

async fn probe(registry: &SessionRegistry, args: &ProbeArgs) -> anyhow::Result<()> {
    let info = registry.connect(&args.instance_id).await?;
    info!(application = %info.application, "Connected");
    let document = registry.document_info(&args.instance_id).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);

    if let Some(path) = &args.lisp_file {
        let result = registry
            .load_lisp_file(&path.to_string_lossy(), &args.instance_id)
            .await;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    if let Some(code) = &args.lisp {
        let result = registry.execute(code, &args.instance_id).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}
