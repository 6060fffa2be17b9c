use std::{
    future::IntoFuture,
    io::{self, Write},
    process,
    sync::Arc,
};

use embed_relay::{
    application::{error::AppError, relay::EmbedRelay},
    config::{self, RenderArgs},
    domain::session::ExportSession,
    infra::{
        cgi,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        upstream::{ClientOptions, ReqwestRenderApi},
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    let relay = Arc::new(build_relay(&settings)?);

    match command {
        config::Command::Serve(_) => run_serve(settings, relay).await,
        config::Command::Render(args) => run_render(settings, relay, *args).await,
    }
}

fn build_relay(settings: &config::Settings) -> Result<EmbedRelay, AppError> {
    let session = ExportSession::new(
        settings.export.endpoint.as_str(),
        &settings.export.hash,
        settings.upstream.proxy.clone(),
    )?;

    let api = ReqwestRenderApi::new(&ClientOptions {
        connect_timeout: settings.upstream.connect_timeout,
        timeout: settings.upstream.timeout,
        proxy: session.proxy().cloned(),
    })?;

    info!(
        endpoint = session.endpoint(),
        proxied = session.proxy().is_some(),
        "export session ready"
    );

    Ok(EmbedRelay::new(session, Arc::new(api)))
}

async fn run_serve(settings: config::Settings, relay: Arc<EmbedRelay>) -> Result<(), AppError> {
    let router = http::build_router(HttpState {
        relay,
        cookie_max_age: settings.tracking.cookie_max_age,
        assume_https: settings.export.assume_https,
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "embed relay listening");

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.notified().await }
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = shutdown_signal() => {
            info!("shutdown requested; draining connections");
            shutdown.notify_one();
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(result) => {
                    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
                }
                Err(_) => warn!(
                    grace_seconds = settings.server.graceful_shutdown.as_secs(),
                    "graceful shutdown timed out; dropping open connections"
                ),
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_render(
    settings: config::Settings,
    relay: Arc<EmbedRelay>,
    args: RenderArgs,
) -> Result<(), AppError> {
    let inbound = cgi::inbound_from_args(&args, settings.export.assume_https)
        .map_err(|err| AppError::validation(format!("invalid --url `{}`: {err}", args.url)))?;

    let outcome = relay.render(&inbound).await?;
    info!(outcome = outcome.kind(), "render finished");

    let document = cgi::document(&outcome, settings.tracking.cookie_max_age);
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(document.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|err| AppError::from(InfraError::from(err)))
}
