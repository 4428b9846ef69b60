use std::{process, sync::Arc};

use stampa::{
    application::{
        article::{ArticleLocator, ArticleProbe, RestProbe},
        error::AppError,
        queue::{events::QueueObserver, RenderQueue},
        render::RendererFactory,
    },
    config,
    infra::{
        browser::ChromiumLauncher,
        error::InfraError,
        http::{self, HttpState},
        metrics::QueueTelemetry,
        telemetry,
    },
};
use tracing::{dispatcher, error, info, warn, Dispatch, Level};
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

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;
    serve(settings).await
}

async fn serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_application_context(&settings)?;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    info!(
        target = "stampa::server",
        addr = %settings.server.addr,
        concurrency = settings.queue.concurrency,
        max_task_count = settings.queue.max_task_count,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

fn build_application_context(settings: &config::Settings) -> Result<HttpState, AppError> {
    let observer: Arc<dyn QueueObserver> = Arc::new(QueueTelemetry);
    let queue = Arc::new(RenderQueue::new(settings.queue.clone(), observer));

    let locator = ArticleLocator::new(
        settings.render.article_template.clone(),
        settings.render.probe_template.clone(),
    );
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| AppError::unexpected(format!("failed to build http client: {err}")))?;
    let probe: Arc<dyn ArticleProbe> = Arc::new(RestProbe::new(client, locator.clone()));
    let renderers: Arc<dyn RendererFactory> =
        Arc::new(ChromiumLauncher::new(settings.browser.clone()));

    let retry_after_seconds = settings
        .queue
        .queue_timeout
        .as_millis()
        .div_ceil(1000)
        .max(1) as u64;

    Ok(HttpState {
        queue,
        probe,
        locator,
        renderers,
        retry_after_seconds,
        forwarded_headers: settings.render.headers.clone(),
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "stampa::server", error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(target = "stampa::server", "shutdown signal received");
}
