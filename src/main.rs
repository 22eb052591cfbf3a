use std::{borrow::Cow, error::Error, sync::Arc};

use classquizbot::{
    config::{Config, Listener},
    database::Connection,
    registration::register_teachers,
    schema::schema,
    session::SessionStore,
};
use dotenvy::dotenv;
use teloxide::{
    error_handlers::IgnoringErrorHandlerSafe,
    prelude::*,
    update_listeners::webhooks::{self, Options},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from_level(config.log_level))
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_line_number(true)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let connection = Arc::new(Connection::connect(Cow::Owned(config.database_url.clone())).await?);
    connection.perform_migrations().await?;

    let admins = register_teachers(connection.as_ref(), &config.admin_ids).await;
    log::info!("Registered {admins} admin(s) as teachers");

    let sessions = Arc::new(SessionStore::new());
    let dropped = sessions.clear_all().await;
    log::debug!("Cleared {dropped} sessions on startup");

    let bot = Bot::new(&config.token);
    log::info!("Starting bot...");

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![connection, sessions])
        .enable_ctrlc_handler()
        .build();

    match config.listener {
        Listener::Webhook { url, addr } => {
            log::info!("Listening for webhooks on {addr}");
            let listener = webhooks::axum(bot, Options::new(addr, url)).await?;
            dispatcher
                .dispatch_with_listener(listener, Arc::new(IgnoringErrorHandlerSafe))
                .await
        }
        Listener::Polling => dispatcher.dispatch().await,
    }

    Ok(())
}
