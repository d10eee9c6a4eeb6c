use std::sync::Arc;

use automation::{BalanceWatcher, DailyScheduler};
use chrono_tz::Tz;
use engine::{Authorizer, Billing, Directory, Notifier, Settler};
use migration::{Migrator, MigratorTrait};
use settings::Database;
use tokio_util::sync::CancellationToken;

mod billing;
mod directory;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "ledger={level},automation={level},telegram_bot={level},engine={level},migration={level}",
            level = settings.app.level
        ))
        .init();

    let timezone: Tz = settings
        .app
        .timezone
        .parse()
        .map_err(|err| format!("invalid timezone {}: {err}", settings.app.timezone))?;
    let telegram = settings
        .telegram
        .as_ref()
        .ok_or("missing [telegram] settings")?;

    let db = parse_database(&settings.database).await?;
    let engine = Arc::new(engine::Engine::builder().database(db).build().await?);

    let billing: Option<Arc<dyn Billing>> = match &settings.billing {
        Some(billing) => Some(Arc::new(billing::BillingClient::new(billing)?)),
        None => {
            tracing::warn!("no billing settings, daily settlement is disabled");
            None
        }
    };
    let settler = Arc::new(Settler::new(Arc::clone(&engine), billing, timezone));
    let directory: Arc<dyn Directory> =
        Arc::new(directory::ConfigDirectory::new(&settings.groups));
    let authorizer: Arc<dyn Authorizer> =
        Arc::new(directory::AdminList::new(settings.admins.iter().copied()));

    let bot = telegram_bot::Bot::builder()
        .token(&telegram.token)
        .settler(Arc::clone(&settler))
        .directory(Arc::clone(&directory))
        .authorizer(authorizer)
        .build()?;
    let notifier: Arc<dyn Notifier> = Arc::new(bot.notifier());

    let shutdown = CancellationToken::new();

    let scheduler = settings.scheduler.enabled.then(|| {
        let scheduler = Arc::new(DailyScheduler::new(
            Arc::clone(&settler),
            Arc::clone(&directory),
            Arc::clone(&notifier),
            settings.scheduler.config(),
            &shutdown,
        ));
        scheduler.start();
        scheduler
    });
    let watcher = settings.watcher.enabled.then(|| {
        let watcher = BalanceWatcher::new(
            Arc::clone(&engine),
            Arc::clone(&notifier),
            settings.watcher.config(),
            &shutdown,
        );
        watcher.start();
        watcher
    });

    let mut tasks = tokio::task::JoinSet::new();
    let bot_shutdown = shutdown.clone();
    tasks.spawn(async move { bot.run(bot_shutdown).await });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(err) => tracing::error!("failed to listen for ctrl-c: {err}"),
        },
        _ = tasks.join_next() => tracing::warn!("telegram bot exited"),
    }

    shutdown.cancel();
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    while tasks.join_next().await.is_some() {}

    tracing::info!("bye");
    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
