//! Telegram bot.
//!
//! The bot is the chat front-end of the ledger: it parses group messages,
//! checks permissions through the [`Authorizer`], calls the engine and
//! renders the results. It also delivers the notices of the automation loops
//! through [`TelegramNotifier`].

use std::sync::Arc;
use std::time::Duration;

use engine::{Authorizer, Directory, Engine, Settler};
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

pub use notifier::TelegramNotifier;

mod handlers;
mod notifier;
mod parsing;
mod ui;

/// Entries shown by `/ledger`.
const LEDGER_PAGE: u64 = 10;

const SHUTDOWN_RETRY: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct ConfigParameters {
    engine: Arc<Engine>,
    settler: Arc<Settler>,
    directory: Arc<dyn Directory>,
    authorizer: Arc<dyn Authorizer>,
}

pub struct Bot {
    bot: teloxide::Bot,
    parameters: ConfigParameters,
}

impl Bot {
    pub fn builder() -> BotBuilder {
        BotBuilder::default()
    }

    /// Notifier sharing the bot's connection.
    pub fn notifier(&self) -> TelegramNotifier {
        TelegramNotifier::from_bot(self.bot.clone())
    }

    /// Serves updates until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        if shutdown.is_cancelled() {
            tracing::info!("shutdown requested, telegram bot not started");
            return;
        }
        tracing::info!("Starting telegram bot...");

        let handler = Update::filter_message().endpoint(handlers::handle_message);
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.parameters.clone()])
            .default_handler(|upd| async move {
                tracing::warn!("Unhandled update: {:?}", upd);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .build();

        let dispatcher_shutdown = dispatcher.shutdown_token();
        let stopper = tokio::spawn(async move {
            shutdown.cancelled().await;
            stop_when_running(|| dispatcher_shutdown.shutdown()).await;
        });

        dispatcher.dispatch().await;
        stopper.abort();
        tracing::info!("telegram bot stopped");
    }
}

/// Requests a shutdown until it is accepted. The dispatcher refuses requests
/// made before it is running.
async fn stop_when_running<F, S, E>(mut request: F)
where
    F: FnMut() -> Result<S, E>,
    S: Future<Output = ()>,
    E: std::fmt::Display,
{
    loop {
        match request() {
            Ok(stopped) => return stopped.await,
            Err(err) => {
                tracing::debug!("telegram dispatcher not running yet: {err}");
                tokio::time::sleep(SHUTDOWN_RETRY).await;
            }
        }
    }
}

#[derive(Default)]
pub struct BotBuilder {
    token: String,
    settler: Option<Arc<Settler>>,
    directory: Option<Arc<dyn Directory>>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl BotBuilder {
    pub fn token(mut self, token: &str) -> BotBuilder {
        self.token = token.to_string();
        self
    }

    /// The settler also provides the engine the commands run against.
    pub fn settler(mut self, settler: Arc<Settler>) -> BotBuilder {
        self.settler = Some(settler);
        self
    }

    pub fn directory(mut self, directory: Arc<dyn Directory>) -> BotBuilder {
        self.directory = Some(directory);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> BotBuilder {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn build(self) -> Result<Bot, String> {
        tracing::info!("Initializing telegram bot...");
        if self.token.trim().is_empty() {
            return Err("missing telegram token".to_string());
        }
        let settler = self.settler.ok_or("missing settler")?;
        let directory = self.directory.ok_or("missing group directory")?;
        let authorizer = self.authorizer.ok_or("missing authorizer")?;

        Ok(Bot {
            bot: teloxide::Bot::new(&self.token),
            parameters: ConfigParameters {
                engine: Arc::clone(settler.engine()),
                settler,
                directory,
                authorizer,
            },
        })
    }
}
