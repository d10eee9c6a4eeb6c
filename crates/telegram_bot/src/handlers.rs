use chrono::Utc;
use engine::{BalanceRecord, EngineError, Group, previous_billing_date};
use teloxide::{prelude::*, types::ChatId};

use crate::{
    ConfigParameters, LEDGER_PAGE,
    parsing::{
        Command, Direction, looks_like_adjustment, parse_adjustment, parse_alert_limit,
        parse_command, parse_threshold,
    },
    ui,
};

enum Request {
    Adjust,
    Command(Command),
}

pub(crate) async fn handle_message(
    bot: Bot,
    msg: Message,
    cfg: ConfigParameters,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let request = match parse_command(text) {
        Some(Command::Help) => {
            bot.send_message(msg.chat.id, ui::help_text()).await?;
            return Ok(());
        }
        Some(command) => Request::Command(command),
        None if looks_like_adjustment(text) => Request::Adjust,
        None => return Ok(()),
    };

    let chat_id = msg.chat.id;
    let group = match cfg.directory.group(chat_id.0).await {
        Ok(Some(group)) if serves(&request, &group) => group,
        Ok(_) if matches!(request, Request::Adjust) => {
            tracing::debug!("ignoring adjustment in chat {}: group cannot settle", chat_id.0);
            return Ok(());
        }
        Ok(_) => {
            bot.send_message(chat_id, "❌ Only upstream groups support this command.")
                .await?;
            return Ok(());
        }
        Err(err) => {
            tracing::error!("Failed to load group {}: {err}", chat_id.0);
            bot.send_message(chat_id, "❌ Failed to load the group, retry later.")
                .await?;
            return Ok(());
        }
    };

    match request {
        Request::Adjust => handle_adjustment(&bot, &msg, &cfg, &group, text).await,
        Request::Command(command) => {
            let Some(actor_id) = require_admin(&bot, &msg, &cfg).await? else {
                return Ok(());
            };
            handle_admin_command(&bot, chat_id, &cfg, &group, actor_id, command).await
        }
    }
}

async fn handle_adjustment(
    bot: &Bot,
    msg: &Message,
    cfg: &ConfigParameters,
    group: &Group,
    text: &str,
) -> ResponseResult<()> {
    let Some(actor_id) = require_admin(bot, msg, cfg).await? else {
        return Ok(());
    };
    let parsed = match parse_adjustment(text) {
        Ok(parsed) => parsed,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("❌ {err}")).await?;
            return Ok(());
        }
    };

    // Telegram may deliver the same update twice.
    let operation_id = format!("tg:{}:{}", msg.chat.id.0, msg.id.0);
    let result = match parsed.direction {
        Direction::Credit => {
            cfg.engine
                .credit(group.id, actor_id, parsed.amount, Some(&operation_id))
                .await
        }
        Direction::Debit => {
            cfg.engine
                .debit(group.id, actor_id, parsed.amount, Some(&operation_id))
                .await
        }
    };

    let reply = match result {
        Ok(adjusted) => ui::render_adjusted(&adjusted),
        Err(err) => {
            tracing::error!(
                "Failed to adjust balance of group {} by {text}: {err}",
                group.id
            );
            user_message_for_engine_error(&err)
        }
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_admin_command(
    bot: &Bot,
    chat_id: ChatId,
    cfg: &ConfigParameters,
    group: &Group,
    actor_id: i64,
    command: Command,
) -> ResponseResult<()> {
    let reply = match command {
        Command::Help => return Ok(()),
        Command::Balance => match cfg.engine.balance(group.id).await {
            Ok(record) => {
                ui::render_balance(&record.unwrap_or_else(|| BalanceRecord::empty(group.id)))
            }
            Err(err) => {
                tracing::error!("Failed to query balance of group {}: {err}", group.id);
                user_message_for_engine_error(&err)
            }
        },
        Command::Settle => {
            let now = Utc::now().with_timezone(&cfg.settler.timezone());
            let target_date = previous_billing_date(now);
            match cfg.settler.settle_daily(group, target_date).await {
                Ok(result) => ui::render_settlement(&result),
                Err(err) => {
                    tracing::error!("Manual settlement of group {} failed: {err}", group.id);
                    format!("❌ Settlement failed: {err}")
                }
            }
        }
        Command::Ledger => match cfg.engine.entries(group.id, LEDGER_PAGE).await {
            Ok(entries) => ui::render_ledger(&entries),
            Err(err) => {
                tracing::error!("Failed to list entries of group {}: {err}", group.id);
                user_message_for_engine_error(&err)
            }
        },
        Command::SetMinBalance(arg) => match parse_threshold(&arg) {
            Err(err) => format!("❌ {err}, e.g. /set_min_balance 100"),
            Ok(value) => match cfg.engine.set_min_balance(group.id, actor_id, value).await {
                Ok(record) => ui::render_min_balance_set(&record),
                Err(err) => {
                    tracing::error!("Failed to set min balance of group {}: {err}", group.id);
                    user_message_for_engine_error(&err)
                }
            },
        },
        Command::SetAlertLimit(arg) => match parse_alert_limit(&arg) {
            Err(err) => format!("❌ {err}, e.g. /set_balance_alert_limit 3"),
            Ok(limit) => match cfg.engine.set_alert_limit(group.id, actor_id, limit).await {
                Ok(record) => ui::render_alert_limit_set(&record),
                Err(err) => {
                    tracing::error!("Failed to set alert limit of group {}: {err}", group.id);
                    user_message_for_engine_error(&err)
                }
            },
        },
    };
    bot.send_message(chat_id, reply).await?;
    Ok(())
}

/// Commands are served in upstream groups; quick adjustments additionally
/// need an interface binding.
fn serves(request: &Request, group: &Group) -> bool {
    match request {
        Request::Adjust => group.is_settleable(),
        Request::Command(_) => group.tier.is_balance_bearing(),
    }
}

/// Returns the actor id when the sender is an admin, replying otherwise.
async fn require_admin(
    bot: &Bot,
    msg: &Message,
    cfg: &ConfigParameters,
) -> ResponseResult<Option<i64>> {
    let Some(actor_id) = msg
        .from
        .as_ref()
        .and_then(|user| i64::try_from(user.id.0).ok())
    else {
        bot.send_message(msg.chat.id, "Cannot identify the user.")
            .await?;
        return Ok(None);
    };

    match cfg.authorizer.is_admin(actor_id).await {
        Ok(true) => Ok(Some(actor_id)),
        Ok(false) => {
            bot.send_message(msg.chat.id, "❌ Only admins can do this.")
                .await?;
            Ok(None)
        }
        Err(err) => {
            tracing::error!("Failed to check admin permission of {actor_id}: {err}");
            bot.send_message(msg.chat.id, "❌ Permission check failed.")
                .await?;
            Ok(None)
        }
    }
}

fn user_message_for_engine_error(err: &EngineError) -> String {
    match err {
        EngineError::InvalidAmount(_) | EngineError::InvalidThreshold(_) => format!("❌ {err}"),
        EngineError::NoBindings(_) => "❌ No interface is bound to this group.".to_string(),
        EngineError::BillingUnavailable => "❌ The billing source is not configured.".to_string(),
        _ => "❌ Operation failed, retry later.".to_string(),
    }
}
