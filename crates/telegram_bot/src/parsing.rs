use engine::MoneyCents;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Credit,
    Debit,
}

/// A `+N` / `-N` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct QuickAdjust {
    pub direction: Direction,
    pub amount: MoneyCents,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Help,
    Balance,
    Settle,
    Ledger,
    SetMinBalance(String),
    SetAlertLimit(String),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("invalid amount")]
    InvalidAmount,
    #[error("the amount must be greater than 0")]
    NotPositive,
    #[error("the threshold must be 0 or more")]
    NegativeThreshold,
    #[error("the limit must be a positive integer")]
    InvalidLimit,
    #[error("missing argument")]
    MissingArgument,
}

/// Matches `^[+-]\d+(\.\d+)?$`. Anything else is not an adjustment and is
/// ignored by the bot.
pub(crate) fn looks_like_adjustment(text: &str) -> bool {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('+').or_else(|| text.strip_prefix('-')) else {
        return false;
    };
    let (units, fraction) = match rest.split_once('.') {
        Some((units, fraction)) => (units, Some(fraction)),
        None => (rest, None),
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(units) && fraction.is_none_or(digits)
}

pub(crate) fn parse_adjustment(text: &str) -> Result<QuickAdjust, ParseError> {
    let text = text.trim();
    if !looks_like_adjustment(text) {
        return Err(ParseError::InvalidAmount);
    }
    let direction = if text.starts_with('+') {
        Direction::Credit
    } else {
        Direction::Debit
    };
    let amount = text[1..]
        .parse::<MoneyCents>()
        .map_err(|_| ParseError::InvalidAmount)?;
    if !amount.is_positive() {
        return Err(ParseError::NotPositive);
    }
    Ok(QuickAdjust { direction, amount })
}

/// Parses a slash command, accepting the `/command@bot_name` form.
pub(crate) fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim().to_string();
    let name = head.split('@').next().unwrap_or(head);

    match name {
        "/start" | "/help" => Some(Command::Help),
        "/balance" => Some(Command::Balance),
        "/settle" => Some(Command::Settle),
        "/ledger" => Some(Command::Ledger),
        "/set_min_balance" => Some(Command::SetMinBalance(arg)),
        "/set_balance_alert_limit" => Some(Command::SetAlertLimit(arg)),
        _ => None,
    }
}

pub(crate) fn parse_threshold(arg: &str) -> Result<MoneyCents, ParseError> {
    if arg.trim().is_empty() {
        return Err(ParseError::MissingArgument);
    }
    let value = arg
        .parse::<MoneyCents>()
        .map_err(|_| ParseError::InvalidAmount)?;
    if value.is_negative() {
        return Err(ParseError::NegativeThreshold);
    }
    Ok(value)
}

pub(crate) fn parse_alert_limit(arg: &str) -> Result<u32, ParseError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(ParseError::MissingArgument);
    }
    match arg.parse::<u32>() {
        Ok(limit) if limit > 0 && i32::try_from(limit).is_ok() => Ok(limit),
        _ => Err(ParseError::InvalidLimit),
    }
}
