//! Internal helpers for model validation and conversion.

use crate::{Currency, EngineError, ResultEngine};

/// Parse a currency code stored in the DB into a strongly typed `Currency`.
pub(crate) fn model_currency(value: &str) -> ResultEngine<Currency> {
    Currency::try_from(value)
        .map_err(|_| EngineError::CurrencyMismatch(format!("invalid stored currency: {value}")))
}

/// Ensure a transfer stays within one currency. Amounts are interpreted in
/// the sender's currency and are never converted.
pub(crate) fn ensure_same_currency(sender: Currency, recipient: Currency) -> ResultEngine<()> {
    if sender != recipient {
        return Err(EngineError::CurrencyMismatch(format!(
            "sender account is {}, recipient account is {}",
            sender.code(),
            recipient.code()
        )));
    }
    Ok(())
}
