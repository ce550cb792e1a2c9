use lostfound_domain::DomainResult;
use lostfound_domain::error::DomainError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Marker raised by `THROW` inside the resolution transaction.
pub(crate) const PROPOSAL_NOT_FOUND: &str = "proposal_not_found";

pub(crate) fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    classify_error_message(&err.to_string())
}

/// A failed transaction reports every statement as failed, and the thrown
/// marker is usually not the first of them. Scans all of them.
pub(crate) fn map_transaction_errors<I>(messages: I) -> DomainError
where
    I: IntoIterator<Item = String>,
{
    let messages: Vec<String> = messages.into_iter().collect();
    if let Some(thrown) = messages
        .iter()
        .find(|message| message.to_lowercase().contains(PROPOSAL_NOT_FOUND))
    {
        return classify_error_message(thrown);
    }
    DomainError::Unavailable(format!(
        "surreal transaction failed: {}",
        messages.join("; ").to_lowercase()
    ))
}

fn classify_error_message(message: &str) -> DomainError {
    let error_message = message.to_lowercase();
    if error_message.contains(PROPOSAL_NOT_FOUND) {
        return DomainError::NotFound("notification not found".into());
    }
    if error_message.contains("already exists")
        || error_message.contains("duplicate")
        || error_message.contains("unique")
    {
        return DomainError::Conflict("record already exists".into());
    }
    DomainError::Unavailable(format!("surreal query failed: {error_message}"))
}

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, label: &str) -> DomainResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value::<T>(row)
                .map_err(|err| DomainError::Unavailable(format!("invalid {label} row: {err}")))
        })
        .collect()
}

pub(crate) fn decode_count(rows: Vec<Value>, field: &str) -> DomainResult<usize> {
    let Some(row) = rows.into_iter().next() else {
        return Ok(0);
    };
    let Some(value) = row.get(field) else {
        return Err(DomainError::Unavailable(format!("{field} missing")));
    };
    let count = value
        .as_u64()
        .or_else(|| value.as_i64().and_then(|value| value.try_into().ok()))
        .ok_or_else(|| DomainError::Unavailable(format!("invalid {field}")))?;
    Ok(count as usize)
}

pub(crate) fn to_payload<T: serde::Serialize>(row: &T) -> DomainResult<Value> {
    serde_json::to_value(row)
        .map_err(|err| DomainError::Validation(format!("invalid payload: {err}")))
}

pub(crate) fn invalid_result(err: surrealdb::Error) -> DomainError {
    DomainError::Unavailable(format!("invalid query result: {err}"))
}
