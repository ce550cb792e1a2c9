use crate::error::ApiError;
use validator::{Validate, ValidationErrors};

pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|err| ApiError::Validation(describe(&err)))
}

/// Flattens field errors into `field: message` pairs, sorted by field name.
fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let reason = errors
                .iter()
                .find_map(|error| error.message.as_ref().map(ToString::to_string))
                .unwrap_or_else(|| {
                    errors
                        .first()
                        .map(|error| error.code.to_string())
                        .unwrap_or_else(|| "invalid".to_string())
                });
            format!("{field}: {reason}")
        })
        .collect();
    parts.sort();
    if parts.is_empty() {
        errors.to_string()
    } else {
        parts.join(", ")
    }
}
