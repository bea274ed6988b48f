pub mod duplicate_photo;
pub mod multi_account;
pub mod price_spike;

use crate::error::{EngineError, EngineResult};
use serde::de::DeserializeOwned;

/// Deserialize a rule's parameter map into the checker's param struct.
/// A null/absent map means "all defaults"; a malformed map is a checker
/// error (the engine logs it and moves on to the next rule).
pub(crate) fn parse_params<T: DeserializeOwned + Default>(
    checker: &str,
    raw: &serde_json::Value,
) -> EngineResult<T> {
    if raw.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(raw.clone()).map_err(|e| EngineError::Checker {
        checker: checker.to_string(),
        message: format!("bad parameters: {e}"),
    })
}
