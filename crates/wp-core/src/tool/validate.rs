//! Request validation against an action's parameter specs

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::dom::{ElementIndex, Snapshot};

use super::definition::{ActionSpec, ParamKind, ParamSpec, Predicate};
use super::traits::JsonMap;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("{action}: missing required parameter '{param}'")]
    MissingParam { action: String, param: String },

    #[error("{action}: unexpected parameter '{param}'")]
    UnexpectedParam { action: String, param: String },

    #[error("{action}: parameter '{param}' must be {expected}")]
    TypeMismatch {
        action: String,
        param: String,
        expected: String,
    },

    #[error("{action}: parameter '{param}' {reason}")]
    Predicate {
        action: String,
        param: String,
        reason: String,
    },

    #[error("{action}: element {index} does not exist on the current page")]
    UnknownElement { action: String, index: u64 },

    #[error("'{0}' is a browser action and cannot be fanned out")]
    NotFanOut(String),
}

/// Check `params` against `spec`. `snapshot` resolves element indices.
pub fn validate_params(
    spec: &ActionSpec,
    params: &JsonMap,
    snapshot: Option<&Snapshot>,
) -> Result<(), ValidationError> {
    if let Some(key) = params.keys().find(|k| spec.param_spec(k).is_none()) {
        return Err(ValidationError::UnexpectedParam {
            action: spec.name.clone(),
            param: key.clone(),
        });
    }

    for param in &spec.params {
        match params.get(&param.name) {
            None | Some(JsonValue::Null) if param.required => {
                return Err(ValidationError::MissingParam {
                    action: spec.name.clone(),
                    param: param.name.clone(),
                });
            }
            None | Some(JsonValue::Null) => {}
            Some(value) => check_value(spec, param, value, snapshot)?,
        }
    }

    Ok(())
}

fn as_integer(value: &JsonValue) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

fn check_value(
    spec: &ActionSpec,
    param: &ParamSpec,
    value: &JsonValue,
    snapshot: Option<&Snapshot>,
) -> Result<(), ValidationError> {
    let mismatch = |expected: &str| ValidationError::TypeMismatch {
        action: spec.name.clone(),
        param: param.name.clone(),
        expected: expected.to_string(),
    };
    let failed = |reason: String| ValidationError::Predicate {
        action: spec.name.clone(),
        param: param.name.clone(),
        reason,
    };

    match &param.kind {
        ParamKind::String => {
            value.as_str().ok_or_else(|| mismatch("a string"))?;
        }
        ParamKind::Integer => {
            as_integer(value).ok_or_else(|| mismatch("an integer"))?;
        }
        ParamKind::Number => {
            value.as_f64().ok_or_else(|| mismatch("a number"))?;
        }
        ParamKind::Boolean => {
            value.as_bool().ok_or_else(|| mismatch("a boolean"))?;
        }
        ParamKind::Enum(values) => {
            let s = value.as_str().ok_or_else(|| mismatch("a string"))?;
            if !values.iter().any(|v| v == s) {
                return Err(mismatch(&format!("one of [{}]", values.join(", "))));
            }
        }
        ParamKind::Url => {
            let s = value.as_str().ok_or_else(|| mismatch("a URL string"))?;
            reqwest::Url::parse(s).map_err(|e| failed(format!("is not a valid URL ({})", e)))?;
        }
        ParamKind::ElementIndex => {
            let index = as_integer(value)
                .filter(|i| *i >= 0 && *i <= u32::MAX as i64)
                .ok_or_else(|| mismatch("a non-negative element index"))?;
            let exists = snapshot.is_some_and(|s| s.contains(ElementIndex(index as u32)));
            if !exists {
                return Err(ValidationError::UnknownElement {
                    action: spec.name.clone(),
                    index: index as u64,
                });
            }
        }
        ParamKind::Json => {}
    }

    for predicate in &param.predicates {
        match predicate {
            Predicate::NonEmpty => {
                let empty = match value {
                    JsonValue::String(s) => s.trim().is_empty(),
                    JsonValue::Array(a) => a.is_empty(),
                    JsonValue::Object(o) => o.is_empty(),
                    _ => false,
                };
                if empty {
                    return Err(failed("must not be empty".to_string()));
                }
            }
            Predicate::MinInt(min) => {
                if as_integer(value).is_some_and(|v| v < *min) {
                    return Err(failed(format!("must be >= {}", min)));
                }
            }
            Predicate::MaxInt(max) => {
                if as_integer(value).is_some_and(|v| v > *max) {
                    return Err(failed(format!("must be <= {}", max)));
                }
            }
            Predicate::MaxLength(max) => {
                if value.as_str().is_some_and(|s| s.chars().count() > *max) {
                    return Err(failed(format!("must be at most {} characters", max)));
                }
            }
            Predicate::Pattern(re) => {
                if value.as_str().is_some_and(|s| !re.is_match(s)) {
                    return Err(failed(format!("must match /{}/", re.as_str())));
                }
            }
            Predicate::Interactive => {
                let node = as_integer(value)
                    .and_then(|i| snapshot.and_then(|s| s.node(ElementIndex(i as u32))));
                if !node.is_some_and(|n| n.is_interactive()) {
                    return Err(failed("must reference an interactive element".to_string()));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::snapshot_with;
    use regex::Regex;
    use serde_json::json;

    fn click_spec() -> ActionSpec {
        ActionSpec::new("click", "Click an element").param(
            ParamSpec::new("index", ParamKind::ElementIndex).with(Predicate::Interactive),
        )
    }

    fn params(value: JsonValue) -> JsonMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_element_index_checks() {
        // index 0: heading (not interactive), index 1: button
        let snapshot = snapshot_with(&[("h1", "Title", false), ("button", "Next", true)]);
        let spec = click_spec();

        assert!(validate_params(&spec, &params(json!({"index": 1})), Some(&snapshot)).is_ok());

        let err = validate_params(&spec, &params(json!({"index": 0})), Some(&snapshot)).unwrap_err();
        assert!(matches!(err, ValidationError::Predicate { .. }));

        let err = validate_params(&spec, &params(json!({"index": 42})), Some(&snapshot)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownElement {
                action: "click".to_string(),
                index: 42
            }
        );

        let err = validate_params(&spec, &params(json!({"index": "1"})), Some(&snapshot)).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));

        let err = validate_params(&spec, &params(json!({"index": 1})), None).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownElement { .. }));
    }

    #[test]
    fn test_missing_and_unexpected() {
        let spec = click_spec();
        let err = validate_params(&spec, &JsonMap::new(), None).unwrap_err();
        assert_eq!(err.to_string(), "click: missing required parameter 'index'");

        let err = validate_params(&spec, &params(json!({"index": null})), None).unwrap_err();
        assert!(matches!(err, ValidationError::MissingParam { .. }));

        let err = validate_params(&spec, &params(json!({"selector": "#go"})), None).unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedParam { .. }));
    }

    #[test]
    fn test_predicates() {
        let spec = ActionSpec::new("search", "Search")
            .param(
                ParamSpec::new("query", ParamKind::String)
                    .with(Predicate::NonEmpty)
                    .with(Predicate::MaxLength(5)),
            )
            .param(
                ParamSpec::new("page", ParamKind::Integer)
                    .optional()
                    .with(Predicate::MinInt(1))
                    .with(Predicate::MaxInt(10)),
            )
            .param(
                ParamSpec::new("code", ParamKind::String)
                    .optional()
                    .with(Predicate::Pattern(Regex::new(r"^[A-Z]{3}$").unwrap())),
            );

        assert!(validate_params(&spec, &params(json!({"query": "shoes", "page": 2})), None).is_ok());
        assert!(validate_params(&spec, &params(json!({"query": "   "})), None).is_err());
        assert!(validate_params(&spec, &params(json!({"query": "sneakers"})), None).is_err());
        assert!(validate_params(&spec, &params(json!({"query": "a", "page": 0})), None).is_err());
        assert!(validate_params(&spec, &params(json!({"query": "a", "page": 11})), None).is_err());
        assert!(validate_params(&spec, &params(json!({"query": "a", "code": "ABC"})), None).is_ok());
        assert!(validate_params(&spec, &params(json!({"query": "a", "code": "abc"})), None).is_err());
    }

    #[test]
    fn test_enum_and_url() {
        let spec = ActionSpec::new("go", "Go")
            .param(ParamSpec::new("url", ParamKind::Url))
            .param(ParamSpec::new("mode", ParamKind::Enum(vec!["tab".into(), "same".into()])).optional());

        assert!(validate_params(&spec, &params(json!({"url": "https://example.com"})), None).is_ok());
        assert!(validate_params(&spec, &params(json!({"url": "not a url"})), None).is_err());
        let err = validate_params(
            &spec,
            &params(json!({"url": "https://example.com", "mode": "window"})),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "go: parameter 'mode' must be one of [tab, same]");
    }
}
