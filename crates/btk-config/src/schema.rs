//! Strategy parameter schemas: `{type, required, min, max, enum}` rules
//! checked against a parameter blob before a run starts, so a malformed
//! sweep config fails fast instead of mid-replay.

use std::collections::BTreeMap;

use btk_strategy::StrategyError;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterType {
    Integer,
    Float,
    Bool,
    String,
}

#[derive(Clone, Debug, Default)]
pub struct ParameterSchema {
    pub required: bool,
    pub kind: Option<ParameterType>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed: Option<Vec<String>>,
}

impl ParameterSchema {
    pub fn new(kind: ParameterType) -> ParameterSchema {
        ParameterSchema { required: false, kind: Some(kind), min: None, max: None, allowed: None }
    }

    pub fn required(mut self) -> ParameterSchema {
        self.required = true;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> ParameterSchema {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn one_of(mut self, allowed: &[&str]) -> ParameterSchema {
        self.allowed = Some(allowed.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// Validates `params` against `schemas`, field name to rule. Returns every
/// violation found rather than stopping at the first, matching the
/// `Strategy::validate_parameters` contract it feeds into.
pub fn validate_parameters(params: &Value, schemas: &BTreeMap<String, ParameterSchema>) -> Result<(), Vec<StrategyError>> {
    let mut errors = Vec::new();
    let obj = params.as_object();

    for (field, schema) in schemas {
        let value = obj.and_then(|o| o.get(field));

        let value = match value {
            Some(v) => v,
            None => {
                if schema.required {
                    errors.push(StrategyError { field: field.clone(), reason: "missing required parameter".to_string() });
                }
                continue;
            }
        };

        if let Some(kind) = schema.kind {
            if !matches_type(value, kind) {
                errors.push(StrategyError { field: field.clone(), reason: format!("expected {kind:?}") });
                continue;
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = schema.min {
                if n < min {
                    errors.push(StrategyError { field: field.clone(), reason: format!("{n} below minimum {min}") });
                }
            }
            if let Some(max) = schema.max {
                if n > max {
                    errors.push(StrategyError { field: field.clone(), reason: format!("{n} above maximum {max}") });
                }
            }
        }

        if let Some(allowed) = &schema.allowed {
            if let Some(s) = value.as_str() {
                if !allowed.iter().any(|a| a == s) {
                    errors.push(StrategyError { field: field.clone(), reason: format!("{s} not one of {allowed:?}") });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn matches_type(value: &Value, kind: ParameterType) -> bool {
    match kind {
        ParameterType::Integer => value.is_i64() || value.is_u64(),
        ParameterType::Float => value.is_number(),
        ParameterType::Bool => value.is_boolean(),
        ParameterType::String => value.is_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schemas() -> BTreeMap<String, ParameterSchema> {
        let mut m = BTreeMap::new();
        m.insert("min_range_size".to_string(), ParameterSchema::new(ParameterType::Float).required().range(0.0, 1.0));
        m.insert("mode".to_string(), ParameterSchema::new(ParameterType::String).one_of(&["long", "short", "both"]));
        m
    }

    #[test]
    fn valid_parameters_pass() {
        let params = json!({"min_range_size": 0.002, "mode": "long"});
        assert!(validate_parameters(&params, &schemas()).is_ok());
    }

    #[test]
    fn missing_required_field_is_reported() {
        let params = json!({"mode": "long"});
        let errors = validate_parameters(&params, &schemas()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "min_range_size");
    }

    #[test]
    fn out_of_range_and_bad_enum_both_reported() {
        let params = json!({"min_range_size": 5.0, "mode": "sideways"});
        let errors = validate_parameters(&params, &schemas()).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
