use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::rules::{Rule, RuleFailure, RuleMap};

pub type ValueMap = BTreeMap<String, Value>;

pub type BoxedValidatorFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), ValidatorError>> + Send + 'a>>;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Failures reported by a validator, in reporting order and grouped per field.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
    pub fields: BTreeMap<String, Vec<FieldError>>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        let mut fields = BTreeMap::<String, Vec<FieldError>>::new();
        for error in &errors {
            fields
                .entry(error.field.clone())
                .or_default()
                .push(error.clone());
        }
        Self { errors, fields }
    }

    pub fn first_message(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|errors| errors.first())
            .map(|error| error.message.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidatorError {
    /// Some fields failed their rules.
    Failed(ValidationReport),
    /// The validator broke down without reporting field failures.
    Fault(String),
}

/// Executes rules against values. The form hands over only the fields a
/// validation pass selected.
pub trait Validator: Send + Sync + 'static {
    fn validate<'a>(&'a self, rules: &'a RuleMap, values: &'a ValueMap)
    -> BoxedValidatorFuture<'a>;
}

/// Default rule executor: `required`, `whitespace`, `pattern`, `len`,
/// `min`/`max` and custom sync/async validators.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate<'a>(
        &'a self,
        rules: &'a RuleMap,
        values: &'a ValueMap,
    ) -> BoxedValidatorFuture<'a> {
        Box::pin(async move {
            let mut errors = Vec::new();
            for (field, field_rules) in rules {
                let value = values.get(field).cloned().unwrap_or(Value::Null);
                for rule in field_rules.iter() {
                    match check_rule(field, rule, &value).await {
                        Ok(()) => {}
                        Err(RuleFailure::Invalid(message)) => errors.push(FieldError {
                            field: field.clone(),
                            message: message.unwrap_or_else(|| default_message(field, rule)),
                        }),
                        Err(RuleFailure::Fault(reason)) => {
                            return Err(ValidatorError::Fault(reason));
                        }
                    }
                }
            }
            if errors.is_empty() {
                Ok(())
            } else {
                Err(ValidatorError::Failed(ValidationReport::from_errors(errors)))
            }
        })
    }
}

async fn check_rule(field: &str, rule: &Rule, value: &Value) -> Result<(), RuleFailure> {
    let invalid = |fallback: String| {
        Err(RuleFailure::Invalid(Some(
            rule.message.clone().unwrap_or(fallback),
        )))
    };

    if is_missing(value, rule.whitespace) {
        if rule.required {
            return invalid(format!("{field} is required"));
        }
    } else {
        if let (Some(pattern), Value::String(text)) = (&rule.pattern, value) {
            if !pattern.is_match(text) {
                return invalid(format!(
                    "{field} value {text} does not match pattern {}",
                    pattern.as_str()
                ));
            }
        }
        if let Some(measure) = measure(value) {
            if let Some(len) = rule.len {
                if measure != Decimal::from(len) {
                    return invalid(format!("{field} must be exactly {len} in length"));
                }
            }
            if let Some(min) = rule.min {
                if measure < min {
                    return invalid(format!("{field} cannot be less than {min}"));
                }
            }
            if let Some(max) = rule.max {
                if measure > max {
                    return invalid(format!("{field} cannot be greater than {max}"));
                }
            }
        }
    }

    if let Some(validator) = &rule.validator {
        if !validator(rule, value) {
            return Err(RuleFailure::Invalid(None));
        }
    }
    if let Some(validator) = &rule.async_validator {
        validator(rule, value.clone()).await?;
    }
    Ok(())
}

fn default_message(field: &str, rule: &Rule) -> String {
    rule.message
        .clone()
        .unwrap_or_else(|| format!("Validation error on field {field}"))
}

fn is_missing(value: &Value, whitespace: bool) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty() || (whitespace && text.trim().is_empty()),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Numbers compare by value, strings by character count, arrays by length.
fn measure(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => {
            let text = number.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(text) => Some(Decimal::from(text.chars().count())),
        Value::Array(items) => Some(Decimal::from(items.len())),
        _ => None,
    }
}
