use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

pub type BoxedRuleFuture = Pin<Box<dyn Future<Output = Result<(), RuleFailure>> + Send + 'static>>;
pub type SyncRuleFn = Arc<dyn Fn(&Rule, &Value) -> bool + Send + Sync>;
pub type AsyncRuleFn = Arc<dyn Fn(&Rule, Value) -> BoxedRuleFuture + Send + Sync>;

/// Outcome of a failing async rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RuleFailure {
    /// The value is invalid; `None` falls back to the rule message.
    Invalid(Option<String>),
    /// The check itself broke down and no verdict is available.
    Fault(String),
}

#[derive(Clone, Default)]
pub struct Rule {
    pub required: bool,
    pub whitespace: bool,
    pub pattern: Option<Regex>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub len: Option<usize>,
    pub validator: Option<SyncRuleFn>,
    pub async_validator: Option<AsyncRuleFn>,
    pub message: Option<String>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Treat strings made only of whitespace as missing.
    pub fn whitespace(mut self, whitespace: bool) -> Self {
        self.whitespace = whitespace;
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn min(mut self, min: impl Into<Decimal>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn max(mut self, max: impl Into<Decimal>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }

    pub fn validator(mut self, validator: impl Fn(&Rule, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn async_validator<F, Fut>(mut self, validator: F) -> Self
    where
        F: Fn(&Rule, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RuleFailure>> + Send + 'static,
    {
        self.async_validator = Some(Arc::new(move |rule: &Rule, value: Value| {
            Box::pin(validator(rule, value)) as BoxedRuleFuture
        }));
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Debug for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("required", &self.required)
            .field("whitespace", &self.whitespace)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("min", &self.min)
            .field("max", &self.max)
            .field("len", &self.len)
            .field("validator", &self.validator.is_some())
            .field("async_validator", &self.async_validator.is_some())
            .field("message", &self.message)
            .finish()
    }
}

/// A single rule or an ordered list of rules bound to one field.
#[derive(Clone, Debug)]
pub enum Rules {
    One(Rule),
    Many(Vec<Rule>),
}

impl Rules {
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        match self {
            Rules::One(rule) => std::slice::from_ref(rule).iter(),
            Rules::Many(rules) => rules.iter(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Rules::Many(rules) if rules.is_empty())
    }
}

impl From<Rule> for Rules {
    fn from(rule: Rule) -> Self {
        Rules::One(rule)
    }
}

impl From<Vec<Rule>> for Rules {
    fn from(rules: Vec<Rule>) -> Self {
        Rules::Many(rules)
    }
}

/// Rules keyed by field path, as handed to a validator.
pub type RuleMap = BTreeMap<String, Rules>;

/// Registered fields and the rules they were mounted with. A `None` entry is
/// a mounted field without rules.
pub type RuleRegistry = BTreeMap<String, Option<Rules>>;

/// Drops fields whose rules are unset or empty.
pub(crate) fn effective_rules(registry: RuleRegistry) -> RuleMap {
    registry
        .into_iter()
        .filter_map(|(field, rules)| rules.filter(|rules| !rules.is_empty()).map(|r| (field, r)))
        .collect()
}
