use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::controller::FormController;
use crate::error::{FormError, FormResult};
use crate::path;
use crate::rules::{RuleMap, Rules, effective_rules};
use crate::store::{read_lock, write_lock};
use crate::validator::{FieldError, ValidationReport, ValidatorError, ValueMap};

/// Last validator-surfaced message per field path.
pub type ErrorMap = BTreeMap<String, String>;

/// Which fields a validation pass covers. A single field wins over a list,
/// a list wins over explicit values, and explicit values win over the
/// default of every registered field.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FieldSelection {
    #[default]
    All,
    Field(String),
    Fields(Vec<String>),
    /// Explicit values, for fields that may not be registered.
    FieldsValue(ValueMap),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidateOptions {
    pub selection: FieldSelection,
    pub excluded_fields: Vec<String>,
    pub reset_error: bool,
    pub scroll: bool,
}

impl ValidateOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn field(field: impl Into<String>) -> Self {
        Self {
            selection: FieldSelection::Field(field.into()),
            ..Self::default()
        }
    }

    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selection: FieldSelection::Fields(fields.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn fields_value(values: ValueMap) -> Self {
        Self {
            selection: FieldSelection::FieldsValue(values),
            ..Self::default()
        }
    }

    pub fn excluding<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Replace the error map instead of merging into it, and clear errors of
    /// validated fields that pass.
    pub fn reset_error(mut self, reset_error: bool) -> Self {
        self.reset_error = reset_error;
        self
    }

    pub fn scroll(mut self, scroll: bool) -> Self {
        self.scroll = scroll;
        self
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidateOutcome {
    pub is_pass: bool,
    pub errors: Vec<FieldError>,
    pub fields: BTreeMap<String, Vec<FieldError>>,
}

impl ValidateOutcome {
    fn passed() -> Self {
        Self {
            is_pass: true,
            ..Self::default()
        }
    }

    pub fn first_error(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|errors| errors.first())
            .map(|error| error.message.as_str())
    }
}

impl From<ValidationReport> for ValidateOutcome {
    fn from(report: ValidationReport) -> Self {
        Self {
            is_pass: false,
            errors: report.errors,
            fields: report.fields,
        }
    }
}

/// Locates rendered field elements by their marker class.
pub trait ErrorScroller: Send + Sync + 'static {
    /// Vertical offset of the element carrying `marker`, if it is rendered.
    fn offset_top(&self, marker: &str) -> Option<f64>;
    fn scroll_into_view(&self, marker: &str);
}

/// A finished validator run that has not been written back to the stores.
pub(crate) struct Evaluation {
    prior_errors: Arc<ErrorMap>,
    validated: BTreeSet<String>,
    report: Option<ValidationReport>,
    reset_error: bool,
    scroll: bool,
}

impl FormController {
    pub async fn validate(&self, options: ValidateOptions) -> FormResult<ValidateOutcome> {
        let evaluation = self.evaluate(&options).await?;
        self.commit(evaluation)
    }

    pub(crate) async fn evaluate(&self, options: &ValidateOptions) -> FormResult<Evaluation> {
        let snapshot_values = self.stores.validate_values.get()?;
        let registry = self.stores.rules.get()?;
        let prior_errors = self.stores.errors.get()?;

        let excluded = options
            .excluded_fields
            .iter()
            .map(String::as_str)
            .collect::<BTreeSet<_>>();

        let (mut values, mut validated) = match &options.selection {
            FieldSelection::Field(field) => {
                let values = self.pick_values(&snapshot_values, std::slice::from_ref(field))?;
                (values, BTreeSet::from([field.clone()]))
            }
            FieldSelection::Fields(fields) => {
                let values = self.pick_values(&snapshot_values, fields)?;
                (values, fields.iter().cloned().collect())
            }
            FieldSelection::FieldsValue(values) => (values.clone(), values.keys().cloned().collect()),
            FieldSelection::All => {
                let validated = snapshot_values
                    .keys()
                    .chain(registry.keys())
                    .chain(prior_errors.keys())
                    .cloned()
                    .collect();
                (ValueMap::clone(&snapshot_values), validated)
            }
        };
        values.retain(|field, _| !excluded.contains(field.as_str()));
        validated.retain(|field| !excluded.contains(field.as_str()));

        let mut registry = (*registry).clone();
        if !matches!(options.selection, FieldSelection::All) {
            registry.retain(|field, _| validated.contains(field));
        }
        registry.retain(|field, _| !excluded.contains(field.as_str()));
        let rules: RuleMap = effective_rules(registry);

        let report = match self.validator.validate(&rules, &values).await {
            Ok(()) => None,
            Err(ValidatorError::Failed(report)) => Some(report),
            Err(ValidatorError::Fault(reason)) => {
                tracing::warn!(form_id = %self.id, %reason, "validator faulted");
                return Err(FormError::ValidatorFault(reason));
            }
        };
        tracing::trace!(
            form_id = %self.id,
            fields = validated.len(),
            failed = report.as_ref().map_or(0, |report| report.fields.len()),
            "validation evaluated"
        );

        Ok(Evaluation {
            prior_errors,
            validated,
            report,
            reset_error: options.reset_error,
            scroll: options.scroll,
        })
    }

    pub(crate) fn commit(&self, evaluation: Evaluation) -> FormResult<ValidateOutcome> {
        let Evaluation {
            prior_errors,
            validated,
            report,
            reset_error,
            scroll,
        } = evaluation;

        let outcome = match report {
            Some(report) => {
                let mut errors = if reset_error {
                    ErrorMap::new()
                } else {
                    ErrorMap::clone(&prior_errors)
                };
                for (field, field_errors) in &report.fields {
                    if let Some(first) = field_errors.first() {
                        errors.insert(field.clone(), first.message.clone());
                    }
                }
                let failing = errors.keys().cloned().collect::<Vec<_>>();
                self.stores.errors.replace("merging validation errors", errors)?;
                if scroll {
                    self.scroll_to_errors(&failing)?;
                }
                ValidateOutcome::from(report)
            }
            None => {
                if reset_error {
                    self.stores.errors.update("clearing validated errors", |errors| {
                        errors.retain(|field, _| !validated.contains(field));
                    })?;
                }
                ValidateOutcome::passed()
            }
        };

        // A field whose own debounced run is pending keeps reporting it.
        let in_flight = self.validations_in_flight()?;
        self.stores.field_meta.update("writing validation meta", |fields| {
            for field in &validated {
                if let Some(meta) = fields.get_mut(field) {
                    meta.error = outcome.first_error(field).unwrap_or_default().to_string();
                    if !in_flight.contains(field) {
                        meta.is_validating = false;
                    }
                }
            }
        })?;
        Ok(outcome)
    }

    fn pick_values(&self, snapshot: &ValueMap, fields: &[String]) -> FormResult<ValueMap> {
        let tree = self.stores.values.get()?;
        Ok(fields
            .iter()
            .map(|field| {
                let value = snapshot
                    .get(field)
                    .or_else(|| path::get(&tree, field))
                    .cloned()
                    .unwrap_or_default();
                (field.clone(), value)
            })
            .collect())
    }

    fn scroll_to_errors(&self, failing: &[String]) -> FormResult<()> {
        let Some(scroller) = read_lock(&self.error_scroller, "reading error scroller")?.clone()
        else {
            return Ok(());
        };
        let topmost = failing
            .iter()
            .map(|field| self.id.field_marker(field))
            .filter_map(|marker| scroller.offset_top(&marker).map(|top| (top, marker)))
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((_, marker)) = topmost {
            tracing::debug!(form_id = %self.id, %marker, "scrolling to first error");
            scroller.scroll_into_view(&marker);
        }
        Ok(())
    }

    pub fn set_error_scroller(&self, scroller: impl ErrorScroller) -> FormResult<()> {
        *write_lock(&self.error_scroller, "registering error scroller")? = Some(Arc::new(scroller));
        Ok(())
    }

    pub fn errors(&self) -> FormResult<Arc<ErrorMap>> {
        self.stores.errors.get()
    }

    pub fn set_errors(&self, f: impl FnOnce(&mut ErrorMap)) -> FormResult<()> {
        self.stores.errors.update("setting errors", f)
    }

    pub fn remove_error(&self, field: impl AsRef<str>) -> FormResult<()> {
        let field = field.as_ref();
        self.stores.errors.update("removing error", |errors| {
            errors.remove(field);
        })
    }

    pub fn remove_errors<I, S>(&self, fields: I) -> FormResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = fields.into_iter().collect::<Vec<_>>();
        self.stores.errors.update("removing errors", |errors| {
            for field in &fields {
                errors.remove(field.as_ref());
            }
        })
    }

    pub fn reset_errors(&self) -> FormResult<()> {
        self.stores.errors.reset("resetting errors")
    }

    pub fn rule(&self, field: impl AsRef<str>) -> FormResult<Option<Rules>> {
        Ok(self
            .stores
            .rules
            .get()?
            .get(field.as_ref())
            .cloned()
            .flatten())
    }

    /// Effective rules of `fields`, or of every registered field.
    pub fn rules(&self, fields: Option<&[&str]>) -> FormResult<RuleMap> {
        let mut registry = (*self.stores.rules.get()?).clone();
        if let Some(fields) = fields {
            registry.retain(|field, _| fields.contains(&field.as_str()));
        }
        Ok(effective_rules(registry))
    }

    pub fn set_rules(&self, field: impl AsRef<str>, rules: Option<Rules>) -> FormResult<()> {
        let field = field.as_ref();
        self.stores.rules.update("setting rules", |registry| {
            registry.insert(field.to_string(), rules);
        })
    }

    pub fn remove_rule(&self, field: impl AsRef<str>) -> FormResult<()> {
        let field = field.as_ref();
        self.stores.rules.update("removing rule", |registry| {
            registry.remove(field);
        })
    }

    pub fn remove_rules<I, S>(&self, fields: I) -> FormResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = fields.into_iter().collect::<Vec<_>>();
        self.stores.rules.update("removing rules", |registry| {
            for field in &fields {
                registry.remove(field.as_ref());
            }
        })
    }
}
