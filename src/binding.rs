use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_timer::Delay;
use serde_json::{Map, Value};

use crate::controller::FormController;
use crate::error::{FormError, FormResult};
use crate::meta::FieldMeta;
use crate::path::{self, FieldPath};
use crate::rules::Rules;
use crate::validation::{ValidateOptions, ValidateOutcome};
use crate::values::SetValueOptions;

/// Validation scheduled by an input event. Resolves to `None` when the run
/// was skipped or superseded by a newer one for the same field.
pub type PendingValidation =
    Pin<Box<dyn Future<Output = FormResult<Option<ValidateOutcome>>> + Send>>;

pub type ChangeHook = Arc<dyn Fn(&ChangeInput) + Send + Sync>;
pub type BlurHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Debug)]
pub struct FieldOptions {
    pub default_value: Option<Value>,
    pub default_meta: Option<FieldMeta>,
    pub rules: Option<Rules>,
    pub validate_pristine: bool,
    pub scope: Option<String>,
    /// Key read from an event target on change, eg. `checked` for checkboxes.
    pub value_prop_key: String,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            default_value: None,
            default_meta: None,
            rules: None,
            validate_pristine: false,
            scope: None,
            value_prop_key: "value".to_string(),
        }
    }
}

impl FieldOptions {
    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn default_meta(mut self, meta: FieldMeta) -> Self {
        self.default_meta = Some(meta);
        self
    }

    pub fn rules(mut self, rules: impl Into<Rules>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    pub fn validate_pristine(mut self, validate_pristine: bool) -> Self {
        self.validate_pristine = validate_pristine;
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn value_prop_key(mut self, key: impl Into<String>) -> Self {
        self.value_prop_key = key.into();
        self
    }
}

impl FormController {
    /// Mounts a field: seeds its meta, default value, validator snapshot and
    /// rules. Mounting an already mounted field keeps its meta.
    pub fn register_field(
        &self,
        path: impl AsRef<str>,
        options: FieldOptions,
    ) -> FormResult<FieldHandle> {
        let path = path.as_ref();
        if path.is_empty() {
            return Err(FormError::MissingFieldPath);
        }
        let name = FieldPath::scoped(options.scope.as_deref(), path);

        let default_meta = options.default_meta.clone().unwrap_or_default();
        self.stores.field_meta.update("mounting field meta", |fields| {
            fields.entry(name.to_string()).or_insert(default_meta);
        })?;

        if let Some(default_value) = options.default_value.clone() {
            self.stores.values.try_update("seeding field default", |values| {
                if path::get(values, &name).is_none() {
                    path::set(values, &name, default_value)?;
                }
                Ok(())
            })?;
        }

        let current = self.field_value(&name)?.unwrap_or_default();
        self.stores
            .validate_values
            .update("mounting validate value", |snapshot| {
                snapshot.insert(name.to_string(), current);
            })?;
        self.set_rules(&name, options.rules.clone())?;

        tracing::debug!(form_id = %self.id, field = %name, "field registered");
        Ok(FieldHandle {
            form: self.clone(),
            name,
            options: Arc::new(options),
        })
    }
}

/// Per-field view of a form.
#[derive(Clone)]
pub struct FieldHandle {
    form: FormController,
    name: FieldPath,
    options: Arc<FieldOptions>,
}

impl FieldHandle {
    pub fn form(&self) -> &FormController {
        &self.form
    }

    pub fn field_name(&self) -> &FieldPath {
        &self.name
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    pub fn value(&self) -> FormResult<Option<Value>> {
        self.form.field_value(&self.name)
    }

    pub fn meta(&self) -> FormResult<FieldMeta> {
        self.form.field_meta(&self.name)
    }

    pub fn set_value(&self, value: Value) -> FormResult<()> {
        self.set_value_with(value, SetValueOptions::default())
    }

    pub fn set_value_with(&self, value: Value, options: SetValueOptions) -> FormResult<()> {
        self.form.set_field_value(&self.name, value, options)
    }

    pub fn update_value(&self, f: impl FnOnce(Option<&Value>) -> Value) -> FormResult<()> {
        self.form
            .update_field_value(&self.name, f, SetValueOptions::default())
    }

    pub fn set_meta(&self, f: impl FnOnce(&mut FieldMeta)) -> FormResult<()> {
        self.form.set_field_meta(&self.name, f)
    }

    pub fn push_value(&self, value: Value) -> FormResult<()> {
        self.form.push_field_value(&self.name, value)
    }

    pub fn insert_value(&self, index: usize, value: Value) -> FormResult<()> {
        self.form.insert_field_value(&self.name, index, value)
    }

    pub fn remove_value(&self, index: usize) -> FormResult<Option<Value>> {
        self.form.remove_field_value(&self.name, index)
    }

    pub fn swap_values(&self, first: usize, second: usize) -> FormResult<()> {
        self.form.swap_field_values(&self.name, first, second)
    }

    /// Validates this field after the debounce window. Only the most recent
    /// run for the field writes its result.
    pub async fn run_validation(&self) -> FormResult<Option<ValidateOutcome>> {
        let field = self.name.as_str();
        let ticket = self.form.next_ticket(field)?;
        self.form
            .update_registered_field_meta(field, |meta| meta.is_validating = true)?;

        let debounce = self.form.options.validation_debounce;
        if !debounce.is_zero() {
            Delay::new(debounce).await;
            if !self.form.is_latest_ticket(field, ticket)? {
                tracing::trace!(
                    form_id = %self.form.id,
                    field,
                    ticket = ticket.0,
                    "validation superseded while debouncing"
                );
                return Ok(None);
            }
        }

        let evaluation = match self.form.evaluate(&ValidateOptions::field(field)).await {
            Ok(evaluation) => evaluation,
            Err(error) => {
                if self.form.is_latest_ticket(field, ticket)? {
                    self.form.settle_ticket(field, ticket)?;
                    self.form
                        .update_registered_field_meta(field, |meta| meta.is_validating = false)?;
                }
                return Err(error);
            }
        };
        if !self.form.is_latest_ticket(field, ticket)? {
            tracing::trace!(
                form_id = %self.form.id,
                field,
                ticket = ticket.0,
                "stale validation result dropped"
            );
            return Ok(None);
        }

        self.form.settle_ticket(field, ticket)?;
        let outcome = self.form.commit(evaluation)?;
        if outcome.is_pass {
            self.form.remove_error(field)?;
        }
        Ok(Some(outcome))
    }

    /// Runs validation when the field is touched or pristine validation is
    /// enabled for the field or the form.
    pub async fn revalidate(&self) -> FormResult<Option<ValidateOutcome>> {
        let validate_pristine =
            self.options.validate_pristine || self.form.options.validate_pristine;
        if !validate_pristine && !self.meta()?.is_touched {
            return Ok(None);
        }
        self.run_validation().await
    }

    /// Field revalidation followed by form-level revalidation, so a stale
    /// form error clears once the values change. Resolves to the field
    /// outcome.
    pub fn pending_revalidation(&self) -> PendingValidation {
        let field = self.clone();
        Box::pin(async move {
            let outcome = field.revalidate().await?;
            field.form.revalidate().await?;
            Ok(outcome)
        })
    }

    pub fn input_props(&self, overrides: InputPropsOverrides) -> FormResult<InputProps> {
        let InputPropsOverrides {
            class_name,
            on_change,
            on_blur,
            extra,
        } = overrides;

        let mut class = format!(
            "headless-form-field {}",
            self.form.id.field_marker(&self.name)
        );
        if let Some(extra_class) = class_name.as_deref().map(str::trim) {
            if !extra_class.is_empty() {
                class.push(' ');
                class.push_str(extra_class);
            }
        }

        Ok(InputProps {
            value: self.value()?.unwrap_or_default(),
            class_name: class,
            extra,
            field: self.clone(),
            on_change,
            on_blur,
        })
    }

    /// Unmounts the field. Validations still in flight for it are discarded.
    pub fn unregister(&self) -> FormResult<()> {
        let field = self.name.as_str();
        self.form.retire_tickets(field)?;
        self.form.stores.field_meta.update("unmounting field meta", |fields| {
            fields.remove(field);
        })?;
        self.form.remove_rule(field)?;
        self.form
            .stores
            .validate_values
            .update("unmounting validate value", |snapshot| {
                snapshot.remove(field);
            })?;
        tracing::debug!(form_id = %self.form.id, field, "field unregistered");
        Ok(())
    }
}

impl Debug for FieldHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldHandle")
            .field("form_id", &self.form.id)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputEvent {
    pub target: Map<String, Value>,
}

impl InputEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, key: impl Into<String>, value: Value) -> Self {
        self.target.insert(key.into(), value);
        self
    }
}

/// What an input hands to `on_change`: either an event carrying a target
/// or the new value itself.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeInput {
    Event(InputEvent),
    Value(Value),
}

impl ChangeInput {
    fn extract(&self, value_prop_key: &str) -> Value {
        match self {
            ChangeInput::Event(event) => event
                .target
                .get(value_prop_key)
                .cloned()
                .unwrap_or_default(),
            ChangeInput::Value(value) => value.clone(),
        }
    }
}

impl From<InputEvent> for ChangeInput {
    fn from(event: InputEvent) -> Self {
        ChangeInput::Event(event)
    }
}

impl From<Value> for ChangeInput {
    fn from(value: Value) -> Self {
        ChangeInput::Value(value)
    }
}

#[derive(Clone, Default)]
pub struct InputPropsOverrides {
    pub class_name: Option<String>,
    pub on_change: Option<ChangeHook>,
    pub on_blur: Option<BlurHook>,
    pub extra: Map<String, Value>,
}

impl InputPropsOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Called after the form has stored the new value.
    pub fn on_change(mut self, hook: impl Fn(&ChangeInput) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(hook));
        self
    }

    pub fn on_blur(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_blur = Some(Arc::new(hook));
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl Debug for InputPropsOverrides {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPropsOverrides")
            .field("class_name", &self.class_name)
            .field("on_change", &self.on_change.is_some())
            .field("on_blur", &self.on_blur.is_some())
            .field("extra", &self.extra)
            .finish()
    }
}

/// Everything a renderer spreads onto a native input.
#[derive(Clone)]
pub struct InputProps {
    pub value: Value,
    pub class_name: String,
    pub extra: Map<String, Value>,
    field: FieldHandle,
    on_change: Option<ChangeHook>,
    on_blur: Option<BlurHook>,
}

impl InputProps {
    /// Stores the new value, marks the field touched and schedules its
    /// validation. The returned future must be polled for validation to run.
    pub fn on_change(&self, input: impl Into<ChangeInput>) -> FormResult<PendingValidation> {
        let input = input.into();
        let value = input.extract(&self.field.options.value_prop_key);
        self.field.set_value(value)?;
        if let Some(hook) = &self.on_change {
            hook(&input);
        }
        Ok(self.field.pending_revalidation())
    }

    pub fn on_blur(&self) -> FormResult<PendingValidation> {
        self.field
            .form
            .update_registered_field_meta(&self.field.name, |meta| meta.is_touched = true)?;
        if let Some(hook) = &self.on_blur {
            hook();
        }
        Ok(self.field.pending_revalidation())
    }
}

impl Debug for InputProps {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputProps")
            .field("value", &self.value)
            .field("class_name", &self.class_name)
            .field("extra", &self.extra)
            .field("field", &self.field.name)
            .finish()
    }
}
