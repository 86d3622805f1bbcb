use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FormResult;
use crate::id::FormId;
use crate::meta::{DerivedMeta, FieldMeta, FieldMetaMap, FormMeta, compute_derived_meta};
use crate::rules::RuleRegistry;
use crate::store::{Atom, SubscriptionId, read_lock, write_lock};
use crate::validation::{ErrorMap, ErrorScroller, ValidateOptions};
use crate::validator::{FieldError, RuleValidator, Validator, ValueMap};

pub const DEFAULT_VALIDATION_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// Latest field-validation ticket per field. Tickets come from one counter
/// per session so a retired field never reuses a ticket still in flight.
#[derive(Debug, Default)]
pub(crate) struct TicketLedger {
    pub(crate) issued: u64,
    pub(crate) latest: BTreeMap<String, ValidationTicket>,
    pub(crate) in_flight: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormOptions {
    pub default_values: Value,
    /// Run form-level validation before the form has been touched.
    pub validate_pristine: bool,
    /// Trailing quiet period before a field validation runs.
    pub validation_debounce: Duration,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            default_values: Value::Object(Map::new()),
            validate_pristine: false,
            validation_debounce: DEFAULT_VALIDATION_DEBOUNCE,
        }
    }
}

impl FormOptions {
    pub fn with_model<T: Serialize>(mut self, model: &T) -> FormResult<Self> {
        self.default_values = serde_json::to_value(model)?;
        Ok(self)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// The form was not valid when submit was requested; nothing ran.
    Refused,
    /// Field or form validation failed during submit.
    Rejected {
        errors: Vec<FieldError>,
        form_error: Option<String>,
    },
    Submitted,
}

pub(crate) type BoxedFormFuture = Pin<Box<dyn Future<Output = Option<String>> + Send>>;
pub(crate) type FormValidatorFn = Arc<dyn Fn(Value) -> BoxedFormFuture + Send + Sync>;

/// The independent state slices of one session, each under its own
/// session-namespaced key.
#[derive(Clone)]
pub(crate) struct FormStores {
    pub(crate) values: Atom<Value>,
    pub(crate) default_values: Atom<Value>,
    pub(crate) validate_values: Atom<ValueMap>,
    pub(crate) rules: Atom<RuleRegistry>,
    pub(crate) errors: Atom<ErrorMap>,
    pub(crate) form_meta: Atom<FormMeta>,
    pub(crate) field_meta: Atom<FieldMetaMap>,
}

impl FormStores {
    fn new(id: &FormId, default_values: &Value) -> FormResult<Self> {
        let stores = Self {
            values: Atom::new(id.store_key("values"), Value::Object(Map::new())),
            default_values: Atom::new(id.store_key("defaultValues"), Value::Object(Map::new())),
            validate_values: Atom::new(id.store_key("validateValues"), ValueMap::new()),
            rules: Atom::new(id.store_key("rules"), RuleRegistry::new()),
            errors: Atom::new(id.store_key("errors"), ErrorMap::new()),
            form_meta: Atom::new(id.store_key("formMeta"), FormMeta::default()),
            field_meta: Atom::new(id.store_key("fieldMeta"), FieldMetaMap::new()),
        };
        stores
            .default_values
            .replace("seeding default values", default_values.clone())?;
        stores
            .values
            .replace("seeding values", default_values.clone())?;
        Ok(stores)
    }
}

#[derive(Clone)]
pub struct FormController {
    pub(crate) id: FormId,
    pub(crate) options: Arc<FormOptions>,
    pub(crate) stores: FormStores,
    pub(crate) validator: Arc<dyn Validator>,
    pub(crate) form_validator: Arc<RwLock<Option<FormValidatorFn>>>,
    pub(crate) error_scroller: Arc<RwLock<Option<Arc<dyn ErrorScroller>>>>,
    pub(crate) tickets: Arc<RwLock<TicketLedger>>,
}

impl FormController {
    pub fn new(options: FormOptions) -> FormResult<Self> {
        let id = FormId::random();
        let stores = FormStores::new(&id, &options.default_values)?;
        tracing::debug!(form_id = %id, "form session created");
        Ok(Self {
            id,
            options: Arc::new(options),
            stores,
            validator: Arc::new(RuleValidator),
            form_validator: Arc::new(RwLock::new(None)),
            error_scroller: Arc::new(RwLock::new(None)),
            tickets: Arc::new(RwLock::new(TicketLedger::default())),
        })
    }

    /// Replaces the rule executor used by every validation pass.
    pub fn with_validator(mut self, validator: impl Validator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn form_id(&self) -> &FormId {
        &self.id
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn meta(&self) -> FormResult<DerivedMeta> {
        let form_meta = self.stores.form_meta.get()?;
        let field_meta = self.stores.field_meta.get()?;
        Ok(compute_derived_meta(&form_meta, &field_meta))
    }

    pub fn form_meta(&self) -> FormResult<Arc<FormMeta>> {
        self.stores.form_meta.get()
    }

    pub fn set_form_meta(&self, f: impl FnOnce(&mut FormMeta)) -> FormResult<()> {
        self.stores.form_meta.update("writing form meta", f)
    }

    pub fn reset_form_meta(&self, meta: Option<FormMeta>) -> FormResult<()> {
        match meta {
            Some(meta) => self.stores.form_meta.replace("resetting form meta", meta),
            None => self.stores.form_meta.reset("resetting form meta"),
        }
    }

    /// Meta of `path`, or the default meta when the field has none.
    pub fn field_meta(&self, path: impl AsRef<str>) -> FormResult<FieldMeta> {
        Ok(self
            .stores
            .field_meta
            .get()?
            .get(path.as_ref())
            .cloned()
            .unwrap_or_default())
    }

    pub fn field_meta_map(&self) -> FormResult<Arc<FieldMetaMap>> {
        self.stores.field_meta.get()
    }

    /// Updates the meta of `path`, creating the entry when it is missing.
    pub fn set_field_meta(
        &self,
        path: impl AsRef<str>,
        f: impl FnOnce(&mut FieldMeta),
    ) -> FormResult<()> {
        let path = path.as_ref();
        self.stores.field_meta.update("writing field meta", |fields| {
            f(fields.entry(path.to_string()).or_default());
        })
    }

    /// Like `set_field_meta` but never resurrects the entry of a field that
    /// is no longer registered. Returns whether the write happened.
    pub(crate) fn update_registered_field_meta(
        &self,
        path: &str,
        f: impl FnOnce(&mut FieldMeta),
    ) -> FormResult<bool> {
        let written = self
            .stores
            .field_meta
            .update("writing registered field meta", |fields| {
                fields.get_mut(path).map(f).is_some()
            })?;
        if !written {
            tracing::trace!(form_id = %self.id, field = path, "skipped meta write for unregistered field");
        }
        Ok(written)
    }

    pub fn subscribe_values(
        &self,
        listener: impl Fn(&Arc<Value>) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        self.stores.values.subscribe(listener)
    }

    pub fn unsubscribe_values(&self, id: SubscriptionId) -> FormResult<bool> {
        self.stores.values.unsubscribe(id)
    }

    pub fn subscribe_field_meta(
        &self,
        listener: impl Fn(&Arc<FieldMetaMap>) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        self.stores.field_meta.subscribe(listener)
    }

    pub fn unsubscribe_field_meta(&self, id: SubscriptionId) -> FormResult<bool> {
        self.stores.field_meta.unsubscribe(id)
    }

    pub fn subscribe_errors(
        &self,
        listener: impl Fn(&Arc<ErrorMap>) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        self.stores.errors.subscribe(listener)
    }

    pub fn unsubscribe_errors(&self, id: SubscriptionId) -> FormResult<bool> {
        self.stores.errors.unsubscribe(id)
    }

    pub fn register_form_validator(
        &self,
        validator: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> FormResult<()> {
        let validator = Arc::new(validator);
        let wrapped: FormValidatorFn = Arc::new(move |values: Value| {
            let error = validator(&values);
            Box::pin(async move { error }) as BoxedFormFuture
        });
        *write_lock(&self.form_validator, "registering form validator")? = Some(wrapped);
        Ok(())
    }

    pub fn register_async_form_validator<F, Fut>(&self, validator: F) -> FormResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let wrapped: FormValidatorFn =
            Arc::new(move |values: Value| Box::pin(validator(values)) as BoxedFormFuture);
        *write_lock(&self.form_validator, "registering async form validator")? = Some(wrapped);
        Ok(())
    }

    /// Runs the form-level validator against the current values and stores
    /// its message in the form meta. Empty messages count as no error.
    pub async fn run_validation(&self) -> FormResult<Option<String>> {
        let validator = read_lock(&self.form_validator, "reading form validator")?.clone();
        let Some(validator) = validator else {
            return Ok(None);
        };

        self.set_form_meta(|meta| meta.is_validating = true)?;
        let values = Value::clone(&*self.values()?);
        let error = validator(values).await.filter(|error| !error.is_empty());
        self.set_form_meta(|meta| {
            meta.error = error.clone().unwrap_or_default();
            meta.is_validating = false;
        })?;
        tracing::debug!(form_id = %self.id, failed = error.is_some(), "form validation settled");
        Ok(error)
    }

    /// Form-level validation that skips an untouched form unless
    /// `validate_pristine` is set.
    pub async fn revalidate(&self) -> FormResult<Option<String>> {
        if !self.options.validate_pristine && !self.form_meta()?.is_touched {
            return Ok(None);
        }
        self.run_validation().await
    }

    pub async fn handle_submit<F, Fut>(&self, on_submit: F) -> FormResult<SubmitOutcome>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = ()>,
    {
        if !self.meta()?.is_valid {
            self.set_form_meta(|meta| meta.is_submitting = false)?;
            tracing::debug!(form_id = %self.id, "submit refused, form is invalid");
            return Ok(SubmitOutcome::Refused);
        }

        self.set_form_meta(|meta| {
            meta.is_submitting = true;
            meta.is_validating = true;
        })?;
        self.stores.field_meta.update("marking fields validating", |fields| {
            for meta in fields.values_mut() {
                meta.is_validating = true;
            }
        })?;

        let outcome = match self.validate(ValidateOptions::all()).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(form_id = %self.id, %error, "submit validation faulted");
                self.settle_failed_submit()?;
                return Err(error);
            }
        };
        self.stores.field_meta.update("applying submit field errors", |fields| {
            for (field, meta) in fields.iter_mut() {
                meta.is_validating = false;
                if let Some(message) = outcome.first_error(field) {
                    meta.error = message.to_string();
                }
            }
        })?;

        let form_error = match self.run_validation().await {
            Ok(form_error) => form_error,
            Err(error) => {
                self.settle_failed_submit()?;
                return Err(error);
            }
        };
        self.set_form_meta(|meta| meta.is_validating = false)?;

        if !outcome.is_pass || form_error.is_some() {
            self.set_form_meta(|meta| meta.is_submitting = false)?;
            tracing::debug!(
                form_id = %self.id,
                field_errors = outcome.errors.len(),
                form_error = form_error.is_some(),
                "submit rejected by validation"
            );
            return Ok(SubmitOutcome::Rejected {
                errors: outcome.errors,
                form_error,
            });
        }

        self.set_form_meta(|meta| {
            meta.is_submitted = false;
            meta.submission_attempts = meta.submission_attempts.saturating_add(1);
        })?;
        let values = Value::clone(&*self.values()?);
        on_submit(values).await;
        self.set_form_meta(|meta| {
            meta.is_submitted = true;
            meta.is_submitting = false;
        })?;
        tracing::debug!(form_id = %self.id, "form submitted");
        Ok(SubmitOutcome::Submitted)
    }

    fn settle_failed_submit(&self) -> FormResult<()> {
        self.stores.field_meta.update("clearing validating fields", |fields| {
            for meta in fields.values_mut() {
                meta.is_validating = false;
            }
        })?;
        self.set_form_meta(|meta| {
            meta.is_validating = false;
            meta.is_submitting = false;
        })
    }

    /// Restores default values, clears errors and resets the form meta.
    pub fn reset(&self) -> FormResult<()> {
        self.reset_values()?;
        self.reset_form_meta(None)
    }

    pub(crate) fn next_ticket(&self, field: &str) -> FormResult<ValidationTicket> {
        let mut tickets = write_lock(&self.tickets, "issuing validation ticket")?;
        tickets.issued += 1;
        let next = ValidationTicket(tickets.issued);
        tickets.latest.insert(field.to_string(), next);
        tickets.in_flight.insert(field.to_string());
        Ok(next)
    }

    pub(crate) fn is_latest_ticket(
        &self,
        field: &str,
        ticket: ValidationTicket,
    ) -> FormResult<bool> {
        Ok(read_lock(&self.tickets, "checking latest validation ticket")?
            .latest
            .get(field)
            .copied()
            == Some(ticket))
    }

    /// Marks the run holding `ticket` as finished when it is still the latest.
    pub(crate) fn settle_ticket(&self, field: &str, ticket: ValidationTicket) -> FormResult<()> {
        let mut tickets = write_lock(&self.tickets, "settling validation ticket")?;
        if tickets.latest.get(field) == Some(&ticket) {
            tickets.in_flight.remove(field);
        }
        Ok(())
    }

    /// Forgets the field so every run still in flight for it turns stale.
    pub(crate) fn retire_tickets(&self, field: &str) -> FormResult<()> {
        let mut tickets = write_lock(&self.tickets, "retiring validation tickets")?;
        tickets.latest.remove(field);
        tickets.in_flight.remove(field);
        Ok(())
    }

    pub(crate) fn validations_in_flight(&self) -> FormResult<BTreeSet<String>> {
        Ok(read_lock(&self.tickets, "reading validations in flight")?
            .in_flight
            .clone())
    }
}
