//! Headless form state: a path-addressed values tree, per-field and
//! per-form meta, a rule registry and a validation engine, with a field
//! façade that produces the props a renderer binds to its inputs.

mod binding;
mod controller;
mod error;
pub mod id;
mod meta;
pub mod path;
mod rules;
pub mod store;
mod validation;
mod validator;
mod values;


pub use binding::{
    BlurHook, ChangeHook, ChangeInput, FieldHandle, FieldOptions, InputEvent, InputProps,
    InputPropsOverrides, PendingValidation,
};
pub use controller::{
    DEFAULT_VALIDATION_DEBOUNCE, FormController, FormOptions, SubmitOutcome, ValidationTicket,
};
pub use error::{FormError, FormResult};
pub use headless_form_derive::FormFields;
pub use id::FormId;
pub use meta::{DerivedMeta, FieldMeta, FieldMetaMap, FormMeta, compute_derived_meta};
pub use path::FieldPath;
pub use regex::Regex;
pub use rules::{
    AsyncRuleFn, BoxedRuleFuture, Rule, RuleFailure, RuleMap, RuleRegistry, Rules, SyncRuleFn,
};
pub use store::{Atom, SubscriptionId};
pub use validation::{
    ErrorMap, ErrorScroller, FieldSelection, ValidateOptions, ValidateOutcome,
};
pub use validator::{
    BoxedValidatorFuture, FieldError, RuleValidator, ValidationReport, Validator, ValidatorError,
    ValueMap,
};
pub use values::SetValueOptions;

/// Typed field paths of a model, usually derived with
/// `#[derive(FormFields)]`.
pub trait FormFields {
    type Fields;

    fn fields() -> Self::Fields;

    fn field_names() -> &'static [&'static str];
}
