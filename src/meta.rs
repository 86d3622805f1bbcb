use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::is_element_path;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    pub error: String,
    pub is_touched: bool,
    pub is_validating: bool,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

impl FieldMeta {
    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    fn clear_state(&mut self) {
        self.error.clear();
        self.is_touched = false;
        self.is_validating = false;
    }
}

pub type FieldMetaMap = BTreeMap<String, FieldMeta>;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMeta {
    pub error: String,
    pub is_touched: bool,
    pub is_validating: bool,
    pub is_submitting: bool,
    pub is_submitted: bool,
    pub submission_attempts: u32,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

/// Form meta as read by consumers: the stored base record plus flags that
/// are recomputed from the field meta on every read.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMeta {
    #[serde(flatten)]
    pub base: FormMeta,
    pub fields_are_validating: bool,
    pub fields_are_valid: bool,
    pub is_valid: bool,
    pub can_submit: bool,
}

impl std::ops::Deref for DerivedMeta {
    type Target = FormMeta;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

pub fn compute_derived_meta(form_meta: &FormMeta, field_meta: &FieldMetaMap) -> DerivedMeta {
    let fields_are_validating = field_meta.values().any(|meta| meta.is_validating);
    let fields_are_valid = field_meta.values().all(|meta| !meta.has_error());
    let is_valid = fields_are_valid && !fields_are_validating && form_meta.error.is_empty();
    let can_submit = is_valid && !form_meta.is_validating && !form_meta.is_submitting;

    DerivedMeta {
        base: form_meta.clone(),
        fields_are_validating,
        fields_are_valid,
        is_valid,
        can_submit,
    }
}

/// Clears error, touched and validating state of every element entry under
/// the array at `parent`. Returns how many entries were reset.
pub(crate) fn reset_element_meta(field_meta: &mut FieldMetaMap, parent: &str) -> usize {
    let mut reset = 0;
    for (_, meta) in field_meta
        .iter_mut()
        .filter(|(key, _)| is_element_path(parent, key))
    {
        meta.clear_state();
        reset += 1;
    }
    reset
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(error: &str, is_validating: bool) -> FieldMeta {
        FieldMeta {
            error: error.into(),
            is_validating,
            ..FieldMeta::default()
        }
    }

    #[test]
    fn derived_meta_follows_field_meta() {
        let mut fields = FieldMetaMap::new();
        fields.insert("name".into(), field("", false));
        fields.insert("age".into(), field("", false));
        let meta = compute_derived_meta(&FormMeta::default(), &fields);
        assert!(meta.fields_are_valid && meta.is_valid && meta.can_submit);

        fields.insert("age".into(), field("too young", false));
        let meta = compute_derived_meta(&FormMeta::default(), &fields);
        assert!(!meta.fields_are_valid);
        assert!(!meta.is_valid && !meta.can_submit);

        fields.insert("age".into(), field("", true));
        let meta = compute_derived_meta(&FormMeta::default(), &fields);
        assert!(meta.fields_are_validating);
        assert!(!meta.is_valid);
    }

    #[test]
    fn form_error_invalidates_form() {
        let form = FormMeta {
            error: "passwords differ".into(),
            ..FormMeta::default()
        };
        let meta = compute_derived_meta(&form, &FieldMetaMap::new());
        assert!(meta.fields_are_valid);
        assert!(!meta.is_valid);
    }

    #[test]
    fn busy_form_cannot_submit_even_when_valid() {
        for (is_validating, is_submitting) in [(true, false), (false, true), (true, true)] {
            let form = FormMeta {
                is_validating,
                is_submitting,
                ..FormMeta::default()
            };
            let meta = compute_derived_meta(&form, &FieldMetaMap::new());
            assert!(meta.is_valid);
            assert!(!meta.can_submit);
        }
    }

    #[test]
    fn element_meta_reset_skips_parent_and_siblings() {
        let mut fields = FieldMetaMap::new();
        let dirty = FieldMeta {
            error: "bad".into(),
            is_touched: true,
            is_validating: true,
            ..FieldMeta::default()
        };
        for key in ["friends", "friends.0", "friends.1.name", "friendsCount"] {
            fields.insert(key.into(), dirty.clone());
        }

        assert_eq!(reset_element_meta(&mut fields, "friends"), 2);
        assert_eq!(fields["friends.0"], FieldMeta::default());
        assert_eq!(fields["friends.1.name"], FieldMeta::default());
        assert_eq!(fields["friends"], dirty);
        assert_eq!(fields["friendsCount"], dirty);
    }
}
