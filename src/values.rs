use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::controller::FormController;
use crate::error::FormResult;
use crate::meta::reset_element_meta;
use crate::path;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SetValueOptions {
    /// Mark the field and the form touched after the write.
    pub is_touched: bool,
}

impl Default for SetValueOptions {
    fn default() -> Self {
        Self { is_touched: true }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ArrayShift {
    Append,
    Reindex,
}

impl FormController {
    pub fn values(&self) -> FormResult<Arc<Value>> {
        self.stores.values.get()
    }

    pub fn values_as<T: DeserializeOwned>(&self) -> FormResult<T> {
        let values = self.values()?;
        Ok(T::deserialize(&*values)?)
    }

    pub fn field_value(&self, path: impl AsRef<str>) -> FormResult<Option<Value>> {
        Ok(path::get(&*self.values()?, path.as_ref()).cloned())
    }

    pub fn set_field_value(
        &self,
        path: impl AsRef<str>,
        value: Value,
        options: SetValueOptions,
    ) -> FormResult<()> {
        let path = path.as_ref();
        self.stores
            .values
            .try_update("setting field value", |values| path::set(values, path, value))?;
        if options.is_touched {
            self.mark_touched(path)?;
        }
        self.sync_validate_values()
    }

    pub fn update_field_value(
        &self,
        path: impl AsRef<str>,
        f: impl FnOnce(Option<&Value>) -> Value,
        options: SetValueOptions,
    ) -> FormResult<()> {
        let path = path.as_ref();
        self.stores.values.try_update("updating field value", |values| {
            let next = f(path::get(values, path));
            path::set(values, path, next)
        })?;
        if options.is_touched {
            self.mark_touched(path)?;
        }
        self.sync_validate_values()
    }

    pub fn update_values(&self, f: impl FnOnce(&mut Value)) -> FormResult<()> {
        self.stores.values.update("updating values", f)?;
        self.sync_validate_values()
    }

    pub fn remove_value(&self, path: impl AsRef<str>) -> FormResult<Option<Value>> {
        let path = path.as_ref();
        let removed = self
            .stores
            .values
            .update("removing value", |values| path::delete(values, path))?;
        self.sync_validate_values()?;
        Ok(removed)
    }

    pub fn remove_values<I, S>(&self, paths: I) -> FormResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = paths.into_iter().collect::<Vec<_>>();
        self.stores.values.update("removing values", |values| {
            for path in &paths {
                path::delete(values, path.as_ref());
            }
        })?;
        self.sync_validate_values()
    }

    pub fn default_values(&self) -> FormResult<Arc<Value>> {
        self.stores.default_values.get()
    }

    /// Merges `data` into the defaults key by key. With `reset_values` the
    /// values are then reset to the merged defaults.
    pub fn set_default_values(&self, data: Value, reset_values: bool) -> FormResult<()> {
        self.stores
            .default_values
            .update("setting default values", |defaults| match (defaults, data) {
                (Value::Object(defaults), Value::Object(data)) => defaults.extend(data),
                (defaults, data) => *defaults = data,
            })?;
        if reset_values {
            self.reset_values()?;
        }
        Ok(())
    }

    /// Restores the default values and clears every error.
    pub fn reset_values(&self) -> FormResult<()> {
        let defaults = Value::clone(&*self.default_values()?);
        self.stores.values.replace("resetting values", defaults)?;
        self.reset_errors()?;
        self.stores.field_meta.update("clearing field errors", |fields| {
            for meta in fields.values_mut() {
                meta.error.clear();
            }
        })?;
        tracing::debug!(form_id = %self.id, "values reset to defaults");
        self.sync_validate_values()
    }

    pub fn push_field_value(&self, path: impl AsRef<str>, value: Value) -> FormResult<()> {
        let path = path.as_ref();
        self.mutate_array(path, ArrayShift::Append, |values| {
            path::push(values, path, value)
        })
    }

    pub fn insert_field_value(
        &self,
        path: impl AsRef<str>,
        index: usize,
        value: Value,
    ) -> FormResult<()> {
        let path = path.as_ref();
        self.mutate_array(path, ArrayShift::Reindex, |values| {
            path::insert(values, path, index, value)
        })
    }

    pub fn remove_field_value(
        &self,
        path: impl AsRef<str>,
        index: usize,
    ) -> FormResult<Option<Value>> {
        let path = path.as_ref();
        self.mutate_array(path, ArrayShift::Reindex, |values| {
            path::remove(values, path, index)
        })
    }

    pub fn swap_field_values(
        &self,
        path: impl AsRef<str>,
        first: usize,
        second: usize,
    ) -> FormResult<()> {
        let path = path.as_ref();
        self.mutate_array(path, ArrayShift::Reindex, |values| {
            path::swap(values, path, first, second)
        })
    }

    fn mutate_array<R>(
        &self,
        path: &str,
        shift: ArrayShift,
        f: impl FnOnce(&mut Value) -> FormResult<R>,
    ) -> FormResult<R> {
        let output = self
            .stores
            .values
            .try_update("mutating field array", f)
            .inspect_err(|error| {
                tracing::debug!(form_id = %self.id, field = path, %error, "array mutation rejected");
            })?;
        if shift == ArrayShift::Reindex {
            let reset = self
                .stores
                .field_meta
                .update("resetting element meta", |fields| {
                    reset_element_meta(fields, path)
                })?;
            tracing::trace!(form_id = %self.id, field = path, reset, "element meta reset");
        }
        self.mark_touched(path)?;
        self.sync_validate_values()?;
        Ok(output)
    }

    /// Re-reads every snapshot entry from the values tree so the validator
    /// sees what is rendered.
    pub(crate) fn sync_validate_values(&self) -> FormResult<()> {
        let values = self.values()?;
        self.stores
            .validate_values
            .update("syncing validate values", |snapshot| {
                for (field, value) in snapshot.iter_mut() {
                    *value = path::get(&values, field).cloned().unwrap_or_default();
                }
            })
    }

    pub(crate) fn mark_touched(&self, path: &str) -> FormResult<()> {
        self.set_field_meta(path, |meta| meta.is_touched = true)?;
        if !self.form_meta()?.is_touched {
            self.set_form_meta(|meta| meta.is_touched = true)?;
        }
        Ok(())
    }
}
