//! Dotted path addressing over a `serde_json::Value` tree.
//!
//! A path such as `"friends.0.name"` walks object keys and, where the
//! container already is an array, numeric indices. Writes auto-create
//! missing intermediate objects but never arrays; only the array
//! operations below produce new arrays.

use std::fmt::{Display, Formatter};
use std::ops::Deref;

use serde_json::{Map, Value};

use crate::error::{FormError, FormResult};

#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Prefixes `path` with `scope` when one is given.
    pub fn scoped(scope: Option<&str>, path: &str) -> Self {
        match scope {
            Some(scope) if !scope.is_empty() => Self(format!("{scope}.{path}")),
            _ => Self(path.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        segments(&self.0)
    }

    pub fn child(&self, segment: impl Display) -> Self {
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}.{segment}", self.0))
        }
    }

    pub fn index(&self, index: usize) -> Self {
        self.child(index)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for FieldPath {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(move |_| !path.is_empty())
}

/// True when `key` addresses an element (or something nested in an element)
/// of the array at `parent`, eg. `friends.2` or `friends.2.name` for `friends`.
pub fn is_element_path(parent: &str, key: &str) -> bool {
    key.strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.split('.').next())
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

pub fn get_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    segments(path).try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    })
}

/// Writes `value` at `path`. A numeric segment into an existing array may
/// address an element or the slot right after the last one; anything
/// further out is rejected.
pub fn set(root: &mut Value, path: &str, value: Value) -> FormResult<()> {
    let mut node = root;
    for segment in segments(path) {
        node = slot(node, segment).map_err(|(index, len)| FormError::IndexOutOfBounds {
            operation: "set",
            path: path.to_string(),
            index,
            len,
        })?;
    }
    *node = value;
    Ok(())
}

/// Removes the value at `path`. Array elements are replaced by `null` so
/// sibling indices stay stable.
pub fn delete(root: &mut Value, path: &str) -> Option<Value> {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (get_mut(root, parent)?, last),
        None => (root, path),
    };
    match parent {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            items
                .get_mut(index)
                .map(|slot| std::mem::replace(slot, Value::Null))
        }
        _ => None,
    }
}

/// Appends `value` to the array at `path`, seeding a one-element array when
/// nothing is stored there yet.
pub fn push(root: &mut Value, path: &str, value: Value) -> FormResult<()> {
    if matches!(get(root, path), None | Some(Value::Null)) {
        return set(root, path, Value::Array(vec![value]));
    }
    array_mut(root, path, "push")?.push(value);
    Ok(())
}

/// Inserts before `index`; an index past the end appends.
pub fn insert(root: &mut Value, path: &str, index: usize, value: Value) -> FormResult<()> {
    let items = array_mut(root, path, "insert")?;
    let index = index.min(items.len());
    items.insert(index, value);
    Ok(())
}

/// Removes the element at `index`; an index past the end leaves the array
/// untouched.
pub fn remove(root: &mut Value, path: &str, index: usize) -> FormResult<Option<Value>> {
    let items = array_mut(root, path, "remove")?;
    Ok((index < items.len()).then(|| items.remove(index)))
}

pub fn swap(root: &mut Value, path: &str, first: usize, second: usize) -> FormResult<()> {
    let items = array_mut(root, path, "swap")?;
    let len = items.len();
    if let Some(index) = [first, second].into_iter().find(|index| *index >= len) {
        return Err(FormError::IndexOutOfBounds {
            operation: "swap",
            path: path.to_string(),
            index,
            len,
        });
    }
    items.swap(first, second);
    Ok(())
}

fn array_mut<'a>(
    root: &'a mut Value,
    path: &str,
    operation: &'static str,
) -> FormResult<&'a mut Vec<Value>> {
    match get_mut(root, path) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(FormError::InvalidOperation {
            operation,
            path: path.to_string(),
        }),
    }
}

fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|byte| byte.is_ascii_digit())
}

fn slot<'a>(node: &'a mut Value, segment: &str) -> Result<&'a mut Value, (usize, usize)> {
    let array_index = match node {
        Value::Array(items) if is_index(segment) => Some(
            segment
                .parse::<usize>()
                .map_err(|_| (usize::MAX, items.len()))?,
        ),
        _ => None,
    };
    match (node, array_index) {
        (Value::Array(items), Some(index)) => {
            let len = items.len();
            if index > len {
                return Err((index, len));
            }
            if index == len {
                items.push(Value::Null);
            }
            Ok(&mut items[index])
        }
        (Value::Object(map), _) => Ok(map.entry(segment.to_string()).or_insert(Value::Null)),
        (other, _) => {
            *other = Value::Object(Map::new());
            Ok(&mut other[segment])
        }
    }
}
