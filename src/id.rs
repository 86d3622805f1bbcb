use std::fmt::{Display, Formatter};

use rand::Rng;
use rand::distributions::Alphanumeric;

const FORM_ID_LEN: usize = 16;

/// Identity of one form session. Every store key and field marker class
/// owned by the session is namespaced with it.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(String);

impl FormId {
    pub fn random() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(FORM_ID_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn store_key(&self, slice: &str) -> String {
        format!("{}/{slice}", self.0)
    }

    /// Marker class the field binding attaches to its input, used to locate
    /// the rendered element of a failing field.
    pub fn field_marker(&self, field: &str) -> String {
        format!("headless-form-field-{}-{field}", self.0)
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
