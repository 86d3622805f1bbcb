use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{FormError, FormResult};

pub type Listener<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(u64);

struct AtomState<T> {
    value: Arc<T>,
    version: u64,
    listeners: BTreeMap<u64, Listener<T>>,
    next_listener: u64,
}

/// One slice of shared form state.
///
/// Reads hand out an `Arc` snapshot that never changes underneath the
/// reader. Writes build a new value from a copy of the current one and
/// commit it atomically, so a committed root is never the same allocation
/// as the root it replaced.
pub struct Atom<T> {
    key: Arc<str>,
    default: Arc<T>,
    state: Arc<RwLock<AtomState<T>>>,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            default: self.default.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> Atom<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(key: impl Into<String>, default: T) -> Self {
        let default = Arc::new(default);
        Self {
            key: Arc::from(key.into()),
            default: default.clone(),
            state: Arc::new(RwLock::new(AtomState {
                value: default,
                version: 0,
                listeners: BTreeMap::new(),
                next_listener: 1,
            })),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> FormResult<Arc<T>> {
        Ok(read_lock(&self.state, "reading store snapshot")?.value.clone())
    }

    pub fn version(&self) -> FormResult<u64> {
        Ok(read_lock(&self.state, "reading store version")?.version)
    }

    pub fn update<R>(&self, context: &'static str, f: impl FnOnce(&mut T) -> R) -> FormResult<R> {
        self.try_update(context, |draft| Ok(f(draft)))
    }

    /// Applies `f` to a draft copy and commits it only when `f` succeeds.
    pub fn try_update<R>(
        &self,
        context: &'static str,
        f: impl FnOnce(&mut T) -> FormResult<R>,
    ) -> FormResult<R> {
        let (output, value, listeners) = {
            let mut state = write_lock(&self.state, context)?;
            let mut draft = T::clone(&state.value);
            let output = f(&mut draft)?;
            state.value = Arc::new(draft);
            state.version = state.version.wrapping_add(1);
            tracing::trace!(key = %self.key, version = state.version, "store committed");
            (
                output,
                state.value.clone(),
                state.listeners.values().cloned().collect::<Vec<_>>(),
            )
        };
        for listener in listeners {
            listener(&value);
        }
        Ok(output)
    }

    pub fn replace(&self, context: &'static str, value: T) -> FormResult<()> {
        self.update(context, move |draft| *draft = value)
    }

    pub fn reset(&self, context: &'static str) -> FormResult<()> {
        let default = T::clone(&self.default);
        self.replace(context, default)
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&Arc<T>) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        let mut state = write_lock(&self.state, "subscribing to store")?;
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id, Arc::new(listener));
        Ok(SubscriptionId(id))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "unsubscribing from store")?;
        Ok(state.listeners.remove(&id.0).is_some())
    }
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn update_commits_a_new_root() {
        let atom = Atom::new("form/values", vec![1, 2]);
        let before = atom.get().expect("snapshot");
        atom.update("pushing", |draft| draft.push(3)).expect("update");
        let after = atom.get().expect("snapshot");
        assert_eq!(*before, vec![1, 2]);
        assert_eq!(*after, vec![1, 2, 3]);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(atom.version().expect("version"), 1);
    }

    #[test]
    fn failed_update_leaves_store_unchanged() {
        let atom = Atom::new("form/values", vec![1]);
        let before = atom.get().expect("snapshot");
        let result = atom.try_update("failing", |draft| {
            draft.clear();
            Err::<(), _>(FormError::MissingFieldPath)
        });
        assert_eq!(result, Err(FormError::MissingFieldPath));
        assert!(Arc::ptr_eq(&before, &atom.get().expect("snapshot")));
        assert_eq!(atom.version().expect("version"), 0);
    }

    #[test]
    fn subscribers_observe_commits_until_unsubscribed() {
        let atom = Atom::new("form/errors", 0_u32);
        let seen = Arc::new(AtomicUsize::new(0));
        let id = {
            let seen = seen.clone();
            atom.subscribe(move |value| {
                seen.store(**value as usize, Ordering::SeqCst);
            })
            .expect("subscribe")
        };
        atom.replace("setting", 7).expect("replace");
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        assert!(atom.unsubscribe(id).expect("unsubscribe"));
        atom.replace("setting", 9).expect("replace");
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn reset_restores_default() {
        let atom = Atom::new("form/meta", String::from("initial"));
        atom.replace("setting", "changed".into()).expect("replace");
        atom.reset("resetting").expect("reset");
        assert_eq!(*atom.get().expect("snapshot"), "initial");
    }
}
