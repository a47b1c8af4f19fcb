use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

static HOOK_IDS: Lazy<Mutex<(HashSet<usize>, usize)>> = Lazy::new(|| Mutex::new((HashSet::new(), 0)));

fn next_hook_id() -> usize {
    let (id_set, counter) = &mut *HOOK_IDS.lock().unwrap();

    if id_set.len() == usize::MAX {
        panic!("Out of hook ids");
    }

    while !id_set.insert(*counter) {
        *counter = counter.wrapping_add(1);
    }

    let new_id = *counter;
    *counter = counter.wrapping_add(1);

    new_id
}

fn release_hook_id(id: usize) {
    HOOK_IDS.lock().unwrap().0.remove(&id);
}

/// Unique identifier of a registered hook, used to unregister it.
///
/// Identifiers are globally unique for as long as they are held, so a
/// `HookId` can be stored away from the registry it came from without risk
/// of ever matching an unrelated subscription.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HookId(Arc<InnerId>);

#[derive(Debug, Eq, PartialEq)]
struct InnerId(usize);

impl InnerId {
    fn new() -> Self {
        Self(next_hook_id())
    }
}

impl Drop for InnerId {
    fn drop(&mut self) {
        release_hook_id(self.0);
    }
}

pub(crate) struct Hook<T: ?Sized> {
    pub id: HookId,
    pub cb: Arc<T>,
}

impl<T: ?Sized> std::fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<T: ?Sized> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            cb: self.cb.clone(),
        }
    }
}

/// An ordered registry of subscription hooks.
///
/// Callbacks are stored behind `Arc`, so a caller can snapshot the registry,
/// release whatever lock protects it and only then invoke the callbacks.
pub(crate) struct Hooks<T: ?Sized> {
    hooks: Vec<Hook<T>>,
}

impl<T: ?Sized> std::fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").field("len", &self.hooks.len()).finish()
    }
}

impl<T: ?Sized> Default for Hooks<T> {
    fn default() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl<T: ?Sized> Hooks<T> {
    pub fn add(&mut self, cb: Arc<T>) -> HookId {
        let hook = Hook {
            id: HookId(Arc::new(InnerId::new())),
            cb,
        };
        let id = hook.id.clone();
        self.hooks.push(hook);
        id
    }

    pub fn remove(&mut self, id: &HookId) {
        self.hooks.retain(|hook| &hook.id != id);
    }

    /// Takes every registered hook out of the registry.
    pub fn drain(&mut self) -> Vec<Hook<T>> {
        std::mem::take(&mut self.hooks)
    }

    /// Clones the current hook list for invocation outside the registry lock.
    pub fn snapshot(&self) -> Vec<Hook<T>> {
        self.hooks.to_vec()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }
}
