//! Surface entities that can hold input focus
//!
//! The surfaces themselves (their buffers, roles and committed state) live
//! elsewhere in the compositor; this module only models what the input
//! bindings need from them: a wire identity to reference in focus events, a
//! liveness flag, and a destruction-subscription registry. A binding that
//! keeps a reference to a surface it does not own registers a hook here and
//! is called back exactly once when the surface's owner destroys it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::utils::{HookId, Hooks};
use crate::wire::WireHandle;

type DestructionHook = dyn Fn() + Send + Sync;

#[derive(Debug)]
struct SurfaceInner {
    handle: WireHandle,
    alive: AtomicBool,
    destruction_hooks: Mutex<Hooks<DestructionHook>>,
}

/// Handle to a surface entity.
///
/// Clones refer to the same surface; equality is identity of the underlying
/// entity, not of its wire id.
#[derive(Debug, Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Surface {}

impl Surface {
    /// Create a surface entity around its wire identity
    pub fn new(handle: WireHandle) -> Self {
        Surface {
            inner: Arc::new(SurfaceInner {
                handle,
                alive: AtomicBool::new(true),
                destruction_hooks: Mutex::new(Hooks::default()),
            }),
        }
    }

    /// The wire identity focus events reference
    pub fn wire_handle(&self) -> &WireHandle {
        &self.inner.handle
    }

    /// Whether the surface's owner has not destroyed it yet
    pub fn alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Subscribe to the destruction of this surface.
    ///
    /// The callback is invoked exactly once, when the surface's owner
    /// destroys it, unless the subscription is removed first.
    pub fn add_destruction_hook(&self, hook: impl Fn() + Send + Sync + 'static) -> HookId {
        self.inner
            .destruction_hooks
            .lock()
            .unwrap()
            .add(Arc::new(hook))
    }

    /// Cancel a destruction subscription
    pub fn remove_destruction_hook(&self, id: &HookId) {
        self.inner.destruction_hooks.lock().unwrap().remove(id);
    }

    /// Destroy the surface, notifying every subscriber.
    ///
    /// Meant to be called by the surface's owner. Hooks are drained before
    /// any of them runs, so they fire at most once even if destruction is
    /// requested again and callbacks are free to touch the surface.
    pub fn destroy(&self) {
        if !self.inner.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        debug!(handle = %self.inner.handle, "surface destroyed");
        let hooks = self.inner.destruction_hooks.lock().unwrap().drain();
        for hook in hooks {
            (hook.cb)();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::wire::{ClientId, ObjectId};

    fn surface() -> Surface {
        Surface::new(WireHandle::new(ClientId::new(1), ObjectId::new(20), 4))
    }

    #[test]
    fn hooks_fire_once_even_on_double_destroy() {
        let surface = surface();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        surface.add_destruction_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(surface.alive());
        surface.destroy();
        surface.destroy();

        assert!(!surface.alive());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_hooks_never_fire() {
        let surface = surface();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let id = surface.add_destruction_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        surface.remove_destruction_hook(&id);
        surface.destroy();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clones_are_the_same_entity() {
        let a = surface();
        let b = a.clone();
        let other = surface();
        assert_eq!(a, b);
        assert_ne!(a, other);

        b.destroy();
        assert!(!a.alive());
    }
}
