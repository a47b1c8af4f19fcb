//! Region objects
//!
//! A region is a geometry description a client builds up through a series
//! of add and subtract requests and then attaches to surfaces (as input or
//! opaque region). The accumulated rectangles are kept in request order;
//! evaluating the resulting area is the consumer's business, not this
//! module's.
//!
//! Regions emit nothing back to clients. Their consumers live on the
//! compositor side and subscribe to the change notification instead.

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::binding::WireBinding;
use crate::utils::{HookId, Hooks, Rectangle};
use crate::wire::{ClientId, CreationError, ObjectData, ObjectId, WireHandle, WireTransport};

/// Kind of a rectangle part of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectangleKind {
    /// This rectangle should be added to the region
    Add,
    /// The intersection of this rectangle with the region should be
    /// removed from the region
    Subtract,
}

/// Description of the contents of a region.
///
/// The rectangles are stored in the order the client submitted them; they
/// are to be added or subtracted in this order to compute the actual
/// contents of the region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionAttributes {
    /// Ordered rectangles defining this region
    pub rects: Vec<(RectangleKind, Rectangle)>,
}

type ChangeHook = dyn Fn(&RegionAttributes) + Send + Sync;

#[derive(Debug)]
struct RegionInner {
    wire: WireBinding,
    attributes: RegionAttributes,
    change_hooks: Hooks<ChangeHook>,
    known: Weak<Mutex<Vec<RegionBinding>>>,
}

/// One region object bound to one client.
///
/// Created through [`CompositorState::create_region`]; clones refer to the
/// same binding.
#[derive(Debug, Clone)]
pub struct RegionBinding {
    inner: Arc<Mutex<RegionInner>>,
}

#[derive(Debug)]
struct RegionObjectData {
    inner: Weak<Mutex<RegionInner>>,
}

impl ObjectData for RegionObjectData {
    fn unbound(&self, handle: &WireHandle) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let known = {
            let mut guard = inner.lock().unwrap();
            guard.wire.unbound();
            guard.known.clone()
        };
        if let Some(known) = known.upgrade() {
            known
                .lock()
                .unwrap()
                .retain(|region| !Arc::ptr_eq(&region.inner, &inner));
        }
        trace!(%handle, "region binding unbound");
    }
}

impl RegionBinding {
    pub(crate) fn new(known: Weak<Mutex<Vec<RegionBinding>>>) -> Self {
        RegionBinding {
            inner: Arc::new(Mutex::new(RegionInner {
                wire: WireBinding::new(),
                attributes: RegionAttributes::default(),
                change_hooks: Hooks::default(),
                known,
            })),
        }
    }

    pub(crate) fn create<T: WireTransport>(
        &self,
        transport: &mut T,
        client: ClientId,
        version: u32,
        id: ObjectId,
    ) -> Result<(), CreationError> {
        let data = Arc::new(RegionObjectData {
            inner: Arc::downgrade(&self.inner),
        });
        let mut guard = self.inner.lock().unwrap();
        let handle = guard.wire.create(transport, client, version, id, data)?;
        debug!(%handle, "created region for client");
        Ok(())
    }

    /// The current wire object of this binding, if the client still holds it
    pub fn resource(&self) -> Option<WireHandle> {
        self.inner.lock().unwrap().wire.handle().cloned()
    }

    /// Snapshot of the accumulated geometry
    pub fn region(&self) -> RegionAttributes {
        self.inner.lock().unwrap().attributes.clone()
    }

    /// Append a rectangle to the region.
    ///
    /// Notifies every change subscriber synchronously. Geometry requests on
    /// a region that was never created are a contract violation of the
    /// dispatch glue driving this binding.
    pub fn add(&self, rect: Rectangle) {
        self.push(RectangleKind::Add, rect);
    }

    /// Subtract a rectangle from the region.
    ///
    /// Same contract as [`add`](RegionBinding::add).
    pub fn subtract(&self, rect: Rectangle) {
        self.push(RectangleKind::Subtract, rect);
    }

    fn push(&self, kind: RectangleKind, rect: Rectangle) {
        let (snapshot, hooks) = {
            let mut guard = self.inner.lock().unwrap();
            debug_assert!(
                guard.wire.handle().is_some(),
                "geometry request on a region that was never created"
            );
            if guard.wire.handle().is_none() {
                return;
            }
            guard.attributes.rects.push((kind, rect));
            (guard.attributes.clone(), guard.change_hooks.snapshot())
        };
        trace!(?kind, %rect, "region geometry committed");
        for hook in hooks {
            (hook.cb)(&snapshot);
        }
    }

    /// Subscribe to geometry commits.
    ///
    /// The callback runs synchronously on every committed change, with the
    /// new accumulated geometry.
    pub fn add_change_hook(
        &self,
        hook: impl Fn(&RegionAttributes) + Send + Sync + 'static,
    ) -> HookId {
        self.inner.lock().unwrap().change_hooks.add(Arc::new(hook))
    }

    /// Cancel a change subscription
    pub fn remove_change_hook(&self, id: &HookId) {
        self.inner.lock().unwrap().change_hooks.remove(id);
    }

    /// Owner-initiated teardown of the binding.
    pub fn destroy<T: WireTransport>(&self, transport: &mut T) {
        self.inner.lock().unwrap().wire.destroy(transport);
    }
}

/// Tracks the region bindings created for clients.
///
/// Bindings remove themselves from the tracking list when their client
/// releases them; [`teardown`](CompositorState::teardown) destroys whatever
/// is left when the compositor side goes away.
#[derive(Debug, Default)]
pub struct CompositorState {
    regions: Arc<Mutex<Vec<RegionBinding>>>,
}

impl CompositorState {
    /// Create a compositor state tracking no regions
    pub fn new() -> Self {
        CompositorState::default()
    }

    /// Create a region object for a client connection.
    ///
    /// `parent` is the object the create request arrived on; on allocation
    /// failure the peer is notified through it and the binding discarded.
    pub fn create_region<T: WireTransport>(
        &mut self,
        transport: &mut T,
        parent: &WireHandle,
        client: ClientId,
        version: u32,
        id: ObjectId,
    ) -> Result<RegionBinding, CreationError> {
        let binding = RegionBinding::new(Arc::downgrade(&self.regions));
        match binding.create(transport, client, version, id) {
            Ok(()) => {
                self.regions.lock().unwrap().push(binding.clone());
                Ok(binding)
            }
            Err(err) => {
                debug!(%parent, %client, "region creation failed: {err}");
                transport.post_no_memory(parent);
                Err(err)
            }
        }
    }

    /// The region bindings currently alive
    pub fn regions(&self) -> Vec<RegionBinding> {
        self.regions.lock().unwrap().clone()
    }

    /// Look up the live region binding behind a wire handle
    pub fn region_for(&self, handle: &WireHandle) -> Option<RegionBinding> {
        self.regions
            .lock()
            .unwrap()
            .iter()
            .find(|region| region.resource().as_ref() == Some(handle))
            .cloned()
    }

    /// Tear down the compositor side: destroy every binding the clients
    /// still hold.
    pub fn teardown<T: WireTransport>(&mut self, transport: &mut T) {
        let regions: Vec<_> = self.regions.lock().unwrap().drain(..).collect();
        for region in regions {
            region.destroy(transport);
        }
    }
}
