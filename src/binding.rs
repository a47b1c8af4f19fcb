//! The resource binding lifecycle primitive
//!
//! Every protocol object in this crate bridges one server-side domain
//! object to one per-client wire object. [`WireBinding`] owns that
//! relationship and in particular its destruction: the wire object can be
//! torn down either by the transport (client release or disconnect) or by
//! the capability owner (server-side teardown), and the two paths must
//! never both run for the same object.
//!
//! The primitive makes the paths mutually exclusive by construction: both
//! take the stored handle out, and whichever fires second observes an empty
//! slot and does nothing.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::wire::{ClientId, CreationError, ObjectData, ObjectId, WireHandle, WireTransport};

/// Bridges one server-side object to one per-client wire object.
///
/// A binding starts out unbound, is bound at most once through
/// [`create`](WireBinding::create) and ends unbound again through exactly
/// one of the two teardown paths.
#[derive(Debug, Default)]
pub struct WireBinding {
    handle: Option<WireHandle>,
}

impl WireBinding {
    /// Create an unbound binding
    pub fn new() -> Self {
        WireBinding::default()
    }

    /// Request a wire object from the transport and store its handle.
    ///
    /// `data` is registered as the object's unbind notification. Must not be
    /// called on a binding that already holds a live wire object.
    ///
    /// On failure the binding stays unbound; telling the peer is the
    /// caller's job, since only it knows the object the request arrived on.
    pub fn create<T: WireTransport>(
        &mut self,
        transport: &mut T,
        client: ClientId,
        version: u32,
        id: ObjectId,
        data: Arc<dyn ObjectData>,
    ) -> Result<&WireHandle, CreationError> {
        debug_assert!(self.handle.is_none(), "binding already holds a live wire object");
        let handle = transport.create_object(client, version, id, data)?;
        debug!(%handle, "bound wire object");
        Ok(self.handle.insert(handle))
    }

    /// The current wire object, if the binding is bound
    pub fn handle(&self) -> Option<&WireHandle> {
        self.handle.as_ref()
    }

    /// Transport-initiated teardown: the client released the object.
    ///
    /// Clears the stored handle without destroying the wire object; the
    /// transport owns that half of the teardown. Returns the handle that
    /// was cleared, or `None` if the owner already tore the binding down.
    pub fn unbound(&mut self) -> Option<WireHandle> {
        let taken = self.handle.take();
        if let Some(handle) = taken.as_ref() {
            trace!(%handle, "wire object unbound by transport");
        }
        taken
    }

    /// Owner-initiated teardown: explicitly destroy the wire object.
    ///
    /// Returns whether a wire object was actually destroyed. A binding the
    /// transport already unbound is left alone, keeping the teardown paths
    /// exclusive.
    pub fn destroy<T: WireTransport>(&mut self, transport: &mut T) -> bool {
        match self.handle.take() {
            Some(handle) => {
                trace!(%handle, "destroying wire object on owner teardown");
                transport.destroy_object(&handle);
                true
            }
            None => false,
        }
    }
}
