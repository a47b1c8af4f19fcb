//! The seam between protocol objects and the wire transport
//!
//! The transport library owning the client sockets and the dispatch loop is
//! not part of this crate. Protocol objects reach it exclusively through the
//! [`WireTransport`] capability defined here: allocating a per-client wire
//! object, emitting typed events on it, destroying it on owner-initiated
//! teardown and signalling allocation failure to the peer.
//!
//! In the other direction the transport owns exactly one notification per
//! object: the unbind callback of [`ObjectData`], fired once when the client
//! releases the object or its connection goes away.

use std::fmt;
use std::os::fd::BorrowedFd;
use std::sync::Arc;

use crate::utils::Serial;

/// Identity of one client connection, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u32);

impl ClientId {
    /// Wrap a raw transport-assigned connection id
    pub const fn new(raw: u32) -> Self {
        ClientId(raw)
    }

    /// The raw connection id
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Identity of one protocol object within a client connection.
///
/// Object ids are assigned monotonically by the peer that creates the
/// object; they are only meaningful together with a [`ClientId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Wrap a raw protocol object id
    pub const fn new(raw: u32) -> Self {
        ObjectId(raw)
    }

    /// The raw object id
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Transport-assigned identity of one `(client, protocol object)` pair.
///
/// A handle also carries the protocol version negotiated for the object.
/// Handles are cheap to clone; cloning does not affect the underlying wire
/// object's lifetime, which is governed by the teardown protocol described
/// in [`binding`](crate::binding).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireHandle {
    client: ClientId,
    object: ObjectId,
    version: u32,
}

impl WireHandle {
    /// Assemble a handle. Only the transport implementation should need this.
    pub fn new(client: ClientId, object: ObjectId, version: u32) -> Self {
        WireHandle {
            client,
            object,
            version,
        }
    }

    /// The client connection this object belongs to
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// The object id within the client connection
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// The negotiated protocol version of this object
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether two handles belong to the same client connection
    pub fn same_client_as(&self, other: &WireHandle) -> bool {
        self.client == other.client
    }
}

impl fmt::Display for WireHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}v{}", self.client, self.object, self.version)
    }
}

/// Format of the keymap announced to a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeymapFormat {
    /// No keymap is available; the accompanying descriptor is a placeholder
    NoKeymap = 0,
    /// The keymap descriptor contains a libxkbcommon-compatible, version 1 keymap
    XkbV1 = 1,
}

/// Press state carried by a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// The key is no longer pressed
    Released = 0,
    /// The key is pressed
    Pressed = 1,
}

/// Events a keyboard object can emit to its client.
///
/// The transport serializes these in call order, per handle. Keymap events
/// borrow their descriptor: the transport must duplicate or transmit it
/// before returning, it cannot keep the borrow.
#[derive(Debug)]
pub enum KeyboardEvent<'a> {
    /// Announce the keymap this keyboard uses
    Keymap {
        /// Format of the transferred keymap
        format: KeymapFormat,
        /// Descriptor the client can map to read the keymap
        fd: BorrowedFd<'a>,
        /// Size of the keymap in bytes
        size: u32,
    },
    /// The surface gained keyboard focus
    Enter {
        /// Serial of the focus change
        serial: Serial,
        /// The surface gaining focus
        surface: ObjectId,
        /// Keycodes of the keys pressed at the time of the focus change, in press order
        keys: Vec<u32>,
    },
    /// The surface lost keyboard focus
    Leave {
        /// Serial of the focus change
        serial: Serial,
        /// The surface losing focus
        surface: ObjectId,
    },
    /// A key was pressed or released while the client held focus
    Key {
        /// Serial of the input event
        serial: Serial,
        /// Timestamp of the input event, in milliseconds
        time: u32,
        /// Platform keycode of the key
        key: u32,
        /// Whether the key was pressed or released
        state: KeyState,
    },
    /// The modifier state changed while the client held focus
    Modifiers {
        /// Serial of the state change
        serial: Serial,
        /// Currently depressed modifiers
        depressed: u32,
        /// Currently latched modifiers
        latched: u32,
        /// Currently locked modifiers
        locked: u32,
        /// Active keyboard layout group
        group: u32,
    },
}

/// Error returned when the transport cannot allocate a wire object
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    /// The transport refused to allocate a wire object for the client.
    ///
    /// The peer still has to be told; the capability owner handling the
    /// request reports this through [`WireTransport::post_no_memory`] on the
    /// object the request arrived on.
    #[error("the wire transport refused to allocate an object")]
    AllocationFailed,
}

/// Per-object callback state registered with the transport.
///
/// The transport invokes [`unbound`](ObjectData::unbound) exactly once, when
/// the client releases the object or its connection is dropped. It is never
/// invoked for objects torn down through
/// [`WireTransport::destroy_object`].
pub trait ObjectData: fmt::Debug + Send + Sync {
    /// The client released this object or disconnected
    fn unbound(&self, handle: &WireHandle);
}

/// Capability provided by the transport library.
///
/// All operations are synchronous and must be used from the thread driving
/// the transport's dispatch loop. Event emission is fire-and-forget and
/// ordered per handle.
pub trait WireTransport {
    /// Allocate a wire object for `client` with the given negotiated
    /// version and peer-requested id, registering `data` as its unbind
    /// notification.
    fn create_object(
        &mut self,
        client: ClientId,
        version: u32,
        id: ObjectId,
        data: Arc<dyn ObjectData>,
    ) -> Result<WireHandle, CreationError>;

    /// Queue a keyboard event on the given wire object
    fn send_keyboard_event(&mut self, handle: &WireHandle, event: KeyboardEvent<'_>);

    /// Tear down a wire object from the server side.
    ///
    /// Used only for owner-initiated teardown; the transport must not fire
    /// the object's unbind notification afterwards.
    fn destroy_object(&mut self, handle: &WireHandle);

    /// Tell the peer that allocating a child object of `parent` failed
    fn post_no_memory(&mut self, parent: &WireHandle);
}
