//! Seat-side capability plumbing
//!
//! Two halves live here. [`SeatHandler`] is the capability this crate
//! consumes: the seat state owner elsewhere in the compositor supplies the
//! keymap, the pressed-key set, input timestamps and modifier state that
//! keyboard bindings forward to clients. [`SeatState`] is the capability
//! owner this crate provides: it grants the keyboard capability to client
//! connections, tracks the resulting bindings and tears them down with the
//! seat.

use std::os::fd::BorrowedFd;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::keyboard::{KeyboardBinding, ModifiersState};
use crate::utils::Serial;
use crate::wire::{ClientId, CreationError, ObjectId, WireHandle, WireTransport};

/// State supplied by the seat owning the physical keyboard.
///
/// Keyboard bindings never store the seat; every operation that needs seat
/// state borrows it for the duration of the call.
pub trait SeatHandler {
    /// Whether the current keymap can be announced in the compatible wire format
    fn keymap_format_compatible(&self) -> bool;
    /// Descriptor of the current keymap
    fn keymap_fd(&self) -> BorrowedFd<'_>;
    /// Size of the current keymap in bytes
    fn keymap_size(&self) -> u32;
    /// Keycodes of the currently pressed keys, in press order
    fn pressed_keys(&self) -> Vec<u32>;
    /// Timestamp for input events, in milliseconds
    fn timestamp(&self) -> u32;
    /// Current modifier state
    fn modifiers(&self) -> ModifiersState;
    /// Serial of the last modifier state change
    fn last_modifiers_serial(&self) -> Serial;
}

/// Tracks the keyboard bindings a seat has granted.
///
/// Bindings remove themselves from the tracking list when their client
/// releases them; [`teardown`](SeatState::teardown) destroys whatever is
/// left when the seat itself goes away.
#[derive(Debug, Default)]
pub struct SeatState {
    keyboards: Arc<Mutex<Vec<KeyboardBinding>>>,
}

impl SeatState {
    /// Create a seat state tracking no bindings
    pub fn new() -> Self {
        SeatState::default()
    }

    /// Grant the keyboard capability to a client connection.
    ///
    /// Creates the wire object with the negotiated `version` under the
    /// peer-requested `id` and immediately announces the seat's keymap on
    /// it. `parent` is the object the grant request arrived on; on
    /// allocation failure the peer is notified through it and the binding
    /// is discarded.
    pub fn grant_keyboard<T: WireTransport, S: SeatHandler>(
        &mut self,
        transport: &mut T,
        seat: &S,
        parent: &WireHandle,
        client: ClientId,
        version: u32,
        id: ObjectId,
    ) -> Result<KeyboardBinding, CreationError> {
        let binding = KeyboardBinding::new(Arc::downgrade(&self.keyboards));
        match binding.create(transport, seat, client, version, id) {
            Ok(()) => {
                self.keyboards.lock().unwrap().push(binding.clone());
                Ok(binding)
            }
            Err(err) => {
                debug!(%parent, %client, "keyboard grant failed: {err}");
                transport.post_no_memory(parent);
                Err(err)
            }
        }
    }

    /// The keyboard bindings currently alive on this seat
    pub fn keyboards(&self) -> Vec<KeyboardBinding> {
        self.keyboards.lock().unwrap().clone()
    }

    /// Tear down the seat: destroy every binding the clients still hold.
    pub fn teardown<T: WireTransport>(&mut self, transport: &mut T) {
        let keyboards: Vec<_> = self.keyboards.lock().unwrap().drain(..).collect();
        for keyboard in keyboards {
            keyboard.destroy(transport);
        }
    }
}
