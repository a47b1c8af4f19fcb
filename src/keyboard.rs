//! Keyboard input delivery
//!
//! A [`KeyboardBinding`] represents one keyboard device advertised to one
//! client: the seat grants the capability, the binding owns the resulting
//! wire object and serializes focus and input events onto it.
//!
//! The focus state machine is strict: a binding holds at most one focused
//! surface, a focus replacement emits the leave event for the previous
//! surface before the enter event for the new one, and key or modifier
//! delivery without a focused surface is a contract violation of the
//! driving capability owner, not a runtime error. When the focused surface
//! is destroyed by its own owner the focus reference is cleared silently:
//! the wire object the leave event would name is already gone.

use std::os::fd::{AsFd, BorrowedFd};
use std::sync::{Arc, Mutex, Weak};

use rustix::fs::{Mode, OFlags};
use tracing::{debug, trace, warn};

use crate::binding::WireBinding;
use crate::seat::SeatHandler;
use crate::surface::Surface;
use crate::utils::{HookId, Serial};
use crate::wire::{
    ClientId, CreationError, KeyState, KeyboardEvent, KeymapFormat, ObjectData, ObjectId, WireHandle,
    WireTransport,
};

/// Modifier state of a keyboard, as serialized for the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifiersState {
    /// Modifiers currently held down
    pub depressed: u32,
    /// Modifiers latched until the next key press
    pub latched: u32,
    /// Modifiers locked until explicitly released
    pub locked: u32,
    /// Active layout group
    pub group: u32,
}

#[derive(Debug)]
struct KeyboardFocus {
    surface: Surface,
    destruction_hook: HookId,
}

#[derive(Debug)]
struct KeyboardInner {
    wire: WireBinding,
    focus: Option<KeyboardFocus>,
    known: Weak<Mutex<Vec<KeyboardBinding>>>,
}

/// One keyboard device bound to one client.
///
/// Created through [`SeatState::grant_keyboard`](crate::seat::SeatState::grant_keyboard);
/// clones refer to the same binding.
#[derive(Debug, Clone)]
pub struct KeyboardBinding {
    inner: Arc<Mutex<KeyboardInner>>,
}

#[derive(Debug)]
struct KeyboardObjectData {
    inner: Weak<Mutex<KeyboardInner>>,
}

impl ObjectData for KeyboardObjectData {
    fn unbound(&self, handle: &WireHandle) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let (focus, known) = {
            let mut guard = inner.lock().unwrap();
            guard.wire.unbound();
            (guard.focus.take(), guard.known.clone())
        };
        if let Some(focus) = focus {
            focus.surface.remove_destruction_hook(&focus.destruction_hook);
        }
        if let Some(known) = known.upgrade() {
            known
                .lock()
                .unwrap()
                .retain(|kbd| !Arc::ptr_eq(&kbd.inner, &inner));
        }
        trace!(%handle, "keyboard binding unbound");
    }
}

impl KeyboardBinding {
    pub(crate) fn new(known: Weak<Mutex<Vec<KeyboardBinding>>>) -> Self {
        KeyboardBinding {
            inner: Arc::new(Mutex::new(KeyboardInner {
                wire: WireBinding::new(),
                focus: None,
                known,
            })),
        }
    }

    pub(crate) fn create<T: WireTransport, S: SeatHandler>(
        &self,
        transport: &mut T,
        seat: &S,
        client: ClientId,
        version: u32,
        id: ObjectId,
    ) -> Result<(), CreationError> {
        let data = Arc::new(KeyboardObjectData {
            inner: Arc::downgrade(&self.inner),
        });
        let handle = {
            let mut guard = self.inner.lock().unwrap();
            guard.wire.create(transport, client, version, id, data)?.clone()
        };
        debug!(%handle, "granted keyboard to client");
        self.send_initial_keymap(transport, seat, &handle);
        Ok(())
    }

    /// Announce the seat's keymap on a freshly created binding.
    fn send_initial_keymap<T: WireTransport, S: SeatHandler>(
        &self,
        transport: &mut T,
        seat: &S,
        handle: &WireHandle,
    ) {
        if seat.keymap_format_compatible() {
            trace!(%handle, "sending keymap to client");
            transport.send_keyboard_event(
                handle,
                KeyboardEvent::Keymap {
                    format: KeymapFormat::XkbV1,
                    fd: seat.keymap_fd(),
                    size: seat.keymap_size(),
                },
            );
        } else {
            // the event always carries a descriptor, so announce the absence
            // of a keymap with a placeholder that lives only for this call
            match rustix::fs::open("/dev/null", OFlags::RDONLY, Mode::empty()) {
                Ok(placeholder) => {
                    trace!(%handle, "no compatible keymap, sending placeholder");
                    transport.send_keyboard_event(
                        handle,
                        KeyboardEvent::Keymap {
                            format: KeymapFormat::NoKeymap,
                            fd: placeholder.as_fd(),
                            size: 0,
                        },
                    );
                }
                Err(err) => {
                    warn!(%handle, "failed to open placeholder keymap descriptor: {err}");
                }
            }
        }
    }

    /// The current wire object of this binding, if the client still holds it
    pub fn resource(&self) -> Option<WireHandle> {
        self.inner.lock().unwrap().wire.handle().cloned()
    }

    /// The surface currently holding keyboard focus on this binding
    pub fn focused_surface(&self) -> Option<Surface> {
        self.inner
            .lock()
            .unwrap()
            .focus
            .as_ref()
            .map(|focus| focus.surface.clone())
    }

    /// Whether a surface currently holds keyboard focus on this binding
    pub fn is_focused(&self) -> bool {
        self.inner.lock().unwrap().focus.is_some()
    }

    /// Move keyboard focus to `surface`, or clear it with `None`.
    ///
    /// If a surface was focused, a leave event for it is emitted first and
    /// its destruction subscription cancelled. For a new surface the client
    /// is sent an enter event carrying the seat's currently pressed keys,
    /// followed by a modifiers event with the seat's current state; the
    /// binding subscribes to the surface's destruction once the enter event
    /// has been queued. Clearing an already clear focus does nothing.
    pub fn set_focus<T: WireTransport, S: SeatHandler>(
        &self,
        transport: &mut T,
        seat: &S,
        surface: Option<&Surface>,
        serial: Serial,
    ) {
        let (handle, previous) = {
            let mut guard = self.inner.lock().unwrap();
            let Some(handle) = guard.wire.handle().cloned() else {
                trace!("ignoring focus change on an unbound keyboard");
                return;
            };
            if guard.focus.is_none() && surface.is_none() {
                return;
            }
            (handle, guard.focus.take())
        };

        if let Some(previous) = previous {
            trace!(%handle, surface = %previous.surface.wire_handle(), "keyboard focus leaves surface");
            transport.send_keyboard_event(
                &handle,
                KeyboardEvent::Leave {
                    serial,
                    surface: previous.surface.wire_handle().object(),
                },
            );
            previous
                .surface
                .remove_destruction_hook(&previous.destruction_hook);
        }

        let Some(surface) = surface else {
            return;
        };

        trace!(%handle, surface = %surface.wire_handle(), "keyboard focus enters surface");
        transport.send_keyboard_event(
            &handle,
            KeyboardEvent::Enter {
                serial,
                surface: surface.wire_handle().object(),
                keys: seat.pressed_keys(),
            },
        );

        // subscribe only once the enter event naming the surface is queued;
        // destruction of the focused surface clears the focus without a
        // leave event, the wire object it would name is already invalid
        let weak = Arc::downgrade(&self.inner);
        let hook = surface.add_destruction_hook(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().unwrap().focus = None;
            }
        });
        self.inner.lock().unwrap().focus = Some(KeyboardFocus {
            surface: surface.clone(),
            destruction_hook: hook,
        });

        let mods = seat.modifiers();
        transport.send_keyboard_event(
            &handle,
            KeyboardEvent::Modifiers {
                serial: seat.last_modifiers_serial(),
                depressed: mods.depressed,
                latched: mods.latched,
                locked: mods.locked,
                group: mods.group,
            },
        );
    }

    /// Deliver a key press to the focused client.
    ///
    /// A surface must currently be focused.
    pub fn key_pressed<T: WireTransport, S: SeatHandler>(
        &self,
        transport: &mut T,
        seat: &S,
        key: u32,
        serial: Serial,
    ) {
        self.send_key(transport, seat, key, serial, KeyState::Pressed);
    }

    /// Deliver a key release to the focused client.
    ///
    /// A surface must currently be focused.
    pub fn key_released<T: WireTransport, S: SeatHandler>(
        &self,
        transport: &mut T,
        seat: &S,
        key: u32,
        serial: Serial,
    ) {
        self.send_key(transport, seat, key, serial, KeyState::Released);
    }

    fn send_key<T: WireTransport, S: SeatHandler>(
        &self,
        transport: &mut T,
        seat: &S,
        key: u32,
        serial: Serial,
        state: KeyState,
    ) {
        let handle = {
            let guard = self.inner.lock().unwrap();
            debug_assert!(guard.focus.is_some(), "key event delivered without a focused surface");
            match (&guard.focus, guard.wire.handle()) {
                (Some(_), Some(handle)) => handle.clone(),
                _ => return,
            }
        };
        transport.send_keyboard_event(
            &handle,
            KeyboardEvent::Key {
                serial,
                time: seat.timestamp(),
                key,
                state,
            },
        );
    }

    /// Push a modifier state change to the focused client.
    ///
    /// A surface must currently be focused.
    pub fn update_modifiers<T: WireTransport>(
        &self,
        transport: &mut T,
        modifiers: ModifiersState,
        serial: Serial,
    ) {
        let handle = {
            let guard = self.inner.lock().unwrap();
            debug_assert!(
                guard.focus.is_some(),
                "modifiers update delivered without a focused surface"
            );
            match (&guard.focus, guard.wire.handle()) {
                (Some(_), Some(handle)) => handle.clone(),
                _ => return,
            }
        };
        transport.send_keyboard_event(
            &handle,
            KeyboardEvent::Modifiers {
                serial,
                depressed: modifiers.depressed,
                latched: modifiers.latched,
                locked: modifiers.locked,
                group: modifiers.group,
            },
        );
    }

    /// Push a replacement keymap to the client.
    ///
    /// Emits nothing if the client already released the binding.
    pub fn set_keymap<T: WireTransport>(&self, transport: &mut T, fd: BorrowedFd<'_>, size: u32) {
        let Some(handle) = self.resource() else {
            trace!("ignoring keymap update on an unbound keyboard");
            return;
        };
        trace!(%handle, size, "sending replacement keymap to client");
        transport.send_keyboard_event(
            &handle,
            KeyboardEvent::Keymap {
                format: KeymapFormat::XkbV1,
                fd,
                size,
            },
        );
    }

    /// Owner-initiated teardown of the binding.
    ///
    /// Destroys the wire object if the client has not released it yet, and
    /// drops the focus reference (cancelling its destruction subscription)
    /// without emitting a leave event.
    pub fn destroy<T: WireTransport>(&self, transport: &mut T) {
        let focus = {
            let mut guard = self.inner.lock().unwrap();
            guard.wire.destroy(transport);
            guard.focus.take()
        };
        if let Some(focus) = focus {
            focus.surface.remove_destruction_hook(&focus.destruction_hook);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::seat::mock::FakeSeat;
    use crate::wire::mock::{RecordedEvent, RecordingTransport};

    fn detached_keyboard() -> KeyboardBinding {
        KeyboardBinding::new(Weak::new())
    }

    fn bound_keyboard(
        transport: &mut RecordingTransport,
        seat: &FakeSeat,
    ) -> (KeyboardBinding, WireHandle) {
        let kbd = detached_keyboard();
        kbd.create(transport, seat, ClientId::new(1), 4, ObjectId::new(7))
            .unwrap();
        let handle = kbd.resource().unwrap();
        (kbd, handle)
    }

    fn surface_with_id(id: u32) -> Surface {
        Surface::new(WireHandle::new(ClientId::new(1), ObjectId::new(id), 4))
    }

    #[test]
    fn create_announces_a_compatible_keymap_once() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (_kbd, handle) = bound_keyboard(&mut transport, &seat);

        assert_eq!(handle, WireHandle::new(ClientId::new(1), ObjectId::new(7), 4));
        assert_eq!(
            transport.events_for(&handle),
            vec![RecordedEvent::Keymap {
                format: KeymapFormat::XkbV1,
                fd: seat.keymap_raw_fd(),
                size: 1024,
            }]
        );
    }

    #[test]
    fn create_announces_a_placeholder_for_incompatible_keymaps() {
        let mut transport = RecordingTransport::new();
        let mut seat = FakeSeat::new();
        seat.keymap_compatible = false;
        let (_kbd, handle) = bound_keyboard(&mut transport, &seat);

        let events = transport.events_for(&handle);
        assert_eq!(events.len(), 1);
        match &events[0] {
            RecordedEvent::Keymap { format, fd, size } => {
                assert_eq!(*format, KeymapFormat::NoKeymap);
                assert_eq!(*size, 0);
                assert_ne!(*fd, seat.keymap_raw_fd());
            }
            other => panic!("expected a keymap event, got {other:?}"),
        }
    }

    #[test]
    fn focus_replacement_orders_leave_before_enter() {
        let mut transport = RecordingTransport::new();
        let mut seat = FakeSeat::new();
        seat.pressed = vec![30, 31];
        seat.mods = ModifiersState {
            depressed: 1,
            latched: 0,
            locked: 2,
            group: 0,
        };
        seat.mods_serial = Serial::from(5);

        let (kbd, handle) = bound_keyboard(&mut transport, &seat);
        let surface_a = surface_with_id(20);
        let surface_b = surface_with_id(21);

        kbd.set_focus(&mut transport, &seat, Some(&surface_a), Serial::from(10));
        seat.pressed = vec![];
        kbd.set_focus(&mut transport, &seat, Some(&surface_b), Serial::from(11));

        assert_eq!(
            transport.events_for(&handle)[1..],
            [
                RecordedEvent::Enter {
                    serial: 10,
                    surface: ObjectId::new(20),
                    keys: vec![30, 31],
                },
                RecordedEvent::Modifiers {
                    serial: 5,
                    depressed: 1,
                    latched: 0,
                    locked: 2,
                    group: 0,
                },
                RecordedEvent::Leave {
                    serial: 11,
                    surface: ObjectId::new(20),
                },
                RecordedEvent::Enter {
                    serial: 11,
                    surface: ObjectId::new(21),
                    keys: vec![],
                },
                RecordedEvent::Modifiers {
                    serial: 5,
                    depressed: 1,
                    latched: 0,
                    locked: 2,
                    group: 0,
                },
            ]
        );
        assert_eq!(kbd.focused_surface(), Some(surface_b));
    }

    #[test]
    fn key_events_carry_the_seat_timestamp() {
        let mut transport = RecordingTransport::new();
        let mut seat = FakeSeat::new();
        seat.time = 4242;

        let (kbd, handle) = bound_keyboard(&mut transport, &seat);
        let surface = surface_with_id(20);
        kbd.set_focus(&mut transport, &seat, Some(&surface), Serial::from(10));

        kbd.key_pressed(&mut transport, &seat, 30, Serial::from(11));
        kbd.key_released(&mut transport, &seat, 30, Serial::from(12));

        let events = transport.events_for(&handle);
        assert_eq!(
            events[events.len() - 2..],
            [
                RecordedEvent::Key {
                    serial: 11,
                    time: 4242,
                    key: 30,
                    state: KeyState::Pressed,
                },
                RecordedEvent::Key {
                    serial: 12,
                    time: 4242,
                    key: 30,
                    state: KeyState::Released,
                },
            ]
        );
    }

    #[test]
    fn explicit_modifier_push_uses_the_given_values() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, handle) = bound_keyboard(&mut transport, &seat);
        let surface = surface_with_id(20);
        kbd.set_focus(&mut transport, &seat, Some(&surface), Serial::from(10));

        kbd.update_modifiers(
            &mut transport,
            ModifiersState {
                depressed: 4,
                latched: 1,
                locked: 0,
                group: 2,
            },
            Serial::from(13),
        );

        assert_eq!(
            transport.events_for(&handle).last(),
            Some(&RecordedEvent::Modifiers {
                serial: 13,
                depressed: 4,
                latched: 1,
                locked: 0,
                group: 2,
            })
        );
    }

    #[test]
    #[should_panic(expected = "without a focused surface")]
    fn key_delivery_without_focus_is_a_contract_violation() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, _handle) = bound_keyboard(&mut transport, &seat);
        kbd.key_pressed(&mut transport, &seat, 30, Serial::from(11));
    }

    #[test]
    #[should_panic(expected = "without a focused surface")]
    fn modifier_delivery_without_focus_is_a_contract_violation() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, _handle) = bound_keyboard(&mut transport, &seat);
        kbd.update_modifiers(&mut transport, ModifiersState::default(), Serial::from(11));
    }

    #[test]
    fn destroyed_focus_surface_clears_silently() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, handle) = bound_keyboard(&mut transport, &seat);
        let surface = surface_with_id(20);
        kbd.set_focus(&mut transport, &seat, Some(&surface), Serial::from(10));

        assert!(kbd.is_focused());
        let emitted = transport.events_for(&handle).len();
        surface.destroy();

        assert!(!kbd.is_focused());
        assert_eq!(kbd.focused_surface(), None);
        assert_eq!(transport.events_for(&handle).len(), emitted, "no leave event expected");

        // clearing the already clear focus stays a no-op
        kbd.set_focus(&mut transport, &seat, None, Serial::from(11));
        assert_eq!(transport.events_for(&handle).len(), emitted);
    }

    #[test]
    fn clearing_focus_emits_leave_and_cancels_the_subscription() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, handle) = bound_keyboard(&mut transport, &seat);
        let surface = surface_with_id(20);
        kbd.set_focus(&mut transport, &seat, Some(&surface), Serial::from(10));

        kbd.set_focus(&mut transport, &seat, None, Serial::from(11));
        assert_eq!(
            transport.events_for(&handle).last(),
            Some(&RecordedEvent::Leave {
                serial: 11,
                surface: ObjectId::new(20),
            })
        );
        assert_eq!(kbd.focused_surface(), None);

        // the destruction subscription is gone, destroying the surface must
        // not touch the binding anymore
        let emitted = transport.events_for(&handle).len();
        surface.destroy();
        assert_eq!(transport.events_for(&handle).len(), emitted);
        assert_eq!(kbd.focused_surface(), None);
    }

    #[test]
    fn set_keymap_pushes_a_replacement() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, handle) = bound_keyboard(&mut transport, &seat);

        kbd.set_keymap(&mut transport, seat.keymap_fd(), 2048);
        assert_eq!(
            transport.events_for(&handle).last(),
            Some(&RecordedEvent::Keymap {
                format: KeymapFormat::XkbV1,
                fd: seat.keymap_raw_fd(),
                size: 2048,
            })
        );
    }

    #[test]
    fn unbound_binding_tolerates_stale_commands() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, handle) = bound_keyboard(&mut transport, &seat);
        let surface = surface_with_id(20);
        kbd.set_focus(&mut transport, &seat, Some(&surface), Serial::from(10));

        transport.release(&handle);
        assert_eq!(kbd.resource(), None);
        assert_eq!(kbd.focused_surface(), None);

        let emitted = transport.events_for(&handle).len();
        kbd.set_focus(&mut transport, &seat, Some(&surface), Serial::from(11));
        kbd.set_keymap(&mut transport, seat.keymap_fd(), 2048);
        assert_eq!(transport.events_for(&handle).len(), emitted);

        // the subscription was cancelled on unbind
        surface.destroy();
        assert_eq!(transport.events_for(&handle).len(), emitted);
    }

    #[test]
    fn owner_destroy_and_client_release_are_exclusive() {
        let mut transport = RecordingTransport::new();
        let seat = FakeSeat::new();
        let (kbd, handle) = bound_keyboard(&mut transport, &seat);
        let surface = surface_with_id(20);
        kbd.set_focus(&mut transport, &seat, Some(&surface), Serial::from(10));

        kbd.destroy(&mut transport);
        assert_eq!(transport.destroyed, vec![handle.clone()]);
        assert_eq!(kbd.resource(), None);
        assert_eq!(kbd.focused_surface(), None);
        assert!(!transport.is_live(&handle));

        // a release arriving after the owner tore the object down is inert
        transport.release(&handle);
        assert_eq!(transport.destroyed.len(), 1);
    }
}
