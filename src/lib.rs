#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # Waybind: compositor-side protocol object bindings
//!
//! This crate implements the server-side object model a display-server
//! compositor needs to expose protocol objects to its clients: per-client
//! resource lifecycles for region objects and keyboard input delivery,
//! decoupled from any concrete wire transport or event loop.
//!
//! ## Structure of the crate
//!
//! - [`wire`] defines the seam to the transport library: opaque per-client
//!   object handles, the [`WireTransport`](wire::WireTransport) capability
//!   used to allocate objects and emit events, and the unbind notification
//!   every protocol object registers.
//! - [`binding`] provides the lifecycle primitive shared by all protocol
//!   objects: exactly one wire object per binding, with two mutually
//!   exclusive teardown paths (client release vs. owner destruction).
//! - [`surface`] models the entities that can hold input focus, including
//!   the destruction-subscription registry focus holders rely on.
//! - [`seat`] holds the [`SeatHandler`](seat::SeatHandler) capability
//!   supplying keymap and key state, and the [`SeatState`](seat::SeatState)
//!   owner tracking keyboard bindings.
//! - [`keyboard`] implements the keyboard focus and input delivery state
//!   machine.
//! - [`region`] implements region geometry accumulation and its change
//!   notification, together with the [`CompositorState`](region::CompositorState)
//!   owner.
//! - [`utils`] contains the small shared vocabulary: protocol serials,
//!   protocol geometry and subscription registries.
//!
//! ## Concurrency model
//!
//! All operations are meant to be driven from the single thread that owns
//! the transport's dispatch loop. The handles are nevertheless cheap to
//! clone and internally synchronized, so they can be stored wherever the
//! surrounding compositor keeps its state.
//!
//! ## Logging
//!
//! Waybind uses [`tracing`] for its internal logging: lifecycle edges are
//! logged at `debug` level and per-event emission at `trace` level.

pub mod binding;
pub mod keyboard;
pub mod region;
pub mod seat;
pub mod surface;
pub mod utils;
pub mod wire;
