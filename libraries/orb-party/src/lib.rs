//! Orb Party
//!
//! Client side of listen parties.
//!
//! - [`PartyClient`]: applies server messages and yields [`Reconcile`] steps
//!   that keep a guest's player following the host
//! - [`HostPublisher`]: turns the host's playback events into `state_update`
//!   messages (immediately for discrete changes, otherwise as a heartbeat)
//!
//! Transport is left to the caller: feed text frames into
//! [`PartyClient::apply_text`] and send whatever [`HostPublisher`] returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use orb_core::protocol::Role;
//! use orb_party::PartyClient;
//!
//! let mut party = PartyClient::new(Role::Guest);
//! for frame in socket.frames() {
//!     for step in party.apply_text(&frame, now_ms())? {
//!         step.apply(&mut adapter, |track| guest_stream_url(&party, track))?;
//!     }
//!     if party.is_terminal() {
//!         break;
//!     }
//! }
//! ```

mod client;
mod error;
mod publisher;
mod reconcile;

pub use client::{ConnectionStatus, PartyClient, DEFAULT_DRIFT_TOLERANCE_MS};
pub use error::{PartyError, Result};
pub use publisher::{HostPublisher, DEFAULT_HEARTBEAT_INTERVAL};
pub use reconcile::Reconcile;
