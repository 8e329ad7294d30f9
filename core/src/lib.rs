//! Safe ownership of native MIDI clients and input ports.
//!
//! The native service calls back on its own threads with nothing but an opaque context.
//! Clients and ports register themselves under a [`Token`] that is handed to the driver as
//! that context, and every callback resolves the token through a lock protected registry
//! before touching anything. Disposed objects are unregistered first, so callbacks that
//! arrive late are dropped.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod notification;
pub mod packet;
pub mod port;
pub mod registry;

pub use client::{Client, Observer};
pub use config::{ClientConfig, DecodeFailures};
pub use driver::{ClientRef, Driver, EndpointRef, PortRef, Property};
pub use error::{MidiError, MidiResult, OSStatus};
pub use notification::StateChange;
pub use packet::MidiPacket;
pub use port::{InputPort, PacketInput};
pub use registry::Token;
