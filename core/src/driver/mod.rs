//! The boundary with the native MIDI service.
//!
//! Every call is synchronous and reports a native status. Packet lists and notifications
//! come back asynchronously, on threads the driver owns, through [`crate::dispatch`].

pub mod loopback;

#[cfg(target_os = "macos")]
pub mod coremidi;

use crate::error::OSStatus;
use crate::registry::Token;

pub type ObjectRef = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientRef(pub ObjectRef);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef(pub ObjectRef);

/// A source or destination owned by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointRef(pub ObjectRef);

impl From<ClientRef> for ObjectRef {
  fn from(client: ClientRef) -> Self {
    client.0
  }
}

impl From<PortRef> for ObjectRef {
  fn from(port: PortRef) -> Self {
    port.0
  }
}

impl From<EndpointRef> for ObjectRef {
  fn from(endpoint: EndpointRef) -> Self {
    endpoint.0
  }
}

/// String valued object properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
  Name,
  DisplayName,
}

pub trait Driver: Send + Sync {
  fn id(&self) -> &str;

  /// Notifications for the new client go to `dispatch::notify` with `context`.
  fn client_create(&self, name: &str, context: Token) -> Result<ClientRef, OSStatus>;

  fn client_dispose(&self, client: ClientRef) -> OSStatus;

  fn string_property(&self, object: ObjectRef, property: Property) -> Result<String, OSStatus>;

  /// Packets for the new port go to `dispatch::receive` with `context`.
  fn input_port_create(
    &self,
    client: ClientRef,
    name: &str,
    context: Token,
  ) -> Result<PortRef, OSStatus>;

  fn port_dispose(&self, port: PortRef) -> OSStatus;

  fn port_connect_source(&self, port: PortRef, source: EndpointRef, context: Token) -> OSStatus;

  fn port_disconnect_source(&self, port: PortRef, source: EndpointRef) -> OSStatus;

  fn sources(&self) -> Vec<EndpointRef>;
}

#[cfg(target_os = "macos")]
pub const DEFAULT_ID: &str = coremidi::ID;

#[cfg(not(target_os = "macos"))]
pub const DEFAULT_ID: &str = loopback::ID;
