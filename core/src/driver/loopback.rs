//! An in-process driver.
//!
//! Sources are plain ids, packet lists and notifications are delivered synchronously on the
//! thread that calls [`Loopback::send`] or [`Loopback::post_notification`]. Every call is
//! journaled, and any operation can be made to fail once with a chosen status.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;

use super::{ClientRef, Driver, EndpointRef, ObjectRef, PortRef, Property};
use crate::dispatch;
use crate::error::{
  OSStatus, INVALID_CLIENT, INVALID_PORT, NO_CONNECTION, NO_ERR, OBJECT_NOT_FOUND,
  UNKNOWN_ENDPOINT,
};
use crate::notification::PropertyNames;
use crate::packet::{PacketLayout, PacketListBuilder};
use crate::registry::Token;

pub const ID: &str = "Loopback";

const FIRST_OBJECT: ObjectRef = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  ClientCreate,
  ClientDispose,
  StringProperty,
  InputPortCreate,
  PortDispose,
  PortConnectSource,
  PortDisconnectSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  ClientCreate(String),
  ClientDispose(ClientRef),
  InputPortCreate(ClientRef, String),
  PortDispose(PortRef),
  PortConnectSource(PortRef, EndpointRef),
  PortDisconnectSource(PortRef, EndpointRef),
}

struct ClientEntry {
  name: String,
  context: Token,
}

struct PortEntry {
  client: ClientRef,
  name: String,
  context: Token,
  connections: Vec<(EndpointRef, Token)>,
}

struct State {
  next_object: ObjectRef,
  clients: HashMap<ClientRef, ClientEntry>,
  ports: HashMap<PortRef, PortEntry>,
  sources: Vec<(EndpointRef, String)>,
  property_names: Vec<String>,
  failures: HashMap<Operation, OSStatus>,
  calls: Vec<Call>,
}

impl State {
  fn allocate(&mut self) -> ObjectRef {
    let object = self.next_object;
    self.next_object += 1;
    object
  }

  fn fail(&mut self, operation: Operation) -> Option<OSStatus> {
    self.failures.remove(&operation)
  }

  fn name_of(&self, object: ObjectRef) -> Option<&str> {
    self
      .clients
      .get(&ClientRef(object))
      .map(|client| client.name.as_str())
      .or_else(|| {
        self
          .ports
          .get(&PortRef(object))
          .map(|port| port.name.as_str())
      })
      .or_else(|| {
        self
          .sources
          .iter()
          .find(|(source, _)| source.0 == object)
          .map(|(_, name)| name.as_str())
      })
  }
}

pub struct Loopback {
  state: Mutex<State>,
}

impl Loopback {
  pub fn new() -> Loopback {
    Loopback {
      state: Mutex::new(State {
        next_object: FIRST_OBJECT,
        clients: HashMap::new(),
        ports: HashMap::new(),
        sources: Vec::new(),
        property_names: Vec::new(),
        failures: HashMap::new(),
        calls: Vec::new(),
      }),
    }
  }

  fn state(&self) -> MutexGuard<State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn add_source<T>(&self, name: T) -> EndpointRef
  where
    T: Into<String>,
  {
    let mut state = self.state();
    let source = EndpointRef(state.allocate());
    state.sources.push((source, name.into()));
    source
  }

  /// The next call of `operation` fails with `status`.
  pub fn fail_next(&self, operation: Operation, status: OSStatus) {
    self.state().failures.insert(operation, status);
  }

  pub fn calls(&self) -> Vec<Call> {
    self.state().calls.clone()
  }

  pub fn client_count(&self) -> usize {
    self.state().clients.len()
  }

  pub fn port_count(&self) -> usize {
    self.state().ports.len()
  }

  pub fn port_name(&self, port: PortRef) -> Option<String> {
    self.state().ports.get(&port).map(|entry| entry.name.clone())
  }

  pub fn ports_of(&self, client: ClientRef) -> Vec<PortRef> {
    let state = self.state();
    let mut ports: Vec<PortRef> = state
      .ports
      .iter()
      .filter(|(_, entry)| entry.client == client)
      .map(|(port, _)| *port)
      .collect();
    ports.sort_by_key(|port| port.0);
    ports
  }

  pub fn connection_context(&self, port: PortRef, source: EndpointRef) -> Option<Token> {
    self.state().ports.get(&port).and_then(|entry| {
      entry
        .connections
        .iter()
        .find(|(connected, _)| *connected == source)
        .map(|(_, context)| *context)
    })
  }

  /// Registers a property name and returns the raw reference notifications carry for it.
  pub fn intern_property_name<T>(&self, name: T) -> usize
  where
    T: Into<String>,
  {
    let mut state = self.state();
    state.property_names.push(name.into());
    state.property_names.len()
  }

  /// The context the port was created with, the one packet lists are delivered with.
  pub fn port_context(&self, port: PortRef) -> Option<Token> {
    self.state().ports.get(&port).map(|entry| entry.context)
  }

  /// Delivers a packet list to every port connected to `source`, with each port's creation
  /// context. Connection contexts are only recorded.
  pub fn send(&self, source: EndpointRef, packet_list: &[u8]) {
    let contexts: Vec<Token> = self
      .state()
      .ports
      .values()
      .filter(|entry| {
        entry
          .connections
          .iter()
          .any(|(connected, _)| *connected == source)
      })
      .map(|entry| entry.context)
      .collect();

    trace!(
      "Loopback delivering {} bytes from {:?} to {} ports",
      packet_list.len(),
      source,
      contexts.len()
    );

    for context in contexts {
      dispatch::receive(context, packet_list);
    }
  }

  pub fn send_packets<D>(&self, source: EndpointRef, packets: &[(u64, D)])
  where
    D: AsRef<[u8]>,
  {
    let mut builder = PacketListBuilder::new(PacketLayout::native());
    for (timestamp, data) in packets {
      builder.push(*timestamp, data.as_ref());
    }
    self.send(source, &builder.build());
  }

  /// Delivers a notification record to every live client.
  pub fn post_notification(&self, record: &[u8]) {
    let contexts: Vec<Token> = self
      .state()
      .clients
      .values()
      .map(|client| client.context)
      .collect();

    for context in contexts {
      dispatch::notify(context, record, self);
    }
  }
}

impl Default for Loopback {
  fn default() -> Self {
    Loopback::new()
  }
}

impl PropertyNames for Loopback {
  fn property_name(&self, raw: usize) -> Option<String> {
    let state = self.state();
    raw
      .checked_sub(1)
      .and_then(|index| state.property_names.get(index))
      .cloned()
  }
}

impl Driver for Loopback {
  fn id(&self) -> &str {
    ID
  }

  fn client_create(&self, name: &str, context: Token) -> Result<ClientRef, OSStatus> {
    let mut state = self.state();
    state.calls.push(Call::ClientCreate(name.to_string()));
    if let Some(status) = state.fail(Operation::ClientCreate) {
      return Err(status);
    }
    let client = ClientRef(state.allocate());
    state.clients.insert(
      client,
      ClientEntry {
        name: name.to_string(),
        context,
      },
    );
    Ok(client)
  }

  fn client_dispose(&self, client: ClientRef) -> OSStatus {
    let mut state = self.state();
    state.calls.push(Call::ClientDispose(client));
    if let Some(status) = state.fail(Operation::ClientDispose) {
      return status;
    }
    match state.clients.remove(&client) {
      Some(_) => {
        state.ports.retain(|_, entry| entry.client != client);
        NO_ERR
      }
      None => INVALID_CLIENT,
    }
  }

  fn string_property(&self, object: ObjectRef, property: Property) -> Result<String, OSStatus> {
    let mut state = self.state();
    if let Some(status) = state.fail(Operation::StringProperty) {
      return Err(status);
    }
    match property {
      Property::Name | Property::DisplayName => state
        .name_of(object)
        .map(str::to_string)
        .ok_or(OBJECT_NOT_FOUND),
    }
  }

  fn input_port_create(
    &self,
    client: ClientRef,
    name: &str,
    context: Token,
  ) -> Result<PortRef, OSStatus> {
    let mut state = self.state();
    state
      .calls
      .push(Call::InputPortCreate(client, name.to_string()));
    if let Some(status) = state.fail(Operation::InputPortCreate) {
      return Err(status);
    }
    if !state.clients.contains_key(&client) {
      return Err(INVALID_CLIENT);
    }
    let port = PortRef(state.allocate());
    state.ports.insert(
      port,
      PortEntry {
        client,
        name: name.to_string(),
        context,
        connections: Vec::new(),
      },
    );
    Ok(port)
  }

  fn port_dispose(&self, port: PortRef) -> OSStatus {
    let mut state = self.state();
    state.calls.push(Call::PortDispose(port));
    if let Some(status) = state.fail(Operation::PortDispose) {
      return status;
    }
    match state.ports.remove(&port) {
      Some(_) => NO_ERR,
      None => INVALID_PORT,
    }
  }

  fn port_connect_source(&self, port: PortRef, source: EndpointRef, context: Token) -> OSStatus {
    let mut state = self.state();
    state.calls.push(Call::PortConnectSource(port, source));
    if let Some(status) = state.fail(Operation::PortConnectSource) {
      return status;
    }
    if !state.sources.iter().any(|(known, _)| *known == source) {
      return UNKNOWN_ENDPOINT;
    }
    match state.ports.get_mut(&port) {
      Some(entry) => {
        entry.connections.retain(|(connected, _)| *connected != source);
        entry.connections.push((source, context));
        NO_ERR
      }
      None => INVALID_PORT,
    }
  }

  fn port_disconnect_source(&self, port: PortRef, source: EndpointRef) -> OSStatus {
    let mut state = self.state();
    state.calls.push(Call::PortDisconnectSource(port, source));
    if let Some(status) = state.fail(Operation::PortDisconnectSource) {
      return status;
    }
    match state.ports.get_mut(&port) {
      Some(entry) => {
        let before = entry.connections.len();
        entry.connections.retain(|(connected, _)| *connected != source);
        if entry.connections.len() < before {
          NO_ERR
        } else {
          NO_CONNECTION
        }
      }
      None => INVALID_PORT,
    }
  }

  fn sources(&self) -> Vec<EndpointRef> {
    self
      .state()
      .sources
      .iter()
      .map(|(source, _)| *source)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn create_and_dispose() {
    let driver = Loopback::new();
    let client = driver.client_create("client", Token::next()).unwrap();
    let port = driver
      .input_port_create(client, "port", Token::next())
      .unwrap();
    assert_eq!(driver.ports_of(client), vec![port]);

    assert_eq!(driver.port_dispose(port), NO_ERR);
    assert_eq!(driver.port_dispose(port), INVALID_PORT);
    assert_eq!(driver.client_dispose(client), NO_ERR);
    assert_eq!(driver.client_dispose(client), INVALID_CLIENT);
    assert_eq!(driver.client_count(), 0);
  }

  #[test]
  fn port_needs_client() {
    let driver = Loopback::new();
    assert_eq!(
      driver.input_port_create(ClientRef(1), "port", Token::next()),
      Err(INVALID_CLIENT)
    );
  }

  #[test]
  fn string_properties() {
    let driver = Loopback::new();
    let client = driver.client_create("client", Token::next()).unwrap();
    let source = driver.add_source("keys");
    assert_eq!(
      driver.string_property(client.into(), Property::Name),
      Ok("client".to_string())
    );
    assert_eq!(
      driver.string_property(source.into(), Property::DisplayName),
      Ok("keys".to_string())
    );
    assert_eq!(
      driver.string_property(7, Property::Name),
      Err(OBJECT_NOT_FOUND)
    );
  }

  #[test]
  fn failures_are_one_shot() {
    let driver = Loopback::new();
    driver.fail_next(Operation::ClientCreate, -1);
    assert_eq!(driver.client_create("a", Token::next()), Err(-1));
    assert!(driver.client_create("a", Token::next()).is_ok());
  }

  #[test]
  fn interned_property_names() {
    let driver = Loopback::new();
    let raw = driver.intern_property_name("offline");
    assert_eq!(driver.property_name(raw), Some("offline".to_string()));
    assert_eq!(driver.property_name(0), None);
    assert_eq!(driver.property_name(raw + 1), None);
  }

  #[test]
  fn port_and_connection_contexts_are_kept() {
    let driver = Loopback::new();
    let client = driver.client_create("client", Token::next()).unwrap();
    let port_context = Token::next();
    let port = driver
      .input_port_create(client, "port", port_context)
      .unwrap();
    let source = driver.add_source("keys");
    let connection_context = Token::next();
    assert_eq!(
      driver.port_connect_source(port, source, connection_context),
      NO_ERR
    );
    assert_eq!(driver.port_context(port), Some(port_context));
    assert_eq!(
      driver.connection_context(port, source),
      Some(connection_context)
    );
  }
}
