use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::{debug, trace, warn};

use crate::driver::{ClientRef, Driver, EndpointRef, PortRef};
use crate::error::{check, MidiError, MidiResult};
use crate::packet::{extract, MidiPacket, PacketLayout};
use crate::registry::{Registry, Token};

/// Consumer of the packets delivered to an input port.
///
/// It runs synchronously on the driver's delivery thread. Blocking in it stalls delivery
/// for its port until it returns.
pub type PacketInput = Box<dyn FnMut(Vec<MidiPacket>) + Send>;

pub(crate) fn ports() -> &'static Registry<Inlet> {
  static PORTS: OnceLock<Registry<Inlet>> = OnceLock::new();
  PORTS.get_or_init(Registry::new)
}

/// The part of an input port reachable from driver callbacks.
pub(crate) struct Inlet {
  name: String,
  input: Mutex<Option<PacketInput>>,
}

impl Inlet {
  fn new(name: String, input: PacketInput) -> Inlet {
    Inlet {
      name,
      input: Mutex::new(Some(input)),
    }
  }

  pub(crate) fn deliver(&self, packet_list: &[u8]) {
    let packets = extract(packet_list, PacketLayout::native());
    let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
    match input.as_mut() {
      Some(input) => input(packets),
      None => trace!("Input port {:?} closed, dropping {} packets", self.name, packets.len()),
    }
  }

  /// Waits for any delivery in progress; the consumer is never called afterwards.
  fn close(&self) -> Option<PacketInput> {
    self
      .input
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
  }
}

/// An input port owned by a client.
///
/// The port registers itself under a token that the driver hands back with every packet
/// list, the same token for every source connected to it. Disposing the port (explicitly
/// or by dropping it) unregisters the token before releasing the native handle, so late
/// deliveries find nothing and are dropped.
///
/// The consumer must not dispose its own port: disposal waits for the consumer to return.
pub struct InputPort {
  driver: Arc<dyn Driver>,
  handle: PortRef,
  token: Token,
  name: String,
  inlet: Arc<Inlet>,
  sources: Vec<EndpointRef>,
  disposed: bool,
}

impl InputPort {
  pub fn create<F>(
    driver: Arc<dyn Driver>,
    client: ClientRef,
    name: &str,
    input: F,
  ) -> MidiResult<InputPort>
  where
    F: FnMut(Vec<MidiPacket>) + Send + 'static,
  {
    Self::with_token(driver, client, name, Token::next(), Box::new(input))
  }

  pub(crate) fn with_token(
    driver: Arc<dyn Driver>,
    client: ClientRef,
    name: &str,
    token: Token,
    input: PacketInput,
  ) -> MidiResult<InputPort> {
    let handle = driver
      .input_port_create(client, name, token)
      .map_err(MidiError::from_status)?;

    let inlet = Arc::new(Inlet::new(name.to_string(), input));
    if !ports().insert(token, Arc::clone(&inlet)) {
      if let Err(err) = check(driver.port_dispose(handle)) {
        warn!("Failed to release input port {:?}: {}", name, err);
      }
      return Err(MidiError::IdNotUnique);
    }

    debug!(
      "Created input port {:?} ({:?}) with token {}",
      name, handle, token
    );

    Ok(InputPort {
      driver,
      handle,
      token,
      name: name.to_string(),
      inlet,
      sources: Vec::new(),
      disposed: false,
    })
  }

  pub fn name(&self) -> &str {
    self.name.as_str()
  }

  pub fn handle(&self) -> PortRef {
    self.handle
  }

  pub fn token(&self) -> Token {
    self.token
  }

  /// Sources connected so far, in connection order.
  pub fn sources(&self) -> &[EndpointRef] {
    self.sources.as_slice()
  }

  pub fn connect_source(&mut self, source: EndpointRef) -> MidiResult<()> {
    check(
      self
        .driver
        .port_connect_source(self.handle, source, self.token),
    )?;
    debug!("Connected {:?} to input port {:?}", source, self.name);
    self.sources.push(source);
    Ok(())
  }

  pub fn disconnect_source(&mut self, source: EndpointRef) -> MidiResult<()> {
    check(self.driver.port_disconnect_source(self.handle, source))?;
    debug!("Disconnected {:?} from input port {:?}", source, self.name);
    if let Some(index) = self.sources.iter().position(|s| *s == source) {
      self.sources.remove(index);
    }
    Ok(())
  }

  pub fn dispose(mut self) -> MidiResult<()> {
    self.teardown()
  }

  fn teardown(&mut self) -> MidiResult<()> {
    if self.disposed {
      return Ok(());
    }
    self.disposed = true;

    ports().remove(self.token);
    drop(self.inlet.close());
    self.sources.clear();

    let result = check(self.driver.port_dispose(self.handle));
    debug!("Disposed input port {:?}: {:?}", self.name, result);
    result
  }
}

impl Drop for InputPort {
  fn drop(&mut self) {
    if let Err(err) = self.teardown() {
      warn!("Failed to dispose input port {:?}: {}", self.name, err);
    }
  }
}

impl fmt::Debug for InputPort {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("InputPort")
      .field("name", &self.name)
      .field("handle", &self.handle)
      .field("token", &self.token)
      .field("sources", &self.sources)
      .finish()
  }
}
