use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use log::{debug, info, warn};

use crate::config::{ClientConfig, DecodeFailures};
use crate::driver::{ClientRef, Driver, Property};
use crate::error::{check, MidiError, MidiResult};
use crate::notification::StateChange;
use crate::packet::MidiPacket;
use crate::port::InputPort;
use crate::registry::{Registry, Token};

/// Receives every state change a client is notified of, on the driver's thread.
pub type Observer = Box<dyn FnMut(&StateChange) + Send>;

pub(crate) fn clients() -> &'static Registry<Hub> {
  static CLIENTS: OnceLock<Registry<Hub>> = OnceLock::new();
  CLIENTS.get_or_init(Registry::new)
}

pub fn log_state_change(change: &StateChange) {
  info!("{}", change);
}

/// The part of a client reachable from driver callbacks.
pub(crate) struct Hub {
  name: String,
  decode_failures: DecodeFailures,
  observer: Mutex<Option<Observer>>,
}

impl Hub {
  pub(crate) fn notify(&self, change: StateChange) {
    if let StateChange::OtherError(error) = &change {
      if self.decode_failures == DecodeFailures::Log {
        warn!(
          "Client {:?} received a notification it could not decode: {}",
          self.name, error
        );
        return;
      }
    }

    let mut observer = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(observer) = observer.as_mut() {
      observer(&change);
    }
  }

  fn close(&self) -> Option<Observer> {
    self
      .observer
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
  }
}

/// A client of the MIDI service and the input ports it owns.
///
/// Teardown is nested: every input port is disposed before the client handle. It runs on
/// [`Client::dispose`], or on drop when the client was never disposed explicitly.
pub struct Client {
  driver: Arc<dyn Driver>,
  handle: ClientRef,
  token: Token,
  name: String,
  hub: Arc<Hub>,
  input_ports: Vec<InputPort>,
  disposed: bool,
}

impl Client {
  /// A client whose state changes are logged.
  pub fn create(driver: Arc<dyn Driver>, name: &str) -> MidiResult<Client> {
    Self::with_observer(driver, name, log_state_change)
  }

  pub fn with_observer<F>(driver: Arc<dyn Driver>, name: &str, observer: F) -> MidiResult<Client>
  where
    F: FnMut(&StateChange) + Send + 'static,
  {
    Self::with_config(driver, &ClientConfig::named(name), observer)
  }

  pub fn with_config<F>(
    driver: Arc<dyn Driver>,
    config: &ClientConfig,
    observer: F,
  ) -> MidiResult<Client>
  where
    F: FnMut(&StateChange) + Send + 'static,
  {
    Self::with_token(driver, config, Token::next(), Box::new(observer))
  }

  pub(crate) fn with_token(
    driver: Arc<dyn Driver>,
    config: &ClientConfig,
    token: Token,
    observer: Observer,
  ) -> MidiResult<Client> {
    let handle = driver
      .client_create(config.name.as_str(), token)
      .map_err(MidiError::from_status)?;

    let hub = Arc::new(Hub {
      name: config.name.clone(),
      decode_failures: config.decode_failures,
      observer: Mutex::new(Some(observer)),
    });
    if !clients().insert(token, Arc::clone(&hub)) {
      if let Err(err) = check(driver.client_dispose(handle)) {
        warn!("Failed to release client {:?}: {}", config.name, err);
      }
      return Err(MidiError::IdNotUnique);
    }

    debug!(
      "Created client {:?} ({:?}) on {} with token {}",
      config.name,
      handle,
      driver.id(),
      token
    );

    Ok(Client {
      driver,
      handle,
      token,
      name: config.name.clone(),
      hub,
      input_ports: Vec::new(),
      disposed: false,
    })
  }

  pub fn handle(&self) -> ClientRef {
    self.handle
  }

  pub fn token(&self) -> Token {
    self.token
  }

  /// The name the driver reports for this client, if it can be queried.
  pub fn name(&self) -> Option<String> {
    match self.driver.string_property(self.handle.into(), Property::Name) {
      Ok(name) => Some(name),
      Err(status) => {
        debug!(
          "Failed to query the name of client {:?}: {}",
          self.name,
          MidiError::from_status(status)
        );
        None
      }
    }
  }

  pub fn input_ports(&self) -> &[InputPort] {
    self.input_ports.as_slice()
  }

  pub fn input_port_mut(&mut self, index: usize) -> Option<&mut InputPort> {
    self.input_ports.get_mut(index)
  }

  /// Creates an input port named `<client name>.port<index>`.
  ///
  /// `input` gets every packet list delivered to the port, on the driver's thread.
  pub fn add_input_port<F>(&mut self, input: F) -> MidiResult<&mut InputPort>
  where
    F: FnMut(Vec<MidiPacket>) + Send + 'static,
  {
    let display_name = self.name().unwrap_or_else(|| self.name.clone());
    let port_name = format!("{}.port{}", display_name, self.input_ports.len());

    let port = InputPort::create(Arc::clone(&self.driver), self.handle, &port_name, input)?;

    let index = self.input_ports.len();
    self.input_ports.push(port);
    Ok(&mut self.input_ports[index])
  }

  pub fn dispose(mut self) -> MidiResult<()> {
    self.teardown()
  }

  fn teardown(&mut self) -> MidiResult<()> {
    if self.disposed {
      return Ok(());
    }
    self.disposed = true;

    let mut result = Ok(());
    for port in self.input_ports.drain(..) {
      let disposed = port.dispose();
      if result.is_ok() {
        result = disposed;
      }
    }

    clients().remove(self.token);
    drop(self.hub.close());

    let disposed = check(self.driver.client_dispose(self.handle));
    debug!("Disposed client {:?}: {:?}", self.name, disposed);
    result.and(disposed)
  }
}

impl Drop for Client {
  fn drop(&mut self) {
    if let Err(err) = self.teardown() {
      warn!("Failed to dispose client {:?}: {}", self.name, err);
    }
  }
}

impl fmt::Debug for Client {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("Client")
      .field("name", &self.name)
      .field("handle", &self.handle)
      .field("token", &self.token)
      .field("input_ports", &self.input_ports)
      .finish()
  }
}
