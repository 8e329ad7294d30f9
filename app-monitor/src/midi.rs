use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use failure::Fail;

use log::{debug, warn};

use safemidi_core::driver::loopback::{self, Loopback};
use safemidi_core::{Driver, EndpointRef};

use crate::config::Sources;

const DEMO_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Fail)]
pub enum MidiError {
  #[fail(display = "Driver not found: {}", id)]
  DriverNotFound { id: String },
}

pub type MidiResult<T> = Result<T, MidiError>;

type DriverFactory = Box<dyn Fn() -> Arc<dyn Driver>>;

/// The drivers available on this host, by id.
pub struct Midi {
  drivers: HashMap<&'static str, DriverFactory>,
}

impl Midi {
  pub fn new() -> Midi {
    let mut drivers: HashMap<&'static str, DriverFactory> = HashMap::new();

    {
      let loopback_factory = Box::new(|| demo_loopback() as Arc<dyn Driver>);
      drivers.insert(loopback::ID, loopback_factory);
    }

    #[cfg(target_os = "macos")]
    {
      use safemidi_core::driver::coremidi::{self, CoreMidi};
      let coremidi_factory = Box::new(|| Arc::new(CoreMidi::new()) as Arc<dyn Driver>);
      drivers.insert(coremidi::ID, coremidi_factory);
    }

    Midi { drivers }
  }

  pub fn drivers(&self) -> Vec<&'static str> {
    let mut ids: Vec<&'static str> = self.drivers.keys().copied().collect();
    ids.sort();
    ids
  }

  pub fn driver(&self, id: &str) -> MidiResult<Arc<dyn Driver>> {
    self
      .drivers
      .get(id)
      .map(|driver_factory| driver_factory())
      .ok_or_else(|| MidiError::DriverNotFound { id: id.to_string() })
  }
}

/// A loopback driver with one source playing a note every half second.
fn demo_loopback() -> Arc<Loopback> {
  let driver = Arc::new(Loopback::new());
  let source = driver.add_source("Loopback Source");

  let feeder = Arc::clone(&driver);
  thread::spawn(move || {
    let mut timestamp = 0u64;
    loop {
      thread::sleep(DEMO_INTERVAL);
      timestamp += DEMO_INTERVAL.as_nanos() as u64;
      feeder.send_packets(
        source,
        &[(timestamp, [0x90, 0x3c, 0x40]), (timestamp, [0x80, 0x3c, 0x00])],
      );
    }
  });

  driver
}

/// The sources `selection` names among those `available`. Indices out of range are skipped.
pub fn select_sources(available: &[EndpointRef], selection: &Sources) -> Vec<EndpointRef> {
  match selection {
    Sources::Every(_) => available.to_vec(),
    Sources::Indices(indices) => indices
      .iter()
      .filter_map(|index| {
        let source = available.get(*index).copied();
        if source.is_none() {
          warn!(
            "There is no source {}, only {} available",
            index,
            available.len()
          );
        }
        source
      })
      .inspect(|source| debug!("Selected source {:?}", source))
      .collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Every;

  #[test]
  fn loopback_is_always_available() {
    let midi = Midi::new();
    assert!(midi.drivers().contains(&loopback::ID));
    let driver = midi.driver(loopback::ID).unwrap();
    assert_eq!(driver.id(), loopback::ID);
    assert_eq!(driver.sources().len(), 1);
  }

  #[test]
  fn unknown_driver() {
    match Midi::new().driver("Nope") {
      Err(MidiError::DriverNotFound { id }) => assert_eq!(id, "Nope"),
      Ok(_) => panic!("Unexpected driver"),
    }
  }

  #[test]
  fn select_all_sources() {
    let available = vec![EndpointRef(1), EndpointRef(2)];
    assert_eq!(
      select_sources(&available, &Sources::Every(Every::All)),
      available
    );
  }

  #[test]
  fn select_indices_skips_missing() {
    let available = vec![EndpointRef(1), EndpointRef(2), EndpointRef(3)];
    let selected = select_sources(&available, &Sources::Indices(vec![2, 5, 0]));
    assert_eq!(selected, vec![EndpointRef(3), EndpointRef(1)]);
  }
}
