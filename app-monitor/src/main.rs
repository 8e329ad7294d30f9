use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn, LevelFilter};

use failure::{Error, Fail};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};

use safemidi_core::client::log_state_change;
use safemidi_core::{Client, Driver, MidiPacket, Property};

mod config;
use crate::config::Config;

mod midi;
use crate::midi::{select_sources, Midi};

const SAFEMIDI_CONFIG: &str = "SAFEMIDI_CONFIG";
const DEFAULT_SAFEMIDI_CONFIG: &str = "monitor.toml";

const SAFEMIDI_LOG_CONFIG: &str = "SAFEMIDI_LOG_CONFIG";
const DEFAULT_SAFEMIDI_LOG_CONFIG: &str = "log4rs.yaml";

const STDOUT_APPENDER: &str = "stdout";

#[derive(Debug, Fail)]
enum MainError {
  #[fail(display = "Failed to init logging: {}", cause)]
  LoggingInit { cause: String },

  #[fail(display = "Failed to get a MIDI driver: {}", cause)]
  GetMidiDriver { cause: midi::MidiError },
}

fn main() -> Result<(), Error> {
  init_logging()?;

  let config = init_config()?;

  let driver = init_driver(&config)?;

  let (client, receiver) = init_client(&config, driver)?;

  monitor(&receiver, Duration::from_secs(config.midi.run_seconds));

  info!("Closing ...");
  client.dispose()?;

  Ok(())
}

fn init_logging() -> Result<(), Error> {
  let log_config_path = std::env::var(SAFEMIDI_LOG_CONFIG)
    .unwrap_or_else(|_| DEFAULT_SAFEMIDI_LOG_CONFIG.to_string());

  if Path::new(&log_config_path).exists() {
    log4rs::init_file(log_config_path.as_str(), Default::default()).map_err(|err| {
      MainError::LoggingInit {
        cause: err.to_string(),
      }
    })?;
  } else {
    let stdout = ConsoleAppender::builder().build();
    let log_config = LogConfig::builder()
      .appender(Appender::builder().build(STDOUT_APPENDER, Box::new(stdout)))
      .build(
        Root::builder()
          .appender(STDOUT_APPENDER)
          .build(LevelFilter::Info),
      )
      .map_err(|err| MainError::LoggingInit {
        cause: err.to_string(),
      })?;
    log4rs::init_config(log_config).map_err(|err| MainError::LoggingInit {
      cause: err.to_string(),
    })?;
    debug!("No logging configuration at {}, using the console", log_config_path);
  }

  Ok(())
}

fn init_config() -> Result<Config, Error> {
  let config_path =
    std::env::var(SAFEMIDI_CONFIG).unwrap_or_else(|_| DEFAULT_SAFEMIDI_CONFIG.to_string());

  let config = if Path::new(&config_path).exists() {
    info!("Loading monitor configuration from {} ...", config_path);
    Config::from_file(config_path.as_str())?
  } else {
    info!("No configuration at {}, using defaults", config_path);
    Config::default()
  };
  debug!("{:#?}", config);

  Ok(config)
}

fn init_driver(config: &Config) -> Result<Arc<dyn Driver>, Error> {
  info!("Initialising MIDI ...");

  let midi = Midi::new();
  debug!("Available drivers: {:?}", midi.drivers());

  let driver = midi
    .driver(config.midi.driver.as_str())
    .map_err(|cause| MainError::GetMidiDriver { cause })?;

  debug!("MIDI Driver: {}", driver.id());

  Ok(driver)
}

fn init_client(
  config: &Config,
  driver: Arc<dyn Driver>,
) -> Result<(Client, Receiver<Vec<MidiPacket>>), Error> {
  let (sender, receiver) = crossbeam_channel::unbounded::<Vec<MidiPacket>>();

  let mut client = Client::with_config(Arc::clone(&driver), &config.client, log_state_change)?;
  info!(
    "Created client {}",
    client.name().unwrap_or_else(|| config.client.name.clone())
  );

  let port = client.add_input_port(forward(sender))?;
  debug!("Created input port {}", port.name());

  let sources = select_sources(&driver.sources(), &config.midi.sources);
  if sources.is_empty() {
    warn!("There are no sources to connect");
  }

  for source in sources {
    let name = driver
      .string_property(source.0, Property::DisplayName)
      .unwrap_or_else(|_| format!("{:?}", source));
    match port.connect_source(source) {
      Ok(()) => info!("Connected to {}", name),
      Err(err) => warn!("Failed to connect to {}: {}", name, err),
    }
  }

  Ok((client, receiver))
}

/// Sends every packet list on to the main thread.
fn forward(sender: Sender<Vec<MidiPacket>>) -> impl FnMut(Vec<MidiPacket>) + Send + 'static {
  move |packets| {
    if let Err(err) = sender.send(packets) {
      trace!(
        "Dropping {} packets, nobody is listening anymore",
        err.into_inner().len()
      );
    }
  }
}

fn monitor(receiver: &Receiver<Vec<MidiPacket>>, run_time: Duration) {
  info!("Monitoring for {} seconds ...", run_time.as_secs());

  let deadline = Instant::now() + run_time;
  loop {
    let now = Instant::now();
    if now >= deadline {
      break;
    }
    match receiver.recv_timeout(deadline - now) {
      Ok(packets) => {
        for packet in packets {
          info!("{:>20} {:02x?}", packet.timestamp(), packet.data());
        }
      }
      Err(RecvTimeoutError::Timeout) => break,
      Err(RecvTimeoutError::Disconnected) => {
        warn!("The input port was closed");
        break;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn forward_sends_packets() {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let mut input = forward(sender);
    input(vec![MidiPacket::new(1, vec![0xf8])]);
    assert_eq!(
      receiver.try_recv().unwrap(),
      vec![MidiPacket::new(1, vec![0xf8])]
    );
  }

  #[test]
  fn forward_outlives_the_receiver() {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let mut input = forward(sender);
    drop(receiver);
    input(vec![MidiPacket::new(1, vec![0xf8])]);
    input(Vec::new());
  }
}
