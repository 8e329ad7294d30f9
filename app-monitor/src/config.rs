use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

use safemidi_core::config::ClientConfig;
use safemidi_core::driver::DEFAULT_ID;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
  pub midi: Midi,
  pub client: ClientConfig,
}

impl Default for Config {
  fn default() -> Config {
    Config {
      midi: Midi::default(),
      client: ClientConfig::named("safemidi.monitor"),
    }
  }
}

impl Config {
  pub fn from_file<'a, T>(path: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
  }

  #[cfg(test)]
  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Every {
  #[serde(rename = "all")]
  All,
}

/// Which of the driver's sources get connected: `"all"` or a list of indices.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Sources {
  Every(Every),
  Indices(Vec<usize>),
}

impl Default for Sources {
  fn default() -> Sources {
    Sources::Every(Every::All)
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Midi {
  pub driver: String,
  pub run_seconds: u64,
  pub sources: Sources,
}

impl Default for Midi {
  fn default() -> Midi {
    Midi {
      driver: DEFAULT_ID.to_string(),
      run_seconds: 30,
      sources: Sources::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use safemidi_core::config::DecodeFailures;

  #[test]
  fn defaults() {
    let config = Config::from_str("").unwrap();
    assert_eq!(config.midi.driver, DEFAULT_ID);
    assert_eq!(config.midi.run_seconds, 30);
    assert_eq!(config.midi.sources, Sources::Every(Every::All));
    assert_eq!(config.client.name, "safemidi.monitor");
    assert_eq!(config.client.decode_failures, DecodeFailures::Log);
  }

  #[test]
  fn parse() {
    let config = Config::from_str(
      r#"
      [midi]
      driver = "Loopback"
      run_seconds = 5
      sources = [0, 2]

      [client]
      name = "test.monitor"
      decode_failures = "surface"
      "#,
    )
    .unwrap();
    assert_eq!(config.midi.driver, "Loopback");
    assert_eq!(config.midi.run_seconds, 5);
    assert_eq!(config.midi.sources, Sources::Indices(vec![0, 2]));
    assert_eq!(config.client.name, "test.monitor");
    assert_eq!(config.client.decode_failures, DecodeFailures::Surface);
  }

  #[test]
  fn all_sources() {
    let config = Config::from_str("[midi]\nsources = \"all\"").unwrap();
    assert_eq!(config.midi.sources, Sources::Every(Every::All));
  }

  #[test]
  fn reject_unknown_sources() {
    assert!(Config::from_str("[midi]\nsources = \"some\"").is_err());
  }

  #[test]
  fn client_section_alone_keeps_its_defaults() {
    let config = Config::from_str("[client]\nname = \"other\"").unwrap();
    assert_eq!(config.client.name, "other");
    assert_eq!(config.client.decode_failures, DecodeFailures::Log);
  }
}
