use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

pub const DEFAULT_CLIENT_NAME: &str = "safemidi.client";

/// What a client does with notifications that fail to decode.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailures {
  /// Logged as warnings, never seen by the observer.
  #[serde(rename = "log")]
  Log,
  /// Passed to the observer as `StateChange::OtherError`.
  #[serde(rename = "surface")]
  Surface,
}

impl Default for DecodeFailures {
  fn default() -> DecodeFailures {
    DecodeFailures::Log
  }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
  pub name: String,
  pub decode_failures: DecodeFailures,
}

impl Default for ClientConfig {
  fn default() -> ClientConfig {
    ClientConfig {
      name: DEFAULT_CLIENT_NAME.to_string(),
      decode_failures: DecodeFailures::default(),
    }
  }
}

impl ClientConfig {
  pub fn named<T>(name: T) -> ClientConfig
  where
    T: Into<String>,
  {
    ClientConfig {
      name: name.into(),
      ..ClientConfig::default()
    }
  }

  pub fn from_file<'a, T>(path: T) -> Result<ClientConfig, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    let config: ClientConfig = toml::from_str(&content)?;
    Ok(config)
  }

  pub fn from_str<'a, T>(content: T) -> Result<ClientConfig, Error>
  where
    T: Into<&'a str>,
  {
    let config: ClientConfig = toml::from_str(content.into())?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = ClientConfig::from_str("").unwrap();
    assert_eq!(config, ClientConfig::default());
    assert_eq!(config.name, DEFAULT_CLIENT_NAME);
    assert_eq!(config.decode_failures, DecodeFailures::Log);
  }

  #[test]
  fn parse() {
    let config = ClientConfig::from_str(
      r#"
      name = "test.client"
      decode_failures = "surface"
      "#,
    )
    .unwrap();
    assert_eq!(config.name, "test.client");
    assert_eq!(config.decode_failures, DecodeFailures::Surface);
  }

  #[test]
  fn reject_unknown_policy() {
    assert!(ClientConfig::from_str("decode_failures = \"ignore\"").is_err());
  }
}
