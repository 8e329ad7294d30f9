use failure::Fail;

/// Native status code as returned by every driver call.
pub type OSStatus = i32;

pub const NO_ERR: OSStatus = 0;

pub const INVALID_CLIENT: OSStatus = -10830;
pub const INVALID_PORT: OSStatus = -10831;
pub const WRONG_ENDPOINT_TYPE: OSStatus = -10832;
pub const NO_CONNECTION: OSStatus = -10833;
pub const UNKNOWN_ENDPOINT: OSStatus = -10834;
pub const UNKNOWN_PROPERTY: OSStatus = -10835;
pub const WRONG_PROPERTY_TYPE: OSStatus = -10836;
pub const NO_CURRENT_SETUP: OSStatus = -10837;
pub const MESSAGE_SEND_ERR: OSStatus = -10838;
pub const SERVER_START_ERR: OSStatus = -10839;
pub const SETUP_FORMAT_ERR: OSStatus = -10840;
pub const WRONG_THREAD: OSStatus = -10841;
pub const OBJECT_NOT_FOUND: OSStatus = -10842;
pub const ID_NOT_UNIQUE: OSStatus = -10843;

#[derive(Debug, Fail, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiError {
  #[fail(display = "Invalid client")]
  InvalidClient,

  #[fail(display = "Invalid port")]
  InvalidPort,

  #[fail(display = "Wrong endpoint type")]
  WrongEndpointType,

  #[fail(display = "No connection")]
  NoConnection,

  #[fail(display = "Unknown endpoint")]
  UnknownEndpoint,

  #[fail(display = "Unknown property")]
  UnknownProperty,

  #[fail(display = "Wrong property type")]
  WrongPropertyType,

  #[fail(display = "No current setup")]
  NoCurrentSetup,

  #[fail(display = "Message send error")]
  MessageSendError,

  #[fail(display = "Server start error")]
  ServerStartError,

  #[fail(display = "Setup format error")]
  SetupFormatError,

  #[fail(display = "Wrong thread")]
  WrongThread,

  #[fail(display = "Object not found")]
  ObjectNotFound,

  #[fail(display = "Not unique")]
  IdNotUnique,

  #[fail(display = "No error")]
  NoError,

  #[fail(display = "Unknown MIDI error")]
  Unknown,
}

pub type MidiResult<T> = Result<T, MidiError>;

impl MidiError {
  pub fn from_status(status: OSStatus) -> MidiError {
    match status {
      NO_ERR => MidiError::NoError,
      INVALID_CLIENT => MidiError::InvalidClient,
      INVALID_PORT => MidiError::InvalidPort,
      WRONG_ENDPOINT_TYPE => MidiError::WrongEndpointType,
      NO_CONNECTION => MidiError::NoConnection,
      UNKNOWN_ENDPOINT => MidiError::UnknownEndpoint,
      UNKNOWN_PROPERTY => MidiError::UnknownProperty,
      WRONG_PROPERTY_TYPE => MidiError::WrongPropertyType,
      NO_CURRENT_SETUP => MidiError::NoCurrentSetup,
      MESSAGE_SEND_ERR => MidiError::MessageSendError,
      SERVER_START_ERR => MidiError::ServerStartError,
      SETUP_FORMAT_ERR => MidiError::SetupFormatError,
      WRONG_THREAD => MidiError::WrongThread,
      OBJECT_NOT_FOUND => MidiError::ObjectNotFound,
      ID_NOT_UNIQUE => MidiError::IdNotUnique,
      _ => MidiError::Unknown,
    }
  }

  /// The native code this error was translated from, `None` for `Unknown`.
  pub fn status(&self) -> Option<OSStatus> {
    match self {
      MidiError::NoError => Some(NO_ERR),
      MidiError::InvalidClient => Some(INVALID_CLIENT),
      MidiError::InvalidPort => Some(INVALID_PORT),
      MidiError::WrongEndpointType => Some(WRONG_ENDPOINT_TYPE),
      MidiError::NoConnection => Some(NO_CONNECTION),
      MidiError::UnknownEndpoint => Some(UNKNOWN_ENDPOINT),
      MidiError::UnknownProperty => Some(UNKNOWN_PROPERTY),
      MidiError::WrongPropertyType => Some(WRONG_PROPERTY_TYPE),
      MidiError::NoCurrentSetup => Some(NO_CURRENT_SETUP),
      MidiError::MessageSendError => Some(MESSAGE_SEND_ERR),
      MidiError::ServerStartError => Some(SERVER_START_ERR),
      MidiError::SetupFormatError => Some(SETUP_FORMAT_ERR),
      MidiError::WrongThread => Some(WRONG_THREAD),
      MidiError::ObjectNotFound => Some(OBJECT_NOT_FOUND),
      MidiError::IdNotUnique => Some(ID_NOT_UNIQUE),
      MidiError::Unknown => None,
    }
  }
}

impl From<OSStatus> for MidiError {
  fn from(status: OSStatus) -> Self {
    MidiError::from_status(status)
  }
}

/// Converts a driver status into a result right where the call was made.
pub fn check(status: OSStatus) -> MidiResult<()> {
  if status == NO_ERR {
    Ok(())
  } else {
    Err(MidiError::from_status(status))
  }
}
