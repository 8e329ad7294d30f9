//! Decoding of driver notification records into [`StateChange`] events.
//!
//! A record starts with a message id and the declared size of the whole record. Kinds with
//! a fixed payload are only interpreted when the declared size matches that payload exactly
//! and the record really is that long; anything else degrades to
//! `StateChange::OtherError(MidiError::Unknown)`.

use std::convert::TryInto;
use std::fmt;
use std::mem::size_of;

use crate::error::{MidiError, OSStatus};
use crate::packet::read_u32;

pub const MSG_SETUP_CHANGED: i32 = 1;
pub const MSG_OBJECT_ADDED: i32 = 2;
pub const MSG_OBJECT_REMOVED: i32 = 3;
pub const MSG_PROPERTY_CHANGED: i32 = 4;
pub const MSG_THRU_CONNECTIONS_CHANGED: i32 = 5;
pub const MSG_SERIAL_PORT_OWNER_CHANGED: i32 = 6;
pub const MSG_IO_ERROR: i32 = 7;

// Layout mirrors of the native records, only used for their sizes.

#[allow(dead_code)]
#[repr(C)]
struct RawHeader {
  message_id: i32,
  message_size: u32,
}

#[allow(dead_code)]
#[repr(C)]
struct RawIoError {
  header: RawHeader,
  driver_device: u32,
  error_code: i32,
}

#[allow(dead_code)]
#[repr(C)]
struct RawObjectAddRemove {
  header: RawHeader,
  parent: u32,
  parent_type: i32,
  child: u32,
  child_type: i32,
}

#[allow(dead_code)]
#[repr(C)]
struct RawPropertyChange {
  header: RawHeader,
  object: u32,
  object_type: i32,
  property_name: usize,
}

pub const HEADER_SIZE: usize = size_of::<RawHeader>();
pub const IO_ERROR_SIZE: usize = size_of::<RawIoError>();
pub const OBJECT_ADD_REMOVE_SIZE: usize = size_of::<RawObjectAddRemove>();
pub const PROPERTY_CHANGE_SIZE: usize = size_of::<RawPropertyChange>();

const PROPERTY_NAME_OFFSET: usize = 16;

/// Resolves the opaque property name reference carried by property change records.
pub trait PropertyNames {
  fn property_name(&self, raw: usize) -> Option<String>;
}

/// A lookup that never resolves anything.
pub struct NoPropertyNames;

impl PropertyNames for NoPropertyNames {
  fn property_name(&self, _raw: usize) -> Option<String> {
    None
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
  Other,
  Device,
  Entity,
  Source,
  Destination,
  ExternalDevice,
  ExternalEntity,
  ExternalSource,
  ExternalDestination,
  Unknown(i32),
}

impl ObjectType {
  const EXTERNAL: i32 = 0x10;

  pub fn from_raw(raw: i32) -> ObjectType {
    match raw {
      -1 => ObjectType::Other,
      0 => ObjectType::Device,
      1 => ObjectType::Entity,
      2 => ObjectType::Source,
      3 => ObjectType::Destination,
      r if r == Self::EXTERNAL => ObjectType::ExternalDevice,
      r if r == Self::EXTERNAL | 1 => ObjectType::ExternalEntity,
      r if r == Self::EXTERNAL | 2 => ObjectType::ExternalSource,
      r if r == Self::EXTERNAL | 3 => ObjectType::ExternalDestination,
      other => ObjectType::Unknown(other),
    }
  }

  pub fn raw(&self) -> i32 {
    match self {
      ObjectType::Other => -1,
      ObjectType::Device => 0,
      ObjectType::Entity => 1,
      ObjectType::Source => 2,
      ObjectType::Destination => 3,
      ObjectType::ExternalDevice => Self::EXTERNAL,
      ObjectType::ExternalEntity => Self::EXTERNAL | 1,
      ObjectType::ExternalSource => Self::EXTERNAL | 2,
      ObjectType::ExternalDestination => Self::EXTERNAL | 3,
      ObjectType::Unknown(raw) => *raw,
    }
  }
}

impl fmt::Display for ObjectType {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ObjectType::Other => write!(f, "Other"),
      ObjectType::Device => write!(f, "Device"),
      ObjectType::Entity => write!(f, "Entity"),
      ObjectType::Source => write!(f, "Source"),
      ObjectType::Destination => write!(f, "Destination"),
      ObjectType::ExternalDevice => write!(f, "External Device"),
      ObjectType::ExternalEntity => write!(f, "External Entity"),
      ObjectType::ExternalSource => write!(f, "External Source"),
      ObjectType::ExternalDestination => write!(f, "External Destination"),
      ObjectType::Unknown(raw) => write!(f, "Unknown ({})", raw),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoErrorNotification {
  pub driver_device: u32,
  pub error_code: OSStatus,
}

impl IoErrorNotification {
  pub fn error(&self) -> MidiError {
    MidiError::from_status(self.error_code)
  }
}

impl fmt::Display for IoErrorNotification {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "Driver device: {}, error: {}",
      self.driver_device,
      self.error()
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectAddRemoveNotification {
  pub parent: u32,
  pub parent_type: ObjectType,
  pub child: u32,
  pub child_type: ObjectType,
}

impl fmt::Display for ObjectAddRemoveNotification {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "Parent: {}, parent type: {}, child: {}, child type: {}",
      self.parent, self.parent_type, self.child, self.child_type
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChangeNotification {
  pub object: u32,
  pub object_type: ObjectType,
  pub property_name: Option<String>,
}

impl fmt::Display for PropertyChangeNotification {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "Object: {}, object type: {}, property name: {}",
      self.object,
      self.object_type,
      self.property_name.as_ref().map(String::as_str).unwrap_or("?")
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
  IoError(IoErrorNotification),
  ObjectAdded(ObjectAddRemoveNotification),
  ObjectRemoved(ObjectAddRemoveNotification),
  PropertyChanged(PropertyChangeNotification),
  SerialPortOwnerChanged,
  SetupChanged,
  ThruConnectionsChanged,
  OtherError(MidiError),
}

impl StateChange {
  pub fn is_error(&self) -> bool {
    match self {
      StateChange::IoError(_) | StateChange::OtherError(_) => true,
      _ => false,
    }
  }
}

impl fmt::Display for StateChange {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      StateChange::IoError(notification) => write!(f, "IO error occurred. {}", notification),
      StateChange::ObjectAdded(notification) => write!(f, "Object added. {}", notification),
      StateChange::ObjectRemoved(notification) => write!(f, "Object removed. {}", notification),
      StateChange::PropertyChanged(notification) => {
        write!(f, "Property changed. {}", notification)
      }
      StateChange::SerialPortOwnerChanged => write!(f, "Serial port owner changed"),
      StateChange::SetupChanged => write!(f, "Setup changed"),
      StateChange::ThruConnectionsChanged => write!(f, "Thru connections changed"),
      StateChange::OtherError(error) => write!(f, "An unknown error occurred. {}", error),
    }
  }
}

fn read_i32(record: &[u8], offset: usize) -> Option<i32> {
  read_u32(record, offset).map(|value| value as i32)
}

fn read_usize(record: &[u8], offset: usize) -> Option<usize> {
  let bytes = record.get(offset..offset + size_of::<usize>())?;
  Some(usize::from_ne_bytes(bytes.try_into().ok()?))
}

fn decode_io_error(record: &[u8]) -> Option<IoErrorNotification> {
  Some(IoErrorNotification {
    driver_device: read_u32(record, 8)?,
    error_code: read_i32(record, 12)?,
  })
}

fn decode_add_remove(record: &[u8]) -> Option<ObjectAddRemoveNotification> {
  Some(ObjectAddRemoveNotification {
    parent: read_u32(record, 8)?,
    parent_type: ObjectType::from_raw(read_i32(record, 12)?),
    child: read_u32(record, 16)?,
    child_type: ObjectType::from_raw(read_i32(record, 20)?),
  })
}

fn decode_property_change(
  record: &[u8],
  names: &dyn PropertyNames,
) -> Option<PropertyChangeNotification> {
  Some(PropertyChangeNotification {
    object: read_u32(record, 8)?,
    object_type: ObjectType::from_raw(read_i32(record, 12)?),
    property_name: names.property_name(read_usize(record, PROPERTY_NAME_OFFSET)?),
  })
}

/// Slice of exactly `size` bytes when the declared size matches and the record holds them.
fn fixed(record: &[u8], declared: usize, size: usize) -> Option<&[u8]> {
  if declared == size {
    record.get(..size)
  } else {
    None
  }
}

/// How many bytes of a native record at least `declared` bytes long can be read safely:
/// the fixed payload when the declared size matches it, the header otherwise.
pub fn record_len(message_id: i32, declared: usize) -> usize {
  let expected = match message_id {
    MSG_IO_ERROR => IO_ERROR_SIZE,
    MSG_OBJECT_ADDED | MSG_OBJECT_REMOVED => OBJECT_ADD_REMOVE_SIZE,
    MSG_PROPERTY_CHANGED => PROPERTY_CHANGE_SIZE,
    _ => HEADER_SIZE,
  };
  if declared == expected {
    expected
  } else {
    HEADER_SIZE
  }
}

pub fn decode(record: &[u8], names: &dyn PropertyNames) -> StateChange {
  let header = read_i32(record, 0).and_then(|id| read_u32(record, 4).map(|size| (id, size)));
  let (message_id, declared) = match header {
    Some((id, size)) => (id, size as usize),
    None => return StateChange::OtherError(MidiError::Unknown),
  };

  let decoded = match message_id {
    MSG_IO_ERROR => fixed(record, declared, IO_ERROR_SIZE)
      .and_then(decode_io_error)
      .map(StateChange::IoError),
    MSG_OBJECT_ADDED => fixed(record, declared, OBJECT_ADD_REMOVE_SIZE)
      .and_then(decode_add_remove)
      .map(StateChange::ObjectAdded),
    MSG_OBJECT_REMOVED => fixed(record, declared, OBJECT_ADD_REMOVE_SIZE)
      .and_then(decode_add_remove)
      .map(StateChange::ObjectRemoved),
    MSG_PROPERTY_CHANGED => fixed(record, declared, PROPERTY_CHANGE_SIZE)
      .and_then(|record| decode_property_change(record, names))
      .map(StateChange::PropertyChanged),
    MSG_SERIAL_PORT_OWNER_CHANGED => Some(StateChange::SerialPortOwnerChanged),
    MSG_SETUP_CHANGED => Some(StateChange::SetupChanged),
    MSG_THRU_CONNECTIONS_CHANGED => Some(StateChange::ThruConnectionsChanged),
    _ => None,
  };

  decoded.unwrap_or(StateChange::OtherError(MidiError::Unknown))
}

/// Encodes notification records in the native layout.
pub struct NotificationBuilder {
  record: Vec<u8>,
}

impl NotificationBuilder {
  fn with_header(message_id: i32, size: usize) -> NotificationBuilder {
    let mut record = Vec::with_capacity(size);
    record.extend_from_slice(&message_id.to_ne_bytes());
    record.extend_from_slice(&(size as u32).to_ne_bytes());
    NotificationBuilder { record }
  }

  fn u32(mut self, value: u32) -> Self {
    self.record.extend_from_slice(&value.to_ne_bytes());
    self
  }

  fn i32(mut self, value: i32) -> Self {
    self.record.extend_from_slice(&value.to_ne_bytes());
    self
  }

  fn usize(mut self, value: usize) -> Self {
    self.record.extend_from_slice(&value.to_ne_bytes());
    self
  }

  fn padded(mut self, size: usize) -> Self {
    self.record.resize(size, 0);
    self
  }

  pub fn setup_changed() -> NotificationBuilder {
    Self::with_header(MSG_SETUP_CHANGED, HEADER_SIZE)
  }

  pub fn thru_connections_changed() -> NotificationBuilder {
    Self::with_header(MSG_THRU_CONNECTIONS_CHANGED, HEADER_SIZE)
  }

  pub fn serial_port_owner_changed() -> NotificationBuilder {
    Self::with_header(MSG_SERIAL_PORT_OWNER_CHANGED, HEADER_SIZE)
  }

  pub fn io_error(driver_device: u32, error_code: OSStatus) -> NotificationBuilder {
    Self::with_header(MSG_IO_ERROR, IO_ERROR_SIZE)
      .u32(driver_device)
      .i32(error_code)
  }

  pub fn object_added(notification: &ObjectAddRemoveNotification) -> NotificationBuilder {
    Self::add_remove(MSG_OBJECT_ADDED, notification)
  }

  pub fn object_removed(notification: &ObjectAddRemoveNotification) -> NotificationBuilder {
    Self::add_remove(MSG_OBJECT_REMOVED, notification)
  }

  fn add_remove(message_id: i32, n: &ObjectAddRemoveNotification) -> NotificationBuilder {
    Self::with_header(message_id, OBJECT_ADD_REMOVE_SIZE)
      .u32(n.parent)
      .i32(n.parent_type.raw())
      .u32(n.child)
      .i32(n.child_type.raw())
  }

  pub fn property_changed(
    object: u32,
    object_type: ObjectType,
    property_name: usize,
  ) -> NotificationBuilder {
    Self::with_header(MSG_PROPERTY_CHANGED, PROPERTY_CHANGE_SIZE)
      .u32(object)
      .i32(object_type.raw())
      .padded(PROPERTY_NAME_OFFSET)
      .usize(property_name)
  }

  /// A record of an arbitrary kind carrying `size` zeroed bytes.
  pub fn raw(message_id: i32, size: usize) -> NotificationBuilder {
    Self::with_header(message_id, size).padded(size)
  }

  /// Overrides the declared size without touching the record bytes.
  pub fn declared_size(mut self, size: u32) -> Self {
    self.record[4..8].copy_from_slice(&size.to_ne_bytes());
    self
  }

  pub fn build(self) -> Vec<u8> {
    self.record
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  struct Names(HashMap<usize, String>);

  impl PropertyNames for Names {
    fn property_name(&self, raw: usize) -> Option<String> {
      self.0.get(&raw).cloned()
    }
  }

  fn added() -> ObjectAddRemoveNotification {
    ObjectAddRemoveNotification {
      parent: 11,
      parent_type: ObjectType::Device,
      child: 12,
      child_type: ObjectType::Entity,
    }
  }

  #[test]
  fn record_sizes() {
    assert_eq!(HEADER_SIZE, 8);
    assert_eq!(IO_ERROR_SIZE, 16);
    assert_eq!(OBJECT_ADD_REMOVE_SIZE, 24);
    assert_eq!(PROPERTY_CHANGE_SIZE, 16 + size_of::<usize>());
  }

  #[test]
  fn decode_object_added() {
    let record = NotificationBuilder::object_added(&added()).build();
    assert_eq!(record.len(), OBJECT_ADD_REMOVE_SIZE);
    assert_eq!(
      decode(&record, &NoPropertyNames),
      StateChange::ObjectAdded(added())
    );
  }

  #[test]
  fn decode_object_added_with_wrong_size() {
    let undersized = NotificationBuilder::object_added(&added())
      .declared_size(OBJECT_ADD_REMOVE_SIZE as u32 - 4)
      .build();
    assert_eq!(
      decode(&undersized, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );

    let oversized = NotificationBuilder::object_added(&added())
      .declared_size(OBJECT_ADD_REMOVE_SIZE as u32 + 8)
      .build();
    assert_eq!(
      decode(&oversized, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
  }

  #[test]
  fn decode_declared_size_larger_than_record() {
    let mut record = NotificationBuilder::object_removed(&added()).build();
    record.truncate(12);
    assert_eq!(
      decode(&record, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
  }

  #[test]
  fn decode_object_removed() {
    let record = NotificationBuilder::object_removed(&added()).build();
    assert_eq!(
      decode(&record, &NoPropertyNames),
      StateChange::ObjectRemoved(added())
    );
  }

  #[test]
  fn decode_io_error() {
    let record = NotificationBuilder::io_error(5, crate::error::NO_CONNECTION).build();
    let change = decode(&record, &NoPropertyNames);
    assert_eq!(
      change,
      StateChange::IoError(IoErrorNotification {
        driver_device: 5,
        error_code: crate::error::NO_CONNECTION,
      })
    );
    assert_eq!(
      change.to_string(),
      "IO error occurred. Driver device: 5, error: No connection"
    );

    let wrong = NotificationBuilder::io_error(5, 0).declared_size(24).build();
    assert_eq!(
      decode(&wrong, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
  }

  #[test]
  fn decode_property_changed() {
    let mut names = HashMap::new();
    names.insert(0xbeef, "name".to_string());
    let record = NotificationBuilder::property_changed(3, ObjectType::Source, 0xbeef).build();
    assert_eq!(record.len(), PROPERTY_CHANGE_SIZE);

    let change = decode(&record, &Names(names));
    assert_eq!(
      change,
      StateChange::PropertyChanged(PropertyChangeNotification {
        object: 3,
        object_type: ObjectType::Source,
        property_name: Some("name".to_string()),
      })
    );
    assert_eq!(
      change.to_string(),
      "Property changed. Object: 3, object type: Source, property name: name"
    );
  }

  #[test]
  fn decode_property_changed_with_wrong_size() {
    let undersized = NotificationBuilder::property_changed(3, ObjectType::Source, 0xbeef)
      .declared_size(PROPERTY_CHANGE_SIZE as u32 - 4)
      .build();
    assert_eq!(
      decode(&undersized, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );

    let oversized = NotificationBuilder::property_changed(3, ObjectType::Source, 0xbeef)
      .declared_size(PROPERTY_CHANGE_SIZE as u32 + 8)
      .build();
    assert_eq!(
      decode(&oversized, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
  }

  #[test]
  fn decode_object_removed_with_wrong_size() {
    let undersized = NotificationBuilder::object_removed(&added())
      .declared_size(OBJECT_ADD_REMOVE_SIZE as u32 - 4)
      .build();
    assert_eq!(
      decode(&undersized, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );

    let oversized = NotificationBuilder::object_removed(&added())
      .declared_size(OBJECT_ADD_REMOVE_SIZE as u32 + 8)
      .build();
    assert_eq!(
      decode(&oversized, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
  }

  #[test]
  fn decode_unsized_kinds() {
    let cases = vec![
      (NotificationBuilder::setup_changed(), StateChange::SetupChanged),
      (
        NotificationBuilder::thru_connections_changed(),
        StateChange::ThruConnectionsChanged,
      ),
      (
        NotificationBuilder::serial_port_owner_changed(),
        StateChange::SerialPortOwnerChanged,
      ),
    ];
    for (builder, expected) in cases {
      let change = decode(&builder.build(), &NoPropertyNames);
      assert!(!change.is_error());
      assert_eq!(change, expected);
    }

    let kinds = [
      MSG_SETUP_CHANGED,
      MSG_THRU_CONNECTIONS_CHANGED,
      MSG_SERIAL_PORT_OWNER_CHANGED,
    ];
    for message_id in kinds.iter() {
      for size in [12, 64].iter() {
        let record = NotificationBuilder::raw(*message_id, *size).build();
        assert!(!decode(&record, &NoPropertyNames).is_error());
      }
    }
  }

  #[test]
  fn errors_are_flagged() {
    let io_error = decode(
      &NotificationBuilder::io_error(1, crate::error::NO_CONNECTION).build(),
      &NoPropertyNames,
    );
    assert!(io_error.is_error());
    assert!(StateChange::OtherError(MidiError::Unknown).is_error());
    assert!(!StateChange::ObjectAdded(added()).is_error());
  }

  #[test]
  fn decode_unknown_kind() {
    let record = NotificationBuilder::raw(0x1000, HEADER_SIZE).build();
    assert_eq!(
      decode(&record, &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
    assert_eq!(
      decode(&[1, 0, 0], &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
  }

  #[test]
  fn record_len_never_exceeds_a_matching_size() {
    assert_eq!(record_len(MSG_IO_ERROR, IO_ERROR_SIZE), IO_ERROR_SIZE);
    assert_eq!(record_len(MSG_IO_ERROR, 4096), HEADER_SIZE);
    assert_eq!(record_len(MSG_OBJECT_REMOVED, 20), HEADER_SIZE);
    assert_eq!(record_len(MSG_SETUP_CHANGED, 64), HEADER_SIZE);

    let record = NotificationBuilder::io_error(1, 0).declared_size(4096).build();
    let len = record_len(MSG_IO_ERROR, 4096);
    assert_eq!(
      decode(&record[..len], &NoPropertyNames),
      StateChange::OtherError(MidiError::Unknown)
    );
  }

  #[test]
  fn object_type_names() {
    assert_eq!(ObjectType::from_raw(0x12), ObjectType::ExternalSource);
    assert_eq!(ObjectType::ExternalDevice.to_string(), "External Device");
    assert_eq!(ObjectType::from_raw(-1), ObjectType::Other);
    assert_eq!(ObjectType::from_raw(99), ObjectType::Unknown(99));
  }

  #[test]
  fn display_add_remove() {
    assert_eq!(
      StateChange::ObjectRemoved(added()).to_string(),
      "Object removed. Parent: 11, parent type: Device, child: 12, child type: Entity"
    );
  }
}
