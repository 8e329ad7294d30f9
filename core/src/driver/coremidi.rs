use std::os::raw::c_void;
use std::panic;
use std::ptr;
use std::slice;

use core_foundation::base::TCFType;
use core_foundation::string::CFString;
use core_foundation_sys::string::CFStringRef;

use log::error;

use super::{ClientRef, Driver, EndpointRef, ObjectRef, PortRef, Property};
use crate::dispatch;
use crate::error::{OSStatus, NO_ERR, UNKNOWN_PROPERTY};
use crate::notification::{record_len, PropertyNames};
use crate::packet::{PacketLayout, PACKET_HEADER_SIZE, PACKET_LIST_HEADER_SIZE};
use crate::registry::Token;

pub const ID: &str = "CoreMIDI";

const LENGTH_OFFSET: usize = 8;

/// The system MIDI service.
pub struct CoreMidi;

impl CoreMidi {
  pub fn new() -> CoreMidi {
    CoreMidi
  }
}

impl Default for CoreMidi {
  fn default() -> Self {
    CoreMidi::new()
  }
}

impl Driver for CoreMidi {
  fn id(&self) -> &str {
    ID
  }

  fn client_create(&self, name: &str, context: Token) -> Result<ClientRef, OSStatus> {
    let name = CFString::new(name);
    let mut client: sys::MIDIClientRef = 0;
    let status = unsafe {
      sys::MIDIClientCreate(
        name.as_concrete_TypeRef(),
        Some(notify_proc),
        context.raw() as *mut c_void,
        &mut client,
      )
    };
    if status == NO_ERR {
      Ok(ClientRef(client))
    } else {
      Err(status)
    }
  }

  fn client_dispose(&self, client: ClientRef) -> OSStatus {
    unsafe { sys::MIDIClientDispose(client.0) }
  }

  fn string_property(&self, object: ObjectRef, property: Property) -> Result<String, OSStatus> {
    let key = unsafe {
      match property {
        Property::Name => sys::kMIDIPropertyName,
        Property::DisplayName => sys::kMIDIPropertyDisplayName,
      }
    };
    let mut value: CFStringRef = ptr::null();
    let status = unsafe { sys::MIDIObjectGetStringProperty(object, key, &mut value) };
    if status != NO_ERR {
      return Err(status);
    }
    if value.is_null() {
      return Err(UNKNOWN_PROPERTY);
    }
    let value = unsafe { CFString::wrap_under_create_rule(value) };
    Ok(value.to_string())
  }

  fn input_port_create(
    &self,
    client: ClientRef,
    name: &str,
    context: Token,
  ) -> Result<PortRef, OSStatus> {
    let name = CFString::new(name);
    let mut port: sys::MIDIPortRef = 0;
    let status = unsafe {
      sys::MIDIInputPortCreate(
        client.0,
        name.as_concrete_TypeRef(),
        Some(read_proc),
        context.raw() as *mut c_void,
        &mut port,
      )
    };
    if status == NO_ERR {
      Ok(PortRef(port))
    } else {
      Err(status)
    }
  }

  fn port_dispose(&self, port: PortRef) -> OSStatus {
    unsafe { sys::MIDIPortDispose(port.0) }
  }

  fn port_connect_source(&self, port: PortRef, source: EndpointRef, context: Token) -> OSStatus {
    unsafe { sys::MIDIPortConnectSource(port.0, source.0, context.raw() as *mut c_void) }
  }

  fn port_disconnect_source(&self, port: PortRef, source: EndpointRef) -> OSStatus {
    unsafe { sys::MIDIPortDisconnectSource(port.0, source.0) }
  }

  fn sources(&self) -> Vec<EndpointRef> {
    let count = unsafe { sys::MIDIGetNumberOfSources() };
    (0..count)
      .map(|index| unsafe { sys::MIDIGetSource(index) })
      .filter(|source| *source != 0)
      .map(EndpointRef)
      .collect()
  }
}

/// Property names in notification records are borrowed `CFStringRef`s.
struct CFPropertyNames;

impl PropertyNames for CFPropertyNames {
  fn property_name(&self, raw: usize) -> Option<String> {
    if raw == 0 {
      None
    } else {
      let name = unsafe { CFString::wrap_under_get_rule(raw as CFStringRef) };
      Some(name.to_string())
    }
  }
}

/// Bounds of a packet list, found by walking its record headers.
unsafe fn packet_list_bytes<'a>(packet_list: *const u8) -> &'a [u8] {
  let layout = PacketLayout::native();
  let count = ptr::read_unaligned(packet_list as *const u32);
  let mut offset = PACKET_LIST_HEADER_SIZE;
  let mut end = PACKET_LIST_HEADER_SIZE;
  for _ in 0..count {
    let length = ptr::read_unaligned(packet_list.add(offset + LENGTH_OFFSET) as *const u16);
    end = offset + PACKET_HEADER_SIZE + length as usize;
    offset = layout.next_record(offset, length as usize);
  }
  slice::from_raw_parts(packet_list, end)
}

unsafe extern "C" fn read_proc(
  packet_list: *const sys::MIDIPacketList,
  read_proc_ref_con: *mut c_void,
  _src_conn_ref_con: *mut c_void,
) {
  if packet_list.is_null() {
    return;
  }
  let token = Token::from_raw(read_proc_ref_con as usize);
  let bytes = packet_list_bytes(packet_list as *const u8);
  if panic::catch_unwind(|| dispatch::receive(token, bytes)).is_err() {
    error!("Packet input for token {} panicked", token);
  }
}

unsafe extern "C" fn notify_proc(message: *const sys::MIDINotification, ref_con: *mut c_void) {
  if message.is_null() {
    return;
  }
  let token = Token::from_raw(ref_con as usize);
  let header = &*message;
  let len = record_len(header.messageID as i32, header.messageSize as usize);
  let record = slice::from_raw_parts(message as *const u8, len);
  if panic::catch_unwind(|| dispatch::notify(token, record, &CFPropertyNames)).is_err() {
    error!("State change observer for token {} panicked", token);
  }
}

#[allow(non_snake_case)]
mod sys {
  use core_foundation_sys::base::OSStatus;
  use core_foundation_sys::string::CFStringRef;
  use std::os::raw::c_void;

  pub use coremidi_sys::{
    kMIDIPropertyDisplayName, kMIDIPropertyName, MIDIClientCreate, MIDIClientDispose,
    MIDIClientRef, MIDIGetNumberOfSources, MIDIGetSource, MIDINotification,
    MIDIObjectGetStringProperty, MIDIPortConnectSource, MIDIPortDisconnectSource,
    MIDIPortDispose, MIDIPortRef,
  };

  // Only ever used behind a pointer.
  #[repr(C)]
  pub struct MIDIPacketList(u8);

  pub type MIDIReadProc = Option<
    unsafe extern "C" fn(
      pktlist: *const MIDIPacketList,
      readProcRefCon: *mut c_void,
      srcConnRefCon: *mut c_void,
    ),
  >;

  extern "C" {
    pub fn MIDIInputPortCreate(
      client: MIDIClientRef,
      portName: CFStringRef,
      readProc: MIDIReadProc,
      refCon: *mut c_void,
      outPort: *mut MIDIPortRef,
    ) -> OSStatus;
  }
}
