use std::convert::TryInto;

use log::warn;

/// Size of the `numPackets` field that heads a packet list.
pub const PACKET_LIST_HEADER_SIZE: usize = 4;

/// Timestamp plus declared length, the fixed part of every packet record.
pub const PACKET_HEADER_SIZE: usize = 10;

/// Nominal payload capacity of a single packet record.
pub const MAX_PACKET_DATA: usize = 256;

const TIMESTAMP_OFFSET: usize = 0;
const LENGTH_OFFSET: usize = 8;

/// A host time timestamped MIDI packet, copied out of a driver packet list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPacket {
  timestamp: u64,
  data: Vec<u8>,
}

impl MidiPacket {
  pub fn new(timestamp: u64, data: Vec<u8>) -> MidiPacket {
    MidiPacket { timestamp, data }
  }

  pub fn timestamp(&self) -> u64 {
    self.timestamp
  }

  pub fn data(&self) -> &[u8] {
    self.data.as_slice()
  }

  pub fn into_data(self) -> Vec<u8> {
    self.data
  }
}

/// Alignment applied between consecutive packet records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
  alignment: usize,
}

impl PacketLayout {
  /// Records follow each other without padding (x86, x86_64).
  pub const PACKED: PacketLayout = PacketLayout { alignment: 1 };

  /// Records start on 4 byte boundaries (ARM, AArch64).
  pub const ALIGNED_4: PacketLayout = PacketLayout { alignment: 4 };

  #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
  pub fn native() -> PacketLayout {
    PacketLayout::ALIGNED_4
  }

  #[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
  pub fn native() -> PacketLayout {
    PacketLayout::PACKED
  }

  pub fn alignment(&self) -> usize {
    self.alignment
  }

  fn align(&self, offset: usize) -> usize {
    (offset + self.alignment - 1) & !(self.alignment - 1)
  }

  /// Offset of the record following one starting at `offset` with `length` payload bytes.
  pub fn next_record(&self, offset: usize, length: usize) -> usize {
    self.align(offset + PACKET_HEADER_SIZE + length)
  }
}

impl Default for PacketLayout {
  fn default() -> Self {
    PacketLayout::native()
  }
}

fn read_u16(buffer: &[u8], offset: usize) -> Option<u16> {
  let bytes = buffer.get(offset..offset.checked_add(2)?)?;
  Some(u16::from_ne_bytes(bytes.try_into().ok()?))
}

pub(crate) fn read_u32(buffer: &[u8], offset: usize) -> Option<u32> {
  let bytes = buffer.get(offset..offset.checked_add(4)?)?;
  Some(u32::from_ne_bytes(bytes.try_into().ok()?))
}

fn read_u64(buffer: &[u8], offset: usize) -> Option<u64> {
  let bytes = buffer.get(offset..offset.checked_add(8)?)?;
  Some(u64::from_ne_bytes(bytes.try_into().ok()?))
}

fn read_packet(buffer: &[u8], offset: usize) -> Option<(MidiPacket, usize)> {
  let timestamp = read_u64(buffer, offset + TIMESTAMP_OFFSET)?;
  let length = read_u16(buffer, offset + LENGTH_OFFSET)? as usize;
  let start = offset + PACKET_HEADER_SIZE;
  let data = buffer.get(start..start + length)?;
  Some((MidiPacket::new(timestamp, data.to_vec()), length))
}

/// Copies every packet out of a driver packet list, in the order the driver laid them out.
///
/// The declared packet count is read before walking the records. Payloads are copied up to
/// each record's declared length. Nothing borrowed from `packet_list` outlives the call.
pub fn extract(packet_list: &[u8], layout: PacketLayout) -> Vec<MidiPacket> {
  let count = match read_u32(packet_list, 0) {
    Some(count) => count as usize,
    None => {
      warn!(
        "Packet list too short for its header: {} bytes",
        packet_list.len()
      );
      return Vec::new();
    }
  };

  let max_count = packet_list.len().saturating_sub(PACKET_LIST_HEADER_SIZE) / PACKET_HEADER_SIZE;
  let mut packets = Vec::with_capacity(count.min(max_count));
  let mut offset = PACKET_LIST_HEADER_SIZE;

  for index in 0..count {
    match read_packet(packet_list, offset) {
      Some((packet, length)) => {
        packets.push(packet);
        offset = layout.next_record(offset, length);
      }
      None => {
        warn!(
          "Truncated packet list: decoded {} of {} packets from {} bytes",
          index,
          count,
          packet_list.len()
        );
        break;
      }
    }
  }

  packets
}

/// Encodes packets into the same layout the driver delivers.
pub struct PacketListBuilder {
  layout: PacketLayout,
  count: u32,
  buffer: Vec<u8>,
}

impl PacketListBuilder {
  pub fn new(layout: PacketLayout) -> PacketListBuilder {
    PacketListBuilder {
      layout,
      count: 0,
      buffer: vec![0; PACKET_LIST_HEADER_SIZE],
    }
  }

  pub fn push(&mut self, timestamp: u64, data: &[u8]) -> &mut Self {
    let length = data.len().min(std::u16::MAX as usize);
    let offset = self.buffer.len();
    self.buffer.extend_from_slice(&timestamp.to_ne_bytes());
    self.buffer.extend_from_slice(&(length as u16).to_ne_bytes());
    self.buffer.extend_from_slice(&data[..length]);
    let next = self.layout.next_record(offset, length);
    self.buffer.resize(next, 0);
    self.count += 1;
    self
  }

  pub fn len(&self) -> usize {
    self.count as usize
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  pub fn build(&self) -> Vec<u8> {
    let mut buffer = self.buffer.clone();
    buffer[..PACKET_LIST_HEADER_SIZE].copy_from_slice(&self.count.to_ne_bytes());
    buffer
  }
}
