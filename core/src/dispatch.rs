//! Entry points for driver callbacks.
//!
//! Backends call these from whatever thread the native service delivers on, passing back
//! the token they were given when the port or client was created. A token that no longer
//! resolves belongs to something already disposed, and the delivery is dropped.

use log::trace;

use crate::client::clients;
use crate::notification::{decode, PropertyNames};
use crate::port::ports;
use crate::registry::Token;

/// Routes a raw packet list to the input port registered under `context`.
pub fn receive(context: Token, packet_list: &[u8]) {
  match ports().resolve(context) {
    Some(inlet) => inlet.deliver(packet_list),
    None => trace!("No input port for token {}, dropping packet list", context),
  }
}

/// Decodes a notification record and hands it to the client registered under `context`.
pub fn notify(context: Token, record: &[u8], names: &dyn PropertyNames) {
  match clients().resolve(context) {
    Some(hub) => hub.notify(decode(record, names)),
    None => trace!("No client for token {}, dropping notification", context),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::notification::{NoPropertyNames, NotificationBuilder};
  use crate::packet::{PacketLayout, PacketListBuilder};

  #[test]
  fn unknown_tokens_are_ignored() {
    let token = Token::next();
    let packet_list = PacketListBuilder::new(PacketLayout::native())
      .push(0, &[0x90, 0x3c, 0x40])
      .build();
    receive(token, &packet_list);
    notify(
      token,
      &NotificationBuilder::setup_changed().build(),
      &NoPropertyNames,
    );
    assert!(!ports().contains(token));
    assert!(!clients().contains(token));
  }
}
