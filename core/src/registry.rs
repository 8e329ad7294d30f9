use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

/// Opaque context handed to the driver and handed back on every callback.
///
/// Tokens are process unique, never zero and never a memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(usize);

impl Token {
  pub fn next() -> Token {
    Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
  }

  pub fn from_raw(raw: usize) -> Token {
    Token(raw)
  }

  pub fn raw(&self) -> usize {
    self.0
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Token to instance map where every operation holds the same lock.
pub struct Registry<T> {
  entries: Mutex<HashMap<Token, Arc<T>>>,
}

impl<T> Registry<T> {
  pub fn new() -> Registry<T> {
    Registry {
      entries: Mutex::new(HashMap::new()),
    }
  }

  fn entries(&self) -> MutexGuard<HashMap<Token, Arc<T>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Returns `false` and leaves the map untouched when the token is already taken.
  pub fn insert(&self, token: Token, instance: Arc<T>) -> bool {
    let mut entries = self.entries();
    if entries.contains_key(&token) {
      false
    } else {
      entries.insert(token, instance);
      true
    }
  }

  pub fn resolve(&self, token: Token) -> Option<Arc<T>> {
    self.entries().get(&token).cloned()
  }

  pub fn remove(&self, token: Token) -> Option<Arc<T>> {
    self.entries().remove(&token)
  }

  pub fn contains(&self, token: Token) -> bool {
    self.entries().contains_key(&token)
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }
}

impl<T> Default for Registry<T> {
  fn default() -> Self {
    Registry::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn tokens_are_unique_and_non_zero() {
    let a = Token::next();
    let b = Token::next();
    assert_ne!(a, b);
    assert_ne!(a.raw(), 0);
    assert_eq!(Token::from_raw(a.raw()), a);
  }

  #[test]
  fn insert_resolve_remove() {
    let registry = Registry::new();
    let token = Token::next();
    assert!(registry.insert(token, Arc::new("port")));
    assert!(!registry.insert(token, Arc::new("other")));
    assert_eq!(registry.resolve(token).as_deref(), Some(&"port"));
    assert_eq!(registry.len(), 1);

    assert!(registry.remove(token).is_some());
    assert!(registry.resolve(token).is_none());
    assert!(registry.remove(token).is_none());
    assert!(registry.is_empty());
  }

  #[test]
  fn concurrent_access() {
    let registry = Arc::new(Registry::new());
    let handles: Vec<_> = (0..8)
      .map(|i| {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
          for _ in 0..100 {
            let token = Token::next();
            assert!(registry.insert(token, Arc::new(i)));
            assert_eq!(registry.resolve(token).map(|v| *v), Some(i));
            assert!(registry.remove(token).is_some());
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }
    assert!(registry.is_empty());
  }
}
