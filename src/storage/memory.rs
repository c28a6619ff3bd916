//! Store SBD messages in memory.
//!
//! Messages are grouped into per-device inboxes. Useful primarily for testing, and for
//! embedders that drain received messages themselves instead of leaving them on disk.

use std::collections::HashMap;

use crate::mo::Message;
use crate::storage;
use crate::Result;

/// A storage backend that keeps messages in per-IMEI inboxes in memory.
#[derive(Debug, Default)]
pub struct Storage {
    inboxes: HashMap<String, Vec<Message>>,
}

impl Storage {
    /// Creates a new, empty memory storage.
    ///
    /// # Examples
    ///
    /// ```
    /// let storage = sbd_directip::storage::MemoryStorage::new();
    /// ```
    pub fn new() -> Storage {
        Storage {
            inboxes: HashMap::new(),
        }
    }

    /// Returns every stored message, ordered by time of session.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::storage::{MemoryStorage, Storage};
    /// let mut storage = MemoryStorage::new();
    /// assert!(storage.messages().is_empty());
    /// storage.store(&sbd_directip::mo::Message::from_path("data/0-mo.sbd").unwrap());
    /// assert_eq!(1, storage.messages().len());
    /// ```
    pub fn messages(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self.inboxes.values().flatten().cloned().collect();
        messages.sort();
        messages
    }

    /// Returns the messages received from one device, in arrival order.
    ///
    /// # Examples
    ///
    /// ```
    /// let storage = sbd_directip::storage::MemoryStorage::new();
    /// assert!(storage.messages_from("300125061511830").is_empty());
    /// ```
    pub fn messages_from(&self, imei: &str) -> &[Message] {
        self.inboxes.get(imei).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl storage::Storage for Storage {
    fn store(&mut self, message: &Message) -> Result<()> {
        self.inboxes
            .entry(message.imei().to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }
}
