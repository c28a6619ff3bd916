//! Store SBD messages on the filesystem.
//!
//! Each message lands in a directory tree keyed by the originating device and the session
//! month, with the MOMSN in the file name so that two sessions in the same second cannot
//! clobber each other:
//!
//! ```text
//! root/300125061511830/202101/210114_082536_00007.sbd
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::mo::Message;
use crate::storage;
use crate::{Error, Result};

const SBD_EXTENSION: &str = "sbd";

/// A structure for managing storing and retriving SBD messages on a filesystem.
///
/// All messages live under a single root directory; the device and month subdirectories are
/// created on demand when messages are stored.
#[derive(Debug)]
pub struct Storage<P: AsRef<Path>> {
    root: P,
}

impl<P: AsRef<Path>> Storage<P> {
    /// Opens a new storage for a given directory.
    ///
    /// # Errors
    ///
    /// If the root is not an existing directory, returns a `NotADirectory` error.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::storage::FilesystemStorage;
    /// let storage = FilesystemStorage::open("data").unwrap();
    /// assert!(FilesystemStorage::open("not/a/directory").is_err());
    /// ```
    pub fn open(root: P) -> Result<Storage<P>> {
        if root.as_ref().is_dir() {
            Ok(Storage { root })
        } else {
            Err(Error::NotADirectory(
                root.as_ref().as_os_str().to_os_string(),
            ))
        }
    }

    /// Returns the path a message is (or would be) stored at.
    ///
    /// The path encodes the IMEI, the session month, the session timestamp, and the MOMSN, so
    /// every delivered message gets a distinct name even when a device runs several sessions in
    /// the same second.
    pub fn path_for(&self, message: &Message) -> PathBuf {
        let mut path = self.root.as_ref().to_path_buf();
        path.push(message.imei());
        path.push(message.time_of_session().format("%Y%m").to_string());
        path.push(format!(
            "{}_{:05}.{}",
            message.time_of_session().format("%y%m%d_%H%M%S"),
            message.momsn(),
            SBD_EXTENSION
        ));
        path
    }

    /// Returns every message stored under the root, ordered by time of session.
    ///
    /// Files with an `.sbd` extension that do not parse are skipped, not fatal.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbd_directip::storage::FilesystemStorage;
    /// let storage = FilesystemStorage::open("data").unwrap();
    /// let messages = storage.messages().unwrap();
    /// ```
    pub fn messages(&self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for entry in WalkDir::new(self.root.as_ref()) {
            let entry = entry?;
            if entry.path().extension().map_or(false, |e| e == SBD_EXTENSION) {
                match Message::from_path(entry.path()) {
                    Ok(message) => messages.push(message),
                    Err(err) => debug!("skipping {}: {}", entry.path().display(), err),
                }
            }
        }
        messages.sort();
        Ok(messages)
    }
}

impl<P: AsRef<Path>> storage::Storage for Storage<P> {
    /// Stores a message on the filesystem, creating its directories as needed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sbd_directip::storage::{FilesystemStorage, Storage};
    /// use sbd_directip::mo::Message;
    /// let message = Message::from_path("data/0-mo.sbd").unwrap();
    /// let mut storage = FilesystemStorage::open("/var/iridium").unwrap();
    /// storage.store(&message);
    /// ```
    fn store(&mut self, message: &Message) -> Result<()> {
        let path = self.path_for(message);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&path)?;
        message.write_to(&mut file)?;
        debug!("stored a message at {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    extern crate tempdir;
    use self::tempdir::TempDir;

    use super::*;
    use crate::information_element::InformationElement;
    use crate::mo::{Header, SessionStatus};
    use crate::storage::Storage as StorageTrait;

    fn message(momsn: u16, time_of_session: DateTime<Utc>) -> Message {
        let header = Header {
            cdr_ref: u32::from(momsn),
            imei: *b"300125061511830",
            session_status: SessionStatus::Ok,
            momsn,
            mtmsn: 0,
            time_of_session,
        };
        Message::new(vec![
            InformationElement::MoHeader(header),
            InformationElement::MoPayload(vec![1]),
        ])
        .unwrap()
    }

    #[test]
    fn opens_a_directory() {
        Storage::open(TempDir::new("").unwrap().path()).unwrap();
    }

    #[test]
    fn rejects_a_missing_root() {
        assert!(Storage::open("not/a/real/directory").is_err());
    }

    #[test]
    fn rejects_a_file_root() {
        assert!(Storage::open("data/0-mo.sbd").is_err());
    }

    #[test]
    fn stores_by_imei_month_and_momsn() {
        let tempdir = TempDir::new("").unwrap();
        let mut storage = Storage::open(tempdir.path()).unwrap();
        let message = Message::from_path("data/0-mo.sbd").unwrap();
        storage.store(&message).unwrap();
        let mut expected = PathBuf::from(tempdir.path());
        expected.push("300125061511830");
        expected.push("202101");
        expected.push("210114_082536_00007.sbd");
        assert_eq!(expected, storage.path_for(&message));
        assert_eq!(message, Message::from_path(expected).unwrap());
    }

    #[test]
    fn two_sessions_in_the_same_second_both_survive() {
        let tempdir = TempDir::new("").unwrap();
        let mut storage = Storage::open(tempdir.path()).unwrap();
        let time = Utc
            .with_ymd_and_hms(2021, 1, 14, 8, 25, 36)
            .single()
            .unwrap();
        storage.store(&message(7, time)).unwrap();
        storage.store(&message(8, time)).unwrap();
        assert_eq!(2, storage.messages().unwrap().len());
    }

    #[test]
    fn messages_are_ordered_by_time_of_session() {
        let tempdir = TempDir::new("").unwrap();
        let mut storage = Storage::open(tempdir.path()).unwrap();
        let older = message(1, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).single().unwrap());
        let newer = message(2, Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).single().unwrap());
        storage.store(&newer).unwrap();
        storage.store(&older).unwrap();
        assert_eq!(vec![older, newer], storage.messages().unwrap());
    }
}
