//! kdbx2-core - KeePass 2.x (KDBX v2) database container codec
//!
//! This crate reads and writes KDBX v2 files: an encrypted, authenticated,
//! compressed, hash-block-framed XML document protecting hierarchically
//! organized credential entries. Passwords and other protected strings are
//! additionally encrypted with an inner stream cipher so they never appear
//! in plaintext inside the serialized document.
//!
//! A typical read:
//!
//! ```no_run
//! use kdbx2_core::Database;
//!
//! let bytes = std::fs::read("passwords.kdbx").unwrap();
//! let file = Database::open_with_password(&bytes, "secret").unwrap();
//! for entry in file.entries() {
//!     println!("{:?}", entry.title());
//! }
//! ```
//!
//! And a typical write:
//!
//! ```
//! use kdbx2_core::{Database, EntryBuilder, KeePassFileBuilder};
//!
//! let file = KeePassFileBuilder::new("testDB")
//!     .add_top_entries([EntryBuilder::new("First entry")
//!         .username("Carl")
//!         .password("secret")
//!         .build()])
//!     .build();
//!
//! let mut out = Vec::new();
//! Database::write(&file, "secret", &mut out).unwrap();
//! ```

mod crypto;
mod database;
mod document;
mod entry;
mod error;
mod group;
mod hashed_block;
mod header;
mod keys;
mod protected;
mod xml;

pub use database::{Database, WriteConfig};
pub use document::{KeePassFile, KeePassFileBuilder, Meta, Root};
pub use entry::{
    Entry, EntryBuilder, History, StringField, Times, Value, KEY_NOTES, KEY_PASSWORD, KEY_TITLE,
    KEY_URL, KEY_USERNAME,
};
pub use error::{Error, ErrorKind, Result};
pub use group::{Group, GroupBuilder};
pub use header::{Compression, KdbxHeader, DEFAULT_TRANSFORM_ROUNDS};
pub use keys::DatabaseKey;

// Re-export types that users might need
pub use uuid::Uuid;
