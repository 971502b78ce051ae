//! The protected-string pass: applies the inner stream cipher to every
//! protected value in document order, producing a new tree.
//!
//! The cipher is stateful, so read and write must visit fields in the same
//! order: per group, entries before subgroups; per entry, string fields in
//! declaration order, then history entries.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroize;

use crate::crypto::InnerStream;
use crate::document::KeePassFile;
use crate::entry::{Entry, StringField};
use crate::error::ErrorKind;
use crate::group::Group;

#[derive(Clone, Copy)]
enum Direction {
    Decrypt,
    Encrypt,
}

/// Replace protected ciphertext (Base64) with plaintext throughout the
/// document.
pub(crate) fn decrypt_document(
    file: KeePassFile,
    stream: &mut InnerStream,
) -> Result<KeePassFile, ErrorKind> {
    process_document(file, stream, Direction::Decrypt)
}

/// Replace protected plaintext with ciphertext (Base64) throughout the
/// document.
pub(crate) fn encrypt_document(
    file: KeePassFile,
    stream: &mut InnerStream,
) -> Result<KeePassFile, ErrorKind> {
    process_document(file, stream, Direction::Encrypt)
}

fn process_document(
    mut file: KeePassFile,
    stream: &mut InnerStream,
    direction: Direction,
) -> Result<KeePassFile, ErrorKind> {
    file.root.groups = file
        .root
        .groups
        .into_iter()
        .map(|group| process_group(group, stream, direction))
        .collect::<Result<_, _>>()?;
    Ok(file)
}

fn process_group(
    mut group: Group,
    stream: &mut InnerStream,
    direction: Direction,
) -> Result<Group, ErrorKind> {
    group.entries = group
        .entries
        .into_iter()
        .map(|entry| process_entry(entry, stream, direction))
        .collect::<Result<_, _>>()?;
    group.groups = group
        .groups
        .into_iter()
        .map(|subgroup| process_group(subgroup, stream, direction))
        .collect::<Result<_, _>>()?;
    Ok(group)
}

fn process_entry(
    mut entry: Entry,
    stream: &mut InnerStream,
    direction: Direction,
) -> Result<Entry, ErrorKind> {
    entry.strings = entry
        .strings
        .into_iter()
        .map(|field| process_field(field, stream, direction))
        .collect::<Result<_, _>>()?;

    if let Some(history) = entry.history.as_mut() {
        let entries = std::mem::take(&mut history.entries);
        history.entries = entries
            .into_iter()
            .map(|historic| process_entry(historic, stream, direction))
            .collect::<Result<_, _>>()?;
    }

    Ok(entry)
}

/// Unprotected and empty values are passed through untouched and consume no
/// keystream.
fn process_field(
    mut field: StringField,
    stream: &mut InnerStream,
    direction: Direction,
) -> Result<StringField, ErrorKind> {
    if !field.value.is_protected() || field.value.text.is_empty() {
        return Ok(field);
    }

    field.value.text = match direction {
        Direction::Decrypt => {
            let mut buffer = BASE64.decode(field.value.text.as_bytes()).map_err(|e| {
                ErrorKind::Xml(format!("invalid base64 in protected value: {e}"))
            })?;
            stream.apply(&mut buffer);
            String::from_utf8(buffer).map_err(|e| {
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                ErrorKind::Xml("protected value is not valid UTF-8".to_string())
            })?
        }
        Direction::Encrypt => {
            let mut buffer = field.value.text.clone().into_bytes();
            stream.apply(&mut buffer);
            let encoded = BASE64.encode(&buffer);
            buffer.zeroize();
            encoded
        }
    };

    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::KeePassFileBuilder;
    use crate::entry::EntryBuilder;

    const STREAM_KEY: [u8; 32] = [0x42; 32];

    fn roundtrip(file: KeePassFile) -> KeePassFile {
        let mut enc = InnerStream::new(&STREAM_KEY);
        let locked = encrypt_document(file, &mut enc).unwrap();

        let mut dec = InnerStream::new(&STREAM_KEY);
        decrypt_document(locked, &mut dec).unwrap()
    }

    #[test]
    fn protected_values_roundtrip() {
        let file = KeePassFileBuilder::new("db")
            .add_top_entries([
                EntryBuilder::new("a").password("first secret").build(),
                EntryBuilder::new("b").password("second secret").build(),
            ])
            .build();

        assert_eq!(roundtrip(file.clone()), file);
    }

    #[test]
    fn encryption_hides_the_plaintext() {
        let file = KeePassFileBuilder::new("db")
            .add_top_entries([EntryBuilder::new("a").password("plain as day").build()])
            .build();

        let mut enc = InnerStream::new(&STREAM_KEY);
        let locked = encrypt_document(file, &mut enc).unwrap();

        let password = locked.entries()[0].password().unwrap().to_string();
        assert_ne!(password, "plain as day");
        // Ciphertext is carried as Base64.
        assert!(BASE64.decode(password).is_ok());
    }

    #[test]
    fn unprotected_fields_consume_no_keystream() {
        let with_noise = KeePassFileBuilder::new("db")
            .add_top_entries([EntryBuilder::new("a")
                .username("ignored")
                .notes("also ignored")
                .password("secret")
                .build()])
            .build();
        let without_noise = KeePassFileBuilder::new("db")
            .add_top_entries([EntryBuilder::new("a").password("secret").build()])
            .build();

        let mut enc_a = InnerStream::new(&STREAM_KEY);
        let locked_a = encrypt_document(with_noise, &mut enc_a).unwrap();
        let mut enc_b = InnerStream::new(&STREAM_KEY);
        let locked_b = encrypt_document(without_noise, &mut enc_b).unwrap();

        // Same keystream position for the password in both documents.
        assert_eq!(
            locked_a.entries()[0].password(),
            locked_b.entries()[0].password()
        );
    }

    #[test]
    fn empty_protected_values_are_skipped() {
        let file = KeePassFileBuilder::new("db")
            .add_top_entries([EntryBuilder::new("a")
                .password("")
                .custom_protected_field("Pin", "1234")
                .build()])
            .build();

        let unlocked = roundtrip(file.clone());
        assert_eq!(unlocked, file);
    }

    #[test]
    fn history_entries_follow_their_owner() {
        let old = EntryBuilder::new("e").password("old secret").build();
        let file = KeePassFileBuilder::new("db")
            .add_top_entries([EntryBuilder::new("e")
                .password("new secret")
                .history_entry(old)
                .build()])
            .build();

        let unlocked = roundtrip(file.clone());
        assert_eq!(unlocked, file);
    }

    #[test]
    fn field_order_determines_the_keystream() {
        let file = KeePassFileBuilder::new("db")
            .add_top_entries([EntryBuilder::new("a")
                .custom_protected_field("First", "alpha secret")
                .custom_protected_field("Second", "bravo secret")
                .build()])
            .build();

        let mut enc = InnerStream::new(&STREAM_KEY);
        let mut locked = encrypt_document(file, &mut enc).unwrap();

        // Swap the two protected fields between write and read.
        let entry = &mut locked.root.groups[0].entries[0];
        entry.strings.swap(1, 2);

        let mut dec = InnerStream::new(&STREAM_KEY);
        match decrypt_document(locked, &mut dec) {
            Ok(unlocked) => {
                let entry = &unlocked.root.groups[0].entries[0];
                assert_ne!(entry.get("Second"), Some("bravo secret"));
                assert_ne!(entry.get("First"), Some("alpha secret"));
            }
            // Scrambled keystream usually produces invalid UTF-8.
            Err(err) => assert!(matches!(err, ErrorKind::Xml(_))),
        }
    }
}
