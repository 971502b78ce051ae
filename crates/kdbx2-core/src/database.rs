//! Database operations: the public entry points that thread bytes through
//! the container pipeline.
//!
//! Read: header parse, master-key derivation, AES-CBC decrypt, stream-start
//! check, hashed-block decode, optional GZIP, XML unmarshal, protected-string
//! decrypt. Write runs the same stages in reverse over a freshly initialized
//! header.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use log::debug;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::{self, InnerStream};
use crate::document::KeePassFile;
use crate::error::{Error, ErrorKind, Result};
use crate::hashed_block;
use crate::header::{Compression, KdbxHeader, DEFAULT_TRANSFORM_ROUNDS};
use crate::keys::{self, DatabaseKey};
use crate::protected;
use crate::xml;

/// Options for writing a database.
#[derive(Debug, Clone, Copy)]
pub struct WriteConfig {
    /// Key-transform work factor stored in the fresh header.
    pub transform_rounds: u64,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            transform_rounds: DEFAULT_TRANSFORM_ROUNDS,
        }
    }
}

/// A KDBX v2 database container.
///
/// Parsing only reads the cleartext header; the encrypted payload is kept
/// verbatim until [`Database::open`] is called with key material.
#[derive(Debug)]
pub struct Database {
    header: KdbxHeader,
    data: Vec<u8>,
}

impl Database {
    /// Parse the header of a database file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = KdbxHeader::parse(data).map_err(Error::unreadable)?;
        Ok(Self {
            header,
            data: data.to_vec(),
        })
    }

    /// The parsed header.
    pub fn header(&self) -> &KdbxHeader {
        &self.header
    }

    /// Decrypt the container and unmarshal the credential tree.
    pub fn open(&self, key: &DatabaseKey) -> Result<KeePassFile> {
        let composite = key.composite()?;
        self.open_inner(&composite).map_err(Error::unreadable)
    }

    /// Convenience: parse and open with a password in one step.
    pub fn open_with_password(data: &[u8], password: &str) -> Result<KeePassFile> {
        Self::parse(data)?.open(&DatabaseKey::new().with_password(password))
    }

    /// Convenience: parse and open with a password and key file.
    pub fn open_with_keyfile(
        data: &[u8],
        password: &str,
        keyfile: &[u8],
    ) -> Result<KeePassFile> {
        let key = DatabaseKey::new()
            .with_password(password)
            .with_keyfile(keyfile)?;
        Self::parse(data)?.open(&key)
    }

    fn open_inner(&self, composite: &Zeroizing<[u8; 32]>) -> std::result::Result<KeePassFile, ErrorKind> {
        let master = keys::master_key(composite, &self.header);

        let ciphertext = &self.data[self.header.header_size()..];
        let plaintext = crypto::decrypt_aes_cbc(&master, self.header.encryption_iv(), ciphertext)?;

        if plaintext.len() < 32 {
            return Err(ErrorKind::CannotDecrypt);
        }
        let (start_bytes, framed) = plaintext.split_at(32);
        if start_bytes
            .ct_eq(self.header.stream_start_bytes())
            .unwrap_u8()
            != 1
        {
            return Err(ErrorKind::CannotDecrypt);
        }
        debug!("outer decrypt verified, {} framed bytes", framed.len());

        let content = Zeroizing::new(hashed_block::decode(framed)?);

        let document_bytes = match self.header.compression() {
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(content.as_slice());
                let mut decompressed = Zeroizing::new(Vec::with_capacity(content.len() * 2));
                decoder
                    .read_to_end(&mut *decompressed)
                    .map_err(ErrorKind::Decompression)?;
                decompressed
            }
            Compression::None => content,
        };

        let document = xml::parse_document(&document_bytes)?;
        let mut stream = InnerStream::new(self.header.protected_stream_key());
        protected::decrypt_document(document, &mut stream)
    }

    /// Encrypt the credential tree with a password and write the container
    /// to `sink`. Returns the number of bytes written.
    pub fn write<W: Write>(file: &KeePassFile, password: &str, sink: &mut W) -> Result<usize> {
        let key = DatabaseKey::new().with_password(password);
        Self::write_with_key(file, &key, &WriteConfig::default(), sink)
    }

    /// Encrypt the credential tree with arbitrary key material.
    pub fn write_with_key<W: Write>(
        file: &KeePassFile,
        key: &DatabaseKey,
        config: &WriteConfig,
        sink: &mut W,
    ) -> Result<usize> {
        if config.transform_rounds == 0 {
            return Err(Error::InvalidArgument("transform rounds must be at least 1"));
        }
        let composite = key.composite()?;

        let bytes = write_inner(file, &composite, config).map_err(Error::unwriteable)?;
        sink.write_all(&bytes)
            .map_err(|e| Error::unwriteable(ErrorKind::Io(e)))?;
        Ok(bytes.len())
    }
}

fn write_inner(
    file: &KeePassFile,
    composite: &Zeroizing<[u8; 32]>,
    config: &WriteConfig,
) -> std::result::Result<Vec<u8>, ErrorKind> {
    validate_document(file)?;

    let header = KdbxHeader::initialize(config.transform_rounds);

    let mut stream = InnerStream::new(header.protected_stream_key());
    let locked = protected::encrypt_document(file.clone(), &mut stream)?;
    let document_bytes = Zeroizing::new(xml::write_document(&locked)?);

    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder
        .write_all(&document_bytes)
        .map_err(ErrorKind::Decompression)?;
    let compressed = Zeroizing::new(encoder.finish().map_err(ErrorKind::Decompression)?);

    let framed = hashed_block::encode(&compressed);
    debug!(
        "marshalled document: {} xml bytes, {} compressed, {} framed",
        document_bytes.len(),
        compressed.len(),
        framed.len()
    );

    let mut payload = Zeroizing::new(Vec::with_capacity(32 + framed.len()));
    payload.extend_from_slice(header.stream_start_bytes());
    payload.extend_from_slice(&framed);

    let master = keys::master_key(composite, &header);
    let ciphertext = crypto::encrypt_aes_cbc(&master, header.encryption_iv(), &payload);

    let mut out = header.to_bytes();
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// A writable document needs a root with at least one group to hang entries
/// off.
fn validate_document(file: &KeePassFile) -> std::result::Result<(), ErrorKind> {
    if file.root.groups.is_empty() {
        return Err(ErrorKind::WriteValidation(
            "the root must contain at least one group".to_string(),
        ));
    }
    Ok(())
}
