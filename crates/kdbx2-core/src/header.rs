//! The KDBX v2 outer header: a fixed signature/version prefix followed by a
//! little-endian TLV list terminated by field id 0.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::ErrorKind;

// Outer header field ids
const HEADER_END: u8 = 0;
const HEADER_COMMENT: u8 = 1;
const HEADER_CIPHER_ID: u8 = 2;
const HEADER_COMPRESSION_FLAGS: u8 = 3;
const HEADER_MASTER_SEED: u8 = 4;
const HEADER_TRANSFORM_SEED: u8 = 5;
const HEADER_TRANSFORM_ROUNDS: u8 = 6;
const HEADER_ENCRYPTION_IV: u8 = 7;
const HEADER_PROTECTED_STREAM_KEY: u8 = 8;
const HEADER_STREAM_START_BYTES: u8 = 9;
const HEADER_INNER_RANDOM_STREAM_ID: u8 = 10;

/// KDBX signature: 0x9AA2D903 0xB54BFB67
pub(crate) const SIGNATURE_1: u32 = 0x9AA2_D903;
pub(crate) const SIGNATURE_2: u32 = 0xB54B_FB67;

/// Version written to fresh files (3.1).
const FILE_VERSION: (u16, u16) = (3, 1);
const SUPPORTED_VERSION_MAJOR: u16 = 3;

/// UUID of the AES-256-CBC outer cipher:
/// 31C1F2E6-BF71-4350-BE58-05216AFC5AFF.
const CIPHER_AES256: [u8; 16] = [
    0x31, 0xc1, 0xf2, 0xe6, 0xbf, 0x71, 0x43, 0x50, 0xbe, 0x58, 0x05, 0x21, 0x6a, 0xfc, 0x5a,
    0xff,
];

const INNER_STREAM_SALSA20: u32 = 2;

/// Default work factor for freshly written databases.
pub const DEFAULT_TRANSFORM_ROUNDS: u64 = 8000;

/// Payload compression applied before hashed-block framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    fn from_flags(flags: u32) -> Option<Self> {
        match flags {
            0 => Some(Compression::None),
            1 => Some(Compression::Gzip),
            _ => None,
        }
    }

    fn to_flags(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
        }
    }
}

/// Parsed, validated KDBX v2 header.
///
/// All required fields are guaranteed present exactly once after a
/// successful [`KdbxHeader::parse`]; accessors never fail.
#[derive(Debug, Clone)]
pub struct KdbxHeader {
    version_major: u16,
    version_minor: u16,
    compression: Compression,
    master_seed: [u8; 32],
    transform_seed: [u8; 32],
    transform_rounds: u64,
    encryption_iv: [u8; 16],
    protected_stream_key: [u8; 32],
    stream_start_bytes: [u8; 32],
    header_size: usize,
}

impl KdbxHeader {
    /// Parse and validate the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, ErrorKind> {
        if data.len() < 12 {
            return Err(ErrorKind::CorruptHeader("file too short".to_string()));
        }

        let sig1 = LittleEndian::read_u32(&data[0..4]);
        let sig2 = LittleEndian::read_u32(&data[4..8]);
        if sig1 != SIGNATURE_1 || sig2 != SIGNATURE_2 {
            return Err(ErrorKind::CorruptHeader("invalid signature".to_string()));
        }

        let version_minor = LittleEndian::read_u16(&data[8..10]);
        let version_major = LittleEndian::read_u16(&data[10..12]);
        if version_major != SUPPORTED_VERSION_MAJOR {
            return Err(ErrorKind::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let mut pos = 12;
        let mut compression = None;
        let mut master_seed: Option<[u8; 32]> = None;
        let mut transform_seed: Option<[u8; 32]> = None;
        let mut transform_rounds = None;
        let mut encryption_iv: Option<[u8; 16]> = None;
        let mut protected_stream_key: Option<[u8; 32]> = None;
        let mut stream_start_bytes: Option<[u8; 32]> = None;
        let mut cipher_checked = false;
        let mut inner_stream_checked = false;

        loop {
            if pos + 3 > data.len() {
                return Err(ErrorKind::CorruptHeader("truncated field".to_string()));
            }

            let field_id = data[pos];
            let field_len = LittleEndian::read_u16(&data[pos + 1..pos + 3]) as usize;
            pos += 3;

            if pos + field_len > data.len() {
                return Err(ErrorKind::CorruptHeader(format!(
                    "truncated value for field {field_id}"
                )));
            }

            let value = &data[pos..pos + field_len];
            pos += field_len;

            match field_id {
                HEADER_END => break,
                HEADER_COMMENT => {}
                HEADER_CIPHER_ID => {
                    if cipher_checked {
                        return Err(duplicate(field_id));
                    }
                    if value != CIPHER_AES256 {
                        return Err(ErrorKind::UnsupportedCipher);
                    }
                    cipher_checked = true;
                }
                HEADER_COMPRESSION_FLAGS => {
                    if compression.is_some() {
                        return Err(duplicate(field_id));
                    }
                    let flags = read_u32_field(field_id, value)?;
                    compression = Some(Compression::from_flags(flags).ok_or_else(|| {
                        ErrorKind::CorruptHeader(format!("unknown compression {flags}"))
                    })?);
                }
                HEADER_MASTER_SEED => {
                    store_array(field_id, value, &mut master_seed)?;
                }
                HEADER_TRANSFORM_SEED => {
                    store_array(field_id, value, &mut transform_seed)?;
                }
                HEADER_TRANSFORM_ROUNDS => {
                    if transform_rounds.is_some() {
                        return Err(duplicate(field_id));
                    }
                    if value.len() != 8 {
                        return Err(bad_length(field_id));
                    }
                    let rounds = LittleEndian::read_u64(value);
                    if rounds == 0 {
                        return Err(ErrorKind::CorruptHeader(
                            "transform rounds must be at least 1".to_string(),
                        ));
                    }
                    transform_rounds = Some(rounds);
                }
                HEADER_ENCRYPTION_IV => {
                    store_array(field_id, value, &mut encryption_iv)?;
                }
                HEADER_PROTECTED_STREAM_KEY => {
                    store_array(field_id, value, &mut protected_stream_key)?;
                }
                HEADER_STREAM_START_BYTES => {
                    store_array(field_id, value, &mut stream_start_bytes)?;
                }
                HEADER_INNER_RANDOM_STREAM_ID => {
                    if inner_stream_checked {
                        return Err(duplicate(field_id));
                    }
                    if read_u32_field(field_id, value)? != INNER_STREAM_SALSA20 {
                        return Err(ErrorKind::UnsupportedCipher);
                    }
                    inner_stream_checked = true;
                }
                _ => {
                    return Err(ErrorKind::CorruptHeader(format!(
                        "unknown field {field_id}"
                    )));
                }
            }
        }

        if !cipher_checked || !inner_stream_checked {
            return Err(ErrorKind::CorruptHeader(
                "missing cipher or inner stream field".to_string(),
            ));
        }

        let header = KdbxHeader {
            version_major,
            version_minor,
            compression: compression.ok_or_else(|| missing("compression"))?,
            master_seed: master_seed.ok_or_else(|| missing("master seed"))?,
            transform_seed: transform_seed.ok_or_else(|| missing("transform seed"))?,
            transform_rounds: transform_rounds.ok_or_else(|| missing("transform rounds"))?,
            encryption_iv: encryption_iv.ok_or_else(|| missing("encryption iv"))?,
            protected_stream_key: protected_stream_key
                .ok_or_else(|| missing("protected stream key"))?,
            stream_start_bytes: stream_start_bytes
                .ok_or_else(|| missing("stream start bytes"))?,
            header_size: pos,
        };

        debug!(
            "parsed kdbx header: version {}.{}, {} transform rounds, {:?} compression",
            header.version_major, header.version_minor, header.transform_rounds,
            header.compression
        );

        Ok(header)
    }

    /// Serialize the header: signature, version, then the TLV fields in
    /// canonical order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);

        buf.extend_from_slice(&SIGNATURE_1.to_le_bytes());
        buf.extend_from_slice(&SIGNATURE_2.to_le_bytes());
        buf.extend_from_slice(&self.version_minor.to_le_bytes());
        buf.extend_from_slice(&self.version_major.to_le_bytes());

        push_field(&mut buf, HEADER_CIPHER_ID, &CIPHER_AES256);
        push_field(
            &mut buf,
            HEADER_COMPRESSION_FLAGS,
            &self.compression.to_flags().to_le_bytes(),
        );
        push_field(&mut buf, HEADER_MASTER_SEED, &self.master_seed);
        push_field(&mut buf, HEADER_TRANSFORM_SEED, &self.transform_seed);
        push_field(
            &mut buf,
            HEADER_TRANSFORM_ROUNDS,
            &self.transform_rounds.to_le_bytes(),
        );
        push_field(&mut buf, HEADER_ENCRYPTION_IV, &self.encryption_iv);
        push_field(
            &mut buf,
            HEADER_PROTECTED_STREAM_KEY,
            &self.protected_stream_key,
        );
        push_field(&mut buf, HEADER_STREAM_START_BYTES, &self.stream_start_bytes);
        push_field(
            &mut buf,
            HEADER_INNER_RANDOM_STREAM_ID,
            &INNER_STREAM_SALSA20.to_le_bytes(),
        );
        push_field(&mut buf, HEADER_END, &[]);

        buf
    }

    /// A fresh header for writing: AES cipher, GZip compression, Salsa20
    /// inner stream, and freshly random seeds, stream key, start bytes
    /// and IV.
    pub fn initialize(transform_rounds: u64) -> Self {
        let mut master_seed = [0u8; 32];
        let mut transform_seed = [0u8; 32];
        let mut encryption_iv = [0u8; 16];
        let mut protected_stream_key = [0u8; 32];
        let mut stream_start_bytes = [0u8; 32];

        OsRng.fill_bytes(&mut master_seed);
        OsRng.fill_bytes(&mut transform_seed);
        OsRng.fill_bytes(&mut encryption_iv);
        OsRng.fill_bytes(&mut protected_stream_key);
        OsRng.fill_bytes(&mut stream_start_bytes);

        let mut header = KdbxHeader {
            version_major: FILE_VERSION.0,
            version_minor: FILE_VERSION.1,
            compression: Compression::Gzip,
            master_seed,
            transform_seed,
            transform_rounds,
            encryption_iv,
            protected_stream_key,
            stream_start_bytes,
            header_size: 0,
        };
        header.header_size = header.to_bytes().len();
        header
    }

    pub fn version(&self) -> (u16, u16) {
        (self.version_major, self.version_minor)
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn master_seed(&self) -> &[u8; 32] {
        &self.master_seed
    }

    pub fn transform_seed(&self) -> &[u8; 32] {
        &self.transform_seed
    }

    pub fn transform_rounds(&self) -> u64 {
        self.transform_rounds
    }

    pub fn encryption_iv(&self) -> &[u8; 16] {
        &self.encryption_iv
    }

    pub fn protected_stream_key(&self) -> &[u8; 32] {
        &self.protected_stream_key
    }

    pub fn stream_start_bytes(&self) -> &[u8; 32] {
        &self.stream_start_bytes
    }

    /// Offset of the first encrypted byte: one past the END field.
    pub fn header_size(&self) -> usize {
        self.header_size
    }
}

fn push_field(buf: &mut Vec<u8>, field_id: u8, value: &[u8]) {
    buf.push(field_id);
    buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
    buf.extend_from_slice(value);
}

fn read_u32_field(field_id: u8, value: &[u8]) -> Result<u32, ErrorKind> {
    if value.len() != 4 {
        return Err(bad_length(field_id));
    }
    Ok(LittleEndian::read_u32(value))
}

fn store_array<const N: usize>(
    field_id: u8,
    value: &[u8],
    slot: &mut Option<[u8; N]>,
) -> Result<(), ErrorKind> {
    if slot.is_some() {
        return Err(duplicate(field_id));
    }
    let array: [u8; N] = value.try_into().map_err(|_| bad_length(field_id))?;
    *slot = Some(array);
    Ok(())
}

fn duplicate(field_id: u8) -> ErrorKind {
    ErrorKind::CorruptHeader(format!("duplicate field {field_id}"))
}

fn bad_length(field_id: u8) -> ErrorKind {
    ErrorKind::CorruptHeader(format!("bad length for field {field_id}"))
}

fn missing(name: &str) -> ErrorKind {
    ErrorKind::CorruptHeader(format!("missing {name} field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = KdbxHeader::initialize(6000);
        let bytes = header.to_bytes();

        let parsed = KdbxHeader::parse(&bytes).unwrap();

        assert_eq!(parsed.version(), (3, 1));
        assert_eq!(parsed.compression(), Compression::Gzip);
        assert_eq!(parsed.transform_rounds(), 6000);
        assert_eq!(parsed.master_seed(), header.master_seed());
        assert_eq!(parsed.transform_seed(), header.transform_seed());
        assert_eq!(parsed.encryption_iv(), header.encryption_iv());
        assert_eq!(parsed.protected_stream_key(), header.protected_stream_key());
        assert_eq!(parsed.stream_start_bytes(), header.stream_start_bytes());
        assert_eq!(parsed.header_size(), bytes.len());
    }

    #[test]
    fn invalid_signature_fails() {
        let mut bytes = KdbxHeader::initialize(100).to_bytes();
        bytes[0] ^= 0xff;

        let err = KdbxHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptHeader(_)));
    }

    #[test]
    fn unsupported_version_fails() {
        let mut bytes = KdbxHeader::initialize(100).to_bytes();
        bytes[10] = 4;
        bytes[11] = 0;

        let err = KdbxHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, ErrorKind::UnsupportedVersion { major: 4, .. }));
    }

    #[test]
    fn truncated_header_fails() {
        let bytes = KdbxHeader::initialize(100).to_bytes();

        let err = KdbxHeader::parse(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptHeader(_)));
    }

    #[test]
    fn duplicate_field_fails() {
        let mut bytes = KdbxHeader::initialize(100).to_bytes();
        // Append a second master seed field before the terminator.
        let end = bytes.split_off(bytes.len() - 3);
        bytes.push(HEADER_MASTER_SEED);
        bytes.extend_from_slice(&32u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(&end);

        let err = KdbxHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptHeader(_)));
    }

    #[test]
    fn missing_required_field_fails() {
        // Signature + version + END only.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SIGNATURE_1.to_le_bytes());
        bytes.extend_from_slice(&SIGNATURE_2.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes());
        push_field(&mut bytes, HEADER_END, &[]);

        let err = KdbxHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptHeader(_)));
    }

    #[test]
    fn unknown_cipher_uuid_fails() {
        let header = KdbxHeader::initialize(100);
        let mut bytes = header.to_bytes();
        // The cipher UUID is the first field value, at offset 12 + 3.
        bytes[15] ^= 0xff;

        let err = KdbxHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, ErrorKind::UnsupportedCipher));
    }

    #[test]
    fn zero_transform_rounds_fails() {
        let mut header = KdbxHeader::initialize(100);
        header.transform_rounds = 0;

        let err = KdbxHeader::parse(&header.to_bytes()).unwrap_err();
        assert!(matches!(err, ErrorKind::CorruptHeader(_)));
    }

    #[test]
    fn fresh_headers_use_distinct_randomness() {
        let a = KdbxHeader::initialize(DEFAULT_TRANSFORM_ROUNDS);
        let b = KdbxHeader::initialize(DEFAULT_TRANSFORM_ROUNDS);

        assert_ne!(a.master_seed(), b.master_seed());
        assert_ne!(a.stream_start_bytes(), b.stream_start_bytes());
    }
}
