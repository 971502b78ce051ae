//! Key material: password and key-file components, the composite key, and
//! the master-key derivation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{Error, ErrorKind, Result};
use crate::header::KdbxHeader;

/// The user-supplied key components for opening or writing a database.
///
/// At least one of password and key file must be present. All stored
/// material is hashed or normalized at construction time and zeroized on
/// drop.
#[derive(Default)]
pub struct DatabaseKey {
    password_hash: Option<Zeroizing<[u8; 32]>>,
    keyfile_material: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseKey")
            .field("password", &self.password_hash.is_some())
            .field("keyfile", &self.keyfile_material.is_some())
            .finish()
    }
}

impl DatabaseKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a password component. The password itself is not retained, only
    /// its SHA-256.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password_hash = Some(Zeroizing::new(crypto::sha256(&[password.as_bytes()])));
        self
    }

    /// Add a key-file component, accepting either the XML key-file form or
    /// raw key bytes. Material that is not exactly 32 bytes is hashed down
    /// to 32 with SHA-256.
    pub fn with_keyfile(mut self, contents: &[u8]) -> Result<Self> {
        let material = keyfile_material(contents).map_err(Error::unreadable)?;
        self.keyfile_material = Some(if material.len() == 32 {
            material
        } else {
            Zeroizing::new(crypto::sha256(&[material.as_slice()]).to_vec())
        });
        Ok(self)
    }

    /// Add a key-file component without length normalization.
    ///
    /// Some existing key-file-only databases were keyed on the decoded
    /// payload verbatim, whatever its length. This constructor exists to
    /// open those; [`DatabaseKey::with_keyfile`] is the right choice
    /// everywhere else.
    pub fn with_keyfile_verbatim(mut self, contents: &[u8]) -> Result<Self> {
        self.keyfile_material = Some(keyfile_material(contents).map_err(Error::unreadable)?);
        Ok(self)
    }

    /// SHA-256 over the concatenated components.
    pub(crate) fn composite(&self) -> Result<Zeroizing<[u8; 32]>> {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(2);
        if let Some(hash) = &self.password_hash {
            parts.push(hash.as_slice());
        }
        if let Some(material) = &self.keyfile_material {
            parts.push(material.as_slice());
        }
        if parts.is_empty() {
            return Err(Error::InvalidArgument(
                "a password or a key file is required",
            ));
        }
        Ok(Zeroizing::new(crypto::sha256(&parts)))
    }
}

/// The KDBX master-key derivation: the composite key is run through the
/// AES-ECB transform with the header's seed and round count, hashed, then
/// hashed once more together with the master seed.
pub(crate) fn master_key(
    composite: &Zeroizing<[u8; 32]>,
    header: &KdbxHeader,
) -> Zeroizing<[u8; 32]> {
    let mut transformed = Zeroizing::new(**composite);
    crypto::transform_key_rounds(
        &mut transformed,
        header.transform_seed(),
        header.transform_rounds(),
    );
    let transformed_hash = Zeroizing::new(crypto::sha256(&[transformed.as_slice()]));
    Zeroizing::new(crypto::sha256(&[
        header.master_seed(),
        transformed_hash.as_slice(),
    ]))
}

#[derive(Deserialize)]
struct KeyFileXml {
    #[serde(rename = "Key")]
    key: KeyFileKeyXml,
}

#[derive(Deserialize)]
struct KeyFileKeyXml {
    #[serde(rename = "Data")]
    data: String,
}

/// Extract raw key material from key-file contents.
///
/// A document starting with `<` is treated as the XML form and must carry a
/// Base64 payload under `<Key><Data>`; anything else is raw key bytes.
fn keyfile_material(contents: &[u8]) -> std::result::Result<Zeroizing<Vec<u8>>, ErrorKind> {
    let trimmed = trim_ascii_start(contents);
    if trimmed.first() == Some(&b'<') {
        let text = std::str::from_utf8(trimmed)
            .map_err(|_| ErrorKind::InvalidKeyFile("key file is not valid UTF-8".to_string()))?;
        let parsed: KeyFileXml = quick_xml::de::from_str(text)
            .map_err(|e| ErrorKind::InvalidKeyFile(format!("malformed key file xml: {e}")))?;
        let decoded = BASE64
            .decode(parsed.key.data.trim())
            .map_err(|e| ErrorKind::InvalidKeyFile(format!("invalid base64 payload: {e}")))?;
        Ok(Zeroizing::new(decoded))
    } else {
        Ok(Zeroizing::new(contents.to_vec()))
    }
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}
