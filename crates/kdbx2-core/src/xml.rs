//! XML binding between the decrypted plaintext and the document model.

use crate::document::KeePassFile;
use crate::error::ErrorKind;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>\n";

/// Unmarshal a decrypted, decompressed payload into the document model.
pub(crate) fn parse_document(bytes: &[u8]) -> Result<KeePassFile, ErrorKind> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ErrorKind::Xml(format!("document is not valid UTF-8: {e}")))?;
    quick_xml::de::from_str(text).map_err(|e| ErrorKind::Xml(e.to_string()))
}

/// Marshal the document model into UTF-8 XML bytes.
pub(crate) fn write_document(file: &KeePassFile) -> Result<Vec<u8>, ErrorKind> {
    let body =
        quick_xml::se::to_string(file).map_err(|e| ErrorKind::Xml(e.to_string()))?;
    let mut out = String::with_capacity(XML_DECLARATION.len() + body.len());
    out.push_str(XML_DECLARATION);
    out.push_str(&body);
    Ok(out.into_bytes())
}

/// KeePass XML carries UUIDs as Base64 of the 16 raw bytes.
pub(crate) mod uuid_b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(uuid.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let text = String::deserialize(deserializer)?;
        let decoded = BASE64.decode(text.trim()).map_err(de::Error::custom)?;
        let bytes: [u8; 16] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::custom("UUID payload must be 16 bytes"))?;
        Ok(Uuid::from_bytes(bytes))
    }
}

/// Booleans appear as `True`/`False` text in KeePass documents.
pub(crate) mod opt_bool_text {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<bool>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(true) => serializer.serialize_str("True"),
            Some(false) => serializer.serialize_str("False"),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<bool>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        match text.as_deref() {
            None => Ok(None),
            Some(s) if s.eq_ignore_ascii_case("true") || s == "1" => Ok(Some(true)),
            Some(s) if s.eq_ignore_ascii_case("false") || s == "0" => Ok(Some(false)),
            Some(other) => Err(de::Error::custom(format!("invalid boolean {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::KeePassFileBuilder;
    use crate::entry::EntryBuilder;

    #[test]
    fn document_roundtrip() {
        let file = KeePassFileBuilder::new("testDB")
            .add_top_entries([EntryBuilder::new("First entry")
                .username("Carl")
                .password("secret")
                .build()])
            .build();

        let bytes = write_document(&file).unwrap();
        let parsed = parse_document(&bytes).unwrap();

        assert_eq!(parsed, file);
    }

    #[test]
    fn protected_attribute_survives_roundtrip() {
        let file = KeePassFileBuilder::new("db")
            .add_top_entries([EntryBuilder::new("e").password("p").build()])
            .build();

        let text = String::from_utf8(write_document(&file).unwrap()).unwrap();
        assert!(text.contains("Protected=\"True\""));
    }

    #[test]
    fn parses_foreign_document() {
        let xml = concat!(
            "<KeePassFile><Meta><Generator>KeePass</Generator>",
            "<DatabaseName>sample</DatabaseName></Meta>",
            "<Root><Group><UUID>AAAAAAAAAAAAAAAAAAAAAA==</UUID><Name>Top</Name>",
            "<Entry><UUID>AQEBAQEBAQEBAQEBAQEBAQ==</UUID>",
            "<String><Key>Title</Key><Value>A</Value></String>",
            "<String><Key>Password</Key><Value Protected=\"True\">bm9wZQ==</Value></String>",
            "</Entry></Group></Root></KeePassFile>",
        );

        let file = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(file.meta.database_name, "sample");

        let entries = file.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title(), Some("A"));

        let password = &entries[0].strings[1];
        assert!(password.value.is_protected());
        assert_eq!(password.value.text, "bm9wZQ==");
    }

    #[test]
    fn garbage_is_an_xml_error() {
        let err = parse_document(b"not xml at all").unwrap_err();
        assert!(matches!(err, ErrorKind::Xml(_)));
    }
}
