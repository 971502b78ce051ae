//! Entry types: string fields, timestamps and history.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard KeePass string-field keys.
pub const KEY_TITLE: &str = "Title";
pub const KEY_USERNAME: &str = "UserName";
pub const KEY_PASSWORD: &str = "Password";
pub const KEY_URL: &str = "URL";
pub const KEY_NOTES: &str = "Notes";

/// A credential entry.
///
/// The struct mirrors the KDBX XML layout; field order here is document
/// order in the serialized file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "UUID", with = "crate::xml::uuid_b64")]
    pub uuid: Uuid,

    #[serde(rename = "IconID", default, skip_serializing_if = "Option::is_none")]
    pub icon_id: Option<i32>,

    #[serde(rename = "Times", default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Times>,

    /// Key/value fields in declaration order. Order is significant: the
    /// inner stream cipher consumes keystream in exactly this order.
    #[serde(rename = "String", default)]
    pub strings: Vec<StringField>,

    #[serde(rename = "History", default, skip_serializing_if = "Option::is_none")]
    pub history: Option<History>,
}

impl Entry {
    /// Create an entry with a fresh UUID, current timestamps and the given
    /// title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            icon_id: None,
            times: Some(Times::now()),
            strings: vec![StringField::plain(KEY_TITLE, title)],
            history: None,
        }
    }

    /// Look up a string field by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings
            .iter()
            .find(|field| field.key == key)
            .map(|field| field.value.text.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.get(KEY_TITLE)
    }

    pub fn username(&self) -> Option<&str> {
        self.get(KEY_USERNAME)
    }

    pub fn password(&self) -> Option<&str> {
        self.get(KEY_PASSWORD)
    }

    pub fn url(&self) -> Option<&str> {
        self.get(KEY_URL)
    }

    pub fn notes(&self) -> Option<&str> {
        self.get(KEY_NOTES)
    }
}

/// One `<String>` element: a named value, possibly protected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringField {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

impl StringField {
    pub fn plain(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Value::plain(text),
        }
    }

    pub fn protected(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Value::protected(text),
        }
    }
}

/// A field value. When `Protected` is true the text is Base64 of the inner
/// stream ciphertext on disk and plaintext once the document is unlocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    #[serde(
        rename = "@Protected",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub protected: Option<String>,

    #[serde(rename = "$text", default)]
    pub text: String,
}

impl Value {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            protected: None,
            text: text.into(),
        }
    }

    pub fn protected(text: impl Into<String>) -> Self {
        Self {
            protected: Some("True".to_string()),
            text: text.into(),
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(&self.protected, Some(flag) if flag.eq_ignore_ascii_case("true"))
    }
}

/// Entry and group timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Times {
    #[serde(
        rename = "CreationTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "LastModificationTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modification_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "LastAccessTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_access_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "ExpiryTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry_time: Option<DateTime<Utc>>,

    #[serde(
        rename = "Expires",
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::xml::opt_bool_text"
    )]
    pub expires: Option<bool>,
}

impl Times {
    /// Times for a freshly created node. Timestamps are truncated to whole
    /// seconds, matching the precision of the on-disk format.
    pub fn now() -> Self {
        let now = Utc::now()
            .with_nanosecond(0)
            .expect("zero nanoseconds is always valid");
        Self {
            creation_time: Some(now),
            last_modification_time: Some(now),
            last_access_time: Some(now),
            expiry_time: None,
            expires: Some(false),
        }
    }
}

/// Prior versions of an entry, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(rename = "Entry", default)]
    pub entries: Vec<Entry>,
}

/// Builder for creating entries.
pub struct EntryBuilder {
    entry: Entry,
}

impl EntryBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            entry: Entry::new(title),
        }
    }

    pub fn username(self, username: impl Into<String>) -> Self {
        self.field(StringField::plain(KEY_USERNAME, username))
    }

    /// Password fields are protected: their plaintext never reaches the
    /// serialized document.
    pub fn password(self, password: impl Into<String>) -> Self {
        self.field(StringField::protected(KEY_PASSWORD, password))
    }

    pub fn url(self, url: impl Into<String>) -> Self {
        self.field(StringField::plain(KEY_URL, url))
    }

    pub fn notes(self, notes: impl Into<String>) -> Self {
        self.field(StringField::plain(KEY_NOTES, notes))
    }

    pub fn custom_field(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(StringField::plain(key, value))
    }

    pub fn custom_protected_field(
        self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.field(StringField::protected(key, value))
    }

    pub fn icon(mut self, icon_id: i32) -> Self {
        self.entry.icon_id = Some(icon_id);
        self
    }

    pub fn history_entry(mut self, entry: Entry) -> Self {
        self.entry
            .history
            .get_or_insert_with(History::default)
            .entries
            .push(entry);
        self
    }

    fn field(mut self, field: StringField) -> Self {
        self.entry.strings.push(field);
        self
    }

    pub fn build(self) -> Entry {
        self.entry
    }
}
