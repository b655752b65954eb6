//! Label text validation and transcoding.
//!
//! Text columns may be stored in a database whose encoding is not UTF-8.
//! Rather than failing a scrape, malformed label text is transcoded from
//! the database's charset, or degraded to an empty label.

use std::collections::HashMap;
use std::str::FromStr;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Character sets the exporter can transcode from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Charset {
    Utf8,
    #[default]
    Gbk,
    Gb18030,
}

impl Charset {
    /// Canonical (database-side) name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF8",
            Charset::Gbk => "GBK",
            Charset::Gb18030 => "GB18030",
        }
    }

    /// Decoder used for this charset. GB18030 shares the GBK decoder family.
    fn encoding(&self) -> &'static Encoding {
        match self {
            Charset::Utf8 => encoding_rs::UTF_8,
            Charset::Gbk | Charset::Gb18030 => encoding_rs::GBK,
        }
    }

    /// Decode `bytes` into UTF-8, failing on any malformed sequence.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        self.encoding()
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|s| s.into_owned())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UTF8" | "UTF-8" => Ok(Charset::Utf8),
            "GBK" => Ok(Charset::Gbk),
            "GB18030" => Ok(Charset::Gb18030),
            other => Err(format!("unsupported charset: {}", other)),
        }
    }
}

impl TryFrom<String> for Charset {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Charset> for String {
    fn from(value: Charset) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Charset lookup by database name, with a fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharsetMap {
    default: Charset,
    databases: HashMap<String, Charset>,
}

impl CharsetMap {
    /// Create a map that resolves every database to `default`.
    pub fn new(default: Charset) -> Self {
        Self {
            default,
            databases: HashMap::new(),
        }
    }

    /// Set the charset for one database, replacing any previous entry.
    pub fn insert(&mut self, database: impl Into<String>, charset: Charset) {
        self.databases.insert(database.into(), charset);
    }

    /// Add entries without replacing existing ones.
    pub fn extend_missing<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, Charset)>,
    {
        for (database, charset) in entries {
            self.databases.entry(database).or_insert(charset);
        }
    }

    /// Charset to transcode text coming from `database`.
    pub fn charset_for(&self, database: &str) -> Charset {
        self.databases
            .get(database)
            .copied()
            .unwrap_or(self.default)
    }

    /// The fallback charset.
    pub fn default_charset(&self) -> Charset {
        self.default
    }
}

/// Return label text as a UTF-8 string.
///
/// - `check_required == false` or already valid UTF-8: returned unchanged.
/// - No database name: returns `""`, the source encoding is unknown.
/// - Otherwise transcodes from the database's charset; on failure returns `""`.
pub fn validate_and_fix(
    text: Vec<u8>,
    check_required: bool,
    database: Option<&str>,
    charsets: &CharsetMap,
) -> String {
    let bytes = match String::from_utf8(text) {
        Ok(s) => return s,
        Err(e) => e.into_bytes(),
    };

    if !check_required {
        return String::from_utf8_lossy(&bytes).into_owned();
    }

    let Some(database) = database.filter(|d| !d.is_empty()) else {
        debug!(len = bytes.len(), "Malformed label text without database context");
        return String::new();
    };

    let charset = charsets.charset_for(database);
    match charset.decode(&bytes) {
        Some(decoded) => decoded,
        None => {
            debug!(
                database,
                charset = %charset,
                "Label text could not be transcoded"
            );
            String::new()
        }
    }
}
