//! Cache key management utilities.
//!
//! Keys are a pure function of their inputs: the same parts always yield the
//! same key, which is what lets callers find an entry again.

use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use uuid::Uuid;

/// Separator placed between key parts.
pub const KEY_SEPARATOR: &str = ":";

/// Reserved marker that introduces the tag block of a tagged key.
pub const TAG_MARKER: &str = "|tags:";

/// Separator placed between tags inside the tag block.
pub const TAG_SEPARATOR: &str = ",";

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One formatted component of a cache key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPart(String);

impl KeyPart {
    /// The `null` part.
    pub fn null() -> Self {
        KeyPart("null".to_string())
    }

    /// Any displayable value, using its default string form.
    pub fn display(value: &dyn std::fmt::Display) -> Self {
        KeyPart(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart(s.clone())
    }
}

impl From<Uuid> for KeyPart {
    fn from(id: Uuid) -> Self {
        KeyPart(id.simple().to_string())
    }
}

impl From<NaiveDateTime> for KeyPart {
    fn from(dt: NaiveDateTime) -> Self {
        KeyPart(dt.format(DATE_FORMAT).to_string())
    }
}

impl From<NaiveDate> for KeyPart {
    fn from(d: NaiveDate) -> Self {
        d.and_hms_opt(0, 0, 0)
            .map(KeyPart::from)
            .unwrap_or_else(|| KeyPart(d.to_string()))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for KeyPart
where
    Tz::Offset: std::fmt::Display,
{
    fn from(dt: DateTime<Tz>) -> Self {
        KeyPart(dt.format(DATE_FORMAT).to_string())
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(KeyPart::null)
    }
}

macro_rules! key_part_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for KeyPart {
                fn from(v: $t) -> Self {
                    KeyPart(v.to_string())
                }
            }
        )*
    };
}

key_part_from_display!(bool, char, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Join formatted parts with [`KEY_SEPARATOR`].
    pub fn build(parts: &[KeyPart]) -> String {
        parts
            .iter()
            .map(KeyPart::as_str)
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR)
    }

    /// Build a key with a leading prefix.
    pub fn build_with_prefix(prefix: &str, parts: &[KeyPart]) -> String {
        if parts.is_empty() {
            return prefix.to_string();
        }
        format!("{}{}{}", prefix, KEY_SEPARATOR, Self::build(parts))
    }

    /// Build a key prefixed with the fully-qualified name of `T`.
    pub fn build_for<T: ?Sized>(parts: &[KeyPart]) -> String {
        Self::build_with_prefix(std::any::type_name::<T>(), parts)
    }

    /// Append a tag block to `key`.
    ///
    /// With no tags the key is returned unchanged.
    pub fn build_tagged(key: &str, tags: &[&str]) -> String {
        if tags.is_empty() {
            return key.to_string();
        }
        format!("{}{}{}", key, TAG_MARKER, tags.join(TAG_SEPARATOR))
    }

    /// Tags embedded by [`build_tagged`](Self::build_tagged), in original order.
    pub fn extract_tags(key: &str) -> Vec<String> {
        match key.rfind(TAG_MARKER) {
            Some(pos) => key[pos + TAG_MARKER.len()..]
                .split(TAG_SEPARATOR)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }

    /// The key without its tag block.
    pub fn strip_tags(key: &str) -> &str {
        match key.rfind(TAG_MARKER) {
            Some(pos) => &key[..pos],
            None => key,
        }
    }

    /// Split an untagged key into its parts.
    pub fn parse(key: &str) -> Vec<&str> {
        Self::strip_tags(key).split(KEY_SEPARATOR).collect()
    }
}

/// Compile a glob pattern into an anchored regex.
///
/// `*` matches any run of characters (including none), `?` matches exactly
/// one character; everything else is literal.
///
/// # Errors
///
/// Returns a `Validation` error if the resulting regex cannot be compiled.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 12);
    expr.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Ok(Regex::new(&expr)?)
}

/// Build a key from heterogeneous parts.
///
/// ```
/// use budget_kit::cache_key;
///
/// let key = cache_key!("summary", 2024, None::<&str>);
/// assert_eq!(key, "summary:2024:null");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($($part:expr),+ $(,)?) => {
        $crate::key::CacheKeyBuilder::build(&[$($crate::key::KeyPart::from($part)),+])
    };
}
