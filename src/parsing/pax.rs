//! PAX extended-attribute codec.
//!
//! PAX data is a UTF-8 text format of `"<len> <key>=<value>\n"` records,
//! wrapped inside the archive as the content of a `PaxHeader`-typed primary
//! entry. A PAX block always immediately precedes the single entry it
//! decorates; its attributes overlay that entry's header fields.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::parsing::header::{padding_for, Entry, EntryType, HeaderCodec, SIZE_FIELD_MAX};

/// Reserved keys whose values parse as numbers (floats, to tolerate
/// sub-second mtime/atime/ctime precision).
const NUMERIC_KEYS: [&str; 6] = ["size", "uid", "gid", "mtime", "atime", "ctime"];

/// Maximum name length the primary header can represent via the prefix
/// split; beyond this the name must travel in a PAX `path` attribute.
pub const NAME_MAX: usize = 255;

/// Maximum linkname length in the primary header's fixed-width field.
pub const LINKNAME_MAX: usize = 100;

/// One decoded PAX attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PaxValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for PaxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
        }
    }
}

/// Mapping from PAX attribute key to value, produced by decoding one PAX
/// data block or assembled by the writer before encoding one.
///
/// Transient by design: created immediately before the entry it decorates,
/// applied once, then discarded. Iteration order is deterministic (sorted by
/// key) so encoded output is reproducible.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PaxAttributes {
    attributes: BTreeMap<String, PaxValue>,
}

impl PaxAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PaxValue) {
        self.attributes.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PaxValue> {
        self.attributes.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PaxValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode every attribute as one PAX text record, concatenated.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (key, value) in self.iter() {
            out.extend_from_slice(encode_record(key, &value.to_string()).as_bytes());
        }
        out
    }

    /// Decode a PAX data region into an attribute set.
    ///
    /// Decoding is tolerant: a malformed length prefix (non-numeric or zero)
    /// or a record whose claimed length overruns the buffer or lacks its
    /// trailing newline stops decoding, returning whatever was decoded so
    /// far. Unknown keys are kept as text.
    pub fn decode(data: &[u8]) -> Self {
        let mut attrs = Self::new();
        let mut rest = data;

        while !rest.is_empty() {
            let Some((record_len, digits)) = read_length_prefix(rest) else {
                break;
            };
            if record_len > rest.len() {
                break;
            }
            let record = &rest[..record_len];
            if record[record_len - 1] != b'\n' {
                break;
            }
            rest = &rest[record_len..];

            // body sits between "<len> " and the trailing newline
            let body = &record[digits + 1..record_len - 1];
            let Some(eq) = body.iter().position(|&b| b == b'=') else {
                continue;
            };
            let key = String::from_utf8_lossy(&body[..eq]).to_string();
            let raw = String::from_utf8_lossy(&body[eq + 1..]).to_string();

            let value = if NUMERIC_KEYS.contains(&key.as_str()) {
                raw.parse::<f64>()
                    .map_or(PaxValue::Text(raw), PaxValue::Number)
            } else {
                PaxValue::Text(raw)
            };
            attrs.insert(key, value);
        }
        attrs
    }

    /// Overlay these attributes onto a base entry, producing a new entry.
    ///
    /// `path` replaces the name, `linkpath` the linkname; numeric overrides
    /// apply field by field, with `mtime` floored toward zero. Fields absent
    /// from the set are left untouched. The base is never mutated.
    pub fn apply(&self, base: &Entry) -> Entry {
        let mut entry = base.clone();
        if let Some(PaxValue::Text(path)) = self.get("path") {
            entry.name = path.clone();
        }
        if let Some(PaxValue::Text(linkpath)) = self.get("linkpath") {
            entry.linkname = linkpath.clone();
        }
        if let Some(size) = self.get_number("size") {
            entry.size = size as u64;
        }
        if let Some(mtime) = self.get_number("mtime") {
            entry.mtime = mtime.max(0.0).floor() as u64;
        }
        if let Some(uid) = self.get_number("uid") {
            entry.uid = uid as u64;
        }
        if let Some(gid) = self.get_number("gid") {
            entry.gid = gid as u64;
        }
        if let Some(PaxValue::Text(uname)) = self.get("uname") {
            entry.uname = uname.clone();
        }
        if let Some(PaxValue::Text(gname)) = self.get("gname") {
            entry.gname = gname.clone();
        }
        entry
    }

    fn get_number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            PaxValue::Number(n) => Some(*n),
            PaxValue::Text(s) => s.parse().ok(),
        }
    }
}

/// Whether an entry's fields overflow the primary header's fixed-width
/// encoding and must be promoted to PAX form. This is the sole overflow
/// policy; the writer consults it before every primary-header encode.
pub fn needs_pax_headers(entry: &Entry) -> bool {
    entry.name.len() > NAME_MAX
        || entry.linkname.len() > LINKNAME_MAX
        || entry.size > SIZE_FIELD_MAX
}

/// Encode one PAX record: `"<len> <key>=<value>\n"`, where `<len>` is the
/// decimal length of the entire record including the length digits
/// themselves. The self-referential length is found by fixed-point
/// iteration: recompute the digit count until it stabilizes.
pub fn encode_record(key: &str, value: &str) -> String {
    let suffix_len = 1 + key.len() + 1 + value.len() + 1; // " key=value\n"
    let mut total = suffix_len + 1;
    loop {
        let digits = decimal_digits(total);
        if digits + suffix_len == total {
            break;
        }
        total = digits + suffix_len;
    }
    format!("{} {}={}\n", total, key, value)
}

/// Build the block sequence carrying a PAX attribute set: a `PaxHeader`-typed
/// primary header, the encoded records, and zero padding to the next block
/// boundary.
///
/// The control entry's own name is `"PaxHeader/"` plus the first eighty
/// characters of the decorated entry's name, clamped to the name field: a
/// human-debuggable label, not authoritative (the `path` attribute is).
pub fn pax_header_blocks(original_name: &str, attrs: &PaxAttributes) -> Result<Vec<u8>> {
    let data = attrs.encode();

    let mut label: String = original_name.chars().take(80).collect();
    while label.len() > 90 {
        label.pop();
    }
    let control = Entry {
        name: format!("PaxHeader/{}", label),
        entry_type: EntryType::PaxHeader,
        size: data.len() as u64,
        mode: 0o644,
        ..Entry::default()
    };

    let mut out = Vec::with_capacity(512 + data.len() + 511);
    out.extend_from_slice(&HeaderCodec::encode(&control)?);
    out.extend_from_slice(&data);
    out.resize(out.len() + padding_for(data.len() as u64), 0);
    Ok(out)
}

/// Read the decimal length prefix up to the next space. Returns the record
/// length and the number of digit bytes, or `None` when the prefix is
/// non-numeric or zero.
fn read_length_prefix(data: &[u8]) -> Option<(usize, usize)> {
    let space = data.iter().position(|&b| b == b' ')?;
    if space == 0 {
        return None;
    }
    let mut len = 0usize;
    for &b in &data[..space] {
        if !b.is_ascii_digit() {
            return None;
        }
        len = len.checked_mul(10)?.checked_add((b - b'0') as usize)?;
    }
    if len == 0 {
        return None;
    }
    Some((len, space))
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_length_is_self_including() {
        let record = encode_record("a", "b");
        assert_eq!(record, "6 a=b\n");

        let record = encode_record("path", "some/long/file/name.txt");
        let (len, rest) = record.split_once(' ').unwrap();
        assert_eq!(len.parse::<usize>().unwrap(), record.len());
        assert_eq!(rest, "path=some/long/file/name.txt\n");
    }

    #[test]
    fn test_record_length_fixed_point_boundary() {
        // Suffix lengths near the 1->2 and 2->3 digit boundaries all settle.
        for value_len in 0..300 {
            let value = "v".repeat(value_len);
            let record = encode_record("k", &value);
            let (len, _) = record.split_once(' ').unwrap();
            assert_eq!(len.parse::<usize>().unwrap(), record.len());
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut attrs = PaxAttributes::new();
        attrs.insert("path", PaxValue::Text("dir/some-file.txt".to_string()));
        attrs.insert("size", PaxValue::Number(12345.0));
        attrs.insert("custom.key", PaxValue::Text("custom value".to_string()));

        let decoded = PaxAttributes::decode(&attrs.encode());
        assert_eq!(decoded, attrs);
    }

    #[test]
    fn test_decode_numeric_keys_as_float() {
        let data = b"20 mtime=1234567.25\n";
        let attrs = PaxAttributes::decode(data);
        assert_eq!(attrs.get("mtime"), Some(&PaxValue::Number(1_234_567.25)));
    }

    #[test]
    fn test_decode_stops_on_malformed_length() {
        let mut data = encode_record("path", "kept").into_bytes();
        data.extend_from_slice(b"bogus nonsense\n");
        let attrs = PaxAttributes::decode(&data);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("path"), Some(&PaxValue::Text("kept".to_string())));
    }

    #[test]
    fn test_decode_stops_on_overrunning_length() {
        let data = b"999 path=short\n";
        let attrs = PaxAttributes::decode(data);
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_decode_stops_on_missing_newline() {
        // Claimed length covers bytes that do not end in a newline.
        let data = b"11 path=abcX12 size=99\n";
        let attrs = PaxAttributes::decode(data);
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_apply_is_pure_overlay() {
        let base = Entry {
            name: "short".to_string(),
            size: 10,
            mtime: 100,
            uid: 1,
            ..Entry::default()
        };
        let mut attrs = PaxAttributes::new();
        attrs.insert("path", PaxValue::Text("replaced/name".to_string()));
        attrs.insert("mtime", PaxValue::Number(1234.75));

        let merged = attrs.apply(&base);
        assert_eq!(merged.name, "replaced/name");
        assert_eq!(merged.mtime, 1234); // floored
        assert_eq!(merged.size, 10); // untouched
        assert_eq!(merged.uid, 1); // untouched
        assert_eq!(base.name, "short"); // base unchanged
    }

    #[test]
    fn test_needs_pax_headers_policy() {
        let mut entry = Entry::default();
        assert!(!needs_pax_headers(&entry));

        entry.name = "n".repeat(256);
        assert!(needs_pax_headers(&entry));
        entry.name = "n".repeat(255);
        assert!(!needs_pax_headers(&entry));

        entry.linkname = "l".repeat(101);
        assert!(needs_pax_headers(&entry));
        entry.linkname.clear();

        entry.size = SIZE_FIELD_MAX + 1;
        assert!(needs_pax_headers(&entry));
        entry.size = SIZE_FIELD_MAX;
        assert!(!needs_pax_headers(&entry));
    }

    #[test]
    fn test_pax_header_blocks_layout() {
        let mut attrs = PaxAttributes::new();
        let long_name = "p".repeat(300);
        attrs.insert("path", PaxValue::Text(long_name.clone()));

        let blocks = pax_header_blocks(&long_name, &attrs).unwrap();
        assert_eq!(blocks.len() % 512, 0);

        let header: &[u8; 512] = blocks[..512].try_into().unwrap();
        let control = HeaderCodec::decode(header).unwrap();
        assert_eq!(control.entry_type, EntryType::PaxHeader);
        assert_eq!(control.name, format!("PaxHeader/{}", "p".repeat(80)));
        assert_eq!(control.size as usize, attrs.encode().len());
    }
}
