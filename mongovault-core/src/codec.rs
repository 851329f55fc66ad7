/*!
Type-preserving line codec for documents.

Each document is serialized to exactly one line of canonical MongoDB Extended
JSON. Canonical Extended JSON keeps the type information plain JSON drops:
ObjectIds, datetimes, 32/64-bit integer subtypes, Decimal128 and binary blobs
all survive a round trip, so `decode(encode(doc))` yields a structurally
identical [`Document`] with extended-type identity intact, not mere
JSON-value equality.

Failures to decode a line are reported as [`VaultError::MalformedRecord`]
carrying the 1-based line number; callers must treat them as per-line, never
per-collection, failures.
*/

use crate::{Result, VaultError};
use bson::{Bson, Document};

/// Identifier written into manifests and summaries to name the file format.
pub const FORMAT_IDENTIFIER: &str = "MongoDB Extended JSON";

/// Encode a document as a single line of canonical Extended JSON.
///
/// The output contains no embedded newline: `serde_json` escapes all control
/// characters inside strings and emits no formatting whitespace.
pub fn encode(document: &Document) -> Result<String> {
    let value = Bson::Document(document.clone()).into_canonical_extjson();
    let line = serde_json::to_string(&value)?;
    debug_assert!(!line.contains('\n'), "encoded line must stay on one line");
    Ok(line)
}

/// Decode one line of Extended JSON back into a document.
///
/// `line_number` is the 1-based position of the line in its source file and
/// is carried in the error so a skipped record can be located later.
pub fn decode(line: &str, line_number: u64) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| VaultError::malformed_record(line_number, e.to_string()))?;

    let bson = Bson::try_from(value)
        .map_err(|e| VaultError::malformed_record(line_number, e.to_string()))?;

    match bson {
        Bson::Document(doc) => Ok(doc),
        other => Err(VaultError::malformed_record(
            line_number,
            format!("expected a document, got {:?}", other.element_type()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use bson::spec::BinarySubtype;
    use bson::{doc, Binary, DateTime};

    fn roundtrip(document: Document) {
        let line = encode(&document).unwrap();
        assert!(!line.contains('\n'));
        let decoded = decode(&line, 1).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn test_roundtrip_plain_values() {
        roundtrip(doc! {
            "name": "sensor-a",
            "active": true,
            "reading": 21.5,
            "note": Bson::Null,
        });
    }

    #[test]
    fn test_roundtrip_extended_types() {
        roundtrip(doc! {
            "_id": ObjectId::new(),
            "created": DateTime::from_millis(1_700_000_123_456),
            "small": 42_i32,
            "large": 9_007_199_254_740_993_i64,
            "payload": Binary {
                subtype: BinarySubtype::Generic,
                bytes: vec![0x00, 0xff, 0x10, 0x7f],
            },
        });
    }

    #[test]
    fn test_roundtrip_decimal128() {
        let price: bson::Decimal128 = "10.99".parse().unwrap();
        roundtrip(doc! { "price": price });
    }

    #[test]
    fn test_roundtrip_nested_structures() {
        roundtrip(doc! {
            "tags": ["a", "b", "c"],
            "history": [
                doc! { "at": DateTime::from_millis(0), "value": 1_i64 },
                doc! { "at": DateTime::from_millis(60_000), "value": 2_i64 },
            ],
            "meta": doc! {
                "origin": doc! { "host": "node-1", "pid": 4242_i32 },
            },
        });
    }

    #[test]
    fn test_integer_subtypes_not_collapsed() {
        let line = encode(&doc! { "n": 5_i64 }).unwrap();
        let decoded = decode(&line, 1).unwrap();
        assert_eq!(decoded.get("n"), Some(&Bson::Int64(5)));
        assert_ne!(decoded.get("n"), Some(&Bson::Int32(5)));
    }

    #[test]
    fn test_newlines_in_strings_are_escaped() {
        roundtrip(doc! { "text": "line one\nline two\r\nline three" });
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode("{ not json", 7).unwrap_err();
        match err {
            VaultError::MalformedRecord { line, .. } => assert_eq!(line, 7),
            other => panic!("expected MalformedRecord, got {other}"),
        }
    }

    #[test]
    fn test_decode_non_document() {
        let err = decode("[1, 2, 3]", 3).unwrap_err();
        assert!(matches!(err, VaultError::MalformedRecord { line: 3, .. }));
    }

    #[test]
    fn test_decode_invalid_extended_json() {
        // A well-formed JSON object that is not valid Extended JSON
        let err = decode(r#"{"_id": {"$oid": "nothex"}}"#, 9).unwrap_err();
        assert!(matches!(err, VaultError::MalformedRecord { line: 9, .. }));
    }
}
