//! # Byte-Comparable Key Encoding
//!
//! Encodes `Value` sequences into byte strings whose lexicographic order
//! matches index order, so tree-index keys compare with a single `memcmp`
//! and no type dispatch at comparison time.
//!
//! ## Type Prefix Scheme
//!
//! Each encoded value starts with a prefix byte that orders values of
//! different types:
//!
//! ```text
//! 0x01       NULL (nulls-first default)
//! 0x02-0x03  Booleans (FALSE < TRUE)
//! 0x10-0x16  Numbers (negatives < zero < positives, Int/Float unified)
//! 0x20       TEXT
//! 0x21       BLOB
//! 0xFE       NULL when the column orders nulls last
//! ```
//!
//! ## Number Encoding
//!
//! Integers and floats share one ordering domain. Every number is encoded
//! through its IEEE 754 double bit pattern with the standard order-preserving
//! transform (negatives: all bits inverted; positives: sign bit flipped),
//! eight big-endian bytes after the prefix. Integers that exceed 2^53 keep a
//! trailing big-endian i64 as a tiebreak so distinct values stay distinct.
//!
//! ## Text/Blob Encoding
//!
//! Variable-length values use escape encoding so embedded zero bytes cannot
//! terminate the key early and shorter strings sort first:
//!
//! ```text
//! 0x00 -> 0x00 0xFF
//! 0xFF -> 0xFF 0x00
//! terminator: 0x00 0x00
//! ```
//!
//! ## Descending Columns
//!
//! A descending index column complements every encoded byte of that column
//! (including the prefix), which exactly reverses its order relative to the
//! ascending encoding.

use crate::types::Value;

const PREFIX_NULL: u8 = 0x01;
const PREFIX_FALSE: u8 = 0x02;
const PREFIX_TRUE: u8 = 0x03;
const PREFIX_NUMBER: u8 = 0x10;
const PREFIX_TEXT: u8 = 0x20;
const PREFIX_BLOB: u8 = 0x21;
const PREFIX_NULL_LAST: u8 = 0xFE;

/// Encodes one value into `buf`. `descending` complements the encoded bytes;
/// `nulls_last` moves NULL above every non-null prefix.
pub fn encode_value(buf: &mut Vec<u8>, value: &Value, descending: bool, nulls_last: bool) {
    let start = buf.len();
    match value {
        Value::Null => {
            buf.push(if nulls_last { PREFIX_NULL_LAST } else { PREFIX_NULL });
        }
        Value::Bool(b) => buf.push(if *b { PREFIX_TRUE } else { PREFIX_FALSE }),
        Value::Int(i) => {
            buf.push(PREFIX_NUMBER);
            encode_f64_bits(buf, *i as f64);
            buf.extend_from_slice(&i.to_be_bytes());
        }
        Value::Float(f) => {
            buf.push(PREFIX_NUMBER);
            encode_f64_bits(buf, *f);
            // integer tiebreak slot, saturating; keeps Int/Float comparable
            buf.extend_from_slice(&(f.floor() as i64).to_be_bytes());
        }
        Value::Text(s) => {
            buf.push(PREFIX_TEXT);
            encode_escaped(buf, s.as_bytes());
        }
        Value::Blob(b) => {
            buf.push(PREFIX_BLOB);
            encode_escaped(buf, b);
        }
    }
    if descending {
        for byte in &mut buf[start..] {
            *byte = !*byte;
        }
    }
}

fn encode_f64_bits(buf: &mut Vec<u8>, f: f64) {
    let bits = f.to_bits();
    let ordered = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits ^ (1 << 63)
    };
    buf.extend_from_slice(&ordered.to_be_bytes());
}

fn encode_escaped(buf: &mut Vec<u8>, data: &[u8]) {
    for &b in data {
        match b {
            0x00 => buf.extend_from_slice(&[0x00, 0xFF]),
            0xFF => buf.extend_from_slice(&[0xFF, 0x00]),
            other => buf.push(other),
        }
    }
    buf.extend_from_slice(&[0x00, 0x00]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_value(&mut buf, v, false, false);
        buf
    }

    #[test]
    fn numbers_order_across_int_and_float() {
        let values = [
            Value::Float(-10.5),
            Value::Int(-10),
            Value::Int(0),
            Value::Float(0.5),
            Value::Int(1),
            Value::Float(1.5),
            Value::Int(100),
        ];
        let keys: Vec<_> = values.iter().map(key).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn null_sorts_below_everything_by_default() {
        assert!(key(&Value::Null) < key(&Value::Int(i64::MIN)));
        assert!(key(&Value::Null) < key(&Value::Bool(false)));
    }

    #[test]
    fn null_last_sorts_above_everything() {
        let mut null_last = Vec::new();
        encode_value(&mut null_last, &Value::Null, false, true);
        assert!(null_last > key(&Value::Text("zzz".into())));
        assert!(null_last > key(&Value::Int(i64::MAX)));
    }

    #[test]
    fn text_with_embedded_nul_does_not_terminate_early() {
        let a = key(&Value::Text("a\0b".into()));
        let b = key(&Value::Text("a".into()));
        let c = key(&Value::Text("a\0c".into()));
        assert!(b < a, "prefix string must sort first");
        assert!(a < c);
    }

    #[test]
    fn descending_reverses_order() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        encode_value(&mut a, &Value::Int(1), true, false);
        encode_value(&mut b, &Value::Int(2), true, false);
        assert!(a > b);
    }

    #[test]
    fn composite_keys_order_by_first_column_then_second() {
        let mut k1 = Vec::new();
        let mut k2 = Vec::new();
        encode_value(&mut k1, &Value::Int(1), false, false);
        encode_value(&mut k1, &Value::Text("b".into()), false, false);
        encode_value(&mut k2, &Value::Int(1), false, false);
        encode_value(&mut k2, &Value::Text("c".into()), false, false);
        assert!(k1 < k2);

        let mut k3 = Vec::new();
        encode_value(&mut k3, &Value::Int(2), false, false);
        encode_value(&mut k3, &Value::Text("a".into()), false, false);
        assert!(k2 < k3);
    }
}
