//! Record identifiers and question content hashing
//!
//! Ids are random v4 UUIDs. The content hash is a DJB2 fingerprint over
//! normalized question text, tags and type, evaluated the same way a
//! JavaScript engine evaluates `hash = (hash << 5) + hash + c` so that hashes
//! stored by earlier versions of the app keep matching.

use uuid::Uuid;

const DJB2_SEED: i64 = 5381;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a unique record ID
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fingerprint of a question's content for duplicate surfacing
///
/// Invariant under tag order and under surrounding whitespace or case in any
/// part. Not a uniqueness constraint: two questions may share a hash.
pub fn content_hash<S: AsRef<str>>(question: &str, tags: &[S], question_type: &str) -> String {
    let mut tags: Vec<String> = tags.iter().map(|t| normalize(t.as_ref())).collect();
    // Sort by UTF-16 code units, which is what the original sort compared
    tags.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

    let content = format!(
        "{}|{}|{}",
        normalize(question),
        tags.join(","),
        normalize(question_type)
    );
    to_base36(djb2(&content))
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// The shift operand is truncated to i32, the accumulator is not.
fn djb2(content: &str) -> i64 {
    content.encode_utf16().fold(DJB2_SEED, |hash, unit| {
        let shifted = (hash as i32).wrapping_shl(5);
        i64::from(shifted)
            .wrapping_add(hash)
            .wrapping_add(i64::from(unit))
    })
}

fn to_base36(value: i64) -> String {
    let mut n = value.unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    if value < 0 {
        digits.push(b'-');
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id() {
        let id = generate_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.chars().nth(14), Some('4'));

        let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_known_hashes() {
        let none: [&str; 0] = [];
        assert_eq!(content_hash("", &none, ""), "3hosd");
        assert_eq!(
            content_hash("What is a closure?", &["js", "scope"], "text"),
            "-13rwsu"
        );
        assert_eq!(
            content_hash("Rate your Rust skills", &["rust"], "rating"),
            "-2ocexn9"
        );
        // long enough for the accumulator to leave the i32 range
        assert_eq!(
            content_hash(
                "Explain the event loop in detail, including microtasks and macrotasks.",
                &["javascript", "async", "runtime"],
                "text"
            ),
            "2rxmq8d"
        );
    }

    #[test]
    fn test_hash_normalization() {
        let base = content_hash("What is a closure?", &["js", "scope"], "text");
        assert_eq!(
            content_hash("  what IS a closure?  ", &["scope", " JS"], "TEXT "),
            base
        );
        assert_ne!(
            content_hash("What is a closure?", &["js"], "text"),
            base
        );
        assert_ne!(
            content_hash("What is a closure?", &["js", "scope"], "rating"),
            base
        );
    }

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(-5381), "-45h");
        assert_eq!(to_base36(i64::MIN), "-1y2p0ij32e8e8");
    }
}
