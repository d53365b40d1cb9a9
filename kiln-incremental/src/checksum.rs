//! Structural fingerprints.
//!
//! Everything that can make a rep outdated is reduced to a fixed-format
//! digest: attribute values, textual content, binary files (by size and
//! mtime rather than full byte hashing), and recorded build plans.
//! Hashing never fails; values without a structural form fall back to
//! their stable textual representation.

use kiln_types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hex-encoded blake3 digest, compared for equality and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(String);

impl Digest {
    fn of_bytes(bytes: &[u8]) -> Self {
        Digest(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marker emitted in place of a node that is already being hashed on
/// the current branch, guaranteeing termination on self-referential
/// structures.
const RECURSION_SENTINEL: &str = "<recursion>";

/// Fingerprint a structured value.
///
/// Scalars hash their canonical textual form with a type tag; lists are
/// order-sensitive; maps hash their entries sorted by key so attribute
/// declaration order does not affect the digest.
pub fn checksum(value: &Value) -> Digest {
    let mut visited: Vec<*const ()> = Vec::new();
    digest_value(value, &mut visited)
}

fn digest_value(value: &Value, visited: &mut Vec<*const ()>) -> Digest {
    match value {
        Value::Null => Digest::of_bytes(b"null"),
        Value::Bool(b) => Digest::of_bytes(format!("bool:{b}").as_bytes()),
        Value::Int(n) => Digest::of_bytes(format!("int:{n}").as_bytes()),
        Value::Float(x) => Digest::of_bytes(format!("float:{x}").as_bytes()),
        Value::String(s) => Digest::of_bytes(format!("str:{s}").as_bytes()),
        Value::Opaque(repr) => Digest::of_bytes(format!("opaque:{repr}").as_bytes()),
        Value::List(items) => {
            let mut buf = String::from("list:");
            for item in items {
                buf.push_str(digest_value(item, visited).as_str());
                buf.push(';');
            }
            Digest::of_bytes(buf.as_bytes())
        }
        Value::Map(map) => {
            let mut entries: Vec<(&str, &Value)> = map.iter().collect();
            entries.sort_by_key(|(key, _)| *key);
            let mut buf = String::from("map:");
            for (key, item) in entries {
                buf.push_str(Digest::of_bytes(key.as_bytes()).as_str());
                buf.push('=');
                buf.push_str(digest_value(item, visited).as_str());
                buf.push(';');
            }
            Digest::of_bytes(buf.as_bytes())
        }
        Value::Shared(inner) => {
            let ptr = std::sync::Arc::as_ptr(inner) as *const ();
            if visited.contains(&ptr) {
                return Digest::of_bytes(RECURSION_SENTINEL.as_bytes());
            }
            visited.push(ptr);
            let digest = digest_value(&inner.read(), visited);
            visited.pop();
            digest
        }
    }
}

/// Fingerprint textual document content.
pub fn checksum_text(content: &str) -> Digest {
    let mut buf = Vec::with_capacity(content.len() + 8);
    buf.extend_from_slice(b"text:");
    buf.extend_from_slice(content.as_bytes());
    Digest::of_bytes(&buf)
}

/// Fingerprint file-backed binary content by (size, mtime) instead of
/// hashing the bytes. Cheap for large assets; a touched file re-keys.
pub fn checksum_binary(size: u64, mtime: SystemTime) -> Digest {
    let stamp = mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| format!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
        .unwrap_or_else(|_| "pre-epoch".to_string());
    Digest::of_bytes(format!("binary:{size},{stamp}").as_bytes())
}

/// Combine component digests into one, order-sensitive.
pub fn checksum_parts(parts: &[&Digest]) -> Digest {
    let mut buf = String::from("parts:");
    for part in parts {
        buf.push_str(part.as_str());
        buf.push(',');
    }
    Digest::of_bytes(buf.as_bytes())
}
