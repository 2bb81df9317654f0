//! Note id helpers
//!
//! Notes are keyed by UUID internally. URLs carry either the compact
//! base64url form of that UUID, the note's short id, or its alias.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use uuid::Uuid;

/// Length of a generated short id
pub const SHORTID_LEN: usize = 10;

const SHORTID_ALPHABET: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_-";

/// Encode a note UUID as 22 url-safe characters
pub fn encode_note_id(id: &Uuid) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

/// Decode a route segment into a note UUID
///
/// Accepts the hyphenated UUID form and the compact encoding produced by
/// [`encode_note_id`]. Anything else (aliases, short ids) yields `None`.
pub fn decode_note_id(text: &str) -> Option<Uuid> {
    if let Ok(id) = Uuid::parse_str(text) {
        return Some(id);
    }
    if text.len() != 22 {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(text).ok()?;
    Uuid::from_slice(&bytes).ok()
}

/// Generate a random short id for publish URLs
pub fn generate_shortid() -> String {
    let mut rng = rand::thread_rng();
    (0..SHORTID_LEN)
        .map(|_| SHORTID_ALPHABET[rng.gen_range(0..SHORTID_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_id_decodes_back() {
        let id = Uuid::new_v4();
        let encoded = encode_note_id(&id);
        assert_eq!(encoded.len(), 22);
        assert_eq!(decode_note_id(&encoded), Some(id));
    }

    #[test]
    fn test_hyphenated_uuid_accepted() {
        let id = Uuid::new_v4();
        assert_eq!(decode_note_id(&id.to_string()), Some(id));
    }

    #[test]
    fn test_alias_is_not_an_id() {
        assert_eq!(decode_note_id("my-meeting-notes"), None);
        assert_eq!(decode_note_id(""), None);
    }

    #[test]
    fn test_shortid_shape() {
        let a = generate_shortid();
        let b = generate_shortid();
        assert_eq!(a.len(), SHORTID_LEN);
        assert!(a.bytes().all(|c| SHORTID_ALPHABET.contains(&c)));
        assert_ne!(a, b);
    }
}
