//! Storage key derivation. User-supplied names never reach the filesystem.

use std::fmt::Write as _;

use ring::digest;

use crate::storage::models::ALLOWED_EXTENSIONS;

const SLUG_MAX_CHARS: usize = 40;
const DIGEST_HEX_CHARS: usize = 16;

/// Lower-cased extension of `file_name` if it is on the upload allow-list.
pub fn allowed_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Last path component of a client-supplied file name.
pub fn display_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
}

/// Collision-resistant key for an uploaded file.
pub fn upload_key(ext: &str) -> String {
    format!("{}.{ext}", uuid::Uuid::new_v4().simple())
}

/// Deterministic key for a named map: the same owner saving the same name
/// always lands on the same file, different owners never collide.
pub fn map_key(owner_id: &str, name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(SLUG_MAX_CHARS)
        .collect();

    let mut input = Vec::with_capacity(owner_id.len() + name.len() + 1);
    input.extend_from_slice(owner_id.as_bytes());
    input.push(0);
    input.extend_from_slice(name.as_bytes());
    let hash = digest::digest(&digest::SHA256, &input);

    let mut hex = String::with_capacity(DIGEST_HEX_CHARS);
    for byte in &hash.as_ref()[..DIGEST_HEX_CHARS / 2] {
        let _ = write!(hex, "{byte:02x}");
    }

    format!("map-{slug}-{hex}.geojson")
}

/// Whether `key` has one of the shapes [`upload_key`] or [`map_key`] produce.
/// Anything else in the content directory was not written by this service.
pub fn is_generated_key(key: &str) -> bool {
    let Some((stem, ext)) = key.rsplit_once('.') else {
        return false;
    };

    if let Some(body) = stem.strip_prefix("map-") {
        if ext != "geojson" {
            return false;
        }
        return match body.rsplit_once('-') {
            Some((slug, digest)) => {
                slug.chars().count() <= SLUG_MAX_CHARS
                    && slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                    && is_lower_hex(digest, DIGEST_HEX_CHARS)
            }
            None => false,
        };
    }

    is_lower_hex(stem, 32) && ALLOWED_EXTENSIONS.contains(&ext)
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
