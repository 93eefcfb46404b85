//! `Upload-Metadata` encoding and file fingerprinting.

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Build the `Upload-Metadata` header value from a key → value map.
///
/// Each entry becomes `<key> <base64(value)>`; entries are joined with
/// commas and their order is unspecified. Keys must not contain spaces or
/// commas (the format has no escaping). When the map has no `filename`
/// entry, one is derived from the last segment of `path`.
pub fn encode_metadata(metadata: &HashMap<String, String>, path: &Path) -> String {
    let mut entries = metadata.clone();
    entries
        .entry("filename".to_string())
        .or_insert_with(|| default_filename(path));

    entries
        .iter()
        .map(|(key, value)| format!("{key} {}", STANDARD.encode(value.as_bytes())))
        .collect::<Vec<_>>()
        .join(",")
}

fn default_filename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Derive the default fingerprint for a file path.
///
/// Every run of characters outside `[A-Za-z0-9_]` collapses to a single
/// `.`, so the same path always yields the same fingerprint and the result
/// is safe to use as a file name in a [`FileStore`](crate::store::FileStore)
/// directory. Distinct paths colliding is the caller's concern.
pub fn fingerprint(path: &Path) -> String {
    let mut out = String::new();
    let mut in_run = false;
    for c in path.to_string_lossy().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('.');
            in_run = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_entries(encoded: &str) -> HashMap<String, String> {
        encoded
            .split(',')
            .map(|entry| {
                let (key, b64) = entry.split_once(' ').expect("entry has two fields");
                let value = String::from_utf8(STANDARD.decode(b64).unwrap()).unwrap();
                (key.to_string(), value)
            })
            .collect()
    }

    #[test]
    fn values_round_trip_through_base64() {
        let mut metadata = HashMap::new();
        metadata.insert("filename".to_string(), "report final.pdf".to_string());
        metadata.insert("owner".to_string(), "grüße, ツ".to_string());

        let decoded = decode_entries(&encode_metadata(&metadata, Path::new("/tmp/x")));
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn filename_defaults_to_last_path_segment() {
        let metadata = HashMap::new();
        let decoded = decode_entries(&encode_metadata(&metadata, Path::new("/data/pic.jpg")));
        assert_eq!(decoded.get("filename").map(String::as_str), Some("pic.jpg"));
    }

    #[test]
    fn explicit_filename_wins_over_the_default() {
        let mut metadata = HashMap::new();
        metadata.insert("filename".to_string(), "renamed.bin".to_string());

        let decoded = decode_entries(&encode_metadata(&metadata, Path::new("/data/pic.jpg")));
        assert_eq!(
            decoded.get("filename").map(String::as_str),
            Some("renamed.bin")
        );
    }

    #[test]
    fn fingerprint_collapses_runs_of_separators() {
        assert_eq!(
            fingerprint(Path::new("/home/user/some file (1).tar.gz")),
            ".home.user.some.file.1.tar.gz"
        );
    }

    #[test]
    fn fingerprint_keeps_word_characters() {
        assert_eq!(fingerprint(Path::new("archive_2024")), "archive_2024");
    }

    #[test]
    fn fingerprint_is_stable() {
        let path = Path::new("/var/data/video.mp4");
        assert_eq!(fingerprint(path), fingerprint(path));
    }
}
