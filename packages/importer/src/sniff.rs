//! Content-type detection from the first bytes of a file.

use mime::Mime;

/// How many leading bytes [`sniff`] looks at.
pub const SNIFF_LEN: usize = 512;

/// Signatures of common binary formats.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B", "application/gzip"),
    (b"ID3", "audio/mpeg"),
    (b"OggS", "audio/ogg"),
    (b"fLaC", "audio/flac"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
];

/// Best guess at the MIME type of data starting with `head`.
///
/// Known binary signatures map to their type, anything else containing a NUL
/// byte is `application/octet-stream`, and the rest is `text/plain`.
pub fn sniff(head: &[u8]) -> Mime {
    let head = &head[..head.len().min(SNIFF_LEN)];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return parse(mime);
    }
    if head.len() >= 12 && &head[..4] == b"RIFF" {
        match &head[8..12] {
            b"WAVE" => return parse("audio/wav"),
            b"AVI " => return parse("video/x-msvideo"),
            b"WEBP" => return parse("image/webp"),
            _ => {}
        }
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return parse("video/mp4");
    }
    if head.contains(&0) {
        return mime::APPLICATION_OCTET_STREAM;
    }
    mime::TEXT_PLAIN
}

/// Importable types are `text/*` and `application/*`.
pub fn is_importable(mime: &Mime) -> bool {
    mime.type_() == mime::TEXT || mime.type_() == mime::APPLICATION
}

fn parse(s: &str) -> Mime {
    s.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_text_is_plain_text() {
        let mime = sniff(b"name,age\nann,3\n");
        assert_eq!(mime, mime::TEXT_PLAIN);
        assert!(is_importable(&mime));
    }

    #[test]
    fn images_are_rejected() {
        let mime = sniff(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR");
        assert_eq!(mime.essence_str(), "image/png");
        assert!(!is_importable(&mime));

        let mime = sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 ");
        assert_eq!(mime.essence_str(), "image/webp");
        assert!(!is_importable(&mime));
    }

    #[test]
    fn binary_blobs_are_application() {
        let mime = sniff(b"abc\x00def");
        assert_eq!(mime, mime::APPLICATION_OCTET_STREAM);
        assert!(is_importable(&mime));
    }
}
