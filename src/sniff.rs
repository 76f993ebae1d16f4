//! Magic-byte content sniffing, the default collaborator for the
//! type-fixup pass. Only formats with unambiguous signatures are reported;
//! anything else returns None and the declared type stands.

use crate::transform::TypeSniffer;

pub struct MagicSniffer;

impl TypeSniffer for MagicSniffer {
    fn sniff(&self, bytes: &[u8]) -> Option<String> {
        sniff_magic(bytes).map(str::to_string)
    }
}

fn sniff_magic(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if bytes.starts_with(b"\xff\xd8\xff") {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return Some("application/zip");
    }
    if bytes.starts_with(b"\x1f\x8b") {
        return Some("application/gzip");
    }
    if bytes.starts_with(b"%!PS") {
        return Some("application/postscript");
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some("audio/wav");
    }

    let head = leading_text(bytes, 256).to_ascii_lowercase();
    if head.trim_start().starts_with("<!doctype html") || head.trim_start().starts_with("<html") {
        return Some("text/html");
    }
    None
}

fn leading_text(bytes: &[u8], limit: usize) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(limit)]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_signatures() {
        assert_eq!(sniff_magic(b"%PDF-1.7 ..."), Some("application/pdf"));
        assert_eq!(sniff_magic(b"\x89PNG\r\n\x1a\n...."), Some("image/png"));
        assert_eq!(sniff_magic(b"\xff\xd8\xff\xe0JFIF"), Some("image/jpeg"));
        assert_eq!(sniff_magic(b"GIF89a......"), Some("image/gif"));
        assert_eq!(sniff_magic(b"PK\x03\x04...."), Some("application/zip"));
    }

    #[test]
    fn test_html_detected_with_leading_whitespace() {
        assert_eq!(
            sniff_magic(b"\n  <!DOCTYPE HTML>\n<html>"),
            Some("text/html")
        );
        assert_eq!(sniff_magic(b"<HTML><body>"), Some("text/html"));
    }

    #[test]
    fn test_unknown_content_not_guessed() {
        assert_eq!(sniff_magic(b"just some prose"), None);
        assert_eq!(sniff_magic(b""), None);
        assert_eq!(sniff_magic(&[0u8; 32]), None);
    }
}
