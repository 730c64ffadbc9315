//! Text decoding for toolchain-written files
//!
//! Dependency logs and resource scripts are frequently UTF-16 with a byte
//! order mark. Anything else must be valid UTF-8.

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Decode `bytes` as text, honouring a leading byte order mark.
///
/// Returns `None` for binary or otherwise undecodable content.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return String::from_utf8(rest.to_vec()).ok();
    }
    if let Some(rest) = bytes.strip_prefix(UTF16LE_BOM) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(UTF16BE_BOM) {
        return decode_utf16(rest, u16::from_be_bytes);
    }
    String::from_utf8(bytes.to_vec()).ok()
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = UTF16LE_BOM.to_vec();
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn plain_utf8() {
        assert_eq!(decode_text(b"A.CPP\r\n").as_deref(), Some("A.CPP\r\n"));
    }

    #[test]
    fn utf8_bom_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"B.H");
        assert_eq!(decode_text(&bytes).as_deref(), Some("B.H"));
    }

    #[test]
    fn utf16le_decoded() {
        let bytes = utf16le_with_bom("C:\\SRC\\A.CPP\r\n");
        assert_eq!(decode_text(&bytes).as_deref(), Some("C:\\SRC\\A.CPP\r\n"));
    }

    #[test]
    fn binary_rejected() {
        assert_eq!(decode_text(&[0x00, 0xC3, 0x28, 0xFF]), None);
        assert_eq!(decode_text(&[0xFF, 0xFE, 0x41]), None);
    }
}
