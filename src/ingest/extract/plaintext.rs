/// Plain text fallback
///
/// Normalizes line endings and strips NUL bytes left over from binary
/// content; everything else is kept verbatim.
pub fn extract(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\0', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_extract() {
        assert_eq!(extract("  line one\r\nline two\0\n"), "line one\nline two");
    }
}
