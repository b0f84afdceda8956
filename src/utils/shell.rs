// sitecopy/src/utils/shell.rs

/// Quotes a single token for a POSIX shell. Every byte inside single quotes
/// is literal, so only the quote character itself needs rewriting.
pub fn quote(token: &str) -> String {
    format!("'{}'", token.replace('\'', r"'\''"))
}
