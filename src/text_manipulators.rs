/// Header cells are compared with line breaks and ASCII spaces removed.
pub fn normalize_header(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\n' | '\r' | ' '))
        .collect()
}
