pub const MAX_INPUT_CHARS: usize = 8000;

/// Collapses all whitespace runs to single spaces and truncates to `max_chars` characters.
pub fn sanitize_input(text: &str, max_chars: usize) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").chars().take(max_chars).collect()
}

pub fn sanitize_default(text: &str) -> String {
    sanitize_input(text, MAX_INPUT_CHARS)
}

/// Truncates on a char boundary without touching whitespace.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
