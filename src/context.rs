//! Context assembly under a character budget.

/// Blank line between chunks.
pub const SEPARATOR: &str = "\n\n";

/// Join ranked chunk texts with [`SEPARATOR`], keeping the result within
/// `max_chars` characters (separators included).
///
/// Chunks are taken in order and never truncated. Assembly stops at the first
/// chunk that does not fit, so the result is always a whole-chunk prefix of
/// the input.
pub fn assemble<S: AsRef<str>>(texts: &[S], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for text in texts {
        let text = text.as_ref();
        let sep = if context.is_empty() { 0 } else { SEPARATOR.len() };
        let len = text.chars().count();
        if used + sep + len > max_chars {
            break;
        }
        if sep > 0 {
            context.push_str(SEPARATOR);
        }
        context.push_str(text);
        used += sep + len;
    }

    context
}
