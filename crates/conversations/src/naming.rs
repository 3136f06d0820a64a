/// Shown for conversations stored without a name.
pub const UNTITLED: &str = "Untitled Conversation";

/// Name a new conversation after its first input: the first `max_chars`
/// characters, with `...` appended when anything was cut.
pub fn conversation_name(input: &str, max_chars: usize) -> String {
    let mut chars = input.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

pub fn display_name(name: Option<&str>) -> &str {
    match name {
        Some(n) if !n.trim().is_empty() => n,
        _ => UNTITLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_input_is_truncated_with_ellipsis() {
        let input = "abcdefghijklmnopqrstuvwxy";
        assert_eq!(input.chars().count(), 25);
        assert_eq!(conversation_name(input, 20), "abcdefghijklmnopqrst...");
    }

    #[test]
    fn short_input_is_kept_whole() {
        assert_eq!(conversation_name("hello", 20), "hello");
        assert_eq!(conversation_name("exactly twenty chars", 20), "exactly twenty chars");
    }

    #[test]
    fn truncation_is_character_based() {
        let input = "日本語".repeat(10);
        let name = conversation_name(&input, 20);
        assert_eq!(name.chars().count(), 23);
        assert!(name.ends_with("..."));
    }

    #[test]
    fn blank_names_render_untitled() {
        assert_eq!(display_name(None), UNTITLED);
        assert_eq!(display_name(Some("")), UNTITLED);
        assert_eq!(display_name(Some("Trip")), "Trip");
    }
}
