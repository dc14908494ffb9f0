/// Split source text into retrieval units.
///
/// The input is trimmed and split on every `.`; empty segments are dropped.
/// Segments are not trimmed individually, so `"a. b"` yields `["a", " b"]`.
pub fn chunk(text: &str) -> Vec<String> {
    text.trim()
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(chunk("").is_empty());
        assert!(chunk("   ").is_empty());
    }

    #[test]
    fn test_split_on_periods() {
        assert_eq!(chunk("a.b.c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_double_period_yields_no_empty_chunk() {
        assert_eq!(chunk("a..b"), vec!["a", "b"]);
    }

    #[test]
    fn test_no_periods() {
        assert_eq!(chunk("no periods"), vec!["no periods"]);
    }

    #[test]
    fn test_trailing_period_and_inner_whitespace() {
        assert_eq!(
            chunk("  Paris is the capital of France. It is large.  "),
            vec!["Paris is the capital of France", " It is large"]
        );
    }
}
