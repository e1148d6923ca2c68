//! Reasoning segment removal
//!
//! Reasoning models (deepseek-r1 and friends) emit `<think> ... </think>`
//! before the answer. Only the text after the first end tag is kept.

/// Sentinel closing the model's reasoning segment
pub const REASONING_END_TAG: &str = "</think>";

/// Strip the leading reasoning segment from a raw completion.
///
/// Everything up to and including the first end tag is dropped. Any later end
/// tags are removed as well, so the output never contains one and the function
/// is idempotent. Without a tag the trimmed input is returned.
pub fn strip_reasoning(raw: &str) -> String {
    let Some((_, rest)) = raw.split_once(REASONING_END_TAG) else {
        return raw.trim().to_string();
    };

    let mut answer = rest.to_string();
    // Removing one tag can splice a new one together, hence the loop
    while answer.contains(REASONING_END_TAG) {
        answer = answer.replace(REASONING_END_TAG, "");
    }
    answer.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_reasoning_block() {
        assert_eq!(strip_reasoning("secret</think>answer"), "answer");
        assert_eq!(
            strip_reasoning("<think>\nlet me see\n</think>\n\nМосква.\n"),
            "Москва."
        );
    }

    #[test]
    fn test_no_tag_returns_trimmed_input() {
        assert_eq!(strip_reasoning("  plain answer \n"), "plain answer");
        assert_eq!(strip_reasoning(""), "");
    }

    #[test]
    fn test_later_tags_are_joined() {
        assert_eq!(strip_reasoning("a</think>b</think>c"), "bc");
        assert_eq!(strip_reasoning("</think></think>"), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "secret</think>answer",
            "  no tags here  ",
            "a</think> b </think>c",
            "x</think></thi</think>nk>tail",
            "</think>",
            "<think>unterminated",
        ];
        for input in inputs {
            let once = strip_reasoning(input);
            assert_eq!(strip_reasoning(&once), once, "input: {:?}", input);
            assert!(!once.contains(REASONING_END_TAG));
        }
    }
}
