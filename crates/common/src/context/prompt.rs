//! Grounding prompt assembly
//!
//! The corpus is Russian, so the template is too. Layout:
//!
//! ```text
//! <intro>
//! 1) <first document>
//! 2) <second document>
//!
//! <closing> «<question>»
//! ```

/// First line of every prompt
pub const PROMPT_INTRO: &str = "Вы получили следующие фрагменты текста, релевантные запросу:";

/// Text placed before the quoted question
pub const PROMPT_CLOSING: &str = "На основе этих фрагментов ответьте на вопрос:";

/// Build the grounding prompt for `question` from ranked document texts.
///
/// Documents keep their order and appear verbatim; the question appears once,
/// in guillemets, on the last line.
pub fn build_prompt<S: AsRef<str>>(question: &str, documents: &[S]) -> String {
    let mut lines = Vec::with_capacity(documents.len() + 3);
    lines.push(PROMPT_INTRO.to_string());
    for (i, document) in documents.iter().enumerate() {
        lines.push(format!("{}) {}", i + 1, document.as_ref()));
    }
    lines.push(String::new());
    lines.push(format!("{} «{}»", PROMPT_CLOSING, question));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_in_order() {
        let docs = [
            "Paris is the capital of France.",
            "Berlin is the capital of Germany.",
        ];
        let prompt = build_prompt("capital of France", &docs);

        let paris = prompt.find(docs[0]).unwrap();
        let berlin = prompt.find(docs[1]).unwrap();
        assert!(paris < berlin);
        assert_eq!(prompt.matches(docs[0]).count(), 1);
        assert_eq!(prompt.matches(docs[1]).count(), 1);
        assert_eq!(prompt.matches("capital of France").count(), 2); // once in doc 1, once quoted
        assert!(prompt.contains("1) Paris is the capital of France.\n2) Berlin"));
        assert!(prompt.ends_with("«capital of France»"));
    }

    #[test]
    fn test_question_appears_once() {
        let prompt = build_prompt("Кто написал «Войну и мир»?", &["Лев Толстой — автор романа."]);
        assert_eq!(prompt.matches("Кто написал «Войну и мир»?").count(), 1);
    }

    #[test]
    fn test_empty_documents_still_well_formed() {
        let empty: [&str; 0] = [];
        let prompt = build_prompt("what is rust", &empty);
        assert_eq!(
            prompt,
            format!("{}\n\n{} «what is rust»", PROMPT_INTRO, PROMPT_CLOSING)
        );
        assert!(!prompt.contains("1)"));
    }

    #[test]
    fn test_deterministic() {
        let docs = vec!["a".to_string(), "b".to_string()];
        assert_eq!(build_prompt("q", &docs), build_prompt("q", &docs));
    }
}
