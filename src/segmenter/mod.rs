//! Source segmenter - function-level chunking for retrieval
//!
//! Splits raw source text into function-scoped chunks, the atomic unit the
//! embedding index stores. Two explicit scanners cover the supported language
//! families: a brace-depth scanner for Java-like sources and an indentation
//! scanner for Python-like sources. Neither is aware of string or comment
//! literals; a brace inside a string literal is counted like any other brace.
//!
//! Segmentation is pure and deterministic, and it never fails: when no
//! function boundary is found (or the language is unknown) the whole file
//! becomes a single chunk.

mod brace;
mod indent;

use crate::corpus::{Language, SourceDocument};
use uuid::Uuid;

/// A function-scoped fragment of one source document.
///
/// Invariant: `content` is a non-empty contiguous substring of the owning
/// document's content.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    pub source_document_id: Uuid,
    /// `None` for whole-file fallback chunks.
    pub function_name: Option<String>,
    pub content: String,
    pub language: Language,
}

/// A raw segment before it is tied to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub function_name: Option<String>,
    /// Byte range into the original content.
    pub span: (usize, usize),
}

impl Segment {
    fn text<'a>(&self, content: &'a str) -> &'a str {
        &content[self.span.0..self.span.1]
    }
}

/// Split `content` into function-level segments.
///
/// Unknown languages and match-free files yield one whole-file segment with no
/// function name. Empty content yields no segments at all.
pub fn segment(content: &str, language: &Language) -> Vec<Segment> {
    if content.is_empty() {
        return Vec::new();
    }

    let segments = match language {
        Language::Java => brace::scan(content),
        Language::Python => indent::scan(content),
        Language::Other(_) => Vec::new(),
    };

    if segments.is_empty() {
        return vec![Segment {
            function_name: None,
            span: (0, content.len()),
        }];
    }
    segments
}

/// Segment a document and materialize the chunks the index stores.
pub fn chunk_document(document: &SourceDocument) -> Vec<CodeChunk> {
    segment(&document.content, &document.language)
        .into_iter()
        .map(|seg| CodeChunk {
            source_document_id: document.id,
            function_name: seg.function_name.clone(),
            content: seg.text(&document.content).to_string(),
            language: document.language.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, language: Language) -> SourceDocument {
        SourceDocument::new(content.to_string(), language, "test".to_string())
    }

    #[test]
    fn test_python_two_functions() {
        let source = "def a():\n    pass\n\ndef b():\n    return 1";
        let chunks = chunk_document(&doc(source, Language::Python));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].function_name.as_deref(), Some("a"));
        assert_eq!(chunks[1].function_name.as_deref(), Some("b"));
        // The blank separator line belongs to neither chunk
        assert_eq!(chunks[0].content, "def a():\n    pass");
        assert_eq!(chunks[1].content, "def b():\n    return 1");
    }

    #[test]
    fn test_chunks_are_substrings() {
        let source = "def top():\n    x = 1\n    return x\n\nclass C:\n    def method(self):\n        pass\n";
        let document = doc(source, Language::Python);
        let chunks = chunk_document(&document);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.content.is_empty());
            assert!(document.content.contains(&chunk.content));
        }
    }

    #[test]
    fn test_java_brace_balance() {
        let source = r#"
public class Sorter {
    public static void sort(int[] xs) {
        for (int i = 0; i < xs.length; i++) {
            // inner block
        }
    }

    private int pick(int[] xs) throws IllegalStateException {
        if (xs.length == 0) { throw new IllegalStateException(); }
        return xs[0];
    }
}
"#;
        let chunks = chunk_document(&doc(source, Language::Java));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].function_name.as_deref(), Some("sort"));
        assert_eq!(chunks[1].function_name.as_deref(), Some("pick"));

        for chunk in &chunks {
            let open = chunk.content.matches('{').count();
            let close = chunk.content.matches('}').count();
            assert_eq!(open, close, "unbalanced chunk: {}", chunk.content);
        }
    }

    #[test]
    fn test_unknown_language_whole_file() {
        let source = "SELECT * FROM users;";
        let chunks = chunk_document(&doc(source, Language::Other("sql".to_string())));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].function_name, None);
        assert_eq!(chunks[0].content, source);
    }

    #[test]
    fn test_no_matches_whole_file_fallback() {
        let source = "# just a comment\nx = 1\ny = 2\n";
        let chunks = chunk_document(&doc(source, Language::Python));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].function_name, None);
        assert_eq!(chunks[0].content, source);
    }

    #[test]
    fn test_empty_content_yields_nothing() {
        assert!(segment("", &Language::Python).is_empty());
        assert!(segment("", &Language::Java).is_empty());
    }

    #[test]
    fn test_indentation_strictness() {
        let source = "def outer():\n    a = 1\n    if a:\n        b = 2\n\nprint(outer())\n";
        let chunks = chunk_document(&doc(source, Language::Python));

        assert_eq!(chunks.len(), 1);
        let body = &chunks[0].content;
        let def_indent = 0usize;
        for (i, line) in body.lines().enumerate() {
            if i == 0 || line.trim().is_empty() {
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            assert!(indent > def_indent, "line not indented past def: {line:?}");
        }
        assert!(!body.contains("print"));
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let source = "def a():\n    pass\n\ndef b():\n    pass\n";
        let first = segment(source, &Language::Python);
        let second = segment(source, &Language::Python);
        assert_eq!(first, second);
    }
}
