//! Brace-depth scanner for Java-like sources.
//!
//! A method candidate is a signature line (visibility qualifier, optional
//! static, return type, name, parameter list, optional throws clause) followed
//! by `{`. From the matched `{` an explicit depth counter runs until it
//! returns to zero; the segment spans from the signature start to that brace.
//!
//! Blind spot: braces inside string and comment literals are counted like code.

use super::Segment;
use regex::Regex;
use std::sync::OnceLock;

fn signature_pattern() -> &'static Regex {
    static SIGNATURE_RE: OnceLock<Regex> = OnceLock::new();
    SIGNATURE_RE.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*(?:public|protected|private)\s+(?:static\s+)?[\w<>\[\],\s]+?\s+(\w+)\s*\([^)]*\)\s*(?:throws\s+[\w.,\s]+?)?\s*\{",
        )
        .expect("signature pattern compiles")
    })
}

/// Scan brace-delimited source for method segments.
pub(super) fn scan(content: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut consumed_to = 0usize;

    for caps in signature_pattern().captures_iter(content) {
        let whole = caps.get(0).expect("match has group 0");
        // Skip candidates inside a method already consumed
        if whole.start() < consumed_to {
            continue;
        }

        // The match ends at the opening brace; depth starts at 1 past it.
        let open_brace = whole.end() - 1;
        let Some(close_brace) = matching_brace(content, open_brace) else {
            // Depth never returned to zero: unbalanced tail, no segment
            continue;
        };

        segments.push(Segment {
            function_name: Some(caps[1].to_string()),
            span: (whole.start(), close_brace + 1),
        });
        consumed_to = close_brace + 1;
    }

    segments
}

/// Find the byte offset of the `}` closing the `{` at `open`.
fn matching_brace(content: &str, open: usize) -> Option<usize> {
    debug_assert_eq!(&content[open..=open], "{");
    let mut depth = 0usize;
    for (offset, byte) in content.as_bytes()[open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_brace() {
        let src = "{ a { b } c }";
        assert_eq!(matching_brace(src, 0), Some(12));
        assert_eq!(matching_brace(src, 4), Some(8));
    }

    #[test]
    fn test_scan_simple_method() {
        let src = "public int add(int a, int b) {\n    return a + b;\n}\n";
        let segments = scan(src);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].function_name.as_deref(), Some("add"));
        assert_eq!(&src[segments[0].span.0..segments[0].span.1], src.trim_end());
    }

    #[test]
    fn test_scan_throws_clause() {
        let src = "private static String read(File f) throws IOException, SecurityException {\n    return null;\n}\n";
        let segments = scan(src);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].function_name.as_deref(), Some("read"));
    }

    #[test]
    fn test_scan_generic_return_type() {
        let src = "public List<String> names() {\n    return new ArrayList<>();\n}\n";
        let segments = scan(src);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].function_name.as_deref(), Some("names"));
    }

    #[test]
    fn test_unbalanced_tail_produces_no_segment() {
        let src = "public void broken() {\n    if (true) {\n";
        assert!(scan(src).is_empty());
    }

    #[test]
    fn test_nested_blocks_stay_in_one_segment() {
        let src = r#"public void loop() {
    while (true) {
        if (x) { break; }
    }
}
public void after() {
    return;
}
"#;
        let segments = scan(src);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].function_name.as_deref(), Some("loop"));
        assert_eq!(segments[1].function_name.as_deref(), Some("after"));
    }

    #[test]
    fn test_string_literal_brace_is_counted() {
        // Documented blind spot: the scanner is not string-aware, so the `}`
        // inside the literal closes the method early.
        let src = "public String bad() {\n    return \"}\";\n}\n";
        let segments = scan(src);
        assert_eq!(segments.len(), 1);
        let text = &src[segments[0].span.0..segments[0].span.1];
        assert!(text.ends_with('}'));
        assert!(!text.contains("return \"}\";\n}"));
    }
}
