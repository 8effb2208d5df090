//! Indentation scanner for Python-like sources.
//!
//! A definition line is a `def name(...):`-shaped line. Following lines belong
//! to the same segment while they are blank or indented strictly more than the
//! definition line; the segment ends at the first line indented at or below
//! the definition's indent. Trailing blank lines are stripped.
//!
//! Blind spots: multi-line signatures are not recognized, and indentation is
//! measured in raw whitespace characters (a tab counts as one column).

use super::Segment;
use regex::Regex;
use std::sync::OnceLock;

fn definition_pattern() -> &'static Regex {
    static DEF_RE: OnceLock<Regex> = OnceLock::new();
    DEF_RE.get_or_init(|| {
        Regex::new(r"^[ \t]*def\s+(\w+)\s*\([^)]*\)\s*(?:->[^:]+)?:")
            .expect("definition pattern compiles")
    })
}

/// One line of the source with its byte span.
struct Line<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn split_lines(content: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    for (offset, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
            lines.push(Line {
                text: &content[start..offset],
                start,
                end: offset,
            });
            start = offset + 1;
        }
    }
    if start < content.len() {
        lines.push(Line {
            text: &content[start..],
            start,
            end: content.len(),
        });
    }
    lines
}

fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start_matches([' ', '\t']).len()
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Scan indentation-delimited source for function segments.
pub(super) fn scan(content: &str) -> Vec<Segment> {
    let lines = split_lines(content);
    let mut segments = Vec::new();
    let mut i = 0usize;

    while i < lines.len() {
        let Some(caps) = definition_pattern().captures(lines[i].text) else {
            i += 1;
            continue;
        };
        let def_indent = indent_of(lines[i].text);
        let name = caps[1].to_string();

        // Body: blank lines or lines indented strictly deeper than the def
        let mut j = i + 1;
        let mut last_content = i;
        while j < lines.len() {
            if is_blank(lines[j].text) {
                j += 1;
                continue;
            }
            if indent_of(lines[j].text) <= def_indent {
                break;
            }
            last_content = j;
            j += 1;
        }

        // Trailing blank lines are stripped by ending at the last non-blank line
        segments.push(Segment {
            function_name: Some(name),
            span: (lines[i].start, lines[last_content].end),
        });

        // Nested defs were consumed with the enclosing body
        i = last_content + 1;
    }

    segments
}
