//! Incremental tool-call scanner
//!
//! Recognizes the textual tool-call grammar over an accumulating text
//! stream:
//!
//! ```text
//! <tool>NAME</tool>
//! <input>ARBITRARY_TEXT</input>
//! <requires_approval>true|false</requires_approval>
//! ```
//!
//! The scanner holds minimal state (a buffer and a match-in-progress flag)
//! rather than re-matching a pattern over the whole accumulated turn. Text
//! before a recognized block is released for forwarding; a candidate block
//! that is still incomplete is held back until it either completes, fails to
//! match, or the turn ends. Feeding a turn chunk by chunk and parsing it in
//! one shot produce identical results.

use tiller_core::ToolInvocation;

const OPEN_TOOL: &str = "<tool>";
const CLOSE_TOOL: &str = "</tool>";
const OPEN_INPUT: &str = "<input>";
const CLOSE_INPUT: &str = "</input>";
const OPEN_APPROVAL: &str = "<requires_approval>";
const CLOSE_APPROVAL: &str = "</requires_approval>";

/// Result of feeding one chunk: text safe to forward now, and the
/// invocation if a complete block was recognized.
#[derive(Debug, Default, PartialEq)]
pub struct ScanStep {
    pub emit: String,
    pub invocation: Option<ToolInvocation>,
}

/// Outcome of matching a candidate block that starts at the buffer head.
enum BlockMatch {
    Complete(ToolInvocation),
    Partial,
    Mismatch,
}

enum TagMatch<'a> {
    Done(&'a str),
    Partial,
    Mismatch,
}

#[derive(Debug, Default)]
pub struct ToolCallScanner {
    buf: String,
    /// Buffer currently starts with a candidate block opener.
    in_block: bool,
    matched: bool,
}

impl ToolCallScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of model output.
    ///
    /// Once an invocation has been recognized, all further input for this
    /// turn is swallowed.
    pub fn feed(&mut self, chunk: &str) -> ScanStep {
        if self.matched {
            return ScanStep::default();
        }

        self.buf.push_str(chunk);
        let mut emit = String::new();

        loop {
            if !self.in_block {
                match self.buf.find(OPEN_TOOL) {
                    Some(at) => {
                        emit.push_str(&self.buf[..at]);
                        self.buf.drain(..at);
                        self.in_block = true;
                    }
                    None => {
                        // Release everything except a trailing fragment that
                        // could still grow into the opener.
                        let held = suffix_prefix_len(&self.buf, OPEN_TOOL);
                        let safe = self.buf.len() - held;
                        emit.push_str(&self.buf[..safe]);
                        self.buf.drain(..safe);
                        return ScanStep {
                            emit,
                            invocation: None,
                        };
                    }
                }
            }

            match match_block(&self.buf) {
                BlockMatch::Complete(invocation) => {
                    self.buf.clear();
                    self.in_block = false;
                    self.matched = true;
                    return ScanStep {
                        emit,
                        invocation: Some(invocation),
                    };
                }
                BlockMatch::Partial => {
                    return ScanStep {
                        emit,
                        invocation: None,
                    };
                }
                BlockMatch::Mismatch => {
                    // Not a block after all. The opener itself is plain
                    // text; rescan what follows it.
                    emit.push_str(OPEN_TOOL);
                    self.buf.drain(..OPEN_TOOL.len());
                    self.in_block = false;
                }
            }
        }
    }

    /// Flush text held back at end of turn. An incomplete candidate block is
    /// plain text once the model stops.
    pub fn finish(&mut self) -> String {
        self.in_block = false;
        std::mem::take(&mut self.buf)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_block = false;
        self.matched = false;
    }

    /// One-shot parse over a complete turn. Runs the same machine as
    /// [`feed`](Self::feed), so the two paths cannot diverge.
    pub fn parse(text: &str) -> Option<ToolInvocation> {
        let mut scanner = Self::new();
        scanner.feed(text).invocation
    }
}

/// Longest suffix of `buf` that is a prefix of `tag`.
fn suffix_prefix_len(buf: &str, tag: &str) -> usize {
    let max = tag.len().min(buf.len());
    for len in (1..=max).rev() {
        let start = buf.len() - len;
        if buf.is_char_boundary(start) && tag.starts_with(&buf[start..]) {
            return len;
        }
    }
    0
}

/// Match one tag exactly, distinguishing "not enough input yet" from "can
/// never match".
fn expect<'a>(s: &'a str, tag: &str) -> TagMatch<'a> {
    match s.strip_prefix(tag) {
        Some(rest) => TagMatch::Done(rest),
        None if tag.starts_with(s) => TagMatch::Partial,
        None => TagMatch::Mismatch,
    }
}

/// Take text up to the first occurrence of `close` (non-greedy).
fn take_until<'a>(s: &'a str, close: &str) -> Option<(&'a str, &'a str)> {
    s.find(close)
        .map(|at| (&s[..at], &s[at + close.len()..]))
}

/// Match a full block at the head of `s`. Tags are case-sensitive; the
/// groups may be separated by whitespace; the input body is taken verbatim.
fn match_block(s: &str) -> BlockMatch {
    let rest = match expect(s, OPEN_TOOL) {
        TagMatch::Done(rest) => rest,
        TagMatch::Partial => return BlockMatch::Partial,
        TagMatch::Mismatch => return BlockMatch::Mismatch,
    };

    let Some((name, rest)) = take_until(rest, CLOSE_TOOL) else {
        return BlockMatch::Partial;
    };

    let rest = match expect(rest.trim_start(), OPEN_INPUT) {
        TagMatch::Done(rest) => rest,
        TagMatch::Partial => return BlockMatch::Partial,
        TagMatch::Mismatch => return BlockMatch::Mismatch,
    };

    let Some((raw_input, rest)) = take_until(rest, CLOSE_INPUT) else {
        return BlockMatch::Partial;
    };

    let rest = match expect(rest.trim_start(), OPEN_APPROVAL) {
        TagMatch::Done(rest) => rest,
        TagMatch::Partial => return BlockMatch::Partial,
        TagMatch::Mismatch => return BlockMatch::Mismatch,
    };

    let (requires_approval, rest) = if let Some(rest) = rest.strip_prefix("true") {
        (true, rest)
    } else if let Some(rest) = rest.strip_prefix("false") {
        (false, rest)
    } else if "true".starts_with(rest) || "false".starts_with(rest) {
        return BlockMatch::Partial;
    } else {
        return BlockMatch::Mismatch;
    };

    match expect(rest, CLOSE_APPROVAL) {
        TagMatch::Done(_) => BlockMatch::Complete(ToolInvocation {
            name: name.trim().to_string(),
            raw_input: raw_input.to_string(),
            requires_approval,
        }),
        TagMatch::Partial => BlockMatch::Partial,
        TagMatch::Mismatch => BlockMatch::Mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str =
        "<tool>x</tool>\n<input>y</input>\n<requires_approval>false</requires_approval>";

    #[test]
    fn one_shot_parse_matches_canonical_block() {
        let invocation = ToolCallScanner::parse(CANONICAL).unwrap();
        assert_eq!(invocation.name, "x");
        assert_eq!(invocation.raw_input, "y");
        assert!(!invocation.requires_approval);
    }

    #[test]
    fn prose_before_block_is_emitted_first() {
        let mut scanner = ToolCallScanner::new();
        let step = scanner.feed(&format!("Let me navigate there. {CANONICAL}"));
        assert_eq!(step.emit, "Let me navigate there. ");
        assert!(step.invocation.is_some());
    }

    #[test]
    fn trailing_prose_after_match_is_swallowed() {
        let mut scanner = ToolCallScanner::new();
        let step = scanner.feed(&format!("{CANONICAL} and then some"));
        assert!(step.invocation.is_some());
        let step = scanner.feed("more text");
        assert_eq!(step.emit, "");
        assert!(step.invocation.is_none());
    }

    #[test]
    fn char_at_a_time_equals_one_shot() {
        let text = format!("preamble {CANONICAL} trailer");
        let expected = ToolCallScanner::parse(&text).unwrap();

        let mut scanner = ToolCallScanner::new();
        let mut emitted = String::new();
        let mut found = None;
        for ch in text.chars() {
            let step = scanner.feed(&ch.to_string());
            emitted.push_str(&step.emit);
            if let Some(invocation) = step.invocation {
                found = Some(invocation);
            }
        }

        assert_eq!(found.unwrap(), expected);
        assert_eq!(emitted, "preamble ");
    }

    #[test]
    fn angle_bracket_text_without_block_passes_through() {
        let mut scanner = ToolCallScanner::new();
        let text = "a < b and <tools> is not the opener";
        let mut out = scanner.feed(text).emit;
        out.push_str(&scanner.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn opener_without_full_block_is_flushed_on_finish() {
        let mut scanner = ToolCallScanner::new();
        let step = scanner.feed("thinking <tool>nav");
        assert_eq!(step.emit, "thinking ");
        assert!(step.invocation.is_none());
        assert_eq!(scanner.finish(), "<tool>nav");
    }

    #[test]
    fn mismatched_block_is_replayed_as_text() {
        let mut scanner = ToolCallScanner::new();
        let text = "<tool>name</tool><wrong>";
        let mut out = scanner.feed(text).emit;
        out.push_str(&scanner.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn second_opener_inside_mismatch_is_still_found() {
        let text = format!("<tool>broken</tool><nope>{CANONICAL}");
        let invocation = ToolCallScanner::parse(&text).unwrap();
        assert_eq!(invocation.name, "x");
    }

    #[test]
    fn input_body_is_verbatim() {
        let text = "<tool>type</tool>\n<input>  spaced <em>html</em>\nsecond line </input>\n<requires_approval>true</requires_approval>";
        let invocation = ToolCallScanner::parse(text).unwrap();
        assert_eq!(invocation.raw_input, "  spaced <em>html</em>\nsecond line ");
        assert!(invocation.requires_approval);
    }

    #[test]
    fn tool_name_is_trimmed() {
        let text =
            "<tool> click </tool>\n<input>#id</input>\n<requires_approval>false</requires_approval>";
        let invocation = ToolCallScanner::parse(text).unwrap();
        assert_eq!(invocation.name, "click");
    }

    #[test]
    fn invalid_approval_literal_is_not_a_match() {
        let text = "<tool>x</tool>\n<input>y</input>\n<requires_approval>maybe</requires_approval>";
        assert!(ToolCallScanner::parse(text).is_none());
    }

    #[test]
    fn reset_clears_match_state() {
        let mut scanner = ToolCallScanner::new();
        assert!(scanner.feed(CANONICAL).invocation.is_some());
        scanner.reset();
        assert!(scanner.feed(CANONICAL).invocation.is_some());
    }
}
