//! Property tests for line-oriented stream buffers
//!
//! The buffers must produce identical payload sequences regardless of how
//! the transport fragments the byte stream.

use proptest::prelude::*;
use tiller_llm::stream_buf::{NdjsonBuffer, SseLineBuffer};

/// Split `text` at the given fractional points and run every piece through
/// the buffer, collecting all emitted payloads.
fn feed_sse_in_pieces(text: &str, cuts: &[usize]) -> Vec<String> {
    let mut buffer = SseLineBuffer::new();
    let mut out = Vec::new();
    let mut rest = text;
    for &cut in cuts {
        let mut at = cut % (rest.len() + 1);
        while !rest.is_char_boundary(at) {
            at -= 1;
        }
        let (piece, tail) = rest.split_at(at);
        out.extend(buffer.push(piece));
        rest = tail;
    }
    out.extend(buffer.push(rest));
    out
}

fn feed_ndjson_in_pieces(text: &str, cuts: &[usize]) -> Vec<String> {
    let mut buffer = NdjsonBuffer::new();
    let mut out = Vec::new();
    let mut rest = text;
    for &cut in cuts {
        let mut at = cut % (rest.len() + 1);
        while !rest.is_char_boundary(at) {
            at -= 1;
        }
        let (piece, tail) = rest.split_at(at);
        out.extend(buffer.push(piece));
        rest = tail;
    }
    out.extend(buffer.push(rest));
    out
}

proptest! {
    /// Arbitrary fragmentation never changes the payload sequence an SSE
    /// buffer emits.
    #[test]
    fn sse_payloads_invariant_under_fragmentation(
        payloads in prop::collection::vec("[a-zA-Z0-9{}:\",]{1,40}", 1..8),
        cuts in prop::collection::vec(0usize..200, 0..6),
    ) {
        let text: String = payloads
            .iter()
            .map(|p| format!("data: {p}\n\n"))
            .collect();

        let whole = feed_sse_in_pieces(&text, &[]);
        let pieced = feed_sse_in_pieces(&text, &cuts);

        prop_assert_eq!(whole.clone(), pieced);
        prop_assert_eq!(whole, payloads);
    }

    /// Same invariant for newline-delimited JSON bodies.
    #[test]
    fn ndjson_lines_invariant_under_fragmentation(
        lines in prop::collection::vec("[a-zA-Z0-9{}:\"_,]{1,60}", 1..8),
        cuts in prop::collection::vec(0usize..300, 0..6),
    ) {
        let text: String = lines.iter().map(|l| format!("{l}\n")).collect();

        let whole = feed_ndjson_in_pieces(&text, &[]);
        let pieced = feed_ndjson_in_pieces(&text, &cuts);

        prop_assert_eq!(whole.clone(), pieced);
        prop_assert_eq!(whole, lines);
    }

    /// SSE comment and event-type lines never leak through as payloads.
    #[test]
    fn sse_non_data_lines_are_skipped(
        payload in "[a-zA-Z0-9]{1,40}",
        noise in "[a-zA-Z_]{1,20}",
    ) {
        let text = format!(": keepalive\nevent: {noise}\ndata: {payload}\n\n");
        let out = feed_sse_in_pieces(&text, &[]);
        prop_assert_eq!(out, vec![payload]);
    }
}
