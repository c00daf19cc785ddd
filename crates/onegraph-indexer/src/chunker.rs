//! Deterministic paragraph-preserving text chunker.
//!
//! Sizes are measured in characters with a fixed 4:1 chars-per-token
//! ratio. Oversized paragraphs are hard-split before greedy assembly, and
//! the overlap prefix of each segment is taken from the previous
//! pre-merge segment, so a segment never exceeds
//! `target_chars + overlap_chars + 1` characters.

use onegraph_domain::constants::{CHARS_PER_TOKEN, CHUNK_OVERLAP_TOKENS, CHUNK_TARGET_TOKENS};
use onegraph_domain::entities::{Chunk, TextUnit};
use onegraph_domain::stable_guid;

/// Chunk text units with the default 800/120 token parameters.
#[must_use]
pub fn chunk_text_units(units: &[TextUnit]) -> Vec<Chunk> {
    chunk_text_units_with(units, CHUNK_TARGET_TOKENS, CHUNK_OVERLAP_TOKENS)
}

/// Chunk text units with explicit token parameters.
#[must_use]
pub fn chunk_text_units_with(
    units: &[TextUnit],
    target_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let target_chars = target_tokens * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    for unit in units {
        let segments = chunk_text(&unit.text, target_chars, overlap_chars);
        for (index, segment) in segments.into_iter().enumerate() {
            let seed = format!(
                "{}|{}|{}|{}",
                unit.node_key.label,
                unit.node_key.canonical_key(),
                unit.locator.as_deref().unwrap_or(""),
                index
            );
            chunks.push(Chunk {
                chunk_id: stable_guid(&seed),
                text: segment,
                path: unit.path.clone(),
                locator: unit.locator.clone(),
                node_key: unit.node_key.clone(),
            });
        }
    }
    chunks
}

fn chunk_text(text: &str, target_chars: usize, overlap_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    // Break down oversized paragraphs prior to assembly.
    let mut pieces: Vec<String> = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if char_len(paragraph) <= target_chars {
            pieces.push(paragraph.to_owned());
        } else {
            pieces.extend(split_long(paragraph, target_chars));
        }
    }
    if pieces.is_empty() {
        pieces = split_long(text, target_chars);
    }

    let mut segments: Vec<String> = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if char_len(&current) + char_len(&piece) + 2 <= target_chars {
            if current.is_empty() {
                current = piece;
            } else {
                current.push_str("\n\n");
                current.push_str(&piece);
            }
        } else {
            commit(&mut segments, &current);
            current = piece;
        }
    }
    commit(&mut segments, &current);

    if segments.is_empty() {
        // Pathological whitespace: never return an oversize segment.
        segments = split_long(text, target_chars);
    }

    // Overlap is derived from the pre-merge segment, not the already
    // extended one.
    if overlap_chars > 0 && segments.len() > 1 {
        let mut overlapped = Vec::with_capacity(segments.len());
        let mut prev_tail = String::new();
        for segment in &segments {
            if prev_tail.is_empty() {
                overlapped.push(segment.clone());
            } else {
                overlapped.push(format!("{prev_tail}\n{segment}").trim().to_owned());
            }
            prev_tail = tail_chars(segment, overlap_chars);
        }
        segments = overlapped;
    }

    segments
}

fn commit(segments: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_owned());
    }
}

/// Hard split into pieces of at most `limit` characters.
fn split_long(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn tail_chars(text: &str, n: usize) -> String {
    let len = char_len(text);
    text.chars().skip(len.saturating_sub(n)).collect()
}
