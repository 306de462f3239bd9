// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chunk splitting for surfaces with a message size limit
//!
//! Lines are packed greedily into chunks of at most `max_chunk_length`
//! characters. The line break at a chunk boundary is not repeated inside
//! either chunk, and a line longer than the limit is cut into fixed-size
//! pieces. Lengths are counted in characters, not bytes.

/// A piece of split text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// The original text had a line break right after this chunk
    pub line_break_after: bool,
}

/// Split `text` into chunk texts no longer than `max_chunk_length` characters.
pub fn split(text: &str, max_chunk_length: usize) -> Vec<String> {
    split_chunks(text, max_chunk_length)
        .into_iter()
        .map(|chunk| chunk.text)
        .collect()
}

/// Split `text`, keeping enough information to rebuild it with [`rejoin`].
pub fn split_chunks(text: &str, max_chunk_length: usize) -> Vec<Chunk> {
    let max = max_chunk_length.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    let mut has_current = false;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if has_current && current_len + line_len + 1 <= max {
            current.push('\n');
            current.push_str(line);
            current_len += line_len + 1;
            continue;
        }

        if has_current {
            chunks.push(Chunk {
                text: std::mem::take(&mut current),
                line_break_after: true,
            });
        }

        let mut rest = line;
        let mut rest_len = line_len;
        while rest_len > max {
            let cut = rest
                .char_indices()
                .nth(max)
                .map(|(index, _)| index)
                .unwrap_or(rest.len());
            chunks.push(Chunk {
                text: rest[..cut].to_string(),
                line_break_after: false,
            });
            rest = &rest[cut..];
            rest_len -= max;
        }

        current.push_str(rest);
        current_len = rest_len;
        has_current = true;
    }

    if has_current {
        chunks.push(Chunk {
            text: current,
            line_break_after: false,
        });
    }

    chunks
}

/// Rebuild the original text from its chunks.
pub fn rejoin(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(&chunk.text);
        if chunk.line_break_after {
            text.push('\n');
        }
    }
    text
}
