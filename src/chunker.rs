//! Deterministic content chunker with controlled overlap.
//!
//! Splits oversized legacy source into [`Chunk`]s that respect the
//! configured line and character budgets. The dominant real-world case —
//! content already within limits — short-circuits to a single chunk
//! before any windowing logic runs.
//!
//! # Algorithm
//!
//! 1. If the content fits both budgets, return one complete chunk.
//! 2. Otherwise pick a strategy (`size`, `lines`, or `logical`) from the
//!    file extension and shape, unless the config forces one.
//! 3. Window over lines: each step consumes up to `max_lines_per_chunk`
//!    fresh lines; every chunk after the first is extended backward by
//!    `overlap_lines` of context. A 500-line file at (200, 10) yields
//!    line ranges `[1,200] [191,400] [391,500]`.
//! 4. If a window's text exceeds `max_chars_per_chunk`, shrink it from
//!    the end until it fits or `min_chunk_size` lines remain; an
//!    over-length final window is accepted rather than looping forever.
//! 5. Stamp `total_chunks` and `is_last` once the full sequence is known.
//!
//! Chunking is a pure function of (content, strategy, limits): identical
//! input always produces identical chunks.

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Windowing strategy for oversized content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    /// Byte-driven windows: accumulate whole lines until the character
    /// budget is reached; oversized single lines are hard-split.
    Size,
    /// Line-count windows, shrunk from the end to stay under the
    /// character budget.
    Lines,
    /// Split at recognized structural boundaries (source-format section
    /// headers), windowing within oversized sections.
    Logical,
}

impl ChunkStrategy {
    /// Parse a config string. `"auto"` returns `None`, meaning the
    /// strategy is chosen per file by [`pick_strategy`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "size" => Some(ChunkStrategy::Size),
            "lines" => Some(ChunkStrategy::Lines),
            "logical" => Some(ChunkStrategy::Logical),
            _ => None,
        }
    }
}

/// Choose a strategy from file extension and content shape.
///
/// Pure function: legacy structured formats get `logical`, known text
/// formats get `lines`, anything without line structure falls back to
/// `size`.
pub fn pick_strategy(file_name: &str, content: &str) -> ChunkStrategy {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "cbl" | "cob" | "cpy" | "jcl" => ChunkStrategy::Logical,
        "txt" | "md" | "sql" | "csv" | "cfg" | "ini" => ChunkStrategy::Lines,
        _ => {
            if content.lines().count() > 1 {
                ChunkStrategy::Lines
            } else {
                ChunkStrategy::Size
            }
        }
    }
}

/// Matches COBOL-style structural headers (`PROCEDURE DIVISION.`,
/// `FILE SECTION.`) used as logical split points.
fn section_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*[A-Z0-9][A-Z0-9-]*\s+(DIVISION|SECTION)\s*\.")
            .expect("section header regex is valid")
    })
}

/// Split `content` into an ordered, non-empty chunk sequence.
///
/// Callable repeatedly with identical results for identical input. The
/// config is assumed validated (see [`crate::config::validate_config`]);
/// in particular `overlap_lines < max_lines_per_chunk`.
///
/// # Guarantees
///
/// - At least one chunk is always returned (even for empty content).
/// - Content within both budgets yields exactly one chunk with
///   `is_first = is_last = true`.
/// - Concatenating chunk contents with the overlap lines of each
///   non-first chunk removed reconstructs the original line sequence.
pub fn chunk(content: &str, file_name: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();

    // Dominant case: fits both budgets, no windowing.
    if lines.len() <= config.max_lines_per_chunk && content.len() <= config.max_chars_per_chunk {
        let end_line = lines.len().max(1);
        return finalize(vec![Piece {
            start: 0,
            end: end_line,
            content: content.to_string(),
            label: None,
        }]);
    }

    let strategy =
        ChunkStrategy::parse(&config.strategy).unwrap_or_else(|| pick_strategy(file_name, content));

    let pieces = match strategy {
        ChunkStrategy::Lines => window_lines(&lines, 0, None, config),
        ChunkStrategy::Size => window_size(&lines, config),
        ChunkStrategy::Logical => window_logical(&lines, config),
    };

    finalize(pieces)
}

/// A chunk before totals are stamped. `start` is 0-based inclusive,
/// `end` 0-based exclusive (so `end` doubles as the 1-based inclusive
/// end line).
struct Piece {
    start: usize,
    end: usize,
    content: String,
    label: Option<String>,
}

/// Byte length of `lines[start..end]` joined with `\n`.
fn span_len(prefix: &[usize], start: usize, end: usize) -> usize {
    if end <= start {
        return 0;
    }
    // prefix[i] holds the joined length of lines[0..i] plus a trailing
    // separator, so the difference overcounts by the final newline.
    prefix[end] - prefix[start] - 1
}

fn line_prefix_sums(lines: &[&str]) -> Vec<usize> {
    let mut prefix = Vec::with_capacity(lines.len() + 1);
    let mut acc = 0usize;
    prefix.push(0);
    for line in lines {
        acc += line.len() + 1;
        prefix.push(acc);
    }
    prefix
}

/// Core line-window loop over `lines[base..]`, used by the `lines`
/// strategy directly and by `logical` within each section.
fn window_lines(
    lines: &[&str],
    base: usize,
    label: Option<&str>,
    config: &ChunkingConfig,
) -> Vec<Piece> {
    let n = lines.len();
    let prefix = line_prefix_sums(lines);
    let mut pieces = Vec::new();
    let mut pos = 0usize;

    while pos < n {
        let start = if pos == 0 {
            0
        } else {
            pos.saturating_sub(config.overlap_lines)
        };
        let mut end = (pos + config.max_lines_per_chunk).min(n);

        // Shrink from the end until the text fits the character budget,
        // but never below min_chunk_size lines: an over-length final
        // window beats an infinite loop.
        while span_len(&prefix, start, end) > config.max_chars_per_chunk
            && end - start > config.min_chunk_size
        {
            end -= 1;
        }

        // Pathological overlap/limit combinations could stall the
        // cursor; force advancement to guarantee termination.
        if end <= pos {
            end = pos + 1;
        }

        pieces.push(Piece {
            start: base + start,
            end: base + end,
            content: lines[start..end].join("\n"),
            label: label.map(|l| l.to_string()),
        });
        pos = end;
    }

    pieces
}

/// Byte-driven windows: accumulate whole lines until the budget is
/// reached. A single line exceeding the budget is hard-split at char
/// boundaries, each slice keeping that line's number.
fn window_size(lines: &[&str], config: &ChunkingConfig) -> Vec<Piece> {
    let n = lines.len();
    let prefix = line_prefix_sums(lines);
    let mut pieces = Vec::new();
    let mut pos = 0usize;

    while pos < n {
        let start = if pos == 0 {
            0
        } else {
            pos.saturating_sub(config.overlap_lines)
        };

        if lines[pos].len() > config.max_chars_per_chunk {
            for slice in hard_split(lines[pos], config.max_chars_per_chunk) {
                pieces.push(Piece {
                    start: pos,
                    end: pos + 1,
                    content: slice,
                    label: None,
                });
            }
            pos += 1;
            continue;
        }

        let mut end = pos + 1;
        while end < n && span_len(&prefix, start, end + 1) <= config.max_chars_per_chunk {
            end += 1;
        }

        pieces.push(Piece {
            start,
            end,
            content: lines[start..end].join("\n"),
            label: None,
        });
        pos = end;
    }

    pieces
}

/// Split at recognized section headers, then window within any section
/// that still exceeds the budgets.
fn window_logical(lines: &[&str], config: &ChunkingConfig) -> Vec<Piece> {
    let re = section_header_re();
    let mut boundaries: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .map(|(i, _)| i)
        .collect();

    if boundaries.is_empty() {
        return window_lines(lines, 0, None, config);
    }
    if boundaries[0] != 0 {
        boundaries.insert(0, 0);
    }
    boundaries.push(lines.len());

    let mut pieces = Vec::new();
    for pair in boundaries.windows(2) {
        let (seg_start, seg_end) = (pair[0], pair[1]);
        if seg_start == seg_end {
            continue;
        }
        let label = if re.is_match(lines[seg_start]) {
            Some(lines[seg_start].trim().trim_end_matches('.').to_string())
        } else {
            None
        };
        pieces.extend(window_lines(
            &lines[seg_start..seg_end],
            seg_start,
            label.as_deref(),
            config,
        ));
    }
    pieces
}

/// Hard-split an oversized single line into byte-budget slices, snapped
/// to UTF-8 char boundaries.
fn hard_split(line: &str, max_chars: usize) -> Vec<String> {
    let mut slices = Vec::new();
    let mut remaining = line;
    while !remaining.is_empty() {
        let mut split_at = remaining.len().min(max_chars);
        while split_at > 0 && !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        if split_at == 0 {
            // A single multi-byte char wider than the budget; take it whole.
            split_at = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }
        slices.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }
    slices
}

/// Stamp indices, totals, flags, and content hashes onto finished pieces.
fn finalize(pieces: Vec<Piece>) -> Vec<Chunk> {
    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, p)| make_chunk(i, total, p.start + 1, p.end.max(p.start + 1), p.content, p.label))
        .collect()
}

fn make_chunk(
    index: usize,
    total_chunks: usize,
    start_line: usize,
    end_line: usize,
    content: String,
    section_label: Option<String>,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        total_chunks,
        start_line,
        end_line,
        byte_length: content.len(),
        is_first: index == 0,
        is_last: total_chunks != 0 && index == total_chunks - 1,
        section_label,
        hash,
        content,
    }
}

/// Incremental chunker for inputs too large to hold in memory.
///
/// Feed lines with [`push_line`](StreamChunker::push_line); only one
/// window of lines (plus overlap) is buffered at a time. Emission runs
/// one chunk behind the cut so [`finish`](StreamChunker::finish) always
/// owns the final emission and can mark it `is_last = true`, even when
/// the input length is an exact multiple of the window.
///
/// Windows are cut with the same shrink and overlap rules as the batch
/// `lines` strategy, so boundaries match [`chunk`] exactly. Only
/// `total_chunks` differs: it is unknowable mid-stream and is left at
/// `0`; callers needing stamped totals should use [`chunk`].
pub struct StreamChunker {
    config: ChunkingConfig,
    /// Overlap tail carried from the previous chunk.
    carry: Vec<String>,
    /// Fresh lines not yet emitted.
    fresh: Vec<String>,
    /// Count of fresh lines consumed into cut windows so far.
    fresh_consumed: usize,
    /// One-chunk lookahead: the most recently cut window, held back
    /// until the next cut proves it is not the last.
    pending: Option<Chunk>,
    next_index: usize,
}

impl StreamChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            config: config.clone(),
            carry: Vec::new(),
            fresh: Vec::new(),
            fresh_consumed: 0,
            pending: None,
            next_index: 0,
        }
    }

    /// Feed one line. Returns a chunk once the following window has
    /// started, so the returned chunk is never the stream's last.
    pub fn push_line(&mut self, line: &str) -> Option<Chunk> {
        self.fresh.push(line.to_string());
        if self.fresh.len() >= self.config.max_lines_per_chunk {
            let cut = self.cut_window();
            return self.pending.replace(cut);
        }
        None
    }

    /// Drain the remainder and yield the held-back final chunk(s).
    ///
    /// The last chunk returned always has `is_last = true`. If no line
    /// was ever pushed, a single empty chunk is returned so the stream's
    /// output is never empty, matching the batch chunker.
    pub fn finish(mut self) -> Vec<Chunk> {
        if self.next_index == 0 && self.pending.is_none() && self.fresh.is_empty() {
            return vec![make_chunk(0, 0, 1, 1, String::new(), None).with_last()];
        }

        let mut out = Vec::new();
        // A byte-shrunk cut can leave more fresh lines behind; keep
        // cutting until the remainder is fully consumed.
        while !self.fresh.is_empty() {
            let cut = self.cut_window();
            if let Some(prev) = self.pending.replace(cut) {
                out.push(prev);
            }
        }
        if let Some(last) = self.pending.take() {
            out.push(last.with_last());
        }
        out
    }

    /// Cut one window from carry + fresh, mirroring the batch shrink and
    /// forced-advancement rules, and retain the overlap tail.
    fn cut_window(&mut self) -> Chunk {
        let carry_len = self.carry.len();

        let (end, content) = {
            let window: Vec<&str> = self
                .carry
                .iter()
                .chain(self.fresh.iter())
                .map(|s| s.as_str())
                .collect();
            let prefix = line_prefix_sums(&window);

            let mut end = (carry_len + self.config.max_lines_per_chunk).min(window.len());
            while span_len(&prefix, 0, end) > self.config.max_chars_per_chunk
                && end > self.config.min_chunk_size
            {
                end -= 1;
            }
            // Always consume at least one fresh line.
            if end <= carry_len {
                end = carry_len + 1;
            }
            (end, window[..end].join("\n"))
        };

        let consumed = end - carry_len;
        let start_line = self.fresh_consumed - carry_len + 1;
        self.fresh_consumed += consumed;

        let mut combined: Vec<String> = std::mem::take(&mut self.carry);
        combined.extend(self.fresh.drain(..consumed));
        let keep = self.config.overlap_lines.min(combined.len());
        self.carry = combined.split_off(combined.len() - keep);

        let index = self.next_index;
        self.next_index += 1;
        make_chunk(index, 0, start_line, self.fresh_consumed, content, None)
    }
}

impl Chunk {
    fn with_last(mut self) -> Chunk {
        self.is_last = true;
        self
    }
}

/// Chunk a line stream without holding the whole input in memory.
///
/// Convenience wrapper over [`StreamChunker`] for async readers.
pub async fn chunk_reader<R>(reader: R, config: &ChunkingConfig) -> Result<Vec<Chunk>>
where
    R: AsyncBufRead + Unpin,
{
    let mut stream = StreamChunker::new(config);
    let mut chunks = Vec::new();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(chunk) = stream.push_line(&line) {
            chunks.push(chunk);
        }
    }
    chunks.extend(stream.finish());
    Ok(chunks)
}
