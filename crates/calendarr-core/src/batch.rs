//! Packing day blocks into webhook-sized messages.
//!
//! Blocks are packed greedily in day order. A day is never split across
//! batches by [`pack`]; a day too large for any message becomes its own
//! oversized batch, and the sender decides whether to [`split_block`] it.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::format::FormattedBlock;

const CONTINUED: &str = " (cont.)";

/// Size limits of one webhook message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Total characters across all entries of one message.
    pub max_chars: usize,
    /// Entries (embeds, attachments) per message.
    pub max_entries: usize,
    /// Characters in a single entry's body.
    pub max_entry_chars: usize,
    /// Header line plus mention, as sent in the header message.
    pub max_header_chars: usize,
    /// Plain text messages such as the footer.
    pub max_text_chars: usize,
}

impl BatchLimits {
    pub const DISCORD: Self = Self {
        max_chars: 6000,
        max_entries: 10,
        max_entry_chars: 4096,
        // The summary line shares the 2000 character `content` field.
        max_header_chars: 1800,
        max_text_chars: 2000,
    };

    /// Slack recommends at most 20 attachments per message.
    pub const SLACK: Self = Self {
        max_chars: 40_000,
        max_entries: 20,
        max_entry_chars: 3000,
        // `plain_text` in a header block.
        max_header_chars: 150,
        max_text_chars: 3000,
    };

    /// True when the block cannot be sent as a regular entry.
    pub fn is_oversized(&self, block: &FormattedBlock) -> bool {
        block.char_len > self.max_chars || block.body_len() > self.max_entry_chars
    }
}

/// A day block too large to fit any single message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("day '{day}' renders to {chars} characters, over the {limit} character limit")]
pub struct FormattingOverflow {
    pub day: String,
    pub chars: usize,
    pub limit: usize,
}

/// Day blocks sent together in one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub blocks: Vec<FormattedBlock>,
    pub char_count: usize,
    /// Number of blocks, i.e. embeds or attachments.
    pub entry_count: usize,
    /// Set when the batch holds a single block that exceeds the limits.
    pub overflow: Option<FormattingOverflow>,
    /// Ready-to-send JSON body, filled in by the platform formatter.
    pub payload: Value,
}

impl Batch {
    pub fn from_blocks(blocks: Vec<FormattedBlock>) -> Self {
        Self {
            char_count: blocks.iter().map(|b| b.char_len).sum(),
            entry_count: blocks.len(),
            blocks,
            overflow: None,
            payload: Value::Null,
        }
    }

    pub fn is_oversized(&self) -> bool {
        self.overflow.is_some()
    }

    /// Event lines across all blocks.
    pub fn line_count(&self) -> usize {
        self.blocks.iter().map(|b| b.entry_count).sum()
    }
}

/// Greedily packs blocks into batches, preserving order.
pub fn pack(blocks: Vec<FormattedBlock>, limits: &BatchLimits) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<FormattedBlock> = Vec::new();
    let mut current_chars = 0;

    for block in blocks {
        if limits.is_oversized(&block) {
            if !current.is_empty() {
                batches.push(Batch::from_blocks(std::mem::take(&mut current)));
                current_chars = 0;
            }

            let overflow = FormattingOverflow {
                day: block.title.clone(),
                chars: block.char_len,
                limit: limits.max_chars.min(limits.max_entry_chars),
            };
            warn!(
                day = %overflow.day,
                chars = overflow.chars,
                limit = overflow.limit,
                "Day does not fit in a single message"
            );
            let mut batch = Batch::from_blocks(vec![block]);
            batch.overflow = Some(overflow);
            batches.push(batch);
            continue;
        }

        let fits = current_chars + block.char_len <= limits.max_chars
            && current.len() < limits.max_entries;
        if !fits && !current.is_empty() {
            batches.push(Batch::from_blocks(std::mem::take(&mut current)));
            current_chars = 0;
        }

        current_chars += block.char_len;
        current.push(block);
    }

    if !current.is_empty() {
        batches.push(Batch::from_blocks(current));
    }
    batches
}

/// Splits a block at line boundaries into blocks of at most `max_body_chars`
/// body characters. Continuation blocks get a ` (cont.)` title suffix. A
/// single line longer than the limit is cut mid-line.
pub fn split_block(block: &FormattedBlock, max_body_chars: usize) -> Vec<FormattedBlock> {
    let max = max_body_chars.max(1);
    let mut chunks: Vec<(String, usize)> = Vec::new();
    let mut body = String::new();
    let mut body_len = 0;
    let mut lines_in_body = 0;

    let flush = |chunks: &mut Vec<(String, usize)>, body: &mut String, lines: &mut usize| {
        let trimmed = body.trim_matches('\n');
        if !trimmed.is_empty() {
            chunks.push((trimmed.to_string(), *lines));
        }
        body.clear();
        *lines = 0;
    };

    for line in block.body.split('\n') {
        let line_len = line.chars().count();

        if line_len > max {
            flush(&mut chunks, &mut body, &mut lines_in_body);
            body_len = 0;
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max) {
                chunks.push((piece.iter().collect(), 1));
            }
            continue;
        }

        let added = if body.is_empty() { line_len } else { line_len + 1 };
        if body_len + added > max {
            flush(&mut chunks, &mut body, &mut lines_in_body);
            body_len = 0;
        }

        if !body.is_empty() {
            body.push('\n');
            body_len += 1;
        }
        body.push_str(line);
        body_len += line_len;
        if !line.trim().is_empty() {
            lines_in_body += 1;
        }
    }
    flush(&mut chunks, &mut body, &mut lines_in_body);

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, (text, lines))| {
            let title = if i == 0 || block.title.is_empty() {
                block.title.clone()
            } else {
                format!("{}{CONTINUED}", block.title)
            };
            FormattedBlock::new(title, text, block.position, lines)
        })
        .collect()
}

/// Body size to split an oversized block to, leaving room for its title.
pub fn split_target(block: &FormattedBlock, limits: &BatchLimits) -> usize {
    let title_len = block.title.chars().count() + CONTINUED.len();
    limits
        .max_entry_chars
        .min(limits.max_chars.saturating_sub(title_len))
}
