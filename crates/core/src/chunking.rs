use crate::error::IngestError;

/// Fraction of the window a break point must lie beyond to be accepted.
const MIN_BREAK_FRACTION: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 2_048,
            overlap_chars: 256,
            min_chars: 256,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// One span of input text destined to become its own memory. `length` is
/// counted in characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub length: usize,
}

impl Chunk {
    fn new(text: String) -> Self {
        let length = text.chars().count();
        Self { text, length }
    }
}

/// Splits `text` into bounded, slightly overlapping chunks, preferring
/// paragraph, then sentence, then word boundaries.
///
/// Input that fits in one window is returned as a single chunk, even when it
/// is empty; callers guard against storing empty content.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    let trimmed = text.trim();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= config.max_chars {
        return vec![Chunk::new(trimmed.to_string())];
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = start + config.max_chars;

        if end >= chars.len() {
            let remaining = collect_trimmed(&chars[start..]);
            if !remaining.is_empty() {
                push_tail(&mut chunks, remaining, config);
            }
            break;
        }

        let break_at = start + find_break(&chars[start..end], config.max_chars);
        let piece = collect_trimmed(&chars[start..break_at]);
        if !piece.is_empty() {
            chunks.push(Chunk::new(piece));
        }

        let overlapped = break_at.saturating_sub(config.overlap_chars);
        let stalled = break_at
            .checked_sub(config.max_chars)
            .is_some_and(|floor| overlapped <= floor);
        start = if stalled || overlapped <= start {
            break_at
        } else {
            overlapped
        };
    }

    chunks
}

/// Offset just past the preferred break inside `window`, or the window end.
fn find_break(window: &[char], max_chars: usize) -> usize {
    let threshold = max_chars as f64 * MIN_BREAK_FRACTION;
    let candidates: [&[char]; 3] = [&['\n', '\n'], &['.', ' '], &[' ']];

    for pattern in candidates {
        if let Some(position) = rfind(window, pattern) {
            if position as f64 > threshold {
                return position + pattern.len();
            }
        }
    }

    window.len()
}

fn rfind(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&index| haystack[index..index + needle.len()] == *needle)
}

fn collect_trimmed(chars: &[char]) -> String {
    chars.iter().collect::<String>().trim().to_string()
}

/// A short remainder is folded into the previous chunk when that keeps the
/// chunk within `max_chars`.
fn push_tail(chunks: &mut Vec<Chunk>, remaining: String, config: ChunkingConfig) {
    let remaining_len = remaining.chars().count();
    if remaining_len < config.min_chars {
        if let Some(last) = chunks.last_mut() {
            if last.length + 1 + remaining_len <= config.max_chars {
                last.text.push('\n');
                last.text.push_str(&remaining);
                last.length += 1 + remaining_len;
                return;
            }
        }
    }
    chunks.push(Chunk::new(remaining));
}
