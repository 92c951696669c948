use std::collections::VecDeque;

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Character-budgeted splitter that prefers paragraph, then line, then
/// sentence, then word boundaries.
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size / 2),
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    /// Split into trimmed, non-empty chunks of at most `chunk_size` characters.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let position = separators.iter().position(|s| text.contains(s));
        let (pieces, finer) = match position {
            Some(i) => (split_keep(text, separators[i]), &separators[i + 1..]),
            None => (hard_split(text, self.chunk_size), &separators[..0]),
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            chunks.extend(self.split_with(&piece, finer));
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Pack small pieces into chunks, carrying up to `chunk_overlap` characters forward.
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window);
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_chunk(&mut chunks, &window);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split on `sep`, keeping the separator at the start of each following piece.
fn split_keep(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    for (i, part) in text.split(sep).enumerate() {
        let piece = if i == 0 {
            part.to_string()
        } else {
            format!("{}{}", sep, part)
        };
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces
}

fn hard_split(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
