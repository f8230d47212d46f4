use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A bounded slice of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_name: String,
    pub content: String,
    /// Zero-based, gapless within one document.
    pub index: usize,
    /// Back-filled once every chunk of the document exists.
    pub total_count: usize,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
}

impl Chunk {
    /// The entire document as chunk 1/1.
    pub fn whole(source_name: &str, content: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            content: content.to_string(),
            index: 0,
            total_count: 1,
            start_line: 1,
            end_line: content.lines().count().max(1),
        }
    }

    /// Human label used in service requests and log lines.
    pub fn label(&self) -> String {
        format!("{} chunk {}/{}", self.source_name, self.index + 1, self.total_count)
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Lines that may start a new exercise: `#`/`##` headings, `N. `, `N) `,
/// `N、`, `第N题` and separators of three or more `-`, `=` or `*`.
static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:#{1,2}\s+\S|\s*\d{1,4}[.)]\s+\S|\s*\d{1,4}、|\s*第\s*[0-9一二三四五六七八九十百零]+\s*题|\s*(?:-{3,}|={3,}|\*{3,})\s*$)",
    )
    .expect("Invalid chunk boundary regex")
});

pub fn is_chunk_boundary(line: &str) -> bool {
    BOUNDARY_RE.is_match(line)
}

/// Boundary-aware document splitter. All sizes are in characters.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chunk_size: usize,
    min_chunk_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(8_000, 1_000)
    }
}

struct Buffer {
    text: String,
    chars: usize,
    start_line: usize,
    end_line: usize,
}

impl Buffer {
    fn new() -> Self {
        Self {
            text: String::new(),
            chars: 0,
            start_line: 0,
            end_line: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.chars == 0 && self.start_line == 0
    }

    /// Length after appending `line_chars` more characters (plus separator).
    fn len_with(&self, line_chars: usize) -> usize {
        if self.is_empty() {
            line_chars
        } else {
            self.chars + 1 + line_chars
        }
    }

    fn push(&mut self, line: &str, line_chars: usize, line_no: usize) {
        if self.is_empty() {
            self.start_line = line_no;
        } else {
            self.text.push('\n');
            self.chars += 1;
        }
        self.text.push_str(line);
        self.chars += line_chars;
        self.end_line = line_no;
    }
}

impl Chunker {
    pub fn new(max_chunk_size: usize, min_chunk_size: usize) -> Self {
        let max_chunk_size = max_chunk_size.max(1);
        Self {
            max_chunk_size,
            min_chunk_size: min_chunk_size.min(max_chunk_size),
        }
    }

    /// Split a document into chunks no longer than `max_chunk_size`.
    ///
    /// A boundary line only starts a new chunk once the buffer exceeds
    /// `min_chunk_size`; a line that would overflow the buffer forces a flush,
    /// and a single overlong line is cut into maximum-sized pieces.
    pub fn split(&self, source_name: &str, content: &str) -> Vec<Chunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let total_chars = content.chars().count();
        if total_chars <= self.max_chunk_size {
            return vec![Chunk::whole(source_name, content)];
        }

        let mut chunks = Vec::new();
        let mut buffer = Buffer::new();

        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            let line_chars = line.chars().count();

            if is_chunk_boundary(line) && buffer.chars > self.min_chunk_size {
                self.flush(&mut buffer, source_name, &mut chunks);
            }

            if !buffer.is_empty() && buffer.len_with(line_chars) > self.max_chunk_size {
                self.flush(&mut buffer, source_name, &mut chunks);
            }

            if line_chars > self.max_chunk_size {
                let chars: Vec<char> = line.chars().collect();
                let mut pieces = chars.chunks(self.max_chunk_size).peekable();
                while let Some(piece) = pieces.next() {
                    let piece: String = piece.iter().collect();
                    let piece_chars = piece.chars().count();
                    buffer.push(&piece, piece_chars, line_no);
                    if pieces.peek().is_some() {
                        self.flush(&mut buffer, source_name, &mut chunks);
                    }
                }
                continue;
            }

            buffer.push(line, line_chars, line_no);
        }

        self.flush(&mut buffer, source_name, &mut chunks);

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_count = total;
        }

        tracing::debug!(source = source_name, chunks = total, chars = total_chars, "Document chunked");
        chunks
    }

    fn flush(&self, buffer: &mut Buffer, source_name: &str, chunks: &mut Vec<Chunk>) {
        let taken = std::mem::replace(buffer, Buffer::new());
        if taken.is_empty() || taken.text.trim().is_empty() {
            return;
        }
        chunks.push(Chunk {
            source_name: source_name.to_string(),
            content: taken.text,
            index: chunks.len(),
            total_count: 0,
            start_line: taken.start_line,
            end_line: taken.end_line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_document(exercises: usize, body_chars: usize) -> String {
        let mut doc = String::new();
        for n in 1..=exercises {
            doc.push_str(&format!("{n}. Exercise number {n}\n"));
            let mut body = String::new();
            while body.chars().count() < body_chars {
                body.push_str("Write a function that handles the described input.\n");
            }
            doc.push_str(&body);
        }
        doc
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(Chunker::default().split("a.md", "  \n\t\n ").is_empty());
        assert!(Chunker::default().split("a.md", "").is_empty());
    }

    #[test]
    fn short_document_is_single_chunk() {
        let chunks = Chunker::default().split("a.md", "# Two Sum\nline two\nline three");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].total_count, 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn large_numbered_document_splits_into_bounded_chunks() {
        let doc = numbered_document(25, 780);
        let total = doc.chars().count();
        assert!(total >= 20_000);

        let chunks = Chunker::new(8_000, 1_000).split("set.md", &doc);
        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.total_count, chunks.len());
            assert!(chunk.char_len() <= 8_000);
        }

        // Only the newline between adjacent chunks is lost.
        let joined: usize = chunks.iter().map(Chunk::char_len).sum();
        assert!(total - joined <= chunks.len() + 1);
    }

    #[test]
    fn chunks_start_at_boundaries_once_minimum_reached() {
        let doc = numbered_document(25, 780);
        let chunks = Chunker::new(8_000, 1_000).split("set.md", &doc);
        for chunk in &chunks {
            let first = chunk.content.lines().next().unwrap_or_default();
            assert!(is_chunk_boundary(first), "chunk starts mid-exercise: {first}");
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let doc = numbered_document(10, 900);
        let chunker = Chunker::new(3_000, 500);
        assert_eq!(chunker.split("x.md", &doc), chunker.split("x.md", &doc));
    }

    #[test]
    fn line_ranges_are_contiguous() {
        let doc = numbered_document(12, 600);
        let chunks = Chunker::new(2_000, 400).split("x.md", &doc);
        assert_eq!(chunks[0].start_line, 1);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
        assert_eq!(chunks.last().map(|c| c.end_line), Some(doc.lines().count()));
    }

    #[test]
    fn boundary_without_minimum_does_not_split() {
        let doc = format!("1. a\nshort\n2. b\nshort\n{}", "x".repeat(50));
        let chunks = Chunker::new(40, 30).split("x.md", &doc);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].content.contains("2. b"));
    }

    #[test]
    fn overlong_line_is_cut() {
        let line = "数".repeat(250);
        let chunks = Chunker::new(100, 10).split("cjk.md", &line);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.char_len() <= 100));
        assert_eq!(chunks[2].char_len(), 50);
        assert!(chunks.iter().all(|c| c.start_line == 1 && c.end_line == 1));
    }

    #[test]
    fn cjk_boundaries_are_recognized() {
        assert!(is_chunk_boundary("第3题 两数之和"));
        assert!(is_chunk_boundary("12、反转链表"));
        assert!(is_chunk_boundary("## Two Sum"));
        assert!(is_chunk_boundary("----"));
        assert!(is_chunk_boundary("***"));
        assert!(!is_chunk_boundary("### Example 1"));
        assert!(!is_chunk_boundary("--"));
        assert!(!is_chunk_boundary("plain text"));
    }

    #[test]
    fn label_is_one_based() {
        let chunks = Chunker::default().split("algo.md", "# A");
        assert_eq!(chunks[0].label(), "algo.md chunk 1/1");
    }
}
