//! Sentence-aligned document chunking.
//!
//! Splits retrieved documents into overlapping chunks of bounded estimated
//! token size. Token counts use the character-quartering heuristic shared by
//! the rest of the engine; a different estimator can be injected through
//! [`ChunkOptions`].

use std::sync::LazyLock;

use regex::Regex;

/// A document handed to the chunker.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Opaque document identifier.
    pub id: Option<String>,
    /// Source URL, if known.
    pub url: Option<String>,
    /// Document body.
    pub text: String,
    /// Pre-computed token count; estimated when absent.
    pub token_count: Option<usize>,
}

/// One chunk of a document.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 0-based index of this chunk in the output.
    pub chunk_id: usize,
    /// Chunk text (sentences joined by single spaces).
    pub text: String,
    /// Estimated token count.
    pub token_count: usize,
    /// Half-open character range `[start, end)` in the cleaned document.
    pub char_range: (usize, usize),
    /// Number of sentences packed into this chunk.
    pub sentence_count: usize,
    /// Identifier of the source document.
    pub doc_id: Option<String>,
    /// URL of the source document.
    pub url: Option<String>,
}

/// Token estimator signature: text in, estimated token count out.
pub type TokenEstimator = fn(&str) -> usize;

/// Chunking parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    /// Maximum estimated tokens per chunk.
    pub max_tokens: usize,
    /// Maximum estimated tokens carried over as overlap between chunks.
    pub overlap: usize,
    /// Minimum estimated tokens for the trailing chunk; smaller tails merge
    /// into the previous chunk.
    pub min_tokens: usize,
    /// Whether to normalize whitespace before splitting.
    pub clean_text: bool,
    /// Token estimator; defaults to [`estimate_tokens`].
    pub estimator: TokenEstimator,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap: 50,
            min_tokens: 500,
            clean_text: true,
            estimator: estimate_tokens,
        }
    }
}

static MULTI_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +").expect("space pattern is valid"));
static MULTI_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern is valid"));

/// Normalize whitespace: collapse space runs, cap blank lines at one, trim
/// each line and the outer text.
#[must_use]
pub fn clean(text: &str) -> String {
    let text = MULTI_SPACE_RE.replace_all(text, " ");
    let text = MULTI_NEWLINE_RE.replace_all(&text, "\n\n");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    lines.join("\n").trim().to_string()
}

/// Character-quartering token estimate. Coarse, but applied consistently
/// across chunking and context budgeting.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Truncate a string to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Split text into sentences on `.`, `?` or `!` followed by whitespace.
///
/// Two abbreviation patterns are not treated as boundaries: a single capital
/// letter with a period ("A. B. Testing") and a capitalized two-letter
/// abbreviation ("Mr. Smith", "Dr. Jones").
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '.' | '?' | '!')
            && chars.get(i + 1).is_some_and(|next| next.is_whitespace())
            && !is_abbreviation(&chars, i)
        {
            let sentence: String = chars[start..=i].iter().collect();
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            start = j;
            i = j;
            continue;
        }
        i += 1;
    }

    if start < chars.len() {
        let tail: String = chars[start..].iter().collect();
        let tail = tail.trim();
        if !tail.is_empty() {
            sentences.push(tail.to_string());
        }
    }

    sentences
}

/// True when the terminator at `i` ends an abbreviation rather than a sentence.
fn is_abbreviation(chars: &[char], i: usize) -> bool {
    if chars[i] != '.' {
        return false;
    }
    // Single capital letter: "A." at a word boundary.
    if i >= 1
        && chars[i - 1].is_ascii_uppercase()
        && (i == 1 || !chars[i - 2].is_alphanumeric())
    {
        return true;
    }
    // Capitalized two-letter abbreviation: "Mr.", "Dr.".
    if i >= 2
        && chars[i - 2].is_ascii_uppercase()
        && chars[i - 1].is_ascii_lowercase()
        && (i == 2 || !chars[i - 3].is_alphanumeric())
    {
        return true;
    }
    false
}

/// Chunk a document into sentence-aligned pieces.
///
/// Sentences are packed greedily; when the next sentence would push the chunk
/// past `max_tokens`, the chunk is emitted and the next one is seeded with the
/// longest trailing run of sentences whose summed estimate fits in `overlap`.
/// A trailing chunk under `min_tokens` is merged into its predecessor; with no
/// predecessor the short tail is dropped, so a document that never reaches
/// `max_tokens` can yield no chunks at all.
#[must_use]
pub fn chunk_document(doc: &Document, opts: &ChunkOptions) -> Vec<Chunk> {
    let estimator = opts.estimator;
    let text = if opts.clean_text {
        clean(&doc.text)
    } else {
        doc.text.clone()
    };

    let sentences = split_sentences(&text);
    if sentences.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0;
    let mut char_pos: usize = 0;

    for sentence in sentences {
        let sent_tokens = estimator(&sentence);

        if current_tokens + sent_tokens > opts.max_tokens && !current.is_empty() {
            let chunk_text = current.join(" ");
            let chunk_chars = chunk_text.chars().count();

            chunks.push(Chunk {
                chunk_id: chunks.len(),
                token_count: current_tokens,
                char_range: (char_pos.saturating_sub(chunk_chars), char_pos),
                sentence_count: current.len(),
                doc_id: doc.id.clone(),
                url: doc.url.clone(),
                text: chunk_text,
            });

            // Seed the next chunk with a trailing suffix within the overlap budget.
            let mut overlap_buffer: Vec<String> = Vec::new();
            let mut overlap_tokens = 0;
            for sent in current.iter().rev() {
                let tokens = estimator(sent);
                if overlap_tokens + tokens <= opts.overlap {
                    overlap_buffer.insert(0, sent.clone());
                    overlap_tokens += tokens;
                } else {
                    break;
                }
            }
            current = overlap_buffer;
            current_tokens = overlap_tokens;
        }

        char_pos += sentence.chars().count() + 1;
        current_tokens += sent_tokens;
        current.push(sentence);
    }

    if !current.is_empty() {
        if current_tokens >= opts.min_tokens {
            let chunk_text = current.join(" ");
            let chunk_chars = chunk_text.chars().count();
            chunks.push(Chunk {
                chunk_id: chunks.len(),
                token_count: current_tokens,
                char_range: (char_pos.saturating_sub(chunk_chars), char_pos),
                sentence_count: current.len(),
                doc_id: doc.id.clone(),
                url: doc.url.clone(),
                text: chunk_text,
            });
        } else if let Some(last) = chunks.last_mut() {
            let merged = format!("{} {}", last.text, current.join(" "));
            last.token_count = estimator(&merged);
            last.sentence_count += current.len();
            last.char_range = (last.char_range.0, char_pos);
            last.text = merged;
        }
    }

    chunks
}
