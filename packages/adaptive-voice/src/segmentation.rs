//! Candidate synthesis units for a text buffer.
//!
//! The planner only ever offers text that ends on a sentence terminator
//! (unless told the stream has ended), ordered from the most context to the
//! least: every paragraph, then fewer paragraphs, then sentence prefixes of
//! the first paragraph. The queue builder takes the first one that fits.

/// Characters that end a sentence. `\n` counts so that list items and
/// headings are speakable on their own.
pub const SENTENCE_TERMINATORS: [char; 7] = ['.', '!', '?', '\n', '。', '！', '？'];

/// What to do with text after the last terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trailing {
    /// Hold it back until more tokens complete the sentence.
    #[default]
    AwaitTerminator,
    /// The stream has ended: treat it as a complete sentence.
    Complete,
}

/// One candidate unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Normalised text to synthesize.
    pub text: String,
    /// Byte index in the input buffer just past the last character this
    /// candidate covers.
    pub end: usize,
}

/// Splits a buffer into candidate units.
///
/// The default also offers sentence prefixes when the buffer holds a single
/// paragraph. `Segmenter::new(false)` restricts sentence fallbacks to buffers
/// with more than one paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    /// Offer sentence-level fallbacks even when the buffer is one paragraph.
    pub sentence_fallback_for_single_paragraph: bool,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            sentence_fallback_for_single_paragraph: true,
        }
    }
}

/// A trimmed piece of the buffer with its position.
struct Piece<'a> {
    text: &'a str,
    /// Byte index of `text`'s first character in the buffer.
    start: usize,
    /// Byte index just past the piece, including its separator.
    end: usize,
}

impl Segmenter {
    pub fn new(sentence_fallback_for_single_paragraph: bool) -> Self {
        Self {
            sentence_fallback_for_single_paragraph,
        }
    }

    /// Candidates for `buffer`, most preferred first. Empty when nothing is
    /// speakable yet.
    pub fn candidates(&self, buffer: &str, trailing: Trailing) -> Vec<Candidate> {
        let Some(complete) = complete_region(buffer, trailing) else {
            return Vec::new();
        };

        let paragraphs = split_pieces(buffer, complete, |c| c == '\n');
        let mut candidates: Vec<Candidate> = (0..paragraphs.len())
            .rev()
            .map(|i| Candidate {
                text: join(&paragraphs[..=i], "\n"),
                end: paragraphs[i].end,
            })
            .collect();

        let descend = paragraphs.len() > 1
            || (paragraphs.len() == 1 && self.sentence_fallback_for_single_paragraph);
        if descend {
            let first = &paragraphs[0];
            let region = first.start..first.start + first.text.len();
            let sentences = split_pieces(buffer, region, |c| SENTENCE_TERMINATORS.contains(&c));
            // The full first paragraph is already a candidate, so stop one short.
            for i in (0..sentences.len().saturating_sub(1)).rev() {
                candidates.push(Candidate {
                    text: join(&sentences[..=i], " "),
                    end: sentences[i].end,
                });
            }
        }

        candidates
    }
}

/// Byte range of `buffer` holding only complete sentences, whitespace trimmed.
fn complete_region(buffer: &str, trailing: Trailing) -> Option<std::ops::Range<usize>> {
    let start = buffer.len() - buffer.trim_start().len();
    let trimmed_end = buffer.trim_end().len();
    if start >= trimmed_end {
        return None;
    }

    let end = match trailing {
        Trailing::Complete => trimmed_end,
        Trailing::AwaitTerminator => {
            let (index, terminator) = buffer[start..trimmed_end]
                .char_indices()
                .rev()
                .find(|(_, c)| SENTENCE_TERMINATORS.contains(c))?;
            start + index + terminator.len_utf8()
        }
    };
    Some(start..end)
}

/// Split `buffer[region]` after every separator, trimming each piece and
/// dropping empty ones. Text after the last separator is kept as a piece.
fn split_pieces(
    buffer: &str,
    region: std::ops::Range<usize>,
    is_separator: impl Fn(char) -> bool,
) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut piece_start = region.start;

    let mut push = |from: usize, to: usize| {
        let raw = &buffer[from..to];
        let text = raw.trim();
        if !text.is_empty() {
            let lead = raw.len() - raw.trim_start().len();
            pieces.push(Piece {
                text,
                start: from + lead,
                end: to,
            });
        }
    };

    for (index, c) in buffer[region.clone()].char_indices() {
        if is_separator(c) {
            let end = region.start + index + c.len_utf8();
            push(piece_start, end);
            piece_start = end;
        }
    }
    if piece_start < region.end {
        push(piece_start, region.end);
    }

    pieces
}

fn join(pieces: &[Piece<'_>], separator: &str) -> String {
    pieces
        .iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join(separator)
}
