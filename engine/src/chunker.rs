//! Response Chunker
//!
//! Splits a long answer into transport-sized segments. Each segment is the
//! longest prefix of the remaining text that fits the limit, cut at the last
//! newline inside that prefix (or right after it) when there is one. A
//! newline cut consumes that single newline; a hard cut at the limit consumes
//! nothing. Joining the segments with their separators reproduces the input
//! exactly.
//!
//! Lengths are counted in characters, not bytes, so a segment never splits a
//! multi-byte character.
//!
//! # Examples
//!
//! ```
//! use ava_engine::chunker::split;
//!
//! let parts: Vec<&str> = split("abcde\nfghijk", 10).map(|s| s.text).collect();
//! assert_eq!(parts, vec!["abcde", "fghijk"]);
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// One transport-safe slice of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub text: &'a str,
    /// Text dropped between this segment and the next (`"\n"` at a newline
    /// cut, `None` at a hard cut and after the last segment).
    pub separator: Option<&'a str>,
}

/// Lazy segment iterator returned by [`split`].
///
/// Cloning it restarts nothing and shares nothing: each clone continues
/// independently from the same position.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    remaining: &'a str,
    limit: usize,
    done: bool,
}

/// Splits `text` into segments of at most `limit` characters.
///
/// Always yields at least one segment; empty input yields a single empty
/// segment. A `limit` of zero is treated as one.
pub fn split(text: &str, limit: usize) -> Segments<'_> {
    Segments {
        remaining: text,
        limit: limit.max(1),
        done: false,
    }
}

/// Owned segment texts, ready for delivery.
pub fn split_owned(text: &str, limit: usize) -> Vec<String> {
    split(text, limit).map(|s| s.text.to_string()).collect()
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // Byte offset of the first character past the limit; `None` means
        // everything left fits.
        let Some((window_end, _)) = self.remaining.char_indices().nth(self.limit) else {
            self.done = true;
            return Some(Segment {
                text: self.remaining,
                separator: None,
            });
        };

        let window = &self.remaining[..window_end];
        // A newline right after a full window still gives a segment of
        // exactly `limit` characters.
        let search_end = window_end
            + self.remaining[window_end..]
                .chars()
                .next()
                .map_or(0, char::len_utf8);
        let segment = match self.remaining[..search_end].rfind('\n') {
            // A newline at offset 0 would produce an empty segment.
            Some(cut) if cut > 0 => Segment {
                text: &self.remaining[..cut],
                separator: Some(&self.remaining[cut..cut + 1]),
            },
            _ => Segment {
                text: window,
                separator: None,
            },
        };

        let consumed = segment.text.len() + segment.separator.map_or(0, str::len);
        self.remaining = &self.remaining[consumed..];
        // A trailing newline cut leaves nothing; the separator carries it.
        if self.remaining.is_empty() {
            self.done = true;
        }
        Some(segment)
    }
}

impl std::iter::FusedIterator for Segments<'_> {}

/// Shortens `text` to at most `limit` characters, ending in `…` when cut.
pub fn truncate(text: &str, limit: usize) -> String {
    let limit = limit.max(1);
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some(_) => {
            let kept: String = text.chars().take(limit - 1).collect();
            format!("{}…", kept)
        }
    }
}

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"【.*?】").expect("Invalid citation pattern"))
}

/// Removes bracketed citation markers such as `【4:0†source】`.
///
/// Only the marker is removed; surrounding whitespace is left alone.
pub fn clean_citations(text: &str) -> String {
    citation_pattern().replace_all(text, "").into_owned()
}
