//! Streaming-safe `<think>...</think>` tag stripping.
//!
//! A small state machine narrowed to a single fixed tag pair, since only
//! reasoning scratchpads need stripping here.

/// Buffers a token stream and splits it into visible text and `<think>`
/// content, correctly handling a tag split across chunk boundaries.
pub struct ThinkTagFilter {
    buffer: String,
    inside_tag: bool,
}

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// One piece of output from [`ThinkTagFilter::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilteredChunk {
    /// Text outside any `<think>` tag.
    Visible(String),
    /// Text captured inside a `<think>` tag.
    Thinking(String),
}

impl Default for ThinkTagFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkTagFilter {
    /// Create a filter in the "outside a tag" state.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: String::new(), inside_tag: false }
    }

    /// Feed a new chunk of raw model output and drain as many complete
    /// pieces as the buffer allows. Partial tag matches at the end of the
    /// chunk are held back until more text arrives.
    pub fn process(&mut self, new_text: &str) -> Vec<FilteredChunk> {
        self.buffer.push_str(new_text);
        let mut out = Vec::new();

        loop {
            let needle = if self.inside_tag { CLOSE_TAG } else { OPEN_TAG };
            let Some(start) = potential_start_index(&self.buffer, needle) else {
                if !self.buffer.is_empty() {
                    out.push(self.emit(std::mem::take(&mut self.buffer)));
                }
                break;
            };

            if start > 0 {
                let before: String = self.buffer[..start].to_owned();
                out.push(self.emit(before));
            }

            let is_full_match = self.buffer[start..].len() >= needle.len();
            if is_full_match {
                self.buffer = self.buffer[start.saturating_add(needle.len())..].to_owned();
                self.inside_tag = !self.inside_tag;
            } else {
                self.buffer = self.buffer[start..].to_owned();
                break;
            }
        }

        out
    }

    /// Flush any content still buffered when the stream ends. Unclosed
    /// `<think>` content is surfaced as thinking output rather than lost.
    pub fn finalize(mut self) -> Option<FilteredChunk> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(self.emit(std::mem::take(&mut self.buffer)))
    }

    fn emit(&self, text: String) -> FilteredChunk {
        if self.inside_tag {
            FilteredChunk::Thinking(text)
        } else {
            FilteredChunk::Visible(text)
        }
    }
}

/// Find where `needle` starts in `haystack`, including a partial match at
/// the very end of `haystack` (the needle may continue in the next chunk).
fn potential_start_index(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    if let Some(idx) = haystack.find(needle) {
        return Some(idx);
    }
    for i in (0..haystack.len()).rev() {
        if !haystack.is_char_boundary(i) {
            continue;
        }
        let suffix = &haystack[i..];
        if needle.starts_with(suffix) {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_text() {
        let mut filter = ThinkTagFilter::new();
        let out = filter.process("hello world");
        assert_eq!(out, vec![FilteredChunk::Visible("hello world".to_owned())]);
    }

    #[test]
    fn strips_a_complete_tag_in_one_chunk() {
        let mut filter = ThinkTagFilter::new();
        let out = filter.process("before <think>reasoning</think> after");
        assert_eq!(
            out,
            vec![
                FilteredChunk::Visible("before ".to_owned()),
                FilteredChunk::Thinking("reasoning".to_owned()),
                FilteredChunk::Visible(" after".to_owned()),
            ]
        );
    }

    #[test]
    fn handles_a_tag_split_across_chunks() {
        let mut filter = ThinkTagFilter::new();
        let mut out = filter.process("hello <thin");
        out.extend(filter.process("k>deep thought</think> world"));
        assert_eq!(
            out,
            vec![
                FilteredChunk::Visible("hello ".to_owned()),
                FilteredChunk::Thinking("deep thought".to_owned()),
                FilteredChunk::Visible(" world".to_owned()),
            ]
        );
    }

    #[test]
    fn finalize_surfaces_an_unclosed_tag() {
        let mut filter = ThinkTagFilter::new();
        let _ = filter.process("answer <think>never closes");
        let tail = filter.finalize();
        assert_eq!(tail, Some(FilteredChunk::Thinking("never closes".to_owned())));
    }

    #[test]
    fn finalize_is_none_when_buffer_drained() {
        let mut filter = ThinkTagFilter::new();
        let _ = filter.process("no tags here");
        assert_eq!(filter.finalize(), None);
    }
}
