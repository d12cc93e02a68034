/// Paragraph buffer size that forces a flush even without a delimiter.
pub const PARAGRAPH_CHAR_LIMIT: usize = 300;

/// A request to persist the response as accumulated so far. `content` is
/// always the full cumulative text, never a delta, so every write is an
/// idempotent overwrite of "content so far".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flush {
    pub content: String,
    /// 1-based boundary index; 0 for a final flush when no boundary was
    /// ever reached.
    pub paragraph: usize,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishEvent {
    Flush(Flush),
    /// The source produced no text at all.
    NoContent,
}

/// Splits a fragment stream into paragraph-sized persistence points.
#[derive(Debug, Default)]
pub struct ParagraphSegmenter {
    paragraph: String,
    response: String,
    count: usize,
}

impl ParagraphSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates a fragment; returns a flush when the paragraph buffer
    /// crosses a boundary (contains a blank line or exceeds the size limit).
    pub fn feed(&mut self, fragment: &str) -> Option<Flush> {
        if fragment.is_empty() {
            return None;
        }
        self.paragraph.push_str(fragment);
        self.response.push_str(fragment);

        if self.paragraph.contains("\n\n") || self.paragraph.chars().count() > PARAGRAPH_CHAR_LIMIT
        {
            self.count += 1;
            self.paragraph.clear();
            return Some(Flush {
                content: self.response.clone(),
                paragraph: self.count,
                is_final: false,
            });
        }
        None
    }

    /// Ends the stream. Any text seen so far comes back as a final flush,
    /// whether or not it already went out at a boundary — the row still
    /// needs its terminal write.
    pub fn finish(self) -> FinishEvent {
        if self.response.is_empty() {
            return FinishEvent::NoContent;
        }
        FinishEvent::Flush(Flush {
            content: self.response,
            paragraph: self.count,
            is_final: true,
        })
    }
}
