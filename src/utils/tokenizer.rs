/// Splits document content into words.
///
/// Words are runs of non-whitespace bytes with leading and trailing ASCII
/// punctuation removed. The reported position is the byte offset of the
/// trimmed word. With tag skipping enabled, everything between `<` and `>` is
/// ignored and a tag also ends the word before it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer {
    skip_tags: bool,
}

impl WordTokenizer {
    pub fn new(skip_tags: bool) -> Self {
        Self { skip_tags }
    }

    pub fn skips_tags(&self) -> bool {
        self.skip_tags
    }

    pub fn words<'a>(&self, content: &'a [u8]) -> Words<'a> {
        Words {
            content,
            pos: 0,
            skip_tags: self.skip_tags,
        }
    }
}

/// Iterator of `(offset, word)` pairs
pub struct Words<'a> {
    content: &'a [u8],
    pos: usize,
    skip_tags: bool,
}

impl<'a> Words<'a> {
    fn ends_word(&self, byte: u8) -> bool {
        byte.is_ascii_whitespace() || (self.skip_tags && byte == b'<')
    }
}

impl<'a> Iterator for Words<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let content = self.content;
        loop {
            while self.pos < content.len() && content[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos >= content.len() {
                return None;
            }

            if self.skip_tags && content[self.pos] == b'<' {
                self.pos = match memchr::memchr(b'>', &content[self.pos..]) {
                    Some(end) => self.pos + end + 1,
                    None => content.len(),
                };
                continue;
            }

            let start = self.pos;
            while self.pos < content.len() && !self.ends_word(content[self.pos]) {
                self.pos += 1;
            }

            let raw = &content[start..self.pos];
            let lead = raw
                .iter()
                .position(|b| !b.is_ascii_punctuation())
                .unwrap_or(raw.len());
            let tail = raw
                .iter()
                .rposition(|b| !b.is_ascii_punctuation())
                .map_or(lead, |at| at + 1);
            if lead < tail {
                return Some((start + lead, &raw[lead..tail]));
            }
        }
    }
}

/// Split a phrase into its words, ignoring punctuation
pub fn phrase_words(phrase: &str) -> Vec<&[u8]> {
    WordTokenizer::new(false)
        .words(phrase.as_bytes())
        .map(|(_, word)| word)
        .collect()
}
