/// The source cursor of the outer interpreter.
///
/// Tokens are maximal runs of non-whitespace characters. A backslash
/// starts a comment running to the end of the line. Words like `key`,
/// `char` and `s"` read from the same cursor while their token is being
/// processed, which is why the delimiter that ended a token is pushed back
/// rather than consumed.
#[derive(Debug, Default)]
pub struct SourceBuf {
    text: String,
    /// Byte offset of the next character.
    offs: usize,
    line: u32,
}

impl SourceBuf {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            offs: 0,
            line: 1,
        }
    }

    /// The line the cursor is on, starting at 1.
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Reads one character, or `None` at the end of input.
    pub fn read_char(&mut self) -> Option<char> {
        let ch = self.text[self.offs..].chars().next()?;
        self.offs += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn unread(&mut self, ch: char) {
        self.offs -= ch.len_utf8();
        if ch == '\n' {
            // Keep diagnostics for this token on the token's own line.
            self.line -= 1;
        }
    }

    /// Reads the next whitespace-delimited token, skipping `\` comments.
    /// Returns `None` at the end of input.
    pub fn next_token(&mut self) -> Option<String> {
        let mut token = String::new();
        let mut in_comment = false;
        loop {
            let ch = match self.read_char() {
                Some(ch) => ch,
                None if token.is_empty() => return None,
                None => return Some(token),
            };

            if in_comment {
                if ch != '\n' {
                    continue;
                }
                in_comment = false;
            } else if ch == '\\' {
                in_comment = true;
                continue;
            } else if !ch.is_whitespace() {
                token.push(ch);
                continue;
            }

            if !token.is_empty() {
                self.unread(ch);
                return Some(token);
            }
        }
    }
}
