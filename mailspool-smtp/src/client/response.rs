//! SMTP reply parsing.

use crate::error::DeliveryError;

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The three digit status code shared by every line.
    pub code: u16,
    /// Text of each line, without the code and separator.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// `3xx`: the server wants more input (DATA, AUTH challenges).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Whether an EHLO reply advertises `keyword` (case-insensitive). The
    /// first line is the server's greeting and is never a capability.
    #[must_use]
    pub fn has_capability(&self, keyword: &str) -> bool {
        self.capability(keyword).is_some()
    }

    /// Parameters of an advertised capability, e.g. `["PLAIN", "LOGIN"]`
    /// for `AUTH PLAIN LOGIN`.
    #[must_use]
    pub fn capability(&self, keyword: &str) -> Option<Vec<&str>> {
        self.lines.iter().skip(1).find_map(|line| {
            let mut words = line.split_whitespace();
            words
                .next()
                .filter(|word| word.eq_ignore_ascii_case(keyword))
                .map(|_| words.collect())
        })
    }

    /// Parse one reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` when
    /// the buffer does not yet hold a complete reply.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Protocol`] for malformed lines or a code that changes
    /// part way through a multi-line reply.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>, DeliveryError> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let line = std::str::from_utf8(raw)?.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }

            let (line_code, last, text) = Self::parse_line(line)?;
            match code {
                Some(expected) if expected != line_code => {
                    return Err(DeliveryError::Protocol(format!(
                        "Status code changed within a reply: expected {expected}, got {line_code}"
                    )));
                }
                _ => code = Some(line_code),
            }
            lines.push(text.to_string());

            if last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }

    /// Split `250-text` / `250 text` / `250` into its parts.
    fn parse_line(line: &str) -> Result<(u16, bool, &str), DeliveryError> {
        let code = line
            .get(..3)
            .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| DeliveryError::Protocol(format!("Invalid reply line: '{line}'")))?;

        match line.as_bytes().get(3) {
            None => Ok((code, true, "")),
            Some(b' ') => Ok((code, true, &line[4..])),
            Some(b'-') => Ok((code, false, &line[4..])),
            Some(other) => Err(DeliveryError::Protocol(format!(
                "Invalid separator '{}' in reply line: '{line}'",
                char::from(*other)
            ))),
        }
    }
}
