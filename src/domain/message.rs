use mailparse::MailParseError;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("could not parse message headers: {0}")]
    Parse(#[from] MailParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderField {
    name: String,
    /// Everything before the value as it appeared: name, colon and spaces.
    prefix: Vec<u8>,
    /// Raw value bytes as they appeared after the prefix, folding kept.
    value: Vec<u8>,
}

impl HeaderField {
    fn new(name: &str, value: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            prefix: format!("{name}: ").into_bytes(),
            value,
        }
    }
}

/// An RFC 822 message held as an ordered header list plus an opaque body.
///
/// Header lookup is case-insensitive and the first occurrence of a name wins.
/// Serialising writes every header back in its original order and spelling,
/// so only headers that were explicitly replaced differ from the input.
#[derive(Debug, Clone)]
pub struct Message {
    headers: Vec<HeaderField>,
    body: Vec<u8>,
    line_ending: &'static str,
}

impl Message {
    pub fn parse(raw: &[u8]) -> Result<Self, MessageError> {
        let mut headers = Vec::new();
        let mut ix = 0;
        while let Some(rest) = raw.get(ix..).filter(|rest| !rest.is_empty()) {
            if rest.starts_with(b"\n") {
                ix += 1;
                break;
            }
            if rest.starts_with(b"\r\n") {
                ix += 2;
                break;
            }
            if rest[0] == b'\r' {
                return Err(MailParseError::Generic(
                    "headers were followed by a lone CR",
                )
                .into());
            }
            let (header, consumed) = mailparse::parse_header(rest)?;
            let key_len = header.get_key_raw().len();
            let value_start = match rest.get(key_len) {
                Some(b':') => {
                    key_len + 1 + rest[key_len + 1..].iter().take_while(|&&b| b == b' ').count()
                }
                _ => key_len,
            };
            let prefix = &rest[..value_start];
            let prefix = prefix.strip_suffix(b"\r").unwrap_or(prefix);
            headers.push(HeaderField {
                name: header.get_key(),
                prefix: prefix.to_vec(),
                value: header.get_value_raw().to_vec(),
            });
            ix += consumed;
        }

        Ok(Self {
            headers,
            body: raw.get(ix..).unwrap_or_default().to_vec(),
            line_ending: detect_line_ending(raw),
        })
    }

    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.position(name).map(|i| self.headers[i].value.as_slice())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn line_ending(&self) -> &'static str {
        self.line_ending
    }

    /// Replaces the value of the first `name` header. Returns false when absent.
    /// CRLF folds in `value` are written with the message's own line ending.
    pub fn replace_header(&mut self, name: &str, value: &str) -> bool {
        let Some(i) = self.position(name) else {
            return false;
        };
        self.headers[i].value = self.with_line_ending(value);
        true
    }

    /// Replaces the first `name` header, or appends it after the last header.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if !self.replace_header(name, value) {
            let value = self.with_line_ending(value);
            self.headers.push(HeaderField::new(name, value));
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let eol = self.line_ending.as_bytes();
        let mut out = Vec::with_capacity(self.body.len() + 64 * self.headers.len());
        for h in &self.headers {
            out.extend_from_slice(&h.prefix);
            out.extend_from_slice(&h.value);
            out.extend_from_slice(eol);
        }
        out.extend_from_slice(eol);
        out.extend_from_slice(&self.body);
        out
    }

    fn with_line_ending(&self, value: &str) -> Vec<u8> {
        if self.line_ending == "\r\n" {
            value.as_bytes().to_vec()
        } else {
            value.replace("\r\n", self.line_ending).into_bytes()
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
    }
}

fn detect_line_ending(raw: &[u8]) -> &'static str {
    match raw.iter().position(|&b| b == b'\n') {
        Some(i) if i > 0 && raw[i - 1] == b'\r' => "\r\n",
        Some(_) => "\n",
        None => "\r\n",
    }
}
