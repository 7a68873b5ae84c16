use super::Token;
use crate::{Error, Location, Source, SrcFile};
use logos::Logos;
use std::io::BufRead;

/// An element tag such as `<act:id type="guid">`, `</act:id>` or
/// `<cmdty:get_quotes/>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The tag name. Closing tags keep their leading `/`.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub self_closing: bool,
    pub start: Location,
}

impl Tag {
    pub fn is_close(&self) -> bool {
        self.name.starts_with('/')
    }

    /// The name of the tag that closes this one.
    pub fn closer(&self) -> String {
        format!("/{}", self.name)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[inline]
fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n' || b == b'\r'
}

/// A forward-only reader over the decompressed text of a ledger file, with
/// room to push back one byte.
pub struct Lexer<R> {
    reader: R,
    pushed_back: Option<u8>,
    location: Location,
    last_location: Location,
    file: SrcFile,
    in_comment: bool,
}

impl<R: BufRead> Lexer<R> {
    pub fn new(reader: R, file: SrcFile) -> Self {
        Lexer {
            reader,
            pushed_back: None,
            location: (1, 1).into(),
            last_location: (1, 1).into(),
            file,
            in_comment: false,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn file(&self) -> &SrcFile {
        &self.file
    }

    pub fn src(&self) -> Source {
        Source::at(self.file.clone(), self.location)
    }

    fn format_error(&self, msg: String) -> Error {
        Error::format(msg, self.src())
    }

    fn next_byte(&mut self) -> Result<Option<u8>, Error> {
        let byte = match self.pushed_back.take() {
            Some(b) => b,
            None => {
                let buf = self
                    .reader
                    .fill_buf()
                    .map_err(|e| Error::io(e, self.file.clone()))?;
                match buf.first() {
                    Some(&b) => {
                        self.reader.consume(1);
                        b
                    }
                    None => return Ok(None),
                }
            }
        };
        self.last_location = self.location;
        if byte == b'\n' {
            self.location.line += 1;
            self.location.col = 1;
        } else {
            self.location.col += 1;
        }
        Ok(Some(byte))
    }

    fn unread(&mut self, byte: u8) {
        self.pushed_back = Some(byte);
        self.location = self.last_location;
    }

    /// Reads up to `len` raw bytes. Fewer are returned at the end of the stream.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::with_capacity(len);
        while bytes.len() < len {
            match self.next_byte()? {
                Some(b) => bytes.push(b),
                None => break,
            }
        }
        Ok(bytes)
    }

    pub fn skip_whitespace(&mut self) -> Result<(), Error> {
        while let Some(b) = self.next_byte()? {
            if !is_space(b) {
                self.unread(b);
                break;
            }
        }
        Ok(())
    }

    /// Returns `true` after [`read_tag`](Self::read_tag) stopped at a `<!--`
    /// comment opener that has not been skipped yet.
    pub fn in_comment(&self) -> bool {
        self.in_comment
    }

    /// Reads the next tag. `None` means the end of the stream, text where a tag
    /// was expected, or a comment opener (see [`in_comment`](Self::in_comment)).
    pub fn read_tag(&mut self) -> Result<Option<Tag>, Error> {
        self.skip_whitespace()?;
        let start = self.location;
        match self.next_byte()? {
            None => return Ok(None),
            Some(b'<') => {}
            Some(b) => {
                self.unread(b);
                return Ok(None);
            }
        }

        let mut name = Vec::new();
        let terminator = loop {
            match self.next_byte()? {
                None => {
                    return Err(self.format_error("Unexpected end of stream inside a tag.".into()))
                }
                Some(b) if is_space(b) || b == b'>' => break b,
                Some(b) => name.push(b),
            }
            if name == b"!--" {
                self.in_comment = true;
                return Ok(None);
            }
        };
        let mut name = String::from_utf8(name)
            .map_err(|_| self.format_error("Tag name is not valid UTF-8.".into()))?;
        let mut self_closing = false;
        if name.len() > 1 && name.ends_with('/') {
            name.pop();
            self_closing = true;
        }
        let mut tag = Tag {
            name,
            attributes: Vec::new(),
            self_closing,
            start,
        };
        if terminator == b'>' {
            return Ok(Some(tag));
        }

        let mut header = Vec::new();
        let mut quote = None;
        loop {
            match self.next_byte()? {
                None => {
                    return Err(self.format_error(format!(
                        "Unexpected end of stream inside <{}>.",
                        tag.name
                    )))
                }
                Some(b'>') if quote.is_none() => break,
                Some(b) => {
                    match quote {
                        Some(q) if q == b => quote = None,
                        None if b == b'"' || b == b'\'' => quote = Some(b),
                        _ => {}
                    }
                    header.push(b)
                }
            }
        }
        let header = String::from_utf8(header)
            .map_err(|_| self.format_error("Tag attributes are not valid UTF-8.".into()))?;
        let (attributes, self_closing) = self.parse_attributes(&tag.name, &header)?;
        tag.attributes = attributes;
        tag.self_closing |= self_closing;
        Ok(Some(tag))
    }

    fn parse_attributes(
        &self,
        tag_name: &str,
        header: &str,
    ) -> Result<(Vec<(String, String)>, bool), Error> {
        let mut llex = Token::lexer(header);
        let mut tokens = Vec::new();
        while let Some(token) = llex.next() {
            if token != Token::WhiteSpace {
                tokens.push((token, llex.slice()));
            }
        }

        let mut attributes = Vec::new();
        let mut self_closing = false;
        let mut iter = tokens.into_iter().peekable();
        while let Some((token, text)) = iter.next() {
            match token {
                Token::Name => {
                    if !matches!(iter.next(), Some((Token::Equals, _))) {
                        return Err(self.format_error(format!(
                            "Expect '=' after attribute {} of <{}>.",
                            text, tag_name
                        )));
                    }
                    match iter.next() {
                        Some((Token::DoubleQuoted, quoted))
                        | Some((Token::SingleQuoted, quoted)) => {
                            let value = &quoted[1..quoted.len() - 1];
                            attributes.push((text.to_string(), value.to_string()));
                        }
                        _ => {
                            return Err(self.format_error(format!(
                                "Expect a quoted value for attribute {} of <{}>.",
                                text, tag_name
                            )))
                        }
                    }
                }
                Token::Slash if iter.peek().is_none() => self_closing = true,
                _ => {
                    return Err(self.format_error(format!(
                        "Unexpected {:?} in <{}>.",
                        text, tag_name
                    )))
                }
            }
        }
        Ok((attributes, self_closing))
    }

    /// Consumes a comment body up to and including `-->`.
    pub fn skip_comment(&mut self) -> Result<(), Error> {
        let mut dashes = 0;
        loop {
            match self.next_byte()? {
                None => return Err(self.format_error("Unterminated comment.".into())),
                Some(b'>') if dashes >= 2 => break,
                Some(b'-') => dashes += 1,
                Some(_) => dashes = 0,
            }
        }
        self.in_comment = false;
        log::trace!("skipped a comment ending at {}", self.src());
        Ok(())
    }

    /// Like [`read_tag`](Self::read_tag), but steps over comments.
    pub fn next_tag(&mut self) -> Result<Option<Tag>, Error> {
        loop {
            let tag = self.read_tag()?;
            if tag.is_none() && self.in_comment {
                self.skip_comment()?;
                continue;
            }
            return Ok(tag);
        }
    }

    /// Reads raw text up to, not including, the next `<`.
    pub fn read_text(&mut self) -> Result<String, Error> {
        let mut text = Vec::new();
        while let Some(b) = self.next_byte()? {
            if b == b'<' {
                self.unread(b);
                break;
            }
            text.push(b);
        }
        String::from_utf8(text).map_err(|_| self.format_error("Text is not valid UTF-8.".into()))
    }

    pub fn skip_text(&mut self) -> Result<(), Error> {
        while let Some(b) = self.next_byte()? {
            if b == b'<' {
                self.unread(b);
                break;
            }
        }
        Ok(())
    }

    /// Skips the content of an element whose opening `tag` has been read, up to
    /// and including its matching closing tag. Nested elements are skipped
    /// recursively; stray closing tags are recorded as warnings.
    pub fn skip_element(&mut self, tag: &Tag, warnings: &mut Vec<Error>) -> Result<(), Error> {
        if tag.is_close() || tag.self_closing {
            return Ok(());
        }
        log::trace!("skipping unknown element <{}>", tag.name);
        let closer = tag.closer();
        loop {
            self.skip_text()?;
            let inner = self.next_tag()?.ok_or_else(|| {
                self.format_error(format!(
                    "Unexpected end of stream while looking for <{}>.",
                    closer
                ))
            })?;
            if inner.name == closer {
                return Ok(());
            } else if inner.is_close() {
                let warning = Error::integrity(
                    format!("Couldn't find matching <{}>, found <{}>.", closer, inner.name),
                    Source::at(self.file.clone(), inner.start),
                );
                log::warn!("{}", warning);
                warnings.push(warning);
            } else {
                self.skip_element(&inner, warnings)?;
            }
        }
    }
}
