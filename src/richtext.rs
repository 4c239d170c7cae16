//! Styled text fragments and the inline markup used by the report text.
//!
//! Report paragraphs are written with a tiny markdown-like syntax: `**bold**`, `*italic*` and
//! `\*` for a literal asterisk.  [`parse_markup`] turns such a string into [`Span`]s, which the
//! PDF builder converts into `genpdf` styled strings.

use std::fmt;

use genpdf::style::{Style, StyledString};

/// A slice of text with bold and italic flags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    text: String,
    bold: bool,
    italic: bool,
}

impl Span {
    /// Creates an unstyled span.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_bold(&self) -> bool {
        self.bold
    }

    pub fn is_italic(&self) -> bool {
        self.italic
    }

    /// Marks the span as bold.
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    /// Marks the span as italic.
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    fn to_style(&self) -> Style {
        let mut style = Style::new();
        if self.bold {
            style.set_bold();
        }
        if self.italic {
            style.set_italic();
        }
        style
    }

    /// Converts the span into a `genpdf` styled string.
    pub fn to_styled_string(&self) -> StyledString {
        StyledString::new(self.text.clone(), self.to_style())
    }
}

/// Parse errors produced by [`parse_markup`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    index: usize,
    message: String,
}

impl ParseError {
    fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }

    /// Byte index in the input where the error was detected.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.index)
    }
}

impl std::error::Error for ParseError {}

#[derive(Default)]
struct Markup {
    spans: Vec<Span>,
    buffer: String,
    bold: Option<usize>,
    italic: Option<usize>,
}

impl Markup {
    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        self.spans.push(Span {
            text: std::mem::take(&mut self.buffer),
            bold: self.bold.is_some(),
            italic: self.italic.is_some(),
        });
    }
}

/// Parses `**bold**` and `*italic*` markup into spans.
///
/// Markers toggle their style, so the two may nest in either order.  A backslash makes the next
/// character literal.  Unterminated markers and a trailing backslash are errors.
pub fn parse_markup(input: &str) -> Result<Vec<Span>, ParseError> {
    let mut markup = Markup::default();
    let mut chars = input.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, escaped)) => markup.buffer.push(escaped),
                None => return Err(ParseError::new(index, "dangling escape at end of input")),
            },
            '*' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                markup.flush();
                markup.bold = match markup.bold {
                    Some(_) => None,
                    None => Some(index),
                };
            }
            '*' => {
                markup.flush();
                markup.italic = match markup.italic {
                    Some(_) => None,
                    None => Some(index),
                };
            }
            _ => markup.buffer.push(ch),
        }
    }

    if let Some(index) = markup.bold {
        return Err(ParseError::new(index, "unterminated bold span"));
    }
    if let Some(index) = markup.italic {
        return Err(ParseError::new(index, "unterminated italic span"));
    }

    markup.flush();
    Ok(markup.spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_to_style_reflects_flags() {
        let styled = Span::new("Hello").bold().italic().to_styled_string();
        assert_eq!(styled.s, "Hello");
        assert!(styled.style.is_bold());
        assert!(styled.style.is_italic());
    }

    #[test]
    fn parse_plain_text() {
        let spans = parse_markup("Hello world").expect("parse succeeds");
        assert_eq!(spans, vec![Span::new("Hello world")]);
    }

    #[test]
    fn parse_nested_styles() {
        let spans = parse_markup("This is **very *cool***!").expect("parse succeeds");
        assert_eq!(
            spans,
            vec![
                Span::new("This is "),
                Span::new("very ").bold(),
                Span::new("cool").bold().italic(),
                Span::new("!"),
            ]
        );
    }

    #[test]
    fn escaped_asterisk_is_literal() {
        let spans = parse_markup(r"100 \* COUNT(\*) / *visits*").expect("parse succeeds");
        assert_eq!(spans[0].text(), "100 * COUNT(*) / ");
        assert!(spans[1].is_italic());
    }

    #[test]
    fn error_on_unterminated_bold() {
        let err = parse_markup("**oops").unwrap_err();
        assert!(err.message().contains("unterminated bold"));
        assert_eq!(err.index(), 0);
    }

    #[test]
    fn error_on_dangling_escape() {
        let err = parse_markup("text\\").unwrap_err();
        assert_eq!(err.index(), 4);
    }
}
