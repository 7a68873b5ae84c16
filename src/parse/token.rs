use logos::Logos;

/// Tokens of a tag header, i.e. everything between the tag name and `>`.
#[derive(Debug, PartialEq, Logos, Clone, Copy)]
pub enum Token {
    #[regex(r"[ \t\r\n]+")]
    WhiteSpace,

    #[token("=")]
    Equals,

    #[token("/")]
    Slash,

    #[regex(r#""[^"]*""#)]
    DoubleQuoted,

    #[regex(r"'[^']*'")]
    SingleQuoted,

    #[regex(r#"[^\s=/"'<>]+"#)]
    Name,

    #[error]
    Error,
}
