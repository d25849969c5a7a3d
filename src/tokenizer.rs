use crate::error::{CompileResult, LexicalError, SyntaxError};
use crate::token::{Keyword, Sym, Token};

/// Cursor over the source text. The cursor always rests at the start of a
/// token or at end of input: construction and every `advance` skip any run
/// of whitespace and comments. Cloning the cursor is cheap, which is what
/// `lookahead` relies on.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut tokenizer = Self { input, cursor: 0 };
        tokenizer.skip_trivia();
        tokenizer
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.input.len()
    }

    /// The next token without consuming it.
    pub fn peek(&self) -> CompileResult<Token> {
        match self.scan()? {
            Some((token, _)) => Ok(token),
            None => Err(SyntaxError::UnexpectedEof {
                expected: "a token".to_string(),
            }
            .into()),
        }
    }

    /// Consume and return the next token.
    pub fn advance(&mut self) -> CompileResult<Token> {
        match self.scan()? {
            Some((token, length)) => {
                self.cursor += length;
                self.skip_trivia();
                Ok(token)
            }
            None => Err(SyntaxError::UnexpectedEof {
                expected: "a token".to_string(),
            }
            .into()),
        }
    }

    /// An independent cursor positioned after the next `count` tokens. The
    /// caller's position is untouched; the parser uses this for its two
    /// speculative decisions.
    pub fn lookahead(&self, count: usize) -> CompileResult<Tokenizer<'a>> {
        let mut ahead = self.clone();
        for _ in 0..count {
            ahead.advance()?;
        }
        Ok(ahead)
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = &self.input[self.cursor..];
            let trimmed = rest.trim_start();
            if trimmed.len() < rest.len() {
                self.cursor += rest.len() - trimmed.len();
                continue;
            }
            if rest.starts_with("//") {
                let line_end = rest.find('\n').unwrap_or(rest.len());
                self.cursor += line_end;
                continue;
            }
            if rest.starts_with("/*") {
                // Non-greedy: the first */ ends the comment. Without one the
                // slash and asterisk fall through as symbol tokens.
                if let Some(end) = rest[2..].find("*/") {
                    self.cursor += 2 + end + 2;
                    continue;
                }
            }
            break;
        }
    }

    /// Match one token at the cursor, trying keyword, symbol, integer
    /// literal, string literal, and identifier in that priority order.
    /// Returns the token and its length in bytes, or `None` at end of input.
    fn scan(&self) -> CompileResult<Option<(Token, usize)>> {
        let rest = &self.input[self.cursor..];
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        for keyword in Keyword::ALL {
            let text = keyword.as_str();
            // A keyword match directly followed by a word character is really
            // an identifier ("classify" is not the keyword "class").
            if rest.starts_with(text) && !rest[text.len()..].starts_with(is_word_char) {
                return Ok(Some((Token::Keyword(keyword), text.len())));
            }
        }

        if let Some(sym) = Sym::from_char(first) {
            return Ok(Some((Token::Sym(sym), first.len_utf8())));
        }

        if first.is_ascii_digit() {
            let length = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let literal = &rest[..length];
            let value = literal.parse::<u32>().ok().filter(|value| *value <= 0x7FFF);
            return match value {
                Some(value) => Ok(Some((Token::IntegerLiteral(value as u16), length))),
                None => Err(LexicalError::IntegerOutOfRange {
                    literal: literal.to_string(),
                }
                .into()),
            };
        }

        if first == '"' {
            for (offset, c) in rest.char_indices().skip(1) {
                match c {
                    '"' => {
                        let literal = rest[1..offset].to_string();
                        return Ok(Some((Token::StringLiteral(literal), offset + 1)));
                    }
                    '\n' => return Err(LexicalError::UnterminatedString.into()),
                    _ => {}
                }
            }
            return Err(LexicalError::UnterminatedString.into());
        }

        if first.is_ascii_alphabetic() || first == '_' {
            let length = rest.find(|c| !is_word_char(c)).unwrap_or(rest.len());
            return Ok(Some((Token::Identifier(rest[..length].to_string()), length)));
        }

        let fragment: String = rest
            .chars()
            .take_while(|c| !c.is_whitespace())
            .take(16)
            .collect();
        Err(LexicalError::UnrecognizedInput { fragment }.into())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
