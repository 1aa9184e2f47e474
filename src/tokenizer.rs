//! Lexical analysis: turns the raw input string into tokens, one at a time.
//!
//! The lexer knows nothing about grammar. It recognises keywords,
//! identifiers, numeric, character-code and string literals, and operators.
//! Two-character operators are matched before one-character ones to avoid
//! ambiguity. Lines are 1-based, columns 0-based.

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Eof,
  Ident,
  Number,
  AsciiLiteral,
  StringLiteral,
  Assign,
  LParen,
  RParen,
  LBrace,
  RBrace,
  LBracket,
  RBracket,
  Comma,
  Semicolon,
  Var,
  Return,
  For,
  While,
  Import,
  As,
  From,
  Func,
  Dot,
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
}

impl TokenKind {
  fn keyword(word: &str) -> Option<Self> {
    let kind = match word {
      "var" => Self::Var,
      "return" => Self::Return,
      "for" => Self::For,
      "while" => Self::While,
      "import" => Self::Import,
      "as" => Self::As,
      "from" => Self::From,
      "func" => Self::Func,
      _ => return None,
    };
    Some(kind)
  }
}

/// A lexeme together with its position. `text` borrows from the source;
/// string literals exclude their quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
  pub kind: TokenKind,
  pub text: &'a str,
  pub line: usize,
  pub column: usize,
}

impl<'a> Token<'a> {
  pub fn new(kind: TokenKind, text: &'a str, line: usize, column: usize) -> Self {
    Self {
      kind,
      text,
      line,
      column,
    }
  }

  pub fn is(&self, kind: TokenKind) -> bool {
    self.kind == kind
  }
}

const TWO_CHAR_OPS: [(&str, TokenKind); 4] = [
  ("==", TokenKind::Eq),
  ("!=", TokenKind::Ne),
  ("<=", TokenKind::Le),
  (">=", TokenKind::Ge),
];

/// Pull-based scanner. Once the input is exhausted every call yields `Eof`.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
  source: &'a str,
  pos: usize,
  line: usize,
  column: usize,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Self {
    Self {
      source,
      pos: 0,
      line: 1,
      column: 0,
    }
  }

  pub fn source(&self) -> &'a str {
    self.source
  }

  fn peek_byte(&self) -> Option<u8> {
    self.source.as_bytes().get(self.pos).copied()
  }

  fn peek_byte_at(&self, offset: usize) -> Option<u8> {
    self.source.as_bytes().get(self.pos + offset).copied()
  }

  /// Move past one character, tracking line and column.
  fn bump(&mut self) {
    let Some(c) = self.source[self.pos..].chars().next() else {
      return;
    };
    if c == '\n' {
      self.line += 1;
      self.column = 0;
    } else {
      self.column += 1;
    }
    self.pos += c.len_utf8();
  }

  fn skip_trivia(&mut self) {
    loop {
      match self.peek_byte() {
        Some(c) if c.is_ascii_whitespace() => self.bump(),
        Some(b'/') if self.peek_byte_at(1) == Some(b'/') => {
          while !matches!(self.peek_byte(), None | Some(b'\n')) {
            self.bump();
          }
        }
        _ => break,
      }
    }
  }

  fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
  }

  /// Scan the next token.
  pub fn next_token(&mut self) -> CompileResult<Token<'a>> {
    self.skip_trivia();

    let (line, column, start) = (self.line, self.column, self.pos);
    let Some(c) = self.peek_byte() else {
      return Ok(Token::new(TokenKind::Eof, "", line, column));
    };

    if c.is_ascii_alphabetic() || c == b'_' {
      while self.peek_byte().is_some_and(Self::is_ident_byte) {
        self.bump();
      }
      let text = &self.source[start..self.pos];
      let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Ident);
      return Ok(Token::new(kind, text, line, column));
    }

    if c.is_ascii_digit() {
      while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
        self.bump();
      }
      // `65a` is a character code unless a letter or digit follows the marker:
      // `65abc` is a number then an identifier, `65a_x` is `65a` then `_x`.
      if self.peek_byte() == Some(b'a')
        && !self.peek_byte_at(1).is_some_and(|b| b.is_ascii_alphanumeric())
      {
        self.bump();
        let text = &self.source[start..self.pos];
        return Ok(Token::new(TokenKind::AsciiLiteral, text, line, column));
      }
      let text = &self.source[start..self.pos];
      return Ok(Token::new(TokenKind::Number, text, line, column));
    }

    if c == b'"' {
      self.bump();
      let body_start = self.pos;
      while !matches!(self.peek_byte(), None | Some(b'"')) {
        self.bump();
      }
      if self.peek_byte().is_none() {
        return Err(CompileError::lex(
          self.source,
          line,
          column,
          "unterminated string literal",
        ));
      }
      let text = &self.source[body_start..self.pos];
      self.bump();
      return Ok(Token::new(TokenKind::StringLiteral, text, line, column));
    }

    if let Some((op, kind)) = TWO_CHAR_OPS
      .into_iter()
      .find(|(op, _)| self.source[self.pos..].starts_with(op))
    {
      self.bump();
      self.bump();
      return Ok(Token::new(kind, op, line, column));
    }

    let kind = match c {
      b'=' => TokenKind::Assign,
      b'<' => TokenKind::Lt,
      b'>' => TokenKind::Gt,
      b'(' => TokenKind::LParen,
      b')' => TokenKind::RParen,
      b'{' => TokenKind::LBrace,
      b'}' => TokenKind::RBrace,
      b'[' => TokenKind::LBracket,
      b']' => TokenKind::RBracket,
      b',' => TokenKind::Comma,
      b';' => TokenKind::Semicolon,
      b'.' => TokenKind::Dot,
      b'+' => TokenKind::Plus,
      b'-' => TokenKind::Minus,
      b'*' => TokenKind::Star,
      b'/' => TokenKind::Slash,
      b'%' => TokenKind::Percent,
      _ => {
        let invalid_char = self.source[self.pos..].chars().next().unwrap_or('\0');
        return Err(CompileError::lex(
          self.source,
          line,
          column,
          format!("unexpected character '{invalid_char}'"),
        ));
      }
    };
    self.bump();
    Ok(Token::new(kind, &self.source[start..self.pos], line, column))
  }
}

/// Lex the whole input into a vector terminated by a single `Eof` marker.
pub fn tokenize(source: &str) -> CompileResult<Vec<Token<'_>>> {
  let mut lexer = Lexer::new(source);
  let mut tokens = Vec::new();
  loop {
    let token = lexer.next_token()?;
    tokens.push(token);
    if token.is(TokenKind::Eof) {
      return Ok(tokens);
    }
  }
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: &Token) -> String {
  match token.kind {
    TokenKind::Eof => "EOF".to_string(),
    TokenKind::StringLiteral => format!("\"{}\"", token.text),
    _ => token.text.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source)
      .expect("tokenize failed")
      .into_iter()
      .map(|token| token.kind)
      .collect()
  }

  #[test]
  fn keywords_and_identifiers() {
    use TokenKind::*;
    assert_eq!(
      kinds("var variable func as from import return for while"),
      vec![Var, Ident, Func, As, From, Import, Return, For, While, Eof]
    );
  }

  #[test]
  fn two_char_operators_win() {
    use TokenKind::*;
    assert_eq!(
      kinds("a == b != c <= d >= e < f > g = h"),
      vec![
        Ident, Eq, Ident, Ne, Ident, Le, Ident, Ge, Ident, Lt, Ident, Gt, Ident, Assign, Ident, Eof
      ]
    );
  }

  #[test]
  fn character_code_literal() {
    let tokens = tokenize("65a 7abc 10").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::AsciiLiteral);
    assert_eq!(tokens[0].text, "65a");
    assert_eq!(tokens[1].kind, TokenKind::Number);
    assert_eq!(tokens[1].text, "7");
    assert_eq!(tokens[2].kind, TokenKind::Ident);
    assert_eq!(tokens[2].text, "abc");
    assert_eq!(tokens[3].kind, TokenKind::Number);
  }

  #[test]
  fn underscore_ends_a_character_code() {
    let tokens = tokenize("65a_x 9a1").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::AsciiLiteral);
    assert_eq!(tokens[0].text, "65a");
    assert_eq!(tokens[1].kind, TokenKind::Ident);
    assert_eq!(tokens[1].text, "_x");
    assert_eq!(tokens[2].kind, TokenKind::Number);
    assert_eq!(tokens[2].text, "9");
    assert_eq!(tokens[3].kind, TokenKind::Ident);
    assert_eq!(tokens[3].text, "a1");
  }

  #[test]
  fn string_literal_excludes_quotes() {
    let tokens = tokenize("x = \"hello world\";").unwrap();
    assert_eq!(tokens[2].kind, TokenKind::StringLiteral);
    assert_eq!(tokens[2].text, "hello world");
    assert_eq!(describe_token(&tokens[2]), "\"hello world\"");
  }

  #[test]
  fn positions_are_tracked() {
    let tokens = tokenize("var x\n  = 5 // five\n;").unwrap();
    let positions: Vec<_> = tokens.iter().map(|t| (t.line, t.column)).collect();
    assert_eq!(positions, vec![(1, 0), (1, 4), (2, 2), (2, 4), (3, 0), (3, 1)]);
  }

  #[test]
  fn eof_repeats() {
    let mut lexer = Lexer::new("x");
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Ident);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
  }

  #[test]
  fn unterminated_string_is_fatal() {
    let err = tokenize("x = \"oops").unwrap_err();
    assert!(matches!(err, CompileError::Lex { line: 1, column: 4, .. }));
  }

  #[test]
  fn lone_bang_is_rejected() {
    let err = tokenize("a ! b").unwrap_err();
    assert!(err.to_string().contains("unexpected character '!'"));
  }
}
