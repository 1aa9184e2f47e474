//! Recursive-descent parser producing a `Program` tree.
//!
//! Statements are dispatched on the current token; expressions use
//! precedence climbing with call, index and assignment folded in as
//! postfix forms that bind tighter than any binary operator. The parser
//! pulls tokens lazily and looks at most one token ahead.
//!
//! A statement that fails to parse is recorded as a syntax error and the
//! enclosing block skips one token before trying again. This is best-effort
//! recovery: a badly malformed region can produce follow-on errors. Lexer
//! errors are fatal and abort the parse.

use crate::ast::{BinaryOp, Block, Expr, Import, Program, Stmt, VarKind};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Lexer, Token, TokenKind, describe_token};

const LOWEST: u8 = 0;
/// Call, index and assignment outrank every binary operator.
const POSTFIX: u8 = 5;

fn binding_power(kind: TokenKind) -> u8 {
  match kind {
    TokenKind::LParen | TokenKind::LBracket | TokenKind::Assign => POSTFIX,
    _ => BinaryOp::from_token(kind).map_or(LOWEST, BinaryOp::precedence),
  }
}

/// Parse a whole source file. Fails if the lexer fails or if any statement
/// reported a syntax error; every recorded error is returned together.
pub fn parse(source: &str) -> CompileResult<Program> {
  let mut parser = Parser::new(source)?;
  let program = parser.parse_program()?;
  if parser.errors().is_empty() {
    Ok(program)
  } else {
    Err(CompileError::Parse {
      errors: parser.into_errors(),
    })
  }
}

/// Two-token window over a lazily driven `Lexer`.
pub struct Parser<'a> {
  lexer: Lexer<'a>,
  current: Token<'a>,
  peek: Token<'a>,
  errors: Vec<CompileError>,
}

impl<'a> Parser<'a> {
  pub fn new(source: &'a str) -> CompileResult<Self> {
    let mut lexer = Lexer::new(source);
    let current = lexer.next_token()?;
    let peek = lexer.next_token()?;
    Ok(Self {
      lexer,
      current,
      peek,
      errors: Vec::new(),
    })
  }

  /// Syntax errors recorded so far, in source order.
  pub fn errors(&self) -> &[CompileError] {
    &self.errors
  }

  pub fn into_errors(self) -> Vec<CompileError> {
    self.errors
  }

  /// Parse statements until end of input. Only lexer errors are returned as
  /// `Err`; syntax errors are recorded and the offending statement dropped.
  pub fn parse_program(&mut self) -> CompileResult<Program> {
    let mut statements = Vec::new();
    while !self.current.is(TokenKind::Eof) {
      if let Some(stmt) = self.statement_or_recover()? {
        statements.push(stmt);
      }
    }
    Ok(Program::new(statements))
  }

  fn advance(&mut self) -> CompileResult<()> {
    let next = self.lexer.next_token()?;
    self.current = std::mem::replace(&mut self.peek, next);
    Ok(())
  }

  /// Consume the current token if it has the given kind.
  fn eat(&mut self, kind: TokenKind) -> CompileResult<bool> {
    if self.current.is(kind) {
      self.advance()?;
      return Ok(true);
    }
    Ok(false)
  }

  fn expect(&mut self, kind: TokenKind, expected: &str) -> CompileResult<Token<'a>> {
    if self.current.is(kind) {
      let token = self.current;
      self.advance()?;
      Ok(token)
    } else {
      Err(self.unexpected(expected))
    }
  }

  fn skip_semicolon(&mut self) -> CompileResult<()> {
    self.eat(TokenKind::Semicolon)?;
    Ok(())
  }

  fn error_at(&self, token: &Token, message: impl Into<String>) -> CompileError {
    CompileError::syntax(self.lexer.source(), token.line, token.column, message)
  }

  fn unexpected(&self, expected: &str) -> CompileError {
    let got = describe_token(&self.current);
    self.error_at(
      &self.current,
      format!("expected {expected}, but got \"{got}\""),
    )
  }

  fn statement_or_recover(&mut self) -> CompileResult<Option<Stmt>> {
    match self.parse_statement() {
      Ok(stmt) => Ok(Some(stmt)),
      Err(err) if err.is_syntax() => {
        self.errors.push(err);
        self.advance()?;
        Ok(None)
      }
      Err(err) => Err(err),
    }
  }

  fn parse_statement(&mut self) -> CompileResult<Stmt> {
    match self.current.kind {
      TokenKind::Var => self.parse_var_declaration(),
      TokenKind::Ident => self.parse_expression_statement(),
      TokenKind::Return => self.parse_return(),
      TokenKind::While => self.parse_while(),
      TokenKind::For => self.parse_for(),
      TokenKind::Import => self.parse_import(),
      TokenKind::LBrace => Ok(Stmt::Block(self.parse_block("'{'")?)),
      TokenKind::Func => self.parse_function(),
      _ => {
        let got = describe_token(&self.current);
        Err(self.error_at(
          &self.current,
          format!("unexpected token \"{got}\" at start of statement"),
        ))
      }
    }
  }

  fn parse_block(&mut self, opening: &str) -> CompileResult<Block> {
    self.expect(TokenKind::LBrace, opening)?;
    let mut statements = Vec::new();
    while !self.current.is(TokenKind::RBrace) && !self.current.is(TokenKind::Eof) {
      if let Some(stmt) = self.statement_or_recover()? {
        statements.push(stmt);
      }
    }
    self.expect(TokenKind::RBrace, "'}' to close block")?;
    Ok(Block::new(statements))
  }

  /// `var NAME [ '[' [EXPR] ']' ] [= EXPR] [;]`
  fn parse_var_declaration(&mut self) -> CompileResult<Stmt> {
    self.expect(TokenKind::Var, "'var'")?;
    let name = self
      .expect(TokenKind::Ident, "identifier after 'var'")?
      .text
      .to_string();

    let kind = if self.eat(TokenKind::LBracket)? {
      let size = if self.current.is(TokenKind::RBracket) {
        None
      } else {
        Some(self.parse_expression(LOWEST)?)
      };
      self.expect(TokenKind::RBracket, "']' after array size")?;
      VarKind::Array { size }
    } else {
      VarKind::Scalar
    };

    let value = if self.eat(TokenKind::Assign)? {
      Some(self.parse_expression(LOWEST)?)
    } else {
      None
    };
    self.skip_semicolon()?;

    Ok(Stmt::VarDeclaration { name, kind, value })
  }

  fn parse_expression_statement(&mut self) -> CompileResult<Stmt> {
    let expr = self.parse_expression(LOWEST)?;
    self.skip_semicolon()?;
    Ok(Stmt::Expression(expr))
  }

  fn parse_return(&mut self) -> CompileResult<Stmt> {
    self.expect(TokenKind::Return, "'return'")?;
    let value = match self.current.kind {
      TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => None,
      _ => Some(self.parse_expression(LOWEST)?),
    };
    self.skip_semicolon()?;
    Ok(Stmt::Return { value })
  }

  /// `func NAME ( [IDENT (, IDENT)*] ) BLOCK`
  fn parse_function(&mut self) -> CompileResult<Stmt> {
    self.expect(TokenKind::Func, "'func'")?;
    let name = self
      .expect(TokenKind::Ident, "function name after 'func'")?
      .text
      .to_string();
    self.expect(TokenKind::LParen, "'(' after function name")?;
    let parameters = self.parse_name_list(TokenKind::RParen, "parameter name")?;
    self.expect(TokenKind::RParen, "')' after function parameters")?;
    let body = self.parse_block("'{' before function body")?;
    Ok(Stmt::FunctionDeclaration {
      name,
      parameters,
      body,
    })
  }

  /// Comma separated identifiers up to (not including) `close`.
  fn parse_name_list(&mut self, close: TokenKind, what: &str) -> CompileResult<Vec<String>> {
    let mut names = Vec::new();
    if self.current.is(close) {
      return Ok(names);
    }
    loop {
      names.push(self.expect(TokenKind::Ident, what)?.text.to_string());
      if !self.eat(TokenKind::Comma)? {
        return Ok(names);
      }
    }
  }

  /// `while ( EXPR ) BLOCK`
  fn parse_while(&mut self) -> CompileResult<Stmt> {
    self.expect(TokenKind::While, "'while'")?;
    self.expect(TokenKind::LParen, "'(' after 'while'")?;
    let condition = self.parse_expression(LOWEST)?;
    self.expect(TokenKind::RParen, "')' after while condition")?;
    let body = self.parse_block("'{' after while condition")?;
    Ok(Stmt::WhileLoop { condition, body })
  }

  /// `for ( [INIT] , [COND] , [INCR] ) BLOCK`
  fn parse_for(&mut self) -> CompileResult<Stmt> {
    self.expect(TokenKind::For, "'for'")?;
    self.expect(TokenKind::LParen, "'(' after 'for'")?;
    let init = self.parse_optional_expression(TokenKind::Comma)?;
    self.expect(TokenKind::Comma, "',' after for loop initializer")?;
    let condition = self.parse_optional_expression(TokenKind::Comma)?;
    self.expect(TokenKind::Comma, "',' after for loop condition")?;
    let increment = self.parse_optional_expression(TokenKind::RParen)?;
    self.expect(TokenKind::RParen, "')' after for loop increment")?;
    let body = self.parse_block("'{' after for loop header")?;
    Ok(Stmt::ForLoop {
      init,
      condition,
      increment,
      body,
    })
  }

  fn parse_optional_expression(&mut self, terminator: TokenKind) -> CompileResult<Option<Expr>> {
    if self.current.is(terminator) {
      return Ok(None);
    }
    Ok(Some(self.parse_expression(LOWEST)?))
  }

  /// `import "PATH" as NAME` or `import { NAME (, NAME)* } from "PATH"`.
  fn parse_import(&mut self) -> CompileResult<Stmt> {
    let import = match self.peek.kind {
      TokenKind::StringLiteral => {
        self.advance()?;
        let path = self.current.text.to_string();
        self.advance()?;
        self.expect(TokenKind::As, "'as' after import path")?;
        let alias = self
          .expect(TokenKind::Ident, "alias after 'as'")?
          .text
          .to_string();
        Import::Alias { path, alias }
      }
      TokenKind::LBrace => {
        self.advance()?;
        self.advance()?;
        let names = self.parse_name_list(TokenKind::RBrace, "imported name")?;
        self.expect(TokenKind::RBrace, "'}' after imported names")?;
        self.expect(TokenKind::From, "'from' after imported names")?;
        let path = self
          .expect(TokenKind::StringLiteral, "module path after 'from'")?
          .text
          .to_string();
        Import::Destructured { path, names }
      }
      _ => {
        self.advance()?;
        return Err(self.unexpected("module path or '{' after 'import'"));
      }
    };
    self.skip_semicolon()?;
    Ok(Stmt::Import(import))
  }

  /// Precedence climbing. Folds postfix and binary forms onto `left` while
  /// the current token binds tighter than `min_precedence`.
  fn parse_expression(&mut self, min_precedence: u8) -> CompileResult<Expr> {
    let mut left = self.parse_prefix()?;

    while !matches!(self.current.kind, TokenKind::Eof | TokenKind::Semicolon)
      && binding_power(self.current.kind) > min_precedence
    {
      left = match self.current.kind {
        TokenKind::LParen => self.parse_call(left)?,
        TokenKind::LBracket => self.parse_index(left)?,
        TokenKind::Assign => {
          self.advance()?;
          // Right-associative: `a = b = 3` is `a = (b = 3)`.
          let value = self.parse_expression(LOWEST)?;
          Expr::assign(left, value)
        }
        _ => self.parse_infix(left)?,
      };
    }

    Ok(left)
  }

  fn parse_prefix(&mut self) -> CompileResult<Expr> {
    let token = self.current;
    let expr = match token.kind {
      TokenKind::Ident => Expr::identifier(token.text),
      TokenKind::Number => Expr::number(token.text),
      TokenKind::AsciiLiteral => Expr::ascii(token.text),
      TokenKind::StringLiteral => Expr::string(token.text),
      TokenKind::LParen => {
        self.advance()?;
        let inner = self.parse_expression(LOWEST)?;
        self.expect(TokenKind::RParen, "')'")?;
        return Ok(inner);
      }
      _ => {
        let got = describe_token(&token);
        return Err(self.error_at(&token, format!("unexpected token \"{got}\" in expression")));
      }
    };
    self.advance()?;
    Ok(expr)
  }

  fn parse_infix(&mut self, left: Expr) -> CompileResult<Expr> {
    let token = self.current;
    let Some(op) = BinaryOp::from_token(token.kind) else {
      let got = describe_token(&token);
      return Err(self.error_at(&token, format!("\"{got}\" is not a binary operator")));
    };
    self.advance()?;
    let right = self.parse_expression(op.precedence())?;
    Ok(Expr::binary(op, left, right))
  }

  fn parse_call(&mut self, callee: Expr) -> CompileResult<Expr> {
    self.expect(TokenKind::LParen, "'('")?;
    let mut arguments = Vec::new();
    if !self.current.is(TokenKind::RParen) {
      loop {
        arguments.push(self.parse_expression(LOWEST)?);
        if !self.eat(TokenKind::Comma)? {
          break;
        }
      }
    }
    self.expect(TokenKind::RParen, "')' after call arguments")?;
    Ok(Expr::call(callee, arguments))
  }

  fn parse_index(&mut self, array: Expr) -> CompileResult<Expr> {
    self.expect(TokenKind::LBracket, "'['")?;
    let index = self.parse_expression(LOWEST)?;
    self.expect(TokenKind::RBracket, "']' after index")?;
    Ok(Expr::index(array, index))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use indoc::indoc;

  fn parse_expr(source: &str) -> Expr {
    let program = parse(source).expect("parse failed");
    match program.statements.as_slice() {
      [Stmt::Expression(expr)] => expr.clone(),
      other => panic!("expected a single expression statement, got {other:?}"),
    }
  }

  #[test]
  fn multiplication_binds_tighter_than_addition() {
    assert_eq!(parse_expr("x = 1 + 2 * 3;").to_string(), "(x = (1 + (2 * 3)))");
  }

  #[test]
  fn lower_precedence_operator_takes_the_outer_position() {
    let ops = [
      BinaryOp::Eq,
      BinaryOp::Ne,
      BinaryOp::Lt,
      BinaryOp::Gt,
      BinaryOp::Le,
      BinaryOp::Ge,
      BinaryOp::Add,
      BinaryOp::Sub,
      BinaryOp::Mul,
      BinaryOp::Div,
      BinaryOp::Mod,
    ];
    for a in ops {
      for b in ops.iter().copied().filter(|b| a.precedence() < b.precedence()) {
        let source = format!("x {} y {} z", a.symbol(), b.symbol());
        let expected = format!("(x {} (y {} z))", a.symbol(), b.symbol());
        assert_eq!(parse_expr(&source).to_string(), expected, "source: {source}");
      }
    }
  }

  #[test]
  fn binary_chains_are_left_associative() {
    assert_eq!(parse_expr("r = 10 - 3 - 2").to_string(), "(r = ((10 - 3) - 2))");
    assert_eq!(parse_expr("r = 8 / 4 % 3").to_string(), "(r = ((8 / 4) % 3))");
  }

  #[test]
  fn assignment_is_right_associative() {
    let expr = parse_expr("a = b = 3;");
    assert_eq!(
      expr,
      Expr::assign(
        Expr::identifier("a"),
        Expr::assign(Expr::identifier("b"), Expr::number("3")),
      )
    );
  }

  #[test]
  fn parentheses_override_precedence() {
    assert_eq!(parse_expr("r = (1 + 2) * 3").to_string(), "(r = ((1 + 2) * 3))");
  }

  #[test]
  fn postfix_forms_chain() {
    assert_eq!(parse_expr("f(a, b[1])[2]").to_string(), "f(a, b[1])[2]");
    assert_eq!(parse_expr("x = f() + 2").to_string(), "(x = (f() + 2))");
    assert_eq!(parse_expr("a[i + 1] = 65a").to_string(), "(a[(i + 1)] = 65a)");
  }

  #[test]
  fn comparison_binds_looser_than_arithmetic() {
    assert_eq!(
      parse_expr("ok = a + 1 < b * 2 == c").to_string(),
      "(ok = (((a + 1) < (b * 2)) == c))"
    );
  }

  #[test]
  fn parses_function_with_parameters() {
    let source = indoc! {"
      var x = 5;
      func add(a, b) {
        return a + b + x;
      }
    "};
    let program = parse(source).expect("parse failed");
    let expected = Program::new(vec![
      Stmt::VarDeclaration {
        name: "x".to_string(),
        kind: VarKind::Scalar,
        value: Some(Expr::number("5")),
      },
      Stmt::FunctionDeclaration {
        name: "add".to_string(),
        parameters: vec!["a".to_string(), "b".to_string()],
        body: Block::new(vec![Stmt::Return {
          value: Some(Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, Expr::identifier("a"), Expr::identifier("b")),
            Expr::identifier("x"),
          )),
        }]),
      },
    ]);
    assert_eq!(program, expected);
  }

  #[test]
  fn parses_var_declaration_shapes() {
    let program = parse("var a[10] = 0; var b[] = 1 var c").expect("parse failed");
    assert_eq!(
      program.statements,
      vec![
        Stmt::VarDeclaration {
          name: "a".to_string(),
          kind: VarKind::Array {
            size: Some(Expr::number("10"))
          },
          value: Some(Expr::number("0")),
        },
        Stmt::VarDeclaration {
          name: "b".to_string(),
          kind: VarKind::Array { size: None },
          value: Some(Expr::number("1")),
        },
        Stmt::VarDeclaration {
          name: "c".to_string(),
          kind: VarKind::Scalar,
          value: None,
        },
      ]
    );
  }

  #[test]
  fn parses_loops() {
    let source = indoc! {"
      for (i = 0, i < 3, i = i + 1) { x = x + i; }
      while (x > 0) { x = x - 1 }
      for (, , ) { }
    "};
    let program = parse(source).expect("parse failed");
    assert_eq!(program.statements.len(), 3);

    let Stmt::ForLoop {
      init,
      condition,
      increment,
      body,
    } = &program.statements[0]
    else {
      panic!("expected for loop");
    };
    assert_eq!(init.as_ref().map(Expr::to_string).as_deref(), Some("(i = 0)"));
    assert_eq!(condition.as_ref().map(Expr::to_string).as_deref(), Some("(i < 3)"));
    assert_eq!(
      increment.as_ref().map(Expr::to_string).as_deref(),
      Some("(i = (i + 1))")
    );
    assert_eq!(body.statements.len(), 1);

    assert!(matches!(
      &program.statements[1],
      Stmt::WhileLoop { body, .. } if body.statements.len() == 1
    ));
    assert_eq!(
      program.statements[2],
      Stmt::ForLoop {
        init: None,
        condition: None,
        increment: None,
        body: Block::default(),
      }
    );
  }

  #[test]
  fn parses_both_import_forms() {
    let source = indoc! {r#"
      import "std/io" as io;
      import { print, read } from "std/io"
    "#};
    let program = parse(source).expect("parse failed");
    assert_eq!(
      program.statements,
      vec![
        Stmt::Import(Import::Alias {
          path: "std/io".to_string(),
          alias: "io".to_string(),
        }),
        Stmt::Import(Import::Destructured {
          path: "std/io".to_string(),
          names: vec!["print".to_string(), "read".to_string()],
        }),
      ]
    );
  }

  #[test]
  fn return_without_value() {
    let program = parse("func f() { return; } func g() { return }").expect("parse failed");
    for stmt in &program.statements {
      let Stmt::FunctionDeclaration { body, .. } = stmt else {
        panic!("expected function");
      };
      assert_eq!(body.statements, vec![Stmt::Return { value: None }]);
    }
  }

  #[test]
  fn semicolons_are_optional() {
    let program = parse("x = 1 y = 2").expect("parse failed");
    assert_eq!(program.statements.len(), 2);
  }

  #[test]
  fn stray_token_between_statements_is_reported_once() {
    let mut parser = Parser::new("var x = 1; ) var y = 2;").unwrap();
    let program = parser.parse_program().unwrap();
    assert_eq!(parser.errors().len(), 1);
    assert_eq!(parser.errors()[0].location(), Some((1, 11)));
    assert_eq!(program.statements.len(), 2);
  }

  #[test]
  fn recovery_inside_blocks() {
    let mut parser = Parser::new("func f() { x = 1; ] y = 2; }").unwrap();
    let program = parser.parse_program().unwrap();
    assert_eq!(parser.errors().len(), 1);
    let [Stmt::FunctionDeclaration { body, .. }] = program.statements.as_slice() else {
      panic!("expected one function, got {:?}", program.statements);
    };
    assert_eq!(body.statements.len(), 2);
  }

  #[test]
  fn missing_identifier_after_var_is_located() {
    let mut parser = Parser::new("var = 2;").unwrap();
    parser.parse_program().unwrap();
    let first = &parser.errors()[0];
    assert_eq!(first.location(), Some((1, 4)));
    assert!(first.to_string().contains("expected identifier after 'var'"));
  }

  #[test]
  fn unclosed_block_is_an_error() {
    let err = parse("while (x) { x = x - 1").unwrap_err();
    let CompileError::Parse { errors } = err else {
      panic!("expected parse failure");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("'}' to close block"));
  }

  #[test]
  fn missing_comma_between_parameters() {
    assert!(parse("func f(a b) { }").is_err());
  }

  #[test]
  fn lexer_errors_abort_the_parse() {
    let err = parse("x = 1; y = \"open").unwrap_err();
    assert!(matches!(err, CompileError::Lex { .. }));
  }

  #[test]
  fn malformed_input_always_terminates() {
    let mut parser = Parser::new("} ) ] , ; . + = == 1 2 3 \"s\"").unwrap();
    let program = parser.parse_program().unwrap();
    assert!(program.statements.is_empty());
    assert!(!parser.errors().is_empty());
  }
}
