//! Syntax tree produced by the parser and consumed by the code generator.
//!
//! Statements and expressions are separate closed enums. Every child is
//! owned by exactly one parent and sibling lists are plain vectors, so the
//! tree is a strict forest that is built once and then only read.

use std::fmt;

use crate::tokenizer::TokenKind;

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
}

impl BinaryOp {
  pub fn from_token(kind: TokenKind) -> Option<Self> {
    let op = match kind {
      TokenKind::Eq => Self::Eq,
      TokenKind::Ne => Self::Ne,
      TokenKind::Lt => Self::Lt,
      TokenKind::Gt => Self::Gt,
      TokenKind::Le => Self::Le,
      TokenKind::Ge => Self::Ge,
      TokenKind::Plus => Self::Add,
      TokenKind::Minus => Self::Sub,
      TokenKind::Star => Self::Mul,
      TokenKind::Slash => Self::Div,
      TokenKind::Percent => Self::Mod,
      _ => return None,
    };
    Some(op)
  }

  /// Binding power; higher binds tighter.
  pub fn precedence(self) -> u8 {
    match self {
      Self::Eq | Self::Ne => 1,
      Self::Lt | Self::Gt | Self::Le | Self::Ge => 2,
      Self::Add | Self::Sub => 3,
      Self::Mul | Self::Div | Self::Mod => 4,
    }
  }

  pub fn symbol(self) -> &'static str {
    match self {
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Gt => ">",
      Self::Le => "<=",
      Self::Ge => ">=",
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Mod => "%",
    }
  }

  pub fn is_comparison(self) -> bool {
    self.precedence() <= 2
  }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Identifier(String),
  /// Decimal digits exactly as written.
  NumberLiteral(String),
  /// Digits followed by the `a` marker, e.g. `65a`.
  AsciiLiteral(String),
  StringLiteral(String),
  Assign {
    target: Box<Expr>,
    value: Box<Expr>,
  },
  Call {
    callee: Box<Expr>,
    arguments: Vec<Expr>,
  },
  Binary {
    op: BinaryOp,
    left: Box<Expr>,
    right: Box<Expr>,
  },
  Index {
    array: Box<Expr>,
    index: Box<Expr>,
  },
}

impl Expr {
  pub fn identifier(name: impl Into<String>) -> Self {
    Self::Identifier(name.into())
  }

  pub fn number(text: impl Into<String>) -> Self {
    Self::NumberLiteral(text.into())
  }

  pub fn ascii(text: impl Into<String>) -> Self {
    Self::AsciiLiteral(text.into())
  }

  pub fn string(text: impl Into<String>) -> Self {
    Self::StringLiteral(text.into())
  }

  pub fn assign(target: Expr, value: Expr) -> Self {
    Self::Assign {
      target: Box::new(target),
      value: Box::new(value),
    }
  }

  pub fn call(callee: Expr, arguments: Vec<Expr>) -> Self {
    Self::Call {
      callee: Box::new(callee),
      arguments,
    }
  }

  pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
    Self::Binary {
      op,
      left: Box::new(left),
      right: Box::new(right),
    }
  }

  pub fn index(array: Expr, index: Expr) -> Self {
    Self::Index {
      array: Box::new(array),
      index: Box::new(index),
    }
  }

  pub fn as_identifier(&self) -> Option<&str> {
    match self {
      Self::Identifier(name) => Some(name),
      _ => None,
    }
  }
}

/// Fully parenthesised rendering: `1 + 2 * 3` prints as `(1 + (2 * 3))`.
impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Identifier(text) | Self::NumberLiteral(text) | Self::AsciiLiteral(text) => {
        write!(f, "{text}")
      }
      Self::StringLiteral(text) => write!(f, "\"{text}\""),
      Self::Assign { target, value } => write!(f, "({target} = {value})"),
      Self::Call { callee, arguments } => {
        write!(f, "{callee}(")?;
        for (i, arg) in arguments.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{arg}")?;
        }
        write!(f, ")")
      }
      Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
      Self::Index { array, index } => write!(f, "{array}[{index}]"),
    }
  }
}

/// Storage shape of a `var` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
  Scalar,
  /// `var a[N]`, or `var a[]` when `size` is `None`.
  Array { size: Option<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Import {
  /// `import "path" as alias`
  Alias { path: String, alias: String },
  /// `import { a, b } from "path"`
  Destructured { path: String, names: Vec<String> },
}

impl Import {
  pub fn path(&self) -> &str {
    match self {
      Self::Alias { path, .. } | Self::Destructured { path, .. } => path,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
  pub statements: Vec<Stmt>,
}

impl Block {
  pub fn new(statements: Vec<Stmt>) -> Self {
    Self { statements }
  }

  pub fn ends_with_return(&self) -> bool {
    matches!(self.statements.last(), Some(Stmt::Return { .. }))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  VarDeclaration {
    name: String,
    kind: VarKind,
    value: Option<Expr>,
  },
  FunctionDeclaration {
    name: String,
    parameters: Vec<String>,
    body: Block,
  },
  Return {
    value: Option<Expr>,
  },
  Expression(Expr),
  Block(Block),
  ForLoop {
    init: Option<Expr>,
    condition: Option<Expr>,
    increment: Option<Expr>,
    body: Block,
  },
  WhileLoop {
    condition: Expr,
    body: Block,
  },
  /// Kept for traceability; lowers to nothing.
  Import(Import),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub statements: Vec<Stmt>,
}

impl Program {
  pub fn new(statements: Vec<Stmt>) -> Self {
    Self { statements }
  }

  /// Iterate top-level statements in declaration order.
  pub fn iter(&self) -> std::slice::Iter<'_, Stmt> {
    self.statements.iter()
  }
}
