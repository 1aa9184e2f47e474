//! Shared error utilities used across the compilation pipeline.
//!
//! Located diagnostics follow the same shape everywhere: a `line, column`
//! header, then the offending source line with a caret under the column.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompileError {
  /// The tokenizer could not make sense of the input. Always fatal.
  #[snafu(display("line {line}, column {column}: {message}\n{source_line}\n{marker}"))]
  Lex {
    line: usize,
    column: usize,
    source_line: String,
    marker: String,
    message: String,
  },

  /// A single statement failed to parse; the parser keeps going.
  #[snafu(display("line {line}, column {column}: {message}\n{source_line}\n{marker}"))]
  Syntax {
    line: usize,
    column: usize,
    source_line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("{}", render_all(errors)))]
  Parse { errors: Vec<CompileError> },

  #[snafu(display("codegen error: {message}"))]
  Codegen { message: String },

  #[snafu(display("could not read {}: {source}", path.display()))]
  ReadSource { path: PathBuf, source: io::Error },

  #[snafu(display("could not write {}: {source}", path.display()))]
  WriteListing { path: PathBuf, source: io::Error },
}

impl CompileError {
  /// A fatal tokenizer error anchored at `line`/`column` of `source`.
  pub fn lex(source: &str, line: usize, column: usize, message: impl Into<String>) -> Self {
    let (source_line, marker) = excerpt(source, line, column);
    Self::Lex {
      line,
      column,
      source_line,
      marker,
      message: message.into(),
    }
  }

  /// A recoverable parse error anchored at `line`/`column` of `source`.
  pub fn syntax(source: &str, line: usize, column: usize, message: impl Into<String>) -> Self {
    let (source_line, marker) = excerpt(source, line, column);
    Self::Syntax {
      line,
      column,
      source_line,
      marker,
      message: message.into(),
    }
  }

  pub fn codegen(message: impl Into<String>) -> Self {
    Self::Codegen {
      message: message.into(),
    }
  }

  pub fn is_syntax(&self) -> bool {
    matches!(self, Self::Syntax { .. })
  }

  /// Source position for located diagnostics.
  pub fn location(&self) -> Option<(usize, usize)> {
    match self {
      Self::Lex { line, column, .. } | Self::Syntax { line, column, .. } => Some((*line, *column)),
      _ => None,
    }
  }
}

/// Pull the 1-based `line` out of `source` and build a caret marker under
/// the 0-based `column`.
fn excerpt(source: &str, line: usize, column: usize) -> (String, String) {
  let text = source
    .lines()
    .nth(line.saturating_sub(1))
    .unwrap_or_default()
    .to_string();
  let safe_column = column.min(text.chars().count());
  let marker = format!("{}^", " ".repeat(safe_column));
  (text, marker)
}

fn render_all(errors: &[CompileError]) -> String {
  let mut out = format!("{} syntax error(s):", errors.len());
  for err in errors {
    out.push('\n');
    out.push_str(&err.to_string());
  }
  out
}
