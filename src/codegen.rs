//! Code generation: lower the parsed program into AT&T x86-64 assembly.
//!
//! The emitter uses a simple stack machine: every expression leaves exactly
//! one value on the stack and every statement leaves the stack as it found
//! it. All identifiers name process-wide 8-byte cells in `.data`; cells and
//! string bytes are collected while walking and hoisted above the code, so
//! each symbol is defined once no matter how often it is declared.
//!
//! Cells live under the local `.L.var.` prefix, so variable names can never
//! collide with function labels or `_start`.
//!
//! Top-level statements run from `_start` and end in an `exit(0)` syscall.
//! Function bodies are emitted after that sequence so control never falls
//! into them.

use std::collections::{HashMap, HashSet};

use crate::ast::{BinaryOp, Block, Expr, Program, Stmt, VarKind};
use crate::error::{CompileError, CompileResult};

/// Integer argument registers, in System V order.
const ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];
const WORD_SIZE: usize = 8;
const ENTRY_SYMBOL: &str = "_start";

/// Assembler symbol of the storage cell for variable `name`.
fn cell_symbol(name: &str) -> String {
  format!(".L.var.{name}")
}

/// Emit the complete listing for a program.
pub fn generate(program: &Program) -> CompileResult<String> {
  let mut codegen = Codegen::default();
  for stmt in program.iter() {
    codegen.emit_stmt(stmt)?;
  }
  codegen.emit("mov $60, %rax");
  codegen.emit("xor %rdi, %rdi");
  codegen.emit("syscall");
  Ok(codegen.finish())
}

#[derive(Debug)]
struct Cell {
  name: String,
  words: usize,
}

/// State for one generation pass. The label counter lives here, so separate
/// passes always number from zero.
#[derive(Debug, Default)]
struct Codegen {
  cells: Vec<Cell>,
  cell_index: HashMap<String, usize>,
  strings: String,
  /// Code for whatever is being generated right now: the entry flow, or
  /// the function currently being lowered.
  text: String,
  functions: String,
  function_names: HashSet<String>,
  function_depth: usize,
  label_count: usize,
}

impl Codegen {
  fn emit(&mut self, instr: &str) {
    self.text.push_str("    ");
    self.text.push_str(instr);
    self.text.push('\n');
  }

  fn comment(&mut self, text: &str) {
    self.text.push_str("    # ");
    self.text.push_str(text);
    self.text.push('\n');
  }

  fn label(&mut self, name: &str) {
    self.text.push_str(name);
    self.text.push_str(":\n");
  }

  fn new_label(&mut self, kind: &str) -> String {
    let label = format!(".L.{kind}.{}", self.label_count);
    self.label_count += 1;
    label
  }

  /// Reserve storage for `name`. Redeclaring keeps the larger size.
  fn define_cell(&mut self, name: &str, words: usize) {
    match self.cell_index.get(name) {
      Some(&idx) => {
        let cell = &mut self.cells[idx];
        cell.words = cell.words.max(words);
      }
      None => {
        self.cell_index.insert(name.to_string(), self.cells.len());
        self.cells.push(Cell {
          name: name.to_string(),
          words,
        });
      }
    }
  }

  /// Make sure `name` has a cell and return its symbol.
  fn ensure_cell(&mut self, name: &str) -> String {
    self.define_cell(name, 1);
    cell_symbol(name)
  }

  fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::VarDeclaration { name, kind, value } => {
        let words = storage_words(name, kind)?;
        self.comment(&format!("var {name}"));
        self.define_cell(name, words);
        if let Some(value) = value {
          self.emit_expr(value)?;
          self.emit("pop %rax");
          self.emit(&format!("mov %rax, {}(%rip)", cell_symbol(name)));
        }
      }
      Stmt::FunctionDeclaration {
        name,
        parameters,
        body,
      } => self.emit_function(name, parameters, body)?,
      Stmt::Return { value } => self.emit_return(value.as_ref())?,
      Stmt::Expression(expr) => {
        self.emit_expr(expr)?;
        self.emit("pop %rax");
      }
      Stmt::Block(block) => self.emit_block(block)?,
      Stmt::ForLoop {
        init,
        condition,
        increment,
        body,
      } => {
        let top = self.new_label("for.top");
        let end = self.new_label("for.end");
        self.comment("for");
        if let Some(init) = init {
          self.emit_expr(init)?;
          self.emit("pop %rax");
        }
        self.label(&top);
        if let Some(condition) = condition {
          self.emit_branch_if_false(condition, &end)?;
        }
        self.emit_block(body)?;
        if let Some(increment) = increment {
          self.emit_expr(increment)?;
          self.emit("pop %rax");
        }
        self.emit(&format!("jmp {top}"));
        self.label(&end);
      }
      Stmt::WhileLoop { condition, body } => {
        let top = self.new_label("while.top");
        let end = self.new_label("while.end");
        self.comment("while");
        self.label(&top);
        self.emit_branch_if_false(condition, &end)?;
        self.emit_block(body)?;
        self.emit(&format!("jmp {top}"));
        self.label(&end);
      }
      Stmt::Import(import) => {
        self.comment(&format!("import \"{}\"", escape_string(import.path())));
      }
    }
    Ok(())
  }

  fn emit_block(&mut self, block: &Block) -> CompileResult<()> {
    for stmt in &block.statements {
      self.emit_stmt(stmt)?;
    }
    Ok(())
  }

  fn emit_branch_if_false(&mut self, condition: &Expr, target: &str) -> CompileResult<()> {
    self.emit_expr(condition)?;
    self.emit("pop %rax");
    self.emit("cmp $0, %rax");
    self.emit(&format!("je {target}"));
    Ok(())
  }

  fn emit_epilogue(&mut self) {
    self.emit("mov %rbp, %rsp");
    self.emit("pop %rbp");
    self.emit("ret");
  }

  /// Lower a function into its own buffer and park it after the entry flow.
  fn emit_function(
    &mut self,
    name: &str,
    parameters: &[String],
    body: &Block,
  ) -> CompileResult<()> {
    if name == ENTRY_SYMBOL {
      return Err(CompileError::codegen(format!(
        "function name `{name}` is reserved for the program entry point"
      )));
    }
    if parameters.len() > ARG_REGS.len() {
      return Err(CompileError::codegen(format!(
        "function `{name}` declares {} parameters, at most {} are supported",
        parameters.len(),
        ARG_REGS.len()
      )));
    }
    if !self.function_names.insert(name.to_string()) {
      return Err(CompileError::codegen(format!(
        "function `{name}` is declared more than once"
      )));
    }

    let outer = std::mem::take(&mut self.text);
    self.function_depth += 1;
    let result = self.emit_function_body(name, parameters, body);
    self.function_depth -= 1;
    let code = std::mem::replace(&mut self.text, outer);
    result?;

    self.functions.push('\n');
    self.functions.push_str(&code);
    Ok(())
  }

  fn emit_function_body(
    &mut self,
    name: &str,
    parameters: &[String],
    body: &Block,
  ) -> CompileResult<()> {
    self.text.push_str(&format!(".global {name}\n"));
    self.label(name);
    self.emit("push %rbp");
    self.emit("mov %rsp, %rbp");

    // Parameters are ordinary process-wide cells filled from the registers.
    for (param, reg) in parameters.iter().zip(ARG_REGS) {
      let symbol = self.ensure_cell(param);
      self.emit(&format!("mov {reg}, {symbol}(%rip)"));
    }

    self.emit_block(body)?;

    if !body.ends_with_return() {
      self.emit("mov $0, %rax");
      self.emit_epilogue();
    }
    Ok(())
  }

  fn emit_return(&mut self, value: Option<&Expr>) -> CompileResult<()> {
    match value {
      Some(value) => {
        self.emit_expr(value)?;
        self.emit("pop %rax");
      }
      None => self.emit("mov $0, %rax"),
    }

    if self.function_depth > 0 {
      self.emit_epilogue();
    } else {
      // Outside any function a return ends the process with that status.
      self.emit("mov %rax, %rdi");
      self.emit("mov $60, %rax");
      self.emit("syscall");
    }
    Ok(())
  }

  /// Emit stack-based code for a single expression node.
  fn emit_expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::NumberLiteral(text) => {
        let value = number_value(text)?;
        self.emit(&format!("mov ${value}, %rax"));
        self.emit("push %rax");
      }
      Expr::AsciiLiteral(text) => {
        let code = ascii_code(text)?;
        self.emit(&format!("mov ${code}, %rax"));
        self.emit("push %rax");
      }
      Expr::StringLiteral(text) => {
        let label = self.new_label("str");
        self
          .strings
          .push_str(&format!("{label}:\n    .asciz \"{}\"\n", escape_string(text)));
        self.emit(&format!("lea {label}(%rip), %rax"));
        self.emit("push %rax");
      }
      Expr::Identifier(name) => {
        let symbol = self.ensure_cell(name);
        self.emit(&format!("mov {symbol}(%rip), %rax"));
        self.emit("push %rax");
      }
      Expr::Index { array, index } => {
        let base = self.array_base(array)?;
        self.emit_expr(index)?;
        self.emit("pop %rdi");
        self.emit(&format!("lea {base}(%rip), %rax"));
        self.emit(&format!("mov (%rax,%rdi,{WORD_SIZE}), %rax"));
        self.emit("push %rax");
      }
      Expr::Assign { target, value } => self.emit_assign(target, value)?,
      Expr::Binary { op, left, right } => {
        self.emit_expr(left)?;
        self.emit_expr(right)?;
        self.emit("pop %rdi");
        self.emit("pop %rax");
        self.emit_binary_op(*op);
        self.emit("push %rax");
      }
      Expr::Call { callee, arguments } => self.emit_call(callee, arguments)?,
    }
    Ok(())
  }

  /// Combine `%rax` (left) and `%rdi` (right) into `%rax`.
  fn emit_binary_op(&mut self, op: BinaryOp) {
    if op.is_comparison() {
      let cc = match op {
        BinaryOp::Eq => "e",
        BinaryOp::Ne => "ne",
        BinaryOp::Lt => "l",
        BinaryOp::Le => "le",
        BinaryOp::Gt => "g",
        _ => "ge",
      };
      self.emit("cmp %rdi, %rax");
      self.emit(&format!("set{cc} %al"));
      self.emit("movzbl %al, %eax");
      return;
    }

    match op {
      BinaryOp::Add => self.emit("add %rdi, %rax"),
      BinaryOp::Sub => self.emit("sub %rdi, %rax"),
      BinaryOp::Mul => self.emit("imul %rdi, %rax"),
      BinaryOp::Div => {
        self.emit("cqo");
        self.emit("idiv %rdi");
      }
      BinaryOp::Mod => {
        self.emit("cqo");
        self.emit("idiv %rdi");
        self.emit("mov %rdx, %rax");
      }
      // Comparisons were handled above.
      _ => {}
    }
  }

  /// Store the value into its target and leave it on the stack as the
  /// value of the whole assignment.
  fn emit_assign(&mut self, target: &Expr, value: &Expr) -> CompileResult<()> {
    match target {
      Expr::Identifier(name) => {
        let symbol = self.ensure_cell(name);
        self.emit_expr(value)?;
        self.emit("pop %rax");
        self.emit(&format!("mov %rax, {symbol}(%rip)"));
      }
      Expr::Index { array, index } => {
        let base = self.array_base(array)?;
        self.emit_expr(value)?;
        self.emit_expr(index)?;
        self.emit("pop %rdi");
        self.emit("pop %rax");
        self.emit(&format!("lea {base}(%rip), %rdx"));
        self.emit(&format!("mov %rax, (%rdx,%rdi,{WORD_SIZE})"));
      }
      other => {
        return Err(CompileError::codegen(format!(
          "invalid assignment target `{other}`"
        )));
      }
    }
    self.emit("push %rax");
    Ok(())
  }

  fn emit_call(&mut self, callee: &Expr, arguments: &[Expr]) -> CompileResult<()> {
    let Some(name) = callee.as_identifier() else {
      return Err(CompileError::codegen(format!(
        "only named functions can be called, got `{callee}`"
      )));
    };
    if arguments.len() > ARG_REGS.len() {
      return Err(CompileError::codegen(format!(
        "call to `{name}` passes {} arguments, at most {} are supported",
        arguments.len(),
        ARG_REGS.len()
      )));
    }

    for arg in arguments {
      self.emit_expr(arg)?;
    }
    for reg in ARG_REGS[..arguments.len()].iter().rev() {
      self.emit(&format!("pop {reg}"));
    }
    self.emit(&format!("call {name}"));
    self.emit("push %rax");
    Ok(())
  }

  /// Symbol of the cell an index expression addresses.
  fn array_base(&mut self, array: &Expr) -> CompileResult<String> {
    let Some(name) = array.as_identifier() else {
      return Err(CompileError::codegen(format!(
        "cannot index into `{array}`, only named arrays are supported"
      )));
    };
    Ok(self.ensure_cell(name))
  }

  /// Assemble the data section, the entry flow and the function bodies.
  fn finish(self) -> String {
    let mut asm = String::new();
    if !self.cells.is_empty() || !self.strings.is_empty() {
      asm.push_str(".data\n");
      for cell in &self.cells {
        asm.push_str(&format!("{}:\n", cell_symbol(&cell.name)));
        if cell.words == 1 {
          asm.push_str("    .quad 0\n");
        } else {
          asm.push_str(&format!("    .zero {}\n", cell.words * WORD_SIZE));
        }
      }
      asm.push_str(&self.strings);
      asm.push('\n');
    }

    asm.push_str(".text\n");
    asm.push_str(&format!(".global {ENTRY_SYMBOL}\n"));
    asm.push_str(&format!("{ENTRY_SYMBOL}:\n"));
    asm.push_str(&self.text);
    asm.push_str(&self.functions);
    asm
  }
}

/// Number of 8-byte words a declaration needs.
fn storage_words(name: &str, kind: &VarKind) -> CompileResult<usize> {
  match kind {
    VarKind::Scalar | VarKind::Array { size: None } => Ok(1),
    VarKind::Array {
      size: Some(Expr::NumberLiteral(text)),
    } => {
      let words = text.parse::<usize>().map_err(|err| {
        CompileError::codegen(format!("invalid size `{text}` for array `{name}`: {err}"))
      })?;
      Ok(words.max(1))
    }
    VarKind::Array { size: Some(other) } => Err(CompileError::codegen(format!(
      "size of array `{name}` must be an integer literal, got `{other}`"
    ))),
  }
}

/// Decimal value of a number literal. Leading zeros stay decimal.
fn number_value(text: &str) -> CompileResult<i64> {
  text
    .parse::<i64>()
    .map_err(|err| CompileError::codegen(format!("invalid number literal `{text}`: {err}")))
}

/// Decode a character-code literal such as `65a`.
fn ascii_code(text: &str) -> CompileResult<i64> {
  let Some(digits) = text.strip_suffix('a') else {
    return Err(CompileError::codegen(format!(
      "character code `{text}` is missing its `a` marker"
    )));
  };
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return Err(CompileError::codegen(format!(
      "character code `{text}` has no digits"
    )));
  }
  digits
    .parse::<i64>()
    .map_err(|err| CompileError::codegen(format!("invalid character code `{text}`: {err}")))
}

/// Escape string bytes for an `.asciz` directive.
fn escape_string(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for byte in text.bytes() {
    match byte {
      b'\\' => out.push_str("\\\\"),
      b'"' => out.push_str("\\\""),
      b'\n' => out.push_str("\\n"),
      b'\t' => out.push_str("\\t"),
      0x20..=0x7e => out.push(byte as char),
      _ => out.push_str(&format!("\\{byte:03o}")),
    }
  }
  out
}
