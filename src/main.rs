use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use snafu::ResultExt;

use manuc::error::{ReadSourceSnafu, WriteListingSnafu};
use manuc::{CompileError, CompileResult, compile_program, parser};

#[derive(Parser, Debug)]
#[command(
  name = "manuc",
  version,
  about = "Compile a .manu source file into x86-64 assembly"
)]
struct Cli {
  /// Source file to compile.
  input: PathBuf,
  /// Where to write the assembly listing.
  #[arg(short = 'o', long = "output", value_name = "FILE", default_value = "output.asm")]
  output: PathBuf,
  /// Print the parsed tree to stdout before generating code.
  #[arg(long = "dump-ast")]
  dump_ast: bool,
}

fn run(cli: &Cli) -> CompileResult<()> {
  let source = fs::read_to_string(&cli.input).context(ReadSourceSnafu { path: &cli.input })?;

  let program = parser::parse(&source)?;
  if cli.dump_ast {
    println!("{program:#?}");
  }
  let asm = compile_program(&program)?;

  fs::write(&cli.output, asm).context(WriteListingSnafu { path: &cli.output })?;
  Ok(())
}

fn main() {
  let cli = Cli::parse();

  match run(&cli) {
    Ok(()) => println!(
      "Transpilation successful! Assembly code written to {}",
      cli.output.display()
    ),
    Err(CompileError::Parse { errors }) => {
      for err in &errors {
        eprintln!("{err}");
      }
      eprintln!("{} syntax error(s), no output written", errors.len());
      process::exit(1);
    }
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_defaults_to_output_asm() {
    let cli = Cli::try_parse_from(["manuc", "prog.manu"]).unwrap();
    assert_eq!(cli.input, PathBuf::from("prog.manu"));
    assert_eq!(cli.output, PathBuf::from("output.asm"));
    assert!(!cli.dump_ast);
  }

  #[test]
  fn flags_are_parsed() {
    let cli = Cli::try_parse_from(["manuc", "a.manu", "-o", "a.s", "--dump-ast"]).unwrap();
    assert_eq!(cli.output, PathBuf::from("a.s"));
    assert!(cli.dump_ast);
  }

  #[test]
  fn input_is_required() {
    assert!(Cli::try_parse_from(["manuc"]).is_err());
  }

  #[test]
  fn missing_input_reports_read_failure() {
    let cli = Cli::try_parse_from(["manuc", "/nonexistent/dir/prog.manu"]).unwrap();
    let err = run(&cli).unwrap_err();
    assert!(matches!(err, CompileError::ReadSource { .. }));
  }
}
