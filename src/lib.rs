pub mod error;
pub mod frontend;
mod index;
pub mod ir;
pub mod lower;

use std::path::Path;

use tracing::info;

pub use crate::error::{CompileError, LoweringError, Trap};
use crate::frontend::{SourceFile, SyntaxError, parser::Parser};

impl CompileError {
    fn from_syntax(source_file: &SourceFile, error: SyntaxError) -> Self {
        let (line, column) = source_file.line_and_column(error.span.start);

        Self::Syntax {
            line,
            column,
            message: error.message,
        }
    }
}

/// Parses, lowers and verifies a chainlang program
pub fn compile_source(source_file: &SourceFile) -> Result<ir::Module, CompileError> {
    let program = Parser::parse_program(source_file)
        .map_err(|error| CompileError::from_syntax(source_file, error))?;

    info!(
        origin = %source_file.origin,
        statements = program.statements.len(),
        "parsed program"
    );

    Ok(lower::lower_program(lower::DEFAULT_MODULE_NAME, &program)?)
}

/// Compiles a program and writes its IR to `path`. Nothing is written if
/// compilation fails.
pub fn compile_to_artifact(
    source_file: &SourceFile,
    path: &Path,
) -> Result<ir::Module, CompileError> {
    let module = compile_source(source_file)?;
    lower::write_artifact(&module, path)?;

    Ok(module)
}
