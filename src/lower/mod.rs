//! Lowering of the chainlang syntax tree into the SSA IR.
//!
//! All state lives in a [`LoweringContext`]: the module under construction,
//! the builder's insertion point and the [`ScopeTable`]. Statements and
//! expressions are lowered against whatever block the builder is currently
//! positioned at, and any of them may leave it positioned somewhere else.

use std::path::Path;

use tracing::{debug, info};

use crate::{
    error::LoweringError,
    frontend::ast::Program,
    ir::{
        BlockId, FunctionId, Module, Signature, Type, builder::Builder,
        pretty_print::module_to_string, verify::verify_module,
    },
};

mod expression;
pub mod scope;
mod statement;

pub use self::scope::{SCOPE_CAPACITY, ScopeTable};

pub const DEFAULT_MODULE_NAME: &str = "chainlang";

/// Block a guarded integer division jumps to when its divisor is zero
pub type CatchTarget = Option<BlockId>;

pub struct LoweringContext {
    builder: Builder,
    scopes: ScopeTable,
    printf: FunctionId,
    main: FunctionId,
}

impl LoweringContext {
    /// Fresh module with the print intrinsic declared and the builder
    /// positioned in the entry block of the implicit `main`
    pub fn new(module_name: &str) -> Self {
        let mut builder = Builder::new(module_name);

        let printf = builder.declare_function(
            "printf",
            Signature {
                parameters: vec![Type::Ptr],
                return_type: Type::I32,
                is_variadic: true,
            },
        );

        let main = builder.declare_function(
            "main",
            Signature {
                parameters: Vec::new(),
                return_type: Type::I32,
                is_variadic: false,
            },
        );

        let entry = builder.append_block(main, "entry");
        builder.position_at_end(entry);

        debug!(module = module_name, "initialized lowering context");

        Self {
            builder,
            scopes: ScopeTable::new(),
            printf,
            main,
        }
    }

    /// Lowers every top level statement into `main`
    pub fn lower_program(&mut self, program: &Program) -> Result<(), LoweringError> {
        self.lower_body(&program.statements, None)
    }

    /// Terminates `main` and verifies the module
    pub fn finish(mut self) -> Result<Module, LoweringError> {
        if let Some(block) = self.builder.insert_block() {
            if self.builder.current_function() == Some(self.main)
                && !self.builder.is_terminated(block)
            {
                let zero = self.builder.const_int(0);
                self.builder.build_return(zero);
            }
        }

        let module = self.builder.finish();

        verify_module(&module)
            .map_err(|diagnostics| LoweringError::VerificationFailed { diagnostics })?;

        info!(
            functions = module.functions.len(),
            blocks = module.blocks.len(),
            "module verified"
        );

        Ok(module)
    }

    fn current_function(&self) -> FunctionId {
        self.builder.current_function().unwrap_or(self.main)
    }

    fn current_block(&self) -> Option<BlockId> {
        self.builder.insert_block()
    }

    fn current_block_is_terminated(&self) -> bool {
        self.current_block()
            .is_some_and(|block| self.builder.is_terminated(block))
    }

    fn append_block(&mut self, name: &str) -> BlockId {
        let function = self.current_function();
        self.builder.append_block(function, name)
    }

    /// Branches to `destination` unless the current block already ended
    fn branch_unless_terminated(&mut self, destination: BlockId) {
        if !self.current_block_is_terminated() {
            self.builder.build_branch(destination);
        }
    }
}

/// Lowers and verifies a whole program in a fresh module
pub fn lower_program(module_name: &str, program: &Program) -> Result<Module, LoweringError> {
    let mut context = LoweringContext::new(module_name);
    context.lower_program(program)?;
    context.finish()
}

/// Serializes `module` to `path`
pub fn write_artifact(module: &Module, path: &Path) -> Result<(), LoweringError> {
    std::fs::write(path, module_to_string(module)).map_err(|source| {
        LoweringError::ArtifactWriteFailed {
            path: path.to_owned(),
            source,
        }
    })?;

    info!(path = %path.display(), "wrote IR artifact");

    Ok(())
}
