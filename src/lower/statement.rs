use tracing::debug;

use super::{CatchTarget, LoweringContext};
use crate::{
    error::{LoweringError, ValueKind},
    frontend::ast::{Block, Expression, Statement},
    ir::{BinaryOperator, IntPredicate, Signature, Type},
};

impl LoweringContext {
    /// Lowers statements in order, stopping once the current block has been
    /// terminated since nothing after that point is reachable
    pub(super) fn lower_body(
        &mut self,
        body: &Block,
        catch: CatchTarget,
    ) -> Result<(), LoweringError> {
        for statement in body {
            self.lower_statement(statement, catch)?;

            if self.current_block_is_terminated() {
                break;
            }
        }

        Ok(())
    }

    pub(super) fn lower_statement(
        &mut self,
        statement: &Statement,
        catch: CatchTarget,
    ) -> Result<(), LoweringError> {
        match statement {
            Statement::Let { name, value } => self.lower_let(name, value, catch),
            Statement::Assign { name, value } => {
                let (value, _) = self.lower_expression(value, catch)?;
                let slot = self.scopes.lookup(name)?;
                self.builder.build_store(value, slot);

                Ok(())
            }
            Statement::Output(value) => self.lower_output(value, catch),
            Statement::If {
                condition,
                positive,
                negative,
            } => self.lower_if(condition, positive, negative, catch),
            Statement::While { condition, body } => self.lower_while(condition, body, catch),
            Statement::For {
                variable,
                start,
                end,
                body,
            } => self.lower_for(variable, *start, *end, body, catch),
            Statement::FunctionDeclaration {
                name,
                parameters,
                body,
            } => self.lower_function(name, parameters, body),
            Statement::Return(value) => {
                let (value, _) = self.lower_expression(value, catch)?;
                self.builder.build_return(value);

                Ok(())
            }
            Statement::TryCatch { body, handler } => self.lower_try_catch(body, handler, catch),
        }
    }

    fn lower_let(
        &mut self,
        name: &str,
        value: &Expression,
        catch: CatchTarget,
    ) -> Result<(), LoweringError> {
        let (value, _) = self.lower_expression(value, catch)?;
        let ty = self.builder.type_of(value);

        let slot = self.builder.build_entry_alloca(ty, name);
        self.builder.build_store(value, slot);
        self.scopes.bind(name, slot)?;

        debug!(variable = name, %ty, "bound variable");

        Ok(())
    }

    fn lower_output(
        &mut self,
        value: &Expression,
        catch: CatchTarget,
    ) -> Result<(), LoweringError> {
        let (value, kind) = self.lower_expression(value, catch)?;

        let format = match kind {
            ValueKind::Float => "%f\n",
            ValueKind::Int | ValueKind::Bool => "%d\n",
        };
        let format = self.builder.global_string("fmt", format);

        self.builder.build_call(self.printf, vec![format, value], "");

        Ok(())
    }

    fn lower_if(
        &mut self,
        condition: &Expression,
        positive: &Block,
        negative: &Block,
        catch: CatchTarget,
    ) -> Result<(), LoweringError> {
        let condition = self.lower_condition(condition, catch)?;

        let then_block = self.append_block("if.then");
        let else_block = self.append_block("if.else");
        let merge_block = self.append_block("if.merge");

        self.builder.build_conditional_branch(condition, then_block, else_block);

        self.builder.position_at_end(then_block);
        self.lower_body(positive, catch)?;
        self.branch_unless_terminated(merge_block);

        self.builder.position_at_end(else_block);
        self.lower_body(negative, catch)?;
        self.branch_unless_terminated(merge_block);

        self.builder.position_at_end(merge_block);

        Ok(())
    }

    fn lower_while(
        &mut self,
        condition: &Expression,
        body: &Block,
        catch: CatchTarget,
    ) -> Result<(), LoweringError> {
        let cond_block = self.append_block("while.cond");
        let body_block = self.append_block("while.body");
        let end_block = self.append_block("while.end");

        self.builder.build_branch(cond_block);

        self.builder.position_at_end(cond_block);
        let condition = self.lower_condition(condition, catch)?;
        self.builder.build_conditional_branch(condition, body_block, end_block);

        self.builder.position_at_end(body_block);
        self.lower_body(body, catch)?;
        self.branch_unless_terminated(cond_block);

        self.builder.position_at_end(end_block);

        Ok(())
    }

    /// `for variable = start to end` runs while `variable <= end`, the
    /// variable is only bound inside the loop
    fn lower_for(
        &mut self,
        variable: &str,
        start: i32,
        end: i32,
        body: &Block,
        catch: CatchTarget,
    ) -> Result<(), LoweringError> {
        let mark = self.scopes.mark();

        let counter = self.builder.build_entry_alloca(Type::I32, variable);
        let start = self.builder.const_int(start);
        self.builder.build_store(start, counter);
        self.scopes.bind(variable, counter)?;

        let cond_block = self.append_block("for.cond");
        let body_block = self.append_block("for.body");
        let inc_block = self.append_block("for.inc");
        let end_block = self.append_block("for.end");

        self.builder.build_branch(cond_block);

        self.builder.position_at_end(cond_block);
        let current = self.builder.build_load(counter, variable);
        let end = self.builder.const_int(end);
        let in_range = self.builder.build_int_compare(IntPredicate::Sle, current, end, "forcond");
        self.builder.build_conditional_branch(in_range, body_block, end_block);

        self.builder.position_at_end(body_block);
        self.lower_body(body, catch)?;
        self.branch_unless_terminated(inc_block);

        self.builder.position_at_end(inc_block);
        let current = self.builder.build_load(counter, variable);
        let one = self.builder.const_int(1);
        let next = self.builder.build_binary(BinaryOperator::Add, current, one, "nextvar");
        self.builder.build_store(next, counter);
        self.builder.build_branch(cond_block);

        self.builder.position_at_end(end_block);
        self.scopes.restore(mark);

        Ok(())
    }

    /// Functions take and return `i32`. The body is lowered into the module
    /// namespace wherever the declaration appears, then the builder returns
    /// to the block it was lowering before.
    fn lower_function(
        &mut self,
        name: &str,
        parameters: &[String],
        body: &Block,
    ) -> Result<(), LoweringError> {
        let function = self.builder.declare_function(
            name,
            Signature {
                parameters: vec![Type::I32; parameters.len()],
                return_type: Type::I32,
                is_variadic: false,
            },
        );

        let caller_block = self.builder.insert_block();
        let mark = self.scopes.mark();

        let entry = self.builder.append_block(function, "entry");
        self.builder.position_at_end(entry);

        for (index, parameter) in parameters.iter().enumerate() {
            let slot = self.builder.build_entry_alloca(Type::I32, parameter);
            let argument = self.builder.parameter(function, index);
            self.builder.build_store(argument, slot);
            self.scopes.bind(parameter, slot)?;
        }

        // A division by zero inside a function is never caught by a `try`
        // around the declaration
        self.lower_body(body, None)?;

        if !self.current_block_is_terminated() {
            let zero = self.builder.const_int(0);
            self.builder.build_return(zero);
        }

        self.scopes.restore(mark);

        if let Some(block) = caller_block {
            self.builder.position_at_end(block);
        }

        debug!(function = name, parameters = parameters.len(), "lowered function");

        Ok(())
    }

    /// The try body gets its own catch block as target; the handler has no
    /// target of its own
    fn lower_try_catch(
        &mut self,
        body: &Block,
        handler: &Block,
        _outer: CatchTarget,
    ) -> Result<(), LoweringError> {
        let try_block = self.append_block("try");
        let catch_block = self.append_block("catch");
        let after_block = self.append_block("try.end");

        self.builder.build_branch(try_block);

        self.builder.position_at_end(try_block);
        self.lower_body(body, Some(catch_block))?;
        self.branch_unless_terminated(after_block);

        self.builder.position_at_end(catch_block);
        self.lower_body(handler, None)?;
        self.branch_unless_terminated(after_block);

        self.builder.position_at_end(after_block);

        Ok(())
    }
}
