use tracing::trace;

use super::{CatchTarget, LoweringContext};
use crate::{
    error::{LoweringError, SymbolKind, ValueKind},
    frontend::ast::{BinaryOperatorClass, BinaryOperatorKind, Expression, UnaryOperatorKind},
    ir::{BinaryOperator, FloatPredicate, IntPredicate, Type, ValueId},
};

/// A lowered expression: its IR value and scalar kind
pub(super) type Lowered = (ValueId, ValueKind);

impl LoweringContext {
    pub(super) fn lower_expression(
        &mut self,
        expression: &Expression,
        catch: CatchTarget,
    ) -> Result<Lowered, LoweringError> {
        match expression {
            Expression::IntLiteral(value) => Ok((self.builder.const_int(*value), ValueKind::Int)),
            Expression::FloatLiteral(value) => {
                Ok((self.builder.const_float(*value), ValueKind::Float))
            }
            Expression::Variable(name) => {
                let slot = self.scopes.lookup(name)?;
                let value = self.builder.build_load(slot, name);

                Ok((value, self.kind_of(value)))
            }
            Expression::Binary { lhs, operator, rhs } => match operator.class() {
                BinaryOperatorClass::Logical => {
                    self.lower_short_circuit(lhs, *operator, rhs, catch)
                }
                _ => self.lower_binary(lhs, *operator, rhs, catch),
            },
            Expression::Unary {
                operator: UnaryOperatorKind::LogicalNot,
                operand,
            } => {
                let condition = self.lower_condition(operand, catch)?;
                let inverted = self.builder.build_not(condition, "nottmp");

                Ok((inverted, ValueKind::Bool))
            }
            Expression::FunctionCall { name, arguments } => self.lower_call(name, arguments, catch),
        }
    }

    fn kind_of(&self, value: ValueId) -> ValueKind {
        match self.builder.type_of(value) {
            Type::F32 => ValueKind::Float,
            Type::Bool => ValueKind::Bool,
            _ => ValueKind::Int,
        }
    }

    /// Lowers `expression` and compares it against zero unless it already is
    /// an `i1`
    pub(super) fn lower_condition(
        &mut self,
        expression: &Expression,
        catch: CatchTarget,
    ) -> Result<ValueId, LoweringError> {
        let (value, kind) = self.lower_expression(expression, catch)?;

        Ok(self.coerce_to_bool(value, kind))
    }

    fn coerce_to_bool(&mut self, value: ValueId, kind: ValueKind) -> ValueId {
        match kind {
            ValueKind::Bool => value,
            ValueKind::Int => {
                let zero = self.builder.const_int(0);
                self.builder.build_int_compare(IntPredicate::Ne, value, zero, "tobool")
            }
            ValueKind::Float => {
                let zero = self.builder.const_float(0.0);
                self.builder.build_float_compare(FloatPredicate::One, value, zero, "tobool")
            }
        }
    }

    /// `&&` and `||` only evaluate their right operand when it can change the
    /// result. The outcome is merged with a phi in a fresh block.
    fn lower_short_circuit(
        &mut self,
        lhs: &Expression,
        operator: BinaryOperatorKind,
        rhs: &Expression,
        catch: CatchTarget,
    ) -> Result<Lowered, LoweringError> {
        let is_and = operator == BinaryOperatorKind::LogicalAnd;
        let prefix = if is_and { "and" } else { "or" };

        let rhs_block = self.append_block(&format!("{prefix}.rhs"));
        let skip_block = self.append_block(&format!("{prefix}.skip"));
        let merge_block = self.append_block(&format!("{prefix}.merge"));

        let lhs = self.lower_condition(lhs, catch)?;

        if is_and {
            self.builder.build_conditional_branch(lhs, rhs_block, skip_block);
        } else {
            self.builder.build_conditional_branch(lhs, skip_block, rhs_block);
        }

        self.builder.position_at_end(skip_block);
        // `false && _` is false, `true || _` is true
        let short_circuit = self.builder.const_bool(!is_and);
        self.builder.build_branch(merge_block);

        self.builder.position_at_end(rhs_block);
        let rhs = self.lower_condition(rhs, catch)?;
        let rhs_end = self.current_block().unwrap_or(rhs_block);
        self.builder.build_branch(merge_block);

        self.builder.position_at_end(merge_block);
        let merged = self.builder.build_phi(
            Type::Bool,
            vec![(short_circuit, skip_block), (rhs, rhs_end)],
            &format!("{prefix}tmp"),
        );

        trace!(operator = %operator, "lowered short circuit");

        Ok((merged, ValueKind::Bool))
    }

    fn lower_binary(
        &mut self,
        lhs: &Expression,
        operator: BinaryOperatorKind,
        rhs: &Expression,
        catch: CatchTarget,
    ) -> Result<Lowered, LoweringError> {
        let (lhs, lhs_kind) = self.lower_expression(lhs, catch)?;
        let (rhs, rhs_kind) = self.lower_expression(rhs, catch)?;

        let unsupported = |kind| LoweringError::UnsupportedOperation {
            operator: operator.to_string(),
            kind,
        };

        match (lhs_kind, rhs_kind) {
            (ValueKind::Bool, _) => Err(unsupported(ValueKind::Bool)),
            (lhs_kind, rhs_kind) if lhs_kind != rhs_kind => Err(unsupported(rhs_kind)),
            (ValueKind::Float, _) => Ok(self.lower_float_binary(lhs, operator, rhs)),
            _ => Ok(self.lower_int_binary(lhs, operator, rhs, catch)),
        }
    }

    fn lower_int_binary(
        &mut self,
        lhs: ValueId,
        operator: BinaryOperatorKind,
        rhs: ValueId,
        catch: CatchTarget,
    ) -> Lowered {
        let arithmetic = match operator {
            BinaryOperatorKind::Add => Some((BinaryOperator::Add, "addtmp")),
            BinaryOperatorKind::Subtract => Some((BinaryOperator::Sub, "subtmp")),
            BinaryOperatorKind::Multiply => Some((BinaryOperator::Mul, "multmp")),
            BinaryOperatorKind::Divide => {
                return (self.lower_int_division(lhs, rhs, catch), ValueKind::Int);
            }
            _ => None,
        };

        if let Some((instruction, name)) = arithmetic {
            return (
                self.builder.build_binary(instruction, lhs, rhs, name),
                ValueKind::Int,
            );
        }

        let predicate = match operator {
            BinaryOperatorKind::Equals => IntPredicate::Eq,
            BinaryOperatorKind::NotEquals => IntPredicate::Ne,
            BinaryOperatorKind::LessThan => IntPredicate::Slt,
            BinaryOperatorKind::LessThanOrEqualTo => IntPredicate::Sle,
            BinaryOperatorKind::GreaterThan => IntPredicate::Sgt,
            BinaryOperatorKind::GreaterThanOrEqualTo => IntPredicate::Sge,
            _ => unreachable!("logical operators are lowered by lower_short_circuit"),
        };

        (
            self.builder.build_int_compare(predicate, lhs, rhs, "cmptmp"),
            ValueKind::Bool,
        )
    }

    /// With a catch target, a zero divisor branches there and the division
    /// continues in a fresh `div` block
    fn lower_int_division(&mut self, lhs: ValueId, rhs: ValueId, catch: CatchTarget) -> ValueId {
        if let Some(catch) = catch {
            let zero = self.builder.const_int(0);
            let is_zero = self.builder.build_int_compare(IntPredicate::Eq, rhs, zero, "divzero");
            let div_block = self.append_block("div");

            self.builder.build_conditional_branch(is_zero, catch, div_block);
            self.builder.position_at_end(div_block);
        }

        self.builder.build_binary(BinaryOperator::SDiv, lhs, rhs, "divtmp")
    }

    fn lower_float_binary(
        &mut self,
        lhs: ValueId,
        operator: BinaryOperatorKind,
        rhs: ValueId,
    ) -> Lowered {
        let arithmetic = match operator {
            BinaryOperatorKind::Add => Some((BinaryOperator::FAdd, "addtmp")),
            BinaryOperatorKind::Subtract => Some((BinaryOperator::FSub, "subtmp")),
            BinaryOperatorKind::Multiply => Some((BinaryOperator::FMul, "multmp")),
            BinaryOperatorKind::Divide => Some((BinaryOperator::FDiv, "divtmp")),
            _ => None,
        };

        if let Some((instruction, name)) = arithmetic {
            return (
                self.builder.build_binary(instruction, lhs, rhs, name),
                ValueKind::Float,
            );
        }

        let predicate = match operator {
            BinaryOperatorKind::Equals => FloatPredicate::Oeq,
            BinaryOperatorKind::NotEquals => FloatPredicate::One,
            BinaryOperatorKind::LessThan => FloatPredicate::Olt,
            BinaryOperatorKind::LessThanOrEqualTo => FloatPredicate::Ole,
            BinaryOperatorKind::GreaterThan => FloatPredicate::Ogt,
            BinaryOperatorKind::GreaterThanOrEqualTo => FloatPredicate::Oge,
            _ => unreachable!("logical operators are lowered by lower_short_circuit"),
        };

        (
            self.builder.build_float_compare(predicate, lhs, rhs, "cmptmp"),
            ValueKind::Bool,
        )
    }

    fn lower_call(
        &mut self,
        name: &str,
        arguments: &[Expression],
        catch: CatchTarget,
    ) -> Result<Lowered, LoweringError> {
        // Resolved before the arguments so a bad call site emits nothing. The
        // print intrinsic is not callable from source.
        let callee = self
            .builder
            .function_named(name)
            .filter(|callee| *callee != self.printf)
            .ok_or_else(|| LoweringError::UndefinedSymbol {
                kind: SymbolKind::Function,
                name: name.to_owned(),
            })?;

        let arguments = arguments
            .iter()
            .map(|argument| {
                self.lower_expression(argument, catch)
                    .map(|(value, _)| value)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let value = self.builder.build_call(callee, arguments, "calltmp");

        Ok((value, self.kind_of(value)))
    }
}
