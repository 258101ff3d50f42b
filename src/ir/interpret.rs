//! Reference interpreter for verified modules.
//!
//! Slots created by `alloca` live in a memory vector shared by all frames and
//! are released when the frame that created them returns. The only external
//! function understood is `printf`, whose output is captured.

use hashbrown::HashMap;
use tracing::trace;

use super::{
    BinaryOperator, BlockId, Constant, FloatPredicate, FunctionId, GlobalId, Instruction,
    IntPredicate, Module, ValueId, ValueKind,
};
use crate::error::Trap;

pub const MAX_CALL_DEPTH: usize = 1024;

const INTERPRETER_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Outcome of running a module to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub exit_code: i32,
    pub stdout: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RuntimeValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Slot(usize),
    Global(GlobalId),
    Void,
}

/// Runs `@main` and returns its exit code with everything it printed
pub fn run(module: &Module) -> Result<Execution, Trap> {
    let main = module
        .function_named("main")
        .filter(|main| !module.functions[*main].is_declaration())
        .ok_or(Trap::UndefinedEntry)?;

    // Deep guest recursion needs far more native stack than a default thread has
    let (exit_code, stdout) = std::thread::scope(|scope| {
        let handle = std::thread::Builder::new()
            .name("interpreter".to_owned())
            .stack_size(INTERPRETER_STACK_SIZE)
            .spawn_scoped(scope, || -> Result<(i32, String), Trap> {
                let mut interpreter = Interpreter {
                    module,
                    memory: Vec::new(),
                    stdout: String::new(),
                    depth: 0,
                };

                let exit_code = match interpreter.call(main, Vec::new())? {
                    RuntimeValue::Int(code) => code,
                    RuntimeValue::Bool(flag) => flag as i32,
                    _ => 0,
                };

                Ok((exit_code, interpreter.stdout))
            })
            .map_err(|error| Trap::Malformed(format!("could not start interpreter: {error}")))?;

        handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })?;

    Ok(Execution { exit_code, stdout })
}

struct Interpreter<'m> {
    module: &'m Module,
    memory: Vec<Option<RuntimeValue>>,
    stdout: String,
    depth: usize,
}

/// SSA values of one activation
struct Frame {
    values: HashMap<ValueId, RuntimeValue>,
}

impl Interpreter<'_> {
    fn call(
        &mut self,
        function: FunctionId,
        arguments: Vec<RuntimeValue>,
    ) -> Result<RuntimeValue, Trap> {
        let module = self.module;
        let definition = &module.functions[function];

        if definition.is_declaration() {
            return self.call_external(&definition.name, &arguments);
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(Trap::CallDepthExceeded {
                limit: MAX_CALL_DEPTH,
            });
        }

        trace!(function = %definition.name, depth = self.depth, "enter");

        self.depth += 1;
        let memory_mark = self.memory.len();

        let mut frame = Frame {
            values: definition
                .parameters
                .iter()
                .copied()
                .zip(arguments)
                .collect(),
        };

        let result = self.execute(&mut frame, function);

        self.memory.truncate(memory_mark);
        self.depth -= 1;

        result
    }

    fn execute(&mut self, frame: &mut Frame, function: FunctionId) -> Result<RuntimeValue, Trap> {
        let module = self.module;
        let mut previous: Option<BlockId> = None;
        let mut current = module.functions[function]
            .entry_block()
            .ok_or_else(|| Trap::Malformed("function has no entry block".to_owned()))?;

        'blocks: loop {
            let instructions = &module.blocks[current].instructions;

            // Phis read their inputs before any of them is written
            let mut phi_results = Vec::new();
            for id in instructions {
                let Some(Instruction::Phi { incoming }) = module.instruction(*id) else {
                    break;
                };

                let (value, _) = incoming
                    .iter()
                    .find(|(_, block)| Some(*block) == previous)
                    .ok_or_else(|| Trap::Malformed("phi has no edge for predecessor".to_owned()))?;

                phi_results.push((*id, self.operand(frame, *value)?));
            }
            let phi_count = phi_results.len();
            frame.values.extend(phi_results);

            for id in &instructions[phi_count..] {
                let Some(instruction) = module.instruction(*id) else {
                    return Err(Trap::Malformed("block contains a non-instruction".to_owned()));
                };

                match instruction {
                    Instruction::Branch { destination } => {
                        previous = Some(current);
                        current = *destination;
                        continue 'blocks;
                    }
                    Instruction::ConditionalBranch {
                        condition,
                        positive,
                        negative,
                    } => {
                        let taken = match self.operand(frame, *condition)? {
                            RuntimeValue::Bool(flag) => flag,
                            other => return Err(unexpected("i1", other)),
                        };

                        previous = Some(current);
                        current = if taken { *positive } else { *negative };
                        continue 'blocks;
                    }
                    Instruction::Return { value } => return self.operand(frame, *value),
                    _ => {
                        let result = self.evaluate(frame, instruction)?;
                        frame.values.insert(*id, result);
                    }
                }
            }

            return Err(Trap::Malformed(format!(
                "block {} falls off its end",
                super::pretty_print::block_label(module, current)
            )));
        }
    }

    fn operand(&self, frame: &Frame, value: ValueId) -> Result<RuntimeValue, Trap> {
        match &self.module.values[value].kind {
            ValueKind::Constant(Constant::Int(v)) => Ok(RuntimeValue::Int(*v)),
            ValueKind::Constant(Constant::Float(v)) => Ok(RuntimeValue::Float(*v)),
            ValueKind::Constant(Constant::Bool(v)) => Ok(RuntimeValue::Bool(*v)),
            ValueKind::Global(global) => Ok(RuntimeValue::Global(*global)),
            ValueKind::Parameter { .. } | ValueKind::Instruction { .. } => frame
                .values
                .get(&value)
                .copied()
                .ok_or_else(|| Trap::Malformed("use of a value before its definition".to_owned())),
        }
    }

    fn evaluate(&mut self, frame: &Frame, instruction: &Instruction) -> Result<RuntimeValue, Trap> {
        Ok(match instruction {
            Instruction::Alloca { .. } => {
                self.memory.push(None);
                RuntimeValue::Slot(self.memory.len() - 1)
            }
            Instruction::Load { slot } => {
                let address = self.address(frame, *slot)?;
                self.memory
                    .get(address)
                    .copied()
                    .flatten()
                    .ok_or(Trap::UninitializedLoad)?
            }
            Instruction::Store { value, slot } => {
                let value = self.operand(frame, *value)?;
                let address = self.address(frame, *slot)?;

                match self.memory.get_mut(address) {
                    Some(cell) => *cell = Some(value),
                    None => return Err(Trap::Malformed("store to a released slot".to_owned())),
                }

                RuntimeValue::Void
            }
            Instruction::Binary { operator, lhs, rhs } => {
                let lhs = self.operand(frame, *lhs)?;
                let rhs = self.operand(frame, *rhs)?;
                binary(*operator, lhs, rhs)?
            }
            Instruction::IntCompare {
                predicate,
                lhs,
                rhs,
            } => {
                let lhs = self.int_operand(frame, *lhs)?;
                let rhs = self.int_operand(frame, *rhs)?;

                RuntimeValue::Bool(match predicate {
                    IntPredicate::Eq => lhs == rhs,
                    IntPredicate::Ne => lhs != rhs,
                    IntPredicate::Slt => lhs < rhs,
                    IntPredicate::Sgt => lhs > rhs,
                    IntPredicate::Sle => lhs <= rhs,
                    IntPredicate::Sge => lhs >= rhs,
                })
            }
            Instruction::FloatCompare {
                predicate,
                lhs,
                rhs,
            } => {
                let (lhs, rhs) = match (self.operand(frame, *lhs)?, self.operand(frame, *rhs)?) {
                    (RuntimeValue::Float(lhs), RuntimeValue::Float(rhs)) => (lhs, rhs),
                    (other, _) => return Err(unexpected("float", other)),
                };

                // Ordered predicates are false whenever an operand is NaN
                let ordered = !lhs.is_nan() && !rhs.is_nan();

                RuntimeValue::Bool(
                    ordered
                        && match predicate {
                            FloatPredicate::Oeq => lhs == rhs,
                            FloatPredicate::One => lhs != rhs,
                            FloatPredicate::Olt => lhs < rhs,
                            FloatPredicate::Ogt => lhs > rhs,
                            FloatPredicate::Ole => lhs <= rhs,
                            FloatPredicate::Oge => lhs >= rhs,
                        },
                )
            }
            Instruction::Not { operand } => match self.operand(frame, *operand)? {
                RuntimeValue::Bool(flag) => RuntimeValue::Bool(!flag),
                RuntimeValue::Int(value) => RuntimeValue::Int(!value),
                other => return Err(unexpected("i1", other)),
            },
            Instruction::Call { callee, arguments } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| self.operand(frame, *argument))
                    .collect::<Result<Vec<_>, _>>()?;

                self.call(*callee, arguments)?
            }
            Instruction::Phi { .. }
            | Instruction::Branch { .. }
            | Instruction::ConditionalBranch { .. }
            | Instruction::Return { .. } => {
                return Err(Trap::Malformed(
                    "phi or terminator in the middle of a block".to_owned(),
                ));
            }
        })
    }

    fn address(&self, frame: &Frame, slot: ValueId) -> Result<usize, Trap> {
        match self.operand(frame, slot)? {
            RuntimeValue::Slot(address) => Ok(address),
            other => Err(unexpected("ptr", other)),
        }
    }

    fn int_operand(&self, frame: &Frame, value: ValueId) -> Result<i32, Trap> {
        match self.operand(frame, value)? {
            RuntimeValue::Int(value) => Ok(value),
            other => Err(unexpected("i32", other)),
        }
    }

    fn call_external(
        &mut self,
        name: &str,
        arguments: &[RuntimeValue],
    ) -> Result<RuntimeValue, Trap> {
        if name != "printf" {
            return Err(Trap::UnknownExternal {
                name: name.to_owned(),
            });
        }

        let Some((RuntimeValue::Global(format), rest)) = arguments.split_first() else {
            return Err(Trap::Malformed("printf needs a format string".to_owned()));
        };

        let printed = format_printf(&self.module.globals[*format].contents, rest)?;
        let written = printed.len();
        self.stdout.push_str(&printed);

        Ok(RuntimeValue::Int(written as i32))
    }
}

fn binary(
    operator: BinaryOperator,
    lhs: RuntimeValue,
    rhs: RuntimeValue,
) -> Result<RuntimeValue, Trap> {
    use RuntimeValue::{Float, Int};

    Ok(match (operator, lhs, rhs) {
        (BinaryOperator::Add, Int(l), Int(r)) => Int(l.wrapping_add(r)),
        (BinaryOperator::Sub, Int(l), Int(r)) => Int(l.wrapping_sub(r)),
        (BinaryOperator::Mul, Int(l), Int(r)) => Int(l.wrapping_mul(r)),
        (BinaryOperator::SDiv, Int(_), Int(0)) => return Err(Trap::DivisionByZero),
        (BinaryOperator::SDiv, Int(l), Int(r)) => {
            Int(l.checked_div(r).ok_or(Trap::IntegerOverflow)?)
        }
        (BinaryOperator::FAdd, Float(l), Float(r)) => Float(l + r),
        (BinaryOperator::FSub, Float(l), Float(r)) => Float(l - r),
        (BinaryOperator::FMul, Float(l), Float(r)) => Float(l * r),
        (BinaryOperator::FDiv, Float(l), Float(r)) => Float(l / r),
        (operator, lhs, _) => {
            return Err(Trap::Malformed(format!(
                "{operator} applied to {lhs:?}"
            )));
        }
    })
}

/// Expands `%d`, `%f` and `%%` the way the C library would
fn format_printf(format: &str, arguments: &[RuntimeValue]) -> Result<String, Trap> {
    let mut output = String::new();
    let mut arguments = arguments.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }

        match chars.next() {
            Some('%') => output.push('%'),
            Some('d') => match arguments.next() {
                Some(RuntimeValue::Int(value)) => output.push_str(&value.to_string()),
                Some(RuntimeValue::Bool(flag)) => output.push_str(&(*flag as i32).to_string()),
                other => return Err(missing_argument('d', other)),
            },
            Some('f') => match arguments.next() {
                Some(RuntimeValue::Float(value)) => {
                    output.push_str(&format!("{:.6}", f64::from(*value)))
                }
                other => return Err(missing_argument('f', other)),
            },
            Some(other) => {
                output.push('%');
                output.push(other);
            }
            None => output.push('%'),
        }
    }

    Ok(output)
}

fn missing_argument(conversion: char, argument: Option<&RuntimeValue>) -> Trap {
    Trap::Malformed(format!(
        "printf %{conversion} given {argument:?}"
    ))
}

fn unexpected(expected: &str, found: RuntimeValue) -> Trap {
    Trap::Malformed(format!("expected {expected}, found {found:?}"))
}
