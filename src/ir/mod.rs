//! Typed, block-structured SSA IR. Storage is explicit (`alloca`/`load`/
//! `store`), control flow is a list of blocks per function, each ending in
//! exactly one terminator, and values flowing in from several predecessors
//! are merged with `phi`.
//!
//! Every value, block and function lives in a module-wide arena so handles are
//! plain indices and stay valid while the module is being built.

use crate::index::{IndexVec, simple_index};

pub mod builder;
pub mod interpret;
pub mod pretty_print;
pub mod verify;

simple_index! {
    /// Identifies a function (definition or external declaration)
    pub struct FunctionId;
}

simple_index! {
    /// Identifies a basic block
    pub struct BlockId;
}

simple_index! {
    /// Identifies any SSA value: constant, global, parameter or instruction
    pub struct ValueId;
}

simple_index! {
    /// Identifies a global string constant
    pub struct GlobalId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    I32,
    F32,
    Ptr,
    Void,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub parameters: Vec<Type>,
    pub return_type: Type,
    pub is_variadic: bool,
}

#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    pub functions: IndexVec<FunctionId, Function>,
    pub blocks: IndexVec<BlockId, Block>,
    pub values: IndexVec<ValueId, Value>,
    pub globals: IndexVec<GlobalId, GlobalString>,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub parameters: Vec<ValueId>,
    /// Blocks in layout order, the first one is the entry block. A function
    /// without blocks is an external declaration.
    pub blocks: Vec<BlockId>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

#[derive(Debug)]
pub struct Block {
    pub name: String,
    pub function: FunctionId,
    /// Instruction values in execution order
    pub instructions: Vec<ValueId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalString {
    pub name: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub ty: Type,
    pub kind: ValueKind,
    /// Optional name hint used when printing
    pub name: Option<String>,
}

impl Value {
    /// Function whose body the value belongs to, `None` for module level
    /// constants
    pub fn owner(&self, module: &Module) -> Option<FunctionId> {
        match &self.kind {
            ValueKind::Parameter { function, .. } => Some(*function),
            ValueKind::Instruction { block, .. } => Some(module.blocks[*block].function),
            ValueKind::Constant(_) | ValueKind::Global(_) => None,
        }
    }

    pub fn as_instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            ValueKind::Instruction { instruction, .. } => Some(instruction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Constant(Constant),
    Global(GlobalId),
    Parameter {
        function: FunctionId,
        index: usize,
    },
    Instruction {
        block: BlockId,
        instruction: Instruction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    SDiv,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOperator {
    pub fn operand_type(self) -> Type {
        match self {
            Self::Add | Self::Sub | Self::Mul | Self::SDiv => Type::I32,
            Self::FAdd | Self::FSub | Self::FMul | Self::FDiv => Type::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ogt,
    Ole,
    Oge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Alloca {
        ty: Type,
    },
    Load {
        slot: ValueId,
    },
    Store {
        value: ValueId,
        slot: ValueId,
    },
    Binary {
        operator: BinaryOperator,
        lhs: ValueId,
        rhs: ValueId,
    },
    IntCompare {
        predicate: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    FloatCompare {
        predicate: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
    },
    Not {
        operand: ValueId,
    },
    Phi {
        incoming: Vec<(ValueId, BlockId)>,
    },
    Call {
        callee: FunctionId,
        arguments: Vec<ValueId>,
    },
    Branch {
        destination: BlockId,
    },
    ConditionalBranch {
        condition: ValueId,
        positive: BlockId,
        negative: BlockId,
    },
    Return {
        value: ValueId,
    },
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Branch { .. } | Self::ConditionalBranch { .. } | Self::Return { .. }
        )
    }

    /// Blocks control may transfer to after this instruction
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Branch { destination } => vec![*destination],
            Self::ConditionalBranch {
                positive, negative, ..
            } => vec![*positive, *negative],
            _ => Vec::new(),
        }
    }

    /// Values read by this instruction
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Self::Alloca { .. } | Self::Branch { .. } => Vec::new(),
            Self::Load { slot } => vec![*slot],
            Self::Store { value, slot } => vec![*value, *slot],
            Self::Binary { lhs, rhs, .. }
            | Self::IntCompare { lhs, rhs, .. }
            | Self::FloatCompare { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::Not { operand } => vec![*operand],
            Self::Phi { incoming } => incoming.iter().map(|(value, _)| *value).collect(),
            Self::Call { arguments, .. } => arguments.clone(),
            Self::ConditionalBranch { condition, .. } => vec![*condition],
            Self::Return { value } => vec![*value],
        }
    }
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn function_named(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .enumerate()
            .find(|(_, function)| function.name == name)
            .map(|(id, _)| id)
    }

    pub fn type_of(&self, value: ValueId) -> Type {
        self.values[value].ty
    }

    /// The last instruction of `block` if it is a terminator
    pub fn terminator(&self, block: BlockId) -> Option<ValueId> {
        self.blocks[block]
            .instructions
            .last()
            .copied()
            .filter(|id| {
                self.values[*id]
                    .as_instruction()
                    .is_some_and(Instruction::is_terminator)
            })
    }

    pub fn instruction(&self, value: ValueId) -> Option<&Instruction> {
        self.values[value].as_instruction()
    }

    /// Successor blocks of `block` according to its terminator
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .and_then(|id| self.instruction(id))
            .map(Instruction::successors)
            .unwrap_or_default()
    }
}
