use hashbrown::HashMap;

use super::{
    BinaryOperator, Block, BlockId, Constant, FloatPredicate, Function, FunctionId, GlobalString,
    Instruction, IntPredicate, Module, Signature, Type, Value, ValueId, ValueKind,
};

/// Constants are interned by bit pattern so that equal floats share a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstantKey {
    Int(i32),
    Float(u32),
    Bool(bool),
}

impl From<Constant> for ConstantKey {
    fn from(constant: Constant) -> Self {
        match constant {
            Constant::Int(value) => Self::Int(value),
            Constant::Float(value) => Self::Float(value.to_bits()),
            Constant::Bool(value) => Self::Bool(value),
        }
    }
}

/// Appends instructions to a [`Module`] at a movable insertion point.
///
/// Every `build_*` method appends to the block the builder is currently
/// positioned at. The builder never checks whether that block is already
/// terminated; that is left to [`super::verify`].
#[derive(Debug)]
pub struct Builder {
    module: Module,
    insert_block: Option<BlockId>,
    constants: HashMap<ConstantKey, ValueId>,
    strings: HashMap<String, ValueId>,
}

impl Builder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module: Module::new(module_name),
            insert_block: None,
            constants: HashMap::new(),
            strings: HashMap::new(),
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    /* Functions and blocks */

    pub fn declare_function(&mut self, name: &str, signature: Signature) -> FunctionId {
        let id = self.module.functions.next_index();

        let parameters = signature
            .parameters
            .iter()
            .enumerate()
            .map(|(index, ty)| {
                self.module.values.push(Value {
                    ty: *ty,
                    kind: ValueKind::Parameter {
                        function: id,
                        index,
                    },
                    name: None,
                })
            })
            .collect();

        self.module.functions.push(Function {
            name: name.to_owned(),
            signature,
            parameters,
            blocks: Vec::new(),
        })
    }

    /// First function declared under `name`
    pub fn function_named(&self, name: &str) -> Option<FunctionId> {
        self.module.function_named(name)
    }

    pub fn parameter(&self, function: FunctionId, index: usize) -> ValueId {
        self.module.functions[function].parameters[index]
    }

    pub fn append_block(&mut self, function: FunctionId, name: &str) -> BlockId {
        let id = self.module.blocks.push(Block {
            name: name.to_owned(),
            function,
            instructions: Vec::new(),
        });

        self.module.functions[function].blocks.push(id);

        id
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.insert_block = Some(block);
    }

    pub fn insert_block(&self) -> Option<BlockId> {
        self.insert_block
    }

    pub fn current_function(&self) -> Option<FunctionId> {
        self.insert_block
            .map(|block| self.module.blocks[block].function)
    }

    pub fn terminator(&self, block: BlockId) -> Option<ValueId> {
        self.module.terminator(block)
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.terminator(block).is_some()
    }

    pub fn type_of(&self, value: ValueId) -> Type {
        self.module.type_of(value)
    }

    /* Constants and globals */

    fn constant(&mut self, constant: Constant, ty: Type) -> ValueId {
        let values = &mut self.module.values;

        *self
            .constants
            .entry(ConstantKey::from(constant))
            .or_insert_with(|| {
                values.push(Value {
                    ty,
                    kind: ValueKind::Constant(constant),
                    name: None,
                })
            })
    }

    pub fn const_int(&mut self, value: i32) -> ValueId {
        self.constant(Constant::Int(value), Type::I32)
    }

    pub fn const_float(&mut self, value: f32) -> ValueId {
        self.constant(Constant::Float(value), Type::F32)
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.constant(Constant::Bool(value), Type::Bool)
    }

    /// Pointer to a private, NUL terminated string constant. Identical
    /// contents share one global.
    pub fn global_string(&mut self, name: &str, contents: &str) -> ValueId {
        if let Some(value) = self.strings.get(contents) {
            return *value;
        }

        let global = self.module.globals.push(GlobalString {
            name: name.to_owned(),
            contents: contents.to_owned(),
        });

        let value = self.module.values.push(Value {
            ty: Type::Ptr,
            kind: ValueKind::Global(global),
            name: None,
        });

        self.strings.insert(contents.to_owned(), value);

        value
    }

    /* Instructions */

    fn push(&mut self, ty: Type, instruction: Instruction, name: Option<&str>) -> ValueId {
        let block = self
            .insert_block
            .expect("builder must be positioned at a block before emitting instructions");

        let id = self.module.values.push(Value {
            ty,
            kind: ValueKind::Instruction { block, instruction },
            name: name.map(str::to_owned),
        });

        self.module.blocks[block].instructions.push(id);

        id
    }

    /// Type stored in the slot produced by an `alloca`
    fn slot_type(&self, slot: ValueId) -> Type {
        match self.module.instruction(slot) {
            Some(Instruction::Alloca { ty }) => *ty,
            _ => Type::Void,
        }
    }

    pub fn build_alloca(&mut self, ty: Type, name: &str) -> ValueId {
        self.push(Type::Ptr, Instruction::Alloca { ty }, Some(name))
    }

    /// `alloca` placed among the leading allocas of the current function's
    /// entry block, so the slot dominates every block of the function.
    pub fn build_entry_alloca(&mut self, ty: Type, name: &str) -> ValueId {
        let Some(entry) = self
            .current_function()
            .and_then(|function| self.module.functions[function].entry_block())
        else {
            return self.build_alloca(ty, name);
        };

        let position = self.module.blocks[entry]
            .instructions
            .iter()
            .take_while(|id| {
                matches!(
                    self.module.instruction(**id),
                    Some(Instruction::Alloca { .. })
                )
            })
            .count();

        let id = self.module.values.push(Value {
            ty: Type::Ptr,
            kind: ValueKind::Instruction {
                block: entry,
                instruction: Instruction::Alloca { ty },
            },
            name: Some(name.to_owned()),
        });

        self.module.blocks[entry].instructions.insert(position, id);

        id
    }

    pub fn build_load(&mut self, slot: ValueId, name: &str) -> ValueId {
        let ty = self.slot_type(slot);
        self.push(ty, Instruction::Load { slot }, Some(name))
    }

    pub fn build_store(&mut self, value: ValueId, slot: ValueId) -> ValueId {
        self.push(Type::Void, Instruction::Store { value, slot }, None)
    }

    pub fn build_binary(
        &mut self,
        operator: BinaryOperator,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> ValueId {
        self.push(
            operator.operand_type(),
            Instruction::Binary { operator, lhs, rhs },
            Some(name),
        )
    }

    pub fn build_int_compare(
        &mut self,
        predicate: IntPredicate,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> ValueId {
        self.push(
            Type::Bool,
            Instruction::IntCompare {
                predicate,
                lhs,
                rhs,
            },
            Some(name),
        )
    }

    pub fn build_float_compare(
        &mut self,
        predicate: FloatPredicate,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> ValueId {
        self.push(
            Type::Bool,
            Instruction::FloatCompare {
                predicate,
                lhs,
                rhs,
            },
            Some(name),
        )
    }

    pub fn build_not(&mut self, operand: ValueId, name: &str) -> ValueId {
        let ty = self.type_of(operand);
        self.push(ty, Instruction::Not { operand }, Some(name))
    }

    pub fn build_phi(
        &mut self,
        ty: Type,
        incoming: Vec<(ValueId, BlockId)>,
        name: &str,
    ) -> ValueId {
        self.push(ty, Instruction::Phi { incoming }, Some(name))
    }

    pub fn build_call(
        &mut self,
        callee: FunctionId,
        arguments: Vec<ValueId>,
        name: &str,
    ) -> ValueId {
        let ty = self.module.functions[callee].signature.return_type;
        let name = (!name.is_empty()).then_some(name);

        self.push(ty, Instruction::Call { callee, arguments }, name)
    }

    pub fn build_branch(&mut self, destination: BlockId) -> ValueId {
        self.push(Type::Void, Instruction::Branch { destination }, None)
    }

    pub fn build_conditional_branch(
        &mut self,
        condition: ValueId,
        positive: BlockId,
        negative: BlockId,
    ) -> ValueId {
        self.push(
            Type::Void,
            Instruction::ConditionalBranch {
                condition,
                positive,
                negative,
            },
            None,
        )
    }

    pub fn build_return(&mut self, value: ValueId) -> ValueId {
        self.push(Type::Void, Instruction::Return { value }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_signature(parameters: usize) -> Signature {
        Signature {
            parameters: vec![Type::I32; parameters],
            return_type: Type::I32,
            is_variadic: false,
        }
    }

    #[test]
    fn constants_are_interned() {
        let mut builder = Builder::new("test");

        assert_eq!(builder.const_int(7), builder.const_int(7));
        assert_ne!(builder.const_int(7), builder.const_int(8));
        assert_eq!(builder.const_float(1.5), builder.const_float(1.5));
        assert_ne!(builder.const_bool(true), builder.const_int(1));
    }

    #[test]
    fn instructions_append_at_insertion_point() {
        let mut builder = Builder::new("test");
        let function = builder.declare_function("f", int_signature(1));
        let entry = builder.append_block(function, "entry");
        let exit = builder.append_block(function, "exit");

        builder.position_at_end(entry);
        let slot = builder.build_alloca(Type::I32, "a");
        let argument = builder.parameter(function, 0);
        builder.build_store(argument, slot);
        builder.build_branch(exit);

        builder.position_at_end(exit);
        let loaded = builder.build_load(slot, "a");
        builder.build_return(loaded);

        let module = builder.finish();

        assert_eq!(module.blocks[entry].instructions.len(), 3);
        assert_eq!(module.blocks[exit].instructions.len(), 2);
        assert_eq!(module.type_of(loaded), Type::I32);
        assert_eq!(module.successors(entry), vec![exit]);
        assert!(module.terminator(exit).is_some());
    }

    #[test]
    fn unterminated_block_has_no_terminator() {
        let mut builder = Builder::new("test");
        let function = builder.declare_function("f", int_signature(0));
        let entry = builder.append_block(function, "entry");

        builder.position_at_end(entry);
        builder.build_alloca(Type::F32, "x");

        assert!(!builder.is_terminated(entry));
        assert_eq!(builder.current_function(), Some(function));
    }

    #[test]
    fn entry_allocas_lead_the_entry_block() {
        let mut builder = Builder::new("test");
        let function = builder.declare_function("f", int_signature(0));
        let entry = builder.append_block(function, "entry");
        let body = builder.append_block(function, "body");

        builder.position_at_end(entry);
        let first = builder.build_entry_alloca(Type::I32, "a");
        builder.build_branch(body);

        builder.position_at_end(body);
        let second = builder.build_entry_alloca(Type::F32, "b");

        assert_eq!(builder.module().blocks[entry].instructions[..2], [first, second]);
        assert!(builder.module().blocks[body].instructions.is_empty());
        assert!(builder.is_terminated(entry));
    }

    #[test]
    fn global_strings_are_shared() {
        let mut builder = Builder::new("test");

        let a = builder.global_string("fmt", "%d\n");
        let b = builder.global_string("fmt", "%d\n");
        let c = builder.global_string("fmt", "%f\n");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(builder.module().globals.len(), 2);
    }

    #[test]
    fn call_takes_callee_return_type() {
        let mut builder = Builder::new("test");
        let callee = builder.declare_function("g", int_signature(0));
        let caller = builder.declare_function("f", int_signature(0));
        let entry = builder.append_block(caller, "entry");

        builder.position_at_end(entry);
        let result = builder.build_call(callee, Vec::new(), "calltmp");

        assert_eq!(builder.type_of(result), Type::I32);
        assert_eq!(builder.function_named("g"), Some(callee));
        assert!(builder.module().functions[callee].is_declaration());
    }
}
