//! Structural verification of a finished module. All problems are collected
//! instead of stopping at the first one.

use hashbrown::{HashMap, HashSet};

use super::{
    BlockId, Function, FunctionId, Instruction, Module, Type, ValueId, ValueKind,
    pretty_print::block_label,
};
use crate::index::Index;

pub fn verify_module(module: &Module) -> Result<(), Vec<String>> {
    let mut diagnostics = Vec::new();

    let mut seen = HashSet::new();
    for function in module.functions.iter() {
        if !seen.insert(function.name.as_str()) {
            diagnostics.push(format!("function @{} is defined more than once", function.name));
        }
    }

    for (id, function) in module.functions.enumerate() {
        if function.is_declaration() {
            continue;
        }

        FunctionVerifier::new(module, id, function, &mut diagnostics).verify();
    }

    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

struct FunctionVerifier<'m> {
    module: &'m Module,
    id: FunctionId,
    function: &'m Function,
    diagnostics: &'m mut Vec<String>,
    predecessors: HashMap<BlockId, HashSet<BlockId>>,
    /// Dominator sets of every block reachable from the entry block
    dominators: HashMap<BlockId, HashSet<BlockId>>,
}

impl<'m> FunctionVerifier<'m> {
    fn new(
        module: &'m Module,
        id: FunctionId,
        function: &'m Function,
        diagnostics: &'m mut Vec<String>,
    ) -> Self {
        let mut predecessors: HashMap<BlockId, HashSet<BlockId>> = function
            .blocks
            .iter()
            .map(|block| (*block, HashSet::new()))
            .collect();

        for block in &function.blocks {
            for successor in module.successors(*block) {
                predecessors.entry(successor).or_default().insert(*block);
            }
        }

        let mut verifier = Self {
            module,
            id,
            function,
            diagnostics,
            predecessors,
            dominators: HashMap::new(),
        };
        verifier.compute_dominators();
        verifier
    }

    fn report(&mut self, block: BlockId, message: impl AsRef<str>) {
        self.diagnostics.push(format!(
            "@{}, block {}: {}",
            self.function.name,
            block_label(self.module, block),
            message.as_ref()
        ));
    }

    fn reachable_blocks(&self) -> Vec<BlockId> {
        let Some(entry) = self.function.entry_block() else {
            return Vec::new();
        };

        let mut visited: HashSet<BlockId> = HashSet::from([entry]);
        let mut order = vec![entry];
        let mut cursor = 0;

        while let Some(block) = order.get(cursor).copied() {
            cursor += 1;

            for successor in self.module.successors(block) {
                if self.module.blocks[successor].function == self.id && visited.insert(successor) {
                    order.push(successor);
                }
            }
        }

        order
    }

    fn compute_dominators(&mut self) {
        let reachable = self.reachable_blocks();
        let Some(entry) = reachable.first().copied() else {
            return;
        };

        let all: HashSet<BlockId> = reachable.iter().copied().collect();

        self.dominators = reachable
            .iter()
            .map(|block| {
                if *block == entry {
                    (*block, HashSet::from([entry]))
                } else {
                    (*block, all.clone())
                }
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;

            for block in reachable.iter().skip(1) {
                let mut new_set: Option<HashSet<BlockId>> = None;

                for predecessor in &self.predecessors[block] {
                    let Some(dominators) = self.dominators.get(predecessor) else {
                        continue;
                    };

                    new_set = Some(match new_set {
                        None => dominators.clone(),
                        Some(set) => set.intersection(dominators).copied().collect(),
                    });
                }

                let mut new_set = new_set.unwrap_or_default();
                new_set.insert(*block);

                if new_set != self.dominators[block] {
                    self.dominators.insert(*block, new_set);
                    changed = true;
                }
            }
        }
    }

    fn dominates(&self, dominator: BlockId, block: BlockId) -> bool {
        // Uses in unreachable code are not constrained
        self.dominators
            .get(&block)
            .is_none_or(|set| set.contains(&dominator))
    }

    fn verify(&mut self) {
        let module = self.module;

        for block in self.function.blocks.iter().copied() {
            self.verify_block_shape(block);

            for (position, id) in module.blocks[block].instructions.iter().enumerate() {
                if let Some(instruction) = module.instruction(*id) {
                    self.verify_operands(block, position, instruction);
                    self.verify_types(block, *id, instruction);
                }
            }
        }
    }

    fn verify_block_shape(&mut self, block: BlockId) {
        let module = self.module;
        let instructions = &module.blocks[block].instructions;

        if instructions.is_empty() {
            self.report(block, "block is empty");
            return;
        }

        let last = instructions.len() - 1;
        let mut seen_non_phi = false;
        let mut problems = Vec::new();

        for (position, id) in instructions.iter().enumerate() {
            let Some(instruction) = module.instruction(*id) else {
                continue;
            };

            if instruction.is_terminator() && position != last {
                problems.push(format!(
                    "terminator at position {position} is followed by more instructions"
                ));
            }

            match instruction {
                Instruction::Phi { incoming } => {
                    if seen_non_phi {
                        problems.push("phi is not grouped at the start of the block".into());
                    }

                    let incoming_blocks: HashSet<BlockId> =
                        incoming.iter().map(|(_, block)| *block).collect();

                    if incoming_blocks.len() != incoming.len()
                        || incoming_blocks != self.predecessors[&block]
                    {
                        problems.push("phi incoming blocks do not match predecessors".into());
                    }
                }
                _ => seen_non_phi = true,
            }

            for successor in instruction.successors() {
                if module.blocks[successor].function != self.id {
                    problems.push(format!(
                        "branch to block {} of another function",
                        block_label(module, successor)
                    ));
                }
            }
        }

        let terminated = module
            .instruction(instructions[last])
            .is_some_and(Instruction::is_terminator);

        if !terminated {
            problems.push("block does not end with a terminator".into());
        }

        for problem in problems {
            self.report(block, problem);
        }
    }

    /// Location of an instruction value inside this function
    fn definition_site(&self, value: ValueId) -> Option<(BlockId, usize)> {
        let ValueKind::Instruction { block, .. } = self.module.values[value].kind else {
            return None;
        };

        let position = self.module.blocks[block]
            .instructions
            .iter()
            .position(|id| *id == value)?;

        Some((block, position))
    }

    fn verify_operands(&mut self, block: BlockId, position: usize, instruction: &Instruction) {
        let operands: Vec<(ValueId, Option<BlockId>)> = match instruction {
            Instruction::Phi { incoming } => incoming
                .iter()
                .map(|(value, block)| (*value, Some(*block)))
                .collect(),
            _ => instruction
                .operands()
                .into_iter()
                .map(|value| (value, None))
                .collect(),
        };

        let module = self.module;

        for (value, incoming_block) in operands {
            let owner = module.values[value].owner(module);

            if let Some(owner) = owner.filter(|owner| *owner != self.id) {
                let owner_name = &module.functions[owner].name;
                self.report(
                    block,
                    format!("uses %{} which belongs to @{owner_name}", value.index()),
                );
                continue;
            }

            let Some((definition_block, definition_position)) = self.definition_site(value) else {
                continue;
            };

            let dominated = match incoming_block {
                // Phi operands must be available at the end of the incoming edge
                Some(incoming) => self.dominates(definition_block, incoming),
                None if definition_block == block => definition_position < position,
                None => self.dominates(definition_block, block),
            };

            if !dominated {
                self.report(
                    block,
                    format!("%{} does not dominate its use", value.index()),
                );
            }
        }
    }

    fn verify_types(&mut self, block: BlockId, id: ValueId, instruction: &Instruction) {
        let module = self.module;
        let ty = |value: ValueId| module.type_of(value);
        let mut problems = Vec::new();

        match instruction {
            Instruction::Alloca { ty } => {
                if matches!(ty, Type::Void) {
                    problems.push("alloca of void".to_owned());
                }
            }
            Instruction::Load { slot } | Instruction::Store { slot, .. } => {
                match module.instruction(*slot) {
                    Some(Instruction::Alloca { ty: slot_ty }) => {
                        if let Instruction::Store { value, .. } = instruction {
                            if ty(*value) != *slot_ty {
                                problems.push(format!(
                                    "stores {} into a {} slot",
                                    ty(*value),
                                    slot_ty
                                ));
                            }
                        }
                    }
                    _ => problems.push(format!("%{} is not a stack slot", slot.index())),
                }
            }
            Instruction::Binary { operator, lhs, rhs } => {
                let expected = operator.operand_type();
                if ty(*lhs) != expected || ty(*rhs) != expected {
                    problems.push(format!(
                        "{operator} expects {expected} operands, found {} and {}",
                        ty(*lhs),
                        ty(*rhs)
                    ));
                }
            }
            Instruction::IntCompare { lhs, rhs, .. } => {
                if ty(*lhs) != ty(*rhs) || !matches!(ty(*lhs), Type::I32 | Type::Bool) {
                    problems.push(format!(
                        "icmp on {} and {}",
                        ty(*lhs),
                        ty(*rhs)
                    ));
                }
            }
            Instruction::FloatCompare { lhs, rhs, .. } => {
                if ty(*lhs) != Type::F32 || ty(*rhs) != Type::F32 {
                    problems.push(format!(
                        "fcmp on {} and {}",
                        ty(*lhs),
                        ty(*rhs)
                    ));
                }
            }
            Instruction::Not { operand } => {
                if !matches!(ty(*operand), Type::Bool | Type::I32) {
                    problems.push(format!("not on {}", ty(*operand)));
                }
            }
            Instruction::Phi { incoming } => {
                let phi_ty = ty(id);
                if incoming.iter().any(|(value, _)| ty(*value) != phi_ty) {
                    problems.push(format!("phi of {phi_ty} has mismatched incoming values"));
                }
            }
            Instruction::Call { callee, arguments } => {
                let signature = &module.functions[*callee].signature;
                let name = &module.functions[*callee].name;

                let arity_ok = if signature.is_variadic {
                    arguments.len() >= signature.parameters.len()
                } else {
                    arguments.len() == signature.parameters.len()
                };

                if !arity_ok {
                    problems.push(format!(
                        "call to @{name} passes {} arguments, expected {}",
                        arguments.len(),
                        signature.parameters.len()
                    ));
                }

                for (argument, expected) in arguments.iter().zip(&signature.parameters) {
                    if ty(*argument) != *expected {
                        problems.push(format!(
                            "call to @{name} passes {} where {expected} is expected",
                            ty(*argument)
                        ));
                    }
                }
            }
            Instruction::ConditionalBranch { condition, .. } => {
                if ty(*condition) != Type::Bool {
                    problems.push(format!("branch condition is {}", ty(*condition)));
                }
            }
            Instruction::Return { value } => {
                let expected = self.function.signature.return_type;
                let returned = ty(*value);
                if returned != expected {
                    problems.push(format!(
                        "returns {returned} from a function returning {expected}"
                    ));
                }
            }
            Instruction::Branch { .. } => {}
        }

        for problem in problems {
            self.report(block, problem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOperator, IntPredicate, Signature, builder::Builder};

    fn main_signature() -> Signature {
        Signature {
            parameters: Vec::new(),
            return_type: Type::I32,
            is_variadic: false,
        }
    }

    #[test]
    fn accepts_well_formed_diamond() {
        let mut builder = Builder::new("test");
        let main = builder.declare_function("main", main_signature());
        let entry = builder.append_block(main, "entry");
        let left = builder.append_block(main, "left");
        let right = builder.append_block(main, "right");
        let merge = builder.append_block(main, "merge");

        builder.position_at_end(entry);
        let condition = builder.const_bool(true);
        builder.build_conditional_branch(condition, left, right);

        builder.position_at_end(left);
        builder.build_branch(merge);
        builder.position_at_end(right);
        builder.build_branch(merge);

        builder.position_at_end(merge);
        let one = builder.const_int(1);
        let two = builder.const_int(2);
        let phi = builder.build_phi(Type::I32, vec![(one, left), (two, right)], "merged");
        builder.build_return(phi);

        assert_eq!(verify_module(&builder.finish()), Ok(()));
    }

    #[test]
    fn rejects_missing_and_duplicate_terminators() {
        let mut builder = Builder::new("test");
        let main = builder.declare_function("main", main_signature());
        let entry = builder.append_block(main, "entry");
        let open = builder.append_block(main, "open");

        builder.position_at_end(entry);
        builder.build_branch(open);
        builder.build_branch(open);

        builder.position_at_end(open);
        builder.build_alloca(Type::I32, "x");

        let diagnostics = verify_module(&builder.finish()).unwrap_err();

        assert!(diagnostics.iter().any(|d| d.contains("followed by more instructions")));
        assert!(diagnostics.iter().any(|d| d.contains("does not end with a terminator")));
    }

    #[test]
    fn rejects_values_from_other_functions() {
        let mut builder = Builder::new("test");
        let main = builder.declare_function("main", main_signature());
        let main_entry = builder.append_block(main, "entry");
        let other = builder.declare_function("other", main_signature());
        let other_entry = builder.append_block(other, "entry");

        builder.position_at_end(main_entry);
        let slot = builder.build_alloca(Type::I32, "x");
        let zero = builder.const_int(0);
        builder.build_return(zero);

        builder.position_at_end(other_entry);
        let loaded = builder.build_load(slot, "x");
        builder.build_return(loaded);

        let diagnostics = verify_module(&builder.finish()).unwrap_err();

        assert!(diagnostics.iter().any(|d| d.contains("belongs to @main")));
    }

    #[test]
    fn rejects_type_mismatches() {
        let mut builder = Builder::new("test");
        let main = builder.declare_function("main", main_signature());
        let entry = builder.append_block(main, "entry");

        builder.position_at_end(entry);
        let slot = builder.build_alloca(Type::I32, "x");
        let half = builder.const_float(0.5);
        builder.build_store(half, slot);
        let yes = builder.const_bool(true);
        builder.build_return(yes);

        let diagnostics = verify_module(&builder.finish()).unwrap_err();

        assert!(diagnostics.iter().any(|d| d.contains("stores float into a i32 slot")));
        assert!(diagnostics.iter().any(|d| d.contains("returns i1")));
    }

    #[test]
    fn rejects_use_not_dominated_by_definition() {
        let mut builder = Builder::new("test");
        let main = builder.declare_function("main", main_signature());
        let entry = builder.append_block(main, "entry");
        let left = builder.append_block(main, "left");
        let right = builder.append_block(main, "right");
        let merge = builder.append_block(main, "merge");

        builder.position_at_end(entry);
        let condition = builder.const_bool(false);
        builder.build_conditional_branch(condition, left, right);

        builder.position_at_end(left);
        let slot = builder.build_alloca(Type::I32, "x");
        builder.build_branch(merge);
        builder.position_at_end(right);
        builder.build_branch(merge);

        builder.position_at_end(merge);
        let loaded = builder.build_load(slot, "x");
        builder.build_return(loaded);

        let diagnostics = verify_module(&builder.finish()).unwrap_err();

        assert!(diagnostics.iter().any(|d| d.contains("does not dominate")));
    }

    #[test]
    fn accepts_loop_with_unreachable_block() {
        let mut builder = Builder::new("test");
        let main = builder.declare_function("main", main_signature());
        let entry = builder.append_block(main, "entry");
        let header = builder.append_block(main, "header");
        let body = builder.append_block(main, "body");
        let exit = builder.append_block(main, "exit");
        let orphan = builder.append_block(main, "orphan");

        builder.position_at_end(entry);
        let slot = builder.build_alloca(Type::I32, "i");
        let zero = builder.const_int(0);
        builder.build_store(zero, slot);
        builder.build_branch(header);

        builder.position_at_end(header);
        let current = builder.build_load(slot, "i");
        let limit = builder.const_int(3);
        let condition = builder.build_int_compare(IntPredicate::Slt, current, limit, "cmptmp");
        builder.build_conditional_branch(condition, body, exit);

        builder.position_at_end(body);
        let one = builder.const_int(1);
        let next = builder.build_binary(BinaryOperator::Add, current, one, "nextvar");
        builder.build_store(next, slot);
        builder.build_branch(header);

        builder.position_at_end(exit);
        builder.build_return(current);

        // Not reachable from the entry block, so its operands are unconstrained
        builder.position_at_end(orphan);
        builder.build_return(next);

        assert_eq!(verify_module(&builder.finish()), Ok(()));
    }

    #[test]
    fn rejects_duplicate_function_names() {
        let mut builder = Builder::new("test");
        builder.declare_function("f", main_signature());
        builder.declare_function("f", main_signature());

        let diagnostics = verify_module(&builder.finish()).unwrap_err();

        assert_eq!(diagnostics, vec!["function @f is defined more than once".to_owned()]);
    }
}
