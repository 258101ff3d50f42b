use colored::Colorize;
use hashbrown::HashMap;
use itertools::Itertools;

use super::{
    BlockId, Constant, Function, FunctionId, GlobalId, Instruction, Module, Type, ValueId,
    ValueKind,
};
use crate::index::Index;

/// Unique textual label of a block within its module
pub fn block_label(module: &Module, block: BlockId) -> String {
    format!("{}.{}", module.blocks[block].name, block.index())
}

/// Colored listing of the whole module for terminal display
pub fn pretty_print_module(module: &Module) -> String {
    let names = NameTable::new(module);
    let mut output = format!("{} {}\n", "; module".bright_black(), module.name.bright_black());

    if !module.globals.is_empty() {
        output.push('\n');
    }

    for (id, global) in module.globals.enumerate() {
        output.push_str(&format!(
            "{} = {} [{} x i8] c\"{}\"\n",
            names.global(id).blue(),
            "private constant".magenta(),
            global.contents.len() + 1,
            escape_string(&global.contents).green()
        ));
    }

    for (id, function) in module.functions.enumerate() {
        output.push('\n');

        if function.is_declaration() {
            output.push_str(&format!(
                "{} {} {}({})\n",
                "declare".magenta(),
                function.signature.return_type,
                format!("@{}", function.name).blue(),
                parameter_types(function)
            ));
            continue;
        }

        let locals = names.function(module, id);

        output.push_str(&format!(
            "{} {} {}({}) {{\n",
            "define".magenta(),
            function.signature.return_type,
            format!("@{}", function.name).blue(),
            function
                .parameters
                .iter()
                .map(|p| format!("{} {}", module.type_of(*p), locals.value(module, &names, *p)))
                .join(", ")
        ));

        for (index, block) in function.blocks.iter().enumerate() {
            if index != 0 {
                output.push('\n');
            }

            let label = format!("{}:", block_label(module, *block));
            output.push_str(&format!("{}\n", label.bright_red()));

            for instruction in &module.blocks[*block].instructions {
                output.push_str("  ");
                output.push_str(&format_instruction(module, &names, &locals, *instruction));
                output.push('\n');
            }
        }

        output.push_str("}\n");
    }

    output
}

/// Plain text serialization written to the IR artifact
pub fn module_to_string(module: &Module) -> String {
    strip_ansi_escapes::strip_str(pretty_print_module(module))
}

fn parameter_types(function: &Function) -> String {
    let mut types = function
        .signature
        .parameters
        .iter()
        .map(|ty| ty.to_string())
        .collect::<Vec<_>>();

    if function.signature.is_variadic {
        types.push("...".to_owned());
    }

    types.join(", ")
}

fn escape_string(contents: &str) -> String {
    let mut escaped = String::new();

    for byte in contents.bytes().chain(std::iter::once(0)) {
        match byte {
            b'"' | b'\\' => escaped.push_str(&format!("\\{byte:02X}")),
            0x20..=0x7e => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{byte:02X}")),
        }
    }

    escaped
}

/// Printable names for globals, plus a per function table for locals
struct NameTable {
    globals: HashMap<GlobalId, String>,
}

struct LocalNames {
    values: HashMap<ValueId, String>,
}

impl NameTable {
    fn new(module: &Module) -> Self {
        let mut used = HashMap::<String, usize>::new();

        let globals = module
            .globals
            .enumerate()
            .map(|(id, global)| (id, format!("@{}", unique_name(&mut used, &global.name))))
            .collect();

        Self { globals }
    }

    fn global(&self, id: GlobalId) -> &str {
        &self.globals[&id]
    }

    fn function(&self, module: &Module, function: FunctionId) -> LocalNames {
        let function = &module.functions[function];

        let mut used = HashMap::<String, usize>::new();
        let mut next_unnamed = 0;
        let mut values = HashMap::new();

        let mut assign = |value: ValueId, name: Option<&String>| {
            let name = match name {
                Some(name) => unique_name(&mut used, name),
                None => {
                    next_unnamed += 1;
                    (next_unnamed - 1).to_string()
                }
            };

            values.insert(value, format!("%{name}"));
        };

        for parameter in &function.parameters {
            assign(*parameter, module.values[*parameter].name.as_ref());
        }

        for block in &function.blocks {
            for instruction in &module.blocks[*block].instructions {
                if module.type_of(*instruction) != Type::Void {
                    assign(*instruction, module.values[*instruction].name.as_ref());
                }
            }
        }

        LocalNames { values }
    }
}

impl LocalNames {
    fn value(&self, module: &Module, names: &NameTable, value: ValueId) -> String {
        match &module.values[value].kind {
            ValueKind::Constant(constant) => match constant {
                Constant::Int(value) => value.to_string(),
                Constant::Float(value) => format!("{value:?}"),
                Constant::Bool(value) => value.to_string(),
            }
            .purple()
            .to_string(),
            ValueKind::Global(id) => names.global(*id).blue().to_string(),
            _ => match self.values.get(&value) {
                Some(name) => name.yellow().to_string(),
                None => format!("%<foreign {}>", value.index()).red().to_string(),
            },
        }
    }

    fn typed(&self, module: &Module, names: &NameTable, value: ValueId) -> String {
        format!("{} {}", module.type_of(value), self.value(module, names, value))
    }
}

fn unique_name(used: &mut HashMap<String, usize>, name: &str) -> String {
    let count = used.entry(name.to_owned()).or_insert(0);
    *count += 1;

    if *count == 1 {
        name.to_owned()
    } else {
        format!("{name}{}", *count - 1)
    }
}

fn format_instruction(
    module: &Module,
    names: &NameTable,
    locals: &LocalNames,
    id: ValueId,
) -> String {
    let Some(instruction) = module.instruction(id) else {
        return String::new();
    };

    let value = |v: ValueId| locals.value(module, names, v);
    let typed = |v: ValueId| locals.typed(module, names, v);
    let label = |b: BlockId| format!("label %{}", block_label(module, b)).bright_red().to_string();
    let destination = || format!("{} {} ", value(id), "=".white());

    match instruction {
        Instruction::Alloca { ty } => {
            format!("{}{} {ty}", destination(), "alloca".cyan())
        }
        Instruction::Load { slot } => format!(
            "{}{} {}, {}",
            destination(),
            "load".cyan(),
            module.type_of(id),
            typed(*slot)
        ),
        Instruction::Store { value: stored, slot } => {
            format!("{} {}, {}", "store".cyan(), typed(*stored), typed(*slot))
        }
        Instruction::Binary { operator, lhs, rhs } => format!(
            "{}{} {}, {}",
            destination(),
            operator.to_string().cyan(),
            typed(*lhs),
            value(*rhs)
        ),
        Instruction::IntCompare {
            predicate,
            lhs,
            rhs,
        } => format!(
            "{}{} {} {}, {}",
            destination(),
            "icmp".cyan(),
            predicate,
            typed(*lhs),
            value(*rhs)
        ),
        Instruction::FloatCompare {
            predicate,
            lhs,
            rhs,
        } => format!(
            "{}{} {} {}, {}",
            destination(),
            "fcmp".cyan(),
            predicate,
            typed(*lhs),
            value(*rhs)
        ),
        Instruction::Not { operand } => {
            format!("{}{} {}", destination(), "not".cyan(), typed(*operand))
        }
        Instruction::Phi { incoming } => format!(
            "{}{} {} {}",
            destination(),
            "phi".bright_green(),
            module.type_of(id),
            incoming
                .iter()
                .map(|(v, b)| format!("[ {}, %{} ]", value(*v), block_label(module, *b)))
                .join(", ")
        ),
        Instruction::Call { callee, arguments } => {
            let function = &module.functions[*callee];
            let callee_type = if function.signature.is_variadic {
                format!("{} ({})", function.signature.return_type, parameter_types(function))
            } else {
                function.signature.return_type.to_string()
            };
            let prefix = if module.values[id].name.is_some() {
                destination()
            } else {
                String::new()
            };

            format!(
                "{prefix}{} {callee_type} {}({})",
                "call".cyan(),
                format!("@{}", function.name).blue(),
                arguments.iter().map(|a| typed(*a)).join(", ")
            )
        }
        Instruction::Branch { destination } => {
            format!("{} {}", "br".cyan(), label(*destination))
        }
        Instruction::ConditionalBranch {
            condition,
            positive,
            negative,
        } => format!(
            "{} {}, {}, {}",
            "br".cyan(),
            typed(*condition),
            label(*positive),
            label(*negative)
        ),
        Instruction::Return { value: returned } => {
            format!("{} {}", "ret".cyan(), typed(*returned))
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => write!(f, "i1"),
            Type::I32 => write!(f, "i32"),
            Type::F32 => write!(f, "float"),
            Type::Ptr => write!(f, "ptr"),
            Type::Void => write!(f, "void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{BinaryOperator, Signature, builder::Builder};

    #[test]
    fn serializes_function_with_declaration() {
        let mut builder = Builder::new("chainlang");
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
        let two = builder.const_int(2);
        let three = builder.const_int(3);
        let sum = builder.build_binary(BinaryOperator::Add, two, three, "addtmp");
        let format = builder.global_string("fmt", "%d\n");
        builder.build_call(printf, vec![format, sum], "");
        let zero = builder.const_int(0);
        builder.build_return(zero);

        let text = module_to_string(&builder.finish());

        assert_eq!(
            text,
            indoc! {r#"
                ; module chainlang

                @fmt = private constant [4 x i8] c"%d\0A\00"

                declare i32 @printf(ptr, ...)

                define i32 @main() {
                entry.0:
                  %addtmp = add i32 2, 3
                  call i32 (ptr, ...) @printf(ptr @fmt, i32 %addtmp)
                  ret i32 0
                }
            "#}
        );
    }

    #[test]
    fn deduplicates_local_names() {
        let mut builder = Builder::new("test");
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
        builder.build_alloca(Type::I32, "x");
        builder.build_alloca(Type::I32, "x");

        let text = module_to_string(&builder.finish());

        assert!(text.contains("%x = alloca i32"));
        assert!(text.contains("%x1 = alloca i32"));
    }
}
