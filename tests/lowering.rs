use chainc::{
    compile_source, compile_to_artifact,
    frontend::SourceFile,
    ir::{Instruction, IntPredicate, Module, Type, pretty_print::module_to_string},
};
use indoc::indoc;

fn compile(source: &str) -> Module {
    compile_source(&SourceFile::from_memory(source))
        .unwrap_or_else(|error| panic!("program failed to compile: {error}"))
}

fn count_instructions(module: &Module, predicate: impl Fn(&Instruction) -> bool) -> usize {
    module
        .values
        .iter()
        .filter_map(|value| value.as_instruction())
        .filter(|instruction| predicate(instruction))
        .count()
}

const EVERYTHING: &str = indoc! {"
    let total = 0;
    function add(a, b) {
        return a + b;
    }
    for i = 1 to 4 {
        if i == 2 || i == 3 {
            total = add(total, i);
        } else {
            total = total - 1;
        }
    }
    while total > 0 && !(total == 1) {
        total = total - 1;
    }
    try {
        let ratio = 10 / total;
        output ratio;
    } catch {
        output -1;
    }
    output 0.5 * 2.0;
"};

#[test]
fn every_block_ends_in_exactly_one_terminator() {
    let module = compile(EVERYTHING);

    for block in module.blocks.iter() {
        let terminators = block
            .instructions
            .iter()
            .filter(|id| {
                module
                    .instruction(**id)
                    .is_some_and(Instruction::is_terminator)
            })
            .count();

        assert_eq!(terminators, 1, "block {} has {terminators} terminators", block.name);

        let last = block.instructions.last().copied().unwrap();
        assert!(module.instruction(last).unwrap().is_terminator());
    }
}

#[test]
fn lowering_is_deterministic() {
    let first = module_to_string(&compile(EVERYTHING));
    let second = module_to_string(&compile(EVERYTHING));

    assert_eq!(first, second);
}

#[test]
fn module_declares_printf_and_defines_main() {
    let module = compile("output 1;");

    let printf = module.function_named("printf").unwrap();
    let printf = &module.functions[printf];
    assert!(printf.is_declaration());
    assert!(printf.signature.is_variadic);
    assert_eq!(printf.signature.parameters, vec![Type::Ptr]);

    let main = module.function_named("main").unwrap();
    let main = &module.functions[main];
    assert!(!main.is_declaration());
    assert_eq!(main.signature.return_type, Type::I32);
}

#[test]
fn empty_program_returns_zero() {
    let text = module_to_string(&compile(""));

    assert_eq!(
        text,
        indoc! {"
            ; module chainlang

            declare i32 @printf(ptr, ...)

            define i32 @main() {
            entry.0:
              ret i32 0
            }
        "}
    );
}

#[test]
fn output_reuses_one_format_string_per_kind() {
    let module = compile(indoc! {"
        output 1;
        output 2;
        output 1.5;
        output 3 < 4;
    "});

    let formats = module
        .globals
        .iter()
        .map(|global| global.contents.as_str())
        .collect::<Vec<_>>();

    assert_eq!(formats, vec!["%d\n", "%f\n"]);
}

#[test]
fn guarded_division_only_inside_try() {
    let unguarded = module_to_string(&compile("output 10 / 2;"));
    assert!(!unguarded.contains("icmp eq"));
    assert!(unguarded.contains("sdiv i32 10, 2"));

    let guarded = module_to_string(&compile("try { output 10 / 2; } catch { output 0; }"));
    assert!(guarded.contains("%divzero = icmp eq i32 2, 0"));
    assert!(guarded.contains("br i1 %divzero, label %catch."));
    assert!(guarded.contains("div."));
}

#[test]
fn float_division_is_never_guarded() {
    let text = module_to_string(&compile("try { output 1.0 / 0.0; } catch { output 0; }"));

    assert!(text.contains("fdiv float 1.0, 0.0"));
    assert!(!text.contains("icmp eq"));
}

#[test]
fn for_loop_compares_with_signed_less_or_equal() {
    let module = compile("for i = 0 to 9 { output i; }");

    assert_eq!(
        count_instructions(&module, |i| matches!(
            i,
            Instruction::IntCompare {
                predicate: IntPredicate::Sle,
                ..
            }
        )),
        1
    );

    for name in ["for.cond", "for.body", "for.inc", "for.end"] {
        assert!(
            module.blocks.iter().any(|block| block.name == name),
            "missing {name} block"
        );
    }
}

#[test]
fn short_circuit_merges_with_phi() {
    let module = compile("let r = 1 && 0;");

    assert_eq!(
        count_instructions(&module, |i| {
            matches!(i, Instruction::Phi { incoming } if incoming.len() == 2)
        }),
        1
    );

    let names = module
        .blocks
        .iter()
        .map(|block| block.name.as_str())
        .collect::<Vec<_>>();

    assert_eq!(names, vec!["entry", "and.rhs", "and.skip", "and.merge"]);
}

#[test]
fn slots_live_in_entry_block() {
    let module = compile(indoc! {"
        if 1 {
            let inner = 2;
        }
        for i = 0 to 1 {
            let other = 3.5;
        }
    "});

    let main = module.function_named("main").unwrap();
    let entry = module.functions[main].entry_block().unwrap();

    assert_eq!(
        count_instructions(&module, |i| matches!(i, Instruction::Alloca { .. })),
        3
    );

    let leading_allocas = module.blocks[entry]
        .instructions
        .iter()
        .take_while(|id| matches!(module.instruction(**id), Some(Instruction::Alloca { .. })))
        .count();

    assert_eq!(leading_allocas, 3);
}

#[test]
fn statements_after_return_are_not_lowered() {
    let module = compile(indoc! {"
        function f() {
            return 1;
            output 2;
        }
    "});

    // The only call in the module would be the dropped `output`
    assert_eq!(
        count_instructions(&module, |i| matches!(i, Instruction::Call { .. })),
        0
    );
}

#[test]
fn artifact_matches_serialized_module() {
    let directory = mktemp::Temp::new_dir().unwrap();
    let path = directory.as_path().join("output.ll");
    let source = SourceFile::from_memory("let x = 4; output x * 2;");

    let module = compile_to_artifact(&source, &path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();

    assert_eq!(written, module_to_string(&module));
    assert!(!written.contains('\u{1b}'));
}
