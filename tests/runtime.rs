use chainc::{
    Trap, compile_source,
    frontend::SourceFile,
    ir::interpret::{self, Execution},
};
use indoc::indoc;

// ── Helpers ──────────────────────────────────────────────────────────────

fn execute(source: &str) -> Result<Execution, Trap> {
    let module = compile_source(&SourceFile::from_memory(source))
        .unwrap_or_else(|error| panic!("program failed to compile: {error}"));

    interpret::run(&module)
}

fn stdout_of(source: &str) -> String {
    let execution = execute(source).unwrap_or_else(|trap| panic!("program trapped: {trap}"));

    assert_eq!(execution.exit_code, 0);
    execution.stdout
}

// ── Variables and output ─────────────────────────────────────────────────

#[test]
fn latest_binding_shadows_earlier_one() {
    let source = indoc! {"
        let x = 1;
        let x = 2;
        output x;
    "};

    assert_eq!(stdout_of(source), "2\n");
}

#[test]
fn assignment_updates_the_visible_binding() {
    let source = indoc! {"
        let x = 1;
        x = x + 41;
        output x;
    "};

    assert_eq!(stdout_of(source), "42\n");
}

#[test]
fn floats_print_with_six_decimals() {
    let source = indoc! {"
        output 1.5;
        output 3.0 / 2.0 + .25;
        output -2.;
    "};

    assert_eq!(stdout_of(source), "1.500000\n1.750000\n-2.000000\n");
}

#[test]
fn booleans_print_as_integers() {
    let source = indoc! {"
        output 3 < 4;
        output !1;
        output 2.5 >= 2.5;
    "};

    assert_eq!(stdout_of(source), "1\n0\n1\n");
}

#[test]
fn integer_arithmetic_follows_precedence() {
    assert_eq!(stdout_of("output 2 + 3 * 4 - 10 / 5;"), "12\n");
}

// ── Control flow ─────────────────────────────────────────────────────────

#[test]
fn if_else_chain_takes_one_branch() {
    let source = indoc! {"
        let n = 7;
        if n < 5 {
            output 1;
        } else if n < 10 {
            output 2;
        } else {
            output 3;
        }
        output 4;
    "};

    assert_eq!(stdout_of(source), "2\n4\n");
}

#[test]
fn float_condition_compares_against_zero() {
    let source = indoc! {"
        let f = 0.5;
        if f { output 1; } else { output 0; }
        let g = 0.0;
        if g { output 1; } else { output 0; }
    "};

    assert_eq!(stdout_of(source), "1\n0\n");
}

#[test]
fn while_loop_runs_until_condition_fails() {
    let source = indoc! {"
        let n = 0;
        while n < 3 {
            output n;
            n = n + 1;
        }
    "};

    assert_eq!(stdout_of(source), "0\n1\n2\n");
}

#[test]
fn for_loop_includes_both_bounds() {
    let source = indoc! {"
        for i = 1 to 3 {
            output i;
        }
    "};

    assert_eq!(stdout_of(source), "1\n2\n3\n");
}

#[test]
fn for_loop_with_negative_start() {
    assert_eq!(stdout_of("for i = -1 to 1 { output i; }"), "-1\n0\n1\n");
}

#[test]
fn for_loop_with_empty_range_skips_body() {
    let source = indoc! {"
        for i = 3 to 1 { output i; }
        output 7;
    "};

    assert_eq!(stdout_of(source), "7\n");
}

#[test]
fn binding_made_in_branch_is_visible_after_it() {
    let source = indoc! {"
        if 1 {
            let x = 5;
        }
        output x;
    "};

    assert_eq!(stdout_of(source), "5\n");
}

#[test]
fn leaked_binding_from_skipped_branch_is_uninitialized() {
    let source = indoc! {"
        let x = 1;
        if 0 {
            let x = 5;
        }
        output x;
    "};

    assert_eq!(execute(source), Err(Trap::UninitializedLoad));
}

// ── Short circuit evaluation ─────────────────────────────────────────────

#[test]
fn false_and_never_evaluates_right_operand() {
    let source = indoc! {"
        try {
            let r = false && (1 / 0);
            output r;
        } catch {
            output 99;
        }
    "};

    assert_eq!(stdout_of(source), "0\n");
}

#[test]
fn true_or_never_evaluates_right_operand() {
    // Outside a `try` the division is unguarded and would trap if evaluated
    assert_eq!(stdout_of("output 1 || (1 / 0);"), "1\n");
}

#[test]
fn logical_operators_evaluate_right_operand_when_needed() {
    let source = indoc! {"
        output 1 && 2;
        output 1 && 0;
        output 0 || 0.5;
        output 0 || 0;
    "};

    assert_eq!(stdout_of(source), "1\n0\n1\n0\n");
}

// ── Try / catch ──────────────────────────────────────────────────────────

#[test]
fn division_by_zero_in_try_runs_handler() {
    let source = indoc! {"
        try {
            let y = 10 / 0;
            output y;
        } catch {
            output 99;
        }
    "};

    assert_eq!(stdout_of(source), "99\n");
}

#[test]
fn division_by_nonzero_in_try_skips_handler() {
    let source = indoc! {"
        let d = 4;
        try {
            output 12 / d;
        } catch {
            output 99;
        }
        output 0;
    "};

    assert_eq!(stdout_of(source), "3\n0\n");
}

#[test]
fn inner_try_catches_its_own_division() {
    let source = indoc! {"
        try {
            try {
                let a = 1 / 0;
            } catch {
                output 1;
            }
            output 2;
        } catch {
            output 3;
        }
    "};

    assert_eq!(stdout_of(source), "1\n2\n");
}

#[test]
fn handler_divisions_are_unguarded() {
    let source = indoc! {"
        try {
            let a = 1 / 0;
        } catch {
            let b = 1 / 0;
        }
    "};

    assert_eq!(execute(source), Err(Trap::DivisionByZero));
}

#[test]
fn function_bodies_are_unguarded() {
    let source = indoc! {"
        function f(a) {
            return 10 / a;
        }
        try {
            output f(0);
        } catch {
            output 99;
        }
    "};

    assert_eq!(execute(source), Err(Trap::DivisionByZero));
}

// ── Functions ────────────────────────────────────────────────────────────

#[test]
fn function_call_returns_value() {
    let source = indoc! {"
        function f(a) {
            return a + 1;
        }
        output f(4);
    "};

    assert_eq!(stdout_of(source), "5\n");
}

#[test]
fn recursive_function() {
    let source = indoc! {"
        function fact(n) {
            if n <= 1 {
                return 1;
            }
            return n * fact(n - 1);
        }
        output fact(5);
    "};

    assert_eq!(stdout_of(source), "120\n");
}

#[test]
fn function_without_return_yields_zero() {
    let source = indoc! {"
        function noisy() {
            output 1;
        }
        output noisy();
    "};

    assert_eq!(stdout_of(source), "1\n0\n");
}

#[test]
fn function_declared_in_branch_is_module_wide() {
    let source = indoc! {"
        if 1 {
            function three() {
                return 3;
            }
        }
        output three();
    "};

    assert_eq!(stdout_of(source), "3\n");
}

#[test]
fn parameters_shadow_outer_names_only_inside_body() {
    let source = indoc! {"
        let a = 100;
        function twice(a) {
            return a * 2;
        }
        output twice(21);
        output a;
    "};

    assert_eq!(stdout_of(source), "42\n100\n");
}

#[test]
fn top_level_return_sets_exit_code() {
    let source = indoc! {"
        output 1;
        return 3;
        output 2;
    "};

    let execution = execute(source).unwrap();

    assert_eq!(execution.exit_code, 3);
    assert_eq!(execution.stdout, "1\n");
}
