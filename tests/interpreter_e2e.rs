//! End-to-end scenarios through the full pipeline: lex → parse →
//! evaluate, asserting on results, captured output, and diagnostics.

use pretty_assertions::assert_eq;

use koan::value::error;
use koan::{Interpreter, Value};

fn run(source: &str) -> (Value, Interpreter) {
    let mut interp = Interpreter::with_capture();
    let value = interp.run_source(source).expect("program should run");
    (value, interp)
}

#[test]
fn arithmetic_program_prints_seven() {
    let source = "set x 5\nset y x + 2\nprint y";
    let (_, interp) = run(source);
    assert_eq!(interp.captured_output().trim(), "7");
    assert!(interp.diagnostics().is_empty());
}

#[test]
fn undefined_function_reports_and_degrades_to_null() {
    let (value, interp) = run("set r foo()\nr");
    assert_eq!(value, Value::Null);
    assert!(
        interp
            .diagnostics()
            .messages()
            .iter()
            .any(|m| m.contains("Undefined function 'foo'")),
        "diagnostics: {:?}",
        interp.diagnostics().messages()
    );
}

#[test]
fn index_out_of_bounds_error_names_both_numbers() {
    let err = error::index_out_of_bounds(10, 5);
    assert!(error::has_message(&err, "10"));
    assert!(error::has_message(&err, "5"));
    assert_eq!(error::code(&err), error::CODE_GENERIC);
}

#[test]
fn for_loop_with_continue_and_break_visits_one_and_two_only() {
    let source = "\
set visited []
for x in [1, 2, 3]
    if x == 2
        continue
    if x == 3
        break
    push(visited, x)
    print x
set after \"ran\"
after";
    let (value, interp) = run(source);
    // Only 1 is pushed: 2 is skipped, 3 breaks before the push.
    assert_eq!(interp.captured_output().trim(), "1");
    assert_eq!(value, Value::string("ran"));
}

#[test]
fn while_countdown_terminates_after_exactly_three_iterations() {
    let source = "\
set i 0
set iterations 0
while i < 3
    set i i + 1
    set iterations iterations + 1
iterations";
    let (value, interp) = run(source);
    assert_eq!(value, Value::number(3.0));
    assert!(interp.diagnostics().is_empty());
}

#[test]
fn functions_compose_and_recurse() {
    let source = "\
function double x
    return x * 2
function apply_twice x
    return double(double(x))
apply_twice(3)";
    let (value, _) = run(source);
    assert_eq!(value, Value::number(12.0));
}

#[test]
fn returned_function_values_close_over_their_scope() {
    let source = "\
function maker
    set secret 21
    function made
        return secret * 2
set m maker()
m()";
    let (value, _) = run(source);
    assert_eq!(value, Value::number(42.0));
}

#[test]
fn containers_nest_and_index() {
    let source = "\
set grid [[1, 2], [3, 4]]
set o {rows: grid, name: \"g\"}
o.rows[1][0] + len(o.name)";
    let (value, _) = run(source);
    assert_eq!(value, Value::number(4.0));
}

#[test]
fn string_building_across_a_loop() {
    let source = "\
set s \"\"
for part in [\"a\", \"b\", \"c\"]
    set s s + part
s";
    let (value, _) = run(source);
    assert_eq!(value, Value::string("abc"));
}

#[test]
fn division_by_zero_flows_as_an_error_value() {
    let source = "set r 10 / 0\nr";
    let (value, _) = run(source);
    assert!(value.is_error());
    assert!(error::has_message(&value, "Division by zero"));
}

#[test]
fn error_values_are_falsy_and_checkable() {
    let source = "\
set r 1 / 0
if r
    set out \"truthy\"
else
    set out \"falsy\"
out";
    let (value, _) = run(source);
    assert_eq!(value, Value::string("falsy"));
}

#[test]
fn comments_and_blank_lines_are_insignificant() {
    let source = "\
# a program
set x 1

# with comments
set y 2
x + y";
    let (value, _) = run(source);
    assert_eq!(value, Value::number(3.0));
}

#[test]
fn deep_blocks_dedent_cleanly() {
    let source = "\
set r 0
if true
    if true
        if true
            set r 9
r";
    let (value, _) = run(source);
    assert_eq!(value, Value::number(9.0));
}

#[test]
fn evaluation_continues_after_a_reported_problem() {
    let source = "\
set a missing + 1
set b 2
b";
    let (value, interp) = run(source);
    assert_eq!(value, Value::number(2.0));
    assert!(!interp.diagnostics().is_empty());
}

#[test]
fn arena_holds_the_program_while_it_runs() {
    let mut interp = Interpreter::with_capture();
    interp.run_source("set x 1\nset y 2").expect("run");
    assert!(interp.arena().live_nodes() >= 4);
}
