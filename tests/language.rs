use blue_lang::parser::parse_program;
use blue_lang::{run_source, BlueError, Config, ErrorKind, Object};

use std::fs;
use std::str::FromStr;

use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use test_case::test_case;

fn eval(input: &str) -> Object {
    match run_source(input, "test.b", Config::default()) {
        Ok(obj) => obj,
        Err(error) => panic!("{} failed: {}", input, error),
    }
}

fn eval_err(input: &str) -> BlueError {
    match run_source(input, "test.b", Config::default()) {
        Ok(obj) => panic!("{} should fail, got {}", input, obj),
        Err(error) => error,
    }
}

#[test_case("var x = 0; for (i in 1..10) { x += 1; if (i == 5) { break; } }; x", "5" ; "break in for")]
#[test_case("val a = 9223372036854775807; a + 1", "9223372036854775808" ; "overflow promotes")]
#[test_case("\"Hello #{1 + 2}\"", "Hello 3" ; "interpolation")]
#[test_case("fun f(x, y=10){ x + y }; [f(1), f(1,2)]", "[11, 3]" ; "default parameters")]
#[test_case(
    "val m = {1: \"a\", 2: \"b\", 3: \"c\"}; var out = \"\"; for ([k, v] in m) { out = out + k }; out",
    "123" ;
    "map insertion order"
)]
fn scenarios(input: &str, expected: &str) {
    assert_eq!(eval(input).to_string(), expected);
}

#[test]
fn division_by_zero_is_catchable() {
    match eval("try { 1/0 } catch (e) { e }") {
        Object::Str(message) => assert!(message.starts_with("Division by zero"), "{}", message),
        obj => panic!("expected a string, got {}", obj),
    }
}

#[test]
fn overflow_matches_bignum() {
    let samples: [i64; 8] = [0, 1, -1, 7, 3_037_000_500, -3_037_000_500, i64::MAX, i64::MIN + 1];

    for a in samples {
        for b in samples {
            let (x, y) = (BigInt::from(a), BigInt::from(b));
            for (op, expected) in [("+", &x + &y), ("-", &x - &y), ("*", &x * &y)] {
                let input = format!("{} {} {}", a, op, b);
                assert_eq!(eval(&input).to_string(), expected.to_string(), "{}", input);
            }
        }
    }

    assert_eq!(
        eval("2 ** 100").to_string(),
        BigInt::from_str("1267650600228229401496703205376").unwrap().to_string()
    );
}

#[test_case("" ; "empty")]
#[test_case("ascii" ; "ascii")]
#[test_case("añb" ; "latin")]
#[test_case("日本語" ; "cjk")]
#[test_case("a🎉b" ; "emoji")]
fn length_counts_codepoints(text: &str) {
    let input = format!("len({:?})", text);
    assert_eq!(eval(&input), Object::Integer(text.chars().count() as i64));
}

#[test_case("1", "2" ; "integer")]
#[test_case("[1]", "[1, 2]" ; "list")]
#[test_case("{\"a\": 1}", "null" ; "map to null")]
#[test_case("fun() { 1 }", "\"s\"" ; "function to string")]
fn val_is_immutable(first: &str, second: &str) {
    let input = format!("val x = {}; x = {}", first, second);

    match eval_err(&input) {
        BlueError::Runtime { error, .. } => assert_eq!(error.kind, ErrorKind::Name),
        error => panic!("expected a runtime error, got {}", error),
    }
}

#[test_case("[1, {2: 3}]", "[1, {2: 3}]", true ; "nested")]
#[test_case("{1, 2}", "{2, 1}", true ; "sets")]
#[test_case("[1, 2]", "[2, 1]", false ; "list order")]
#[test_case("{\"a\": [1]}", "{\"a\": [1.5]}", false ; "map values")]
fn equality_follows_hash(left: &str, right: &str, equal: bool) {
    let (a, b) = (eval(left), eval(right));

    assert_eq!(a.hash_key() == b.hash_key(), equal);
    assert_eq!(eval(&format!("{} == {}", left, right)), Object::Boolean(equal));
}

#[test_case("val x = [1, 2 * 3, \"s\"]; x[0]" ; "index")]
#[test_case("fun f(a, b = 2) { return a + b; }" ; "function")]
#[test_case("if (a > 1) { b } elif (c) { d } else { e }" ; "conditional")]
#[test_case("match x { [1, _] => 2, _ => 3 }" ; "match")]
#[test_case("try { f() } catch (e) { print(e) } finally { g() }" ; "try")]
#[test_case("[x * 2 for (x in xs) if x > 1]" ; "comprehension")]
#[test_case("var m = {\"k\": {1, 2}}; m.k |= {3}" ; "compound assign")]
fn pretty_printer_round_trips(input: &str) {
    let program = parse_program(input, "test.b").unwrap();
    let printed = program.to_string();

    assert_eq!(parse_program(&printed, "test.b").unwrap(), program, "{}", printed);
}

#[test]
fn imports_resolve_next_to_entry() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("geometry")).unwrap();
    fs::write(
        dir.path().join("geometry/area.b"),
        "import math\nfun circle(r) { math.pi * r * r }",
    )
    .unwrap();
    let main = dir.path().join("main.b");
    fs::write(&main, "import geometry.area\nround(area.circle(2))").unwrap();

    assert_eq!(blue_lang::run_file(&main, vec![]).unwrap(), Object::Integer(13));
}

#[test]
fn script_arguments_reach_os_args() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.b");
    fs::write(&main, "import os\nos.args()").unwrap();

    let result = blue_lang::run_file(&main, vec!["-v".to_string(), "x".to_string()]).unwrap();
    assert_eq!(result.to_string(), "[\"-v\", \"x\"]");
}

#[test]
fn processes_exchange_messages() {
    let input = "var me = self(); \
                 fun worker(parent) { val n = recv(); send(parent, n * n) }; \
                 val pid = spawn(worker, [me]); \
                 send(pid, 12); \
                 recv()";
    assert_eq!(eval(input), Object::Integer(144));
}

#[test]
fn subscribers_receive_published_messages() {
    let input = "val a = subscribe(\"t\"); val b = subscribe(\"t\"); \
                 val n = publish(\"t\", \"hi\"); \
                 [n, recv(a), recv(b)]";
    assert_eq!(eval(input).to_string(), "[2, \"hi\", \"hi\"]");
}

#[test_case("exit(3)", 3 ; "explicit exit")]
#[test_case("exit(0)", 0 ; "exit zero")]
#[test_case("1 / 0", 1 ; "runtime error")]
#[test_case("val = 1", 1 ; "syntax error")]
#[test_case("1 @ 2", 1 ; "lexical error")]
#[test_case("try { exit(4) } catch (e) { 0 }", 4 ; "exit is not caught")]
fn exit_codes(input: &str, code: i32) {
    let result = run_source(input, "test.b", Config::default());
    assert_eq!(blue_lang::exit_status(result), code);
}

#[test]
fn uncaught_error_report_has_excerpts() {
    let dir = tempfile::tempdir().unwrap();
    let main = dir.path().join("main.b");
    fs::write(&main, "fun f() {\n  missing + 1\n}\nf()\n").unwrap();

    let error = blue_lang::run_file(&main, vec![]).unwrap_err();
    let report = blue_lang::report(&error);
    let lines: Vec<&str> = report.lines().collect();

    assert_eq!(lines[0], "NameError: identifier not found: `missing`");
    assert!(report.contains("  missing + 1"), "{}", report);
    assert!(report.contains(":4:"), "{}", report);
}
