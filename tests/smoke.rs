use pretty_assertions::assert_eq;

use transputer_rs::decoder::Decoded;
use transputer_rs::instructions::Op;
use transputer_rs::{assemble, Config, RunError, Session, Trap};

fn ops(src: &str) -> Vec<(Op, u8)> {
    let program = assemble(src, &Config::default()).unwrap();
    program.decoded().into_iter().map(|Decoded { op, operand }| (op, operand)).collect()
}

fn session() -> Session {
    Session::new(Config::default())
}

#[test]
fn wide_literal_gets_a_prefix() {
    assert_eq!(ops("LDC 20"), vec![(Op::Pfix, 1), (Op::Ldc, 4)]);
}

#[test]
fn operations_become_opr() {
    assert_eq!(ops("MUL"), vec![(Op::Pfix, 5), (Op::Opr, 3)]);
    assert_eq!(ops("ADD"), vec![(Op::Opr, 5)]);
}

#[test]
fn mnemonics_are_case_insensitive() {
    assert_eq!(ops("ldc 3\nrev"), vec![(Op::Ldc, 3), (Op::Opr, 0)]);
}

#[test]
fn arithmetic_program() {
    let mut s = session();
    let out = s.run("LDC 6\nLDC 7\nMUL\nADC -2").unwrap();
    assert_eq!(s.cpu.areg, Some(40));
    // LDC, LDC, PFIX OPR, NFIX ADC
    assert_eq!(out.steps, 6);
    assert_eq!(s.cpu.oreg, 0);
}

#[test]
fn semicolons_separate_statements() {
    let mut s = session();
    s.run("LDC 2; LDC 3; ADD").unwrap();
    assert_eq!(s.cpu.areg, Some(5));
}

#[test]
fn countdown_loop_sums() {
    let src = "\
LDC 0
STL 1
LDC 5
STL 2
LDL 1
LDL 2
ADD
STL 1
LDL 2
ADC -1
STL 2
LDL 2
EQC 0
CJ 1
J 1
J -12
LDL 1
";
    let mut s = session();
    s.run(src).unwrap();
    assert_eq!(s.cpu.areg, Some(15));
}

#[test]
fn state_persists_across_chunks() {
    let mut s = session();
    s.run("LDC 5\nSTL 0").unwrap();
    s.run("LDC 2").unwrap();
    s.run("LDL 0\nADD").unwrap();
    assert_eq!(s.cpu.areg, Some(7));
    assert_eq!(s.cpu.iptr, 2);
}

#[test]
fn traps_report_the_source_line() {
    let mut s = session();
    let err = s.run("LDC 1\nLDC 0\nDIV").unwrap_err();
    match err {
        RunError::Trap { line, trap, .. } => {
            assert_eq!(line, 3);
            assert!(matches!(trap, Trap::DivideByZero { op: Op::Div }));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(s.run("LDC 1\nLDC 0\nDIV").unwrap_err().to_string().starts_with("Runtime error at line 3"));
}

#[test]
fn undefined_register_traps() {
    let mut s = session();
    let err = s.run("ADD").unwrap_err();
    assert!(matches!(err, RunError::Trap { trap: Trap::UndefinedRegister { op: Op::Add, .. }, .. }));
}

#[test]
fn unimplemented_operation_traps() {
    let mut s = session();
    let err = s.run("LDC 1\nLDC 2\nLDC 3\nMOVE").unwrap_err();
    assert!(matches!(err, RunError::Trap { line: 4, trap: Trap::NotImplemented { op: Op::Move }, .. }));
}

#[test]
fn oversized_operate_code_traps() {
    let mut s = session();
    let err = s.run("PFIX 15\nPFIX 15\nOPR 15").unwrap_err();
    assert!(matches!(err, RunError::Trap { trap: Trap::InvalidOperate { code: 4095 }, .. }));
}

#[test]
fn compile_errors_are_all_reported() {
    let mut s = session();
    let err = s.run("LDC\nFOO 1\nPFIX 16 LDC 1").unwrap_err();
    let RunError::Compile(diags) = err else { panic!("expected a compile error") };
    // Lexing fails first and alone rejects the chunk.
    assert_eq!(diags.len(), 1);
    assert!(diags.to_string().contains("unrecognised token: FOO"));
    assert_eq!(s.cpu.areg, None);
}
