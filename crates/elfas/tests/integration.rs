//! Pipeline-level integration tests: segment layout, fixups, error
//! propagation, determinism, and the on-disk driver.

use elfas::{assemble, AsmError, Compiler};

// ─── Statement stream ────────────────────────────────────────────────────

#[test]
fn comments_and_whitespace_yield_nothing() {
    let image = assemble("; just a comment\n\n   \t\n# another one\n").unwrap();
    assert!(image.code().is_empty());
    assert!(image.data().is_empty());
}

#[test]
fn one_statement_per_line_is_not_required() {
    // The lexer does not enforce line boundaries.
    let image = assemble("nop ret nop").unwrap();
    assert_eq!(image.code(), [0x90, 0xC3, 0x90]);
}

#[test]
fn stray_close_bracket_is_tolerated() {
    let image = assemble("] nop ]").unwrap();
    assert_eq!(image.code(), [0x90]);
    assert!(image.diagnostics().is_empty());
}

#[test]
fn stray_token_is_reported_but_not_fatal() {
    let image = assemble(", nop").unwrap();
    assert_eq!(image.code(), [0x90]);
    assert_eq!(image.diagnostics().len(), 1);
    assert!(image.diagnostics()[0].contains("unexpected token"));
}

// ─── Data segment ────────────────────────────────────────────────────────

#[test]
fn data_items_are_appended_in_order() {
    let image = assemble(".a DB \"one\"\n.b DB \"two\"").unwrap();
    assert_eq!(image.data(), b"onetwo");
}

#[test]
fn string_escapes_reach_the_data_segment() {
    let image = assemble(".msg DB \"a\\n\\t\\\"b\\\\\"").unwrap();
    assert_eq!(image.data(), b"a\n\t\"b\\");
}

#[test]
fn second_data_item_resolves_with_its_offset() {
    // code is a single 7-byte mov; "one" is at data offset 0, "two" at 3.
    let image = assemble(".a DB \"one\"\n.b DB \"two\"\nmov rsi, b").unwrap();
    let expected = (0x400000u32 + 3 + 7 + 0xB0).to_le_bytes();
    assert_eq!(&image.code()[3..7], expected);
}

// ─── Error propagation ───────────────────────────────────────────────────

#[test]
fn illegal_token_reaches_the_driver() {
    let err = assemble(".msg DB \"unterminated").unwrap_err();
    assert!(matches!(err, AsmError::Syntax { ref msg } if msg == "unterminated string"));
}

#[test]
fn short_label_at_eof_reaches_the_driver() {
    let err = assemble("nop\n:x").unwrap_err();
    assert!(matches!(err, AsmError::Syntax { ref msg } if msg == "unterminated label"));
}

#[test]
fn parse_error_aborts_compilation() {
    let err = assemble(".foo 65").unwrap_err();
    assert!(matches!(err, AsmError::Syntax { ref msg } if msg.contains("expected DB")));
}

#[test]
fn undefined_label_aborts_compilation() {
    let err = assemble("jmp nowhere").unwrap_err();
    assert!(matches!(err, AsmError::UndefinedLabel { ref label } if label == "nowhere"));
}

#[test]
fn undefined_data_aborts_compilation() {
    let err = assemble("mov rsi, missing").unwrap_err();
    assert!(matches!(err, AsmError::UndefinedData { ref name } if name == "missing"));
}

#[test]
fn unencodable_operands_abort_compilation() {
    let err = assemble("xor rax, 1").unwrap_err();
    assert!(matches!(err, AsmError::InvalidOperands { ref mnemonic, .. } if mnemonic == "xor"));
}

#[test]
fn error_message_is_a_single_line() {
    let err = assemble("mov rax rbx").unwrap_err();
    assert!(!err.to_string().contains('\n'));
}

// ─── Determinism ─────────────────────────────────────────────────────────

#[test]
fn identical_source_produces_identical_bytes() {
    let src = "\
.msg DB \"deterministic\"
:start
mov rax, 1
mov rsi, msg
push start
:again
dec rax
jnz again
int 0x80
";
    let a = assemble(src).unwrap();
    let b = assemble(src).unwrap();
    assert_eq!(a.code(), b.code());
    assert_eq!(a.data(), b.data());
}

// ─── Driver + ELF output ─────────────────────────────────────────────────

#[test]
fn compiler_writes_a_valid_executable() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exit3");

    let mut compiler = Compiler::new("mov rax, 60\nmov rdi, 3\nint 0x80\n");
    compiler.set_output(&out);
    compiler.compile().unwrap();

    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(&bytes[..4], b"\x7fELF");
    // e_entry at offset 24.
    let entry = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
    assert_eq!(entry, 0x4000B0);
    // Code follows the headers: 2 movs + int = 16 bytes, no data.
    assert_eq!(bytes.len(), 0xB0 + 16);
    assert_eq!(bytes[0xB0], 0x48);
}

#[cfg(unix)]
#[test]
fn output_file_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("prog");

    let mut compiler = Compiler::new("nop");
    compiler.set_output(&out);
    compiler.compile().unwrap();

    let mode = std::fs::metadata(&out).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn failed_compile_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("never");

    let mut compiler = Compiler::new("jmp nowhere");
    compiler.set_output(&out);
    assert!(compiler.compile().is_err());
    assert!(!out.exists());
}

#[test]
fn data_segment_lands_after_code_in_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("withdata");

    let mut compiler = Compiler::new(".msg DB \"Hi\"\nnop");
    compiler.set_output(&out);
    compiler.compile().unwrap();

    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(bytes[0xB0], 0x90);
    assert_eq!(&bytes[0xB1..0xB3], b"Hi");
}
