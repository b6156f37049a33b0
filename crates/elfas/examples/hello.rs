//! Assemble a classic "Hello, world" program and write it to `./hello`.
//!
//! Run with: `cargo run --example hello`, then `./hello`.

use elfas::Compiler;

const SOURCE: &str = r#"
; write(1, msg, 14) then exit(0), via the legacy int 0x80 gate
.msg DB "Hello, world!\n"

mov rax, 4
mov rbx, 1
mov rcx, msg
mov rdx, 14
int 0x80

xor rbx, rbx
mov rax, 1
int 0x80
"#;

fn main() -> Result<(), elfas::AsmError> {
    let mut compiler = Compiler::new(SOURCE);
    compiler.set_output("./hello");
    compiler.compile()?;
    println!("wrote ./hello");
    Ok(())
}
