//! # elfas — a single-pass x86-64 ELF assembler
//!
//! `elfas` turns a small Intel-flavored assembly dialect into a statically
//! linked, directly executable 64-bit ELF binary for Linux.  There is no
//! linker, no object-file intermediate, and no relocation format in the
//! output: the assembler emits placeholder slots for data addresses, label
//! addresses, and short jump displacements, then patches them in place
//! once the deterministic layout of the process image is known.
//!
//! ## Quick Start
//!
//! ```rust
//! let image = elfas::assemble("xor rax, rax")?;
//! assert_eq!(image.code(), [0x48, 0x31, 0xC0]);
//! # Ok::<(), elfas::AsmError>(())
//! ```
//!
//! ## Pipeline
//!
//! - [`lexer`] — hand-written pull scanner producing `(kind, literal)`
//!   tokens; failures surface as `ILLEGAL` tokens, never panics.
//! - [`parser`] — buffers the token stream, produces data definitions,
//!   labels, and instructions with typed operands.
//! - [`encoder`] — value-precise translation of each instruction into its
//!   byte sequence, recording forward references in three patch maps.
//! - fixups — after encoding, absolute and relative slots are rewritten
//!   using the virtual-address layout of the emitted ELF.
//! - [`elf`] — serializes the two-segment `ET_EXEC` container.

// An assembler performs many deliberate narrowing casts between integer
// widths (i64→u8, usize→u32) and is written in dense hex.  These lints are
// expected and acceptable in this context.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::uninlined_format_args
)]

/// The driver: one-shot assembly and the ELF-writing `Compiler`.
pub mod compiler;
/// ELF64 executable serialization and the process-image layout constants.
pub mod elf;
/// x86-64 instruction encoder and the compilation-state accumulator.
pub mod encoder;
/// Error type shared by every pipeline stage.
pub mod error;
mod fixup;
/// Static mnemonic→arity registry and register tables.
pub mod inst;
/// Parsed program representation: statements and operands.
pub mod ir;
/// Tokens and the hand-written pull lexer.
pub mod lexer;
/// Statement parser over a buffered token stream.
pub mod parser;

// Re-exports
pub use compiler::{assemble, Compiler, Image};
pub use encoder::Encoder;
pub use error::AsmError;
pub use ir::{Operand, Statement};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
