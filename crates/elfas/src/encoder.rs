//! Instruction encoder and compilation state.
//!
//! The [`Encoder`] consumes one [`Statement`] at a time and appends the
//! exact machine-code bytes to the growing text segment.  References whose
//! final value depends on the process-image layout — data addresses,
//! absolute label addresses, short jump displacements — are emitted as
//! placeholder slots and recorded in three patch maps, resolved by the
//! fixup pass once the whole program has been encoded (see
//! [`fixup`](crate::fixup)).
//!
//! All state grows monotonically: bytes append, maps insert, nothing is
//! ever deleted or relocated.

use std::collections::BTreeMap;

use crate::error::AsmError;
use crate::inst;
use crate::ir::{parse_number, Operand, Statement};
use crate::lexer::TokenKind;

/// The mutable accumulator for one compilation.
#[derive(Debug, Default)]
pub struct Encoder {
    /// The growing text segment.
    pub(crate) code: Vec<u8>,
    /// The growing data segment.
    pub(crate) data: Vec<u8>,
    /// Name → offset of each data item within the data segment.
    pub(crate) data_offsets: BTreeMap<String, usize>,
    /// Label name → code offset, captured when the label statement is
    /// processed.
    pub(crate) labels: BTreeMap<String, usize>,
    /// Code offsets of 4-byte slots awaiting the absolute virtual address
    /// of a data item (value: offset into the data segment).
    pub(crate) data_patches: BTreeMap<usize, usize>,
    /// Code offsets of 4-byte slots awaiting the absolute virtual address
    /// of a label.
    pub(crate) abs_label_patches: BTreeMap<usize, String>,
    /// Code offsets of 1-byte slots awaiting a short relative displacement
    /// to a label.
    pub(crate) rel_jump_patches: BTreeMap<usize, String>,
}

impl Encoder {
    /// A fresh, empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The text segment encoded so far.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The data segment collected so far.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Labels seen so far (name → code offset).
    pub fn labels(&self) -> &BTreeMap<String, usize> {
        &self.labels
    }

    /// Data items seen so far (name → data offset).
    pub fn data_offsets(&self) -> &BTreeMap<String, usize> {
        &self.data_offsets
    }

    /// Process one statement, appending bytes and recording patches.
    pub fn process(&mut self, stmt: Statement) -> Result<(), AsmError> {
        match stmt {
            Statement::Data { name, contents } => {
                let offset = self.data.len();
                self.data.extend_from_slice(&contents);
                self.data_offsets.insert(name, offset);
                Ok(())
            }
            Statement::Label { name } => {
                self.labels.insert(name, self.code.len());
                Ok(())
            }
            Statement::Error { message } => Err(AsmError::Syntax { msg: message }),
            Statement::Instruction { mnemonic, operands } => {
                self.encode_instruction(&mnemonic, &operands)
            }
        }
    }

    #[inline]
    fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    fn encode_instruction(&mut self, mnemonic: &str, ops: &[Operand]) -> Result<(), AsmError> {
        let arity = inst::arity(mnemonic).ok_or_else(|| AsmError::UnknownInstruction {
            mnemonic: mnemonic.to_string(),
        })?;
        if ops.len() != arity as usize {
            return Err(AsmError::InvalidOperands {
                mnemonic: mnemonic.to_string(),
                detail: format!("expected {} operand(s), got {}", arity, ops.len()),
            });
        }

        match mnemonic {
            "nop" => {
                self.emit(&[0x90]);
                Ok(())
            }
            "ret" => {
                self.emit(&[0xC3]);
                Ok(())
            }
            "clc" => {
                self.emit(&[0xF8]);
                Ok(())
            }
            "stc" => {
                self.emit(&[0xF9]);
                Ok(())
            }
            "cld" => {
                self.emit(&[0xFC]);
                Ok(())
            }
            "std" => {
                self.emit(&[0xFD]);
                Ok(())
            }
            "cli" => {
                self.emit(&[0xFA]);
                Ok(())
            }
            "sti" => {
                self.emit(&[0xFB]);
                Ok(())
            }
            "cmc" => {
                self.emit(&[0xF5]);
                Ok(())
            }
            "int" => self.encode_int(&ops[0]),
            // ADD is 81 /0, SUB is 81 /5 in the immediate form.
            "add" => self.encode_alu(mnemonic, ops, 0x01, 0x05, 0),
            "sub" => self.encode_alu(mnemonic, ops, 0x29, 0x2D, 5),
            "xor" => self.encode_xor(ops),
            "mov" => self.encode_mov(ops),
            "inc" => self.encode_inc_dec(mnemonic, &ops[0], false),
            "dec" => self.encode_inc_dec(mnemonic, &ops[0], true),
            "push" => self.encode_push(&ops[0]),
            "pop" => self.encode_pop(&ops[0]),
            "jmp" | "je" | "jz" | "jne" | "jnz" => self.encode_jump(mnemonic, &ops[0]),
            _ => Err(AsmError::UnknownInstruction {
                mnemonic: mnemonic.to_string(),
            }),
        }
    }

    /// `int imm8` — `CD <imm8>`.
    fn encode_int(&mut self, op: &Operand) -> Result<(), AsmError> {
        let n = parse_number(&op.literal).ok_or_else(|| AsmError::BadImmediate {
            literal: op.literal.clone(),
        })?;
        self.emit(&[0xCD, n as u8]);
        Ok(())
    }

    /// `add`/`sub` with their reg,reg and reg,imm32 forms.
    ///
    /// `rr_opcode` is the two-register opcode (after the REX.W prefix),
    /// `rax_opcode` the short accumulator-immediate opcode, and `digit` the
    /// /digit of the `81` immediate group (0 for ADD, 5 for SUB).
    fn encode_alu(
        &mut self,
        mnemonic: &str,
        ops: &[Operand],
        rr_opcode: u8,
        rax_opcode: u8,
        digit: u8,
    ) -> Result<(), AsmError> {
        if ops[0].kind == TokenKind::Register && ops[1].kind == TokenKind::Register {
            let modrm = modrm_reg_reg(&ops[0].literal, &ops[1].literal)?;
            self.emit(&[0x48, rr_opcode, modrm]);
            return Ok(());
        }

        if ops[0].kind == TokenKind::Register && ops[1].kind == TokenKind::Number {
            let imm = imm32(&ops[1].literal)?;
            match ops[0].literal.as_str() {
                "rax" => self.emit(&[0x48, rax_opcode]),
                "rbx" | "rcx" | "rdx" => {
                    let reg = register_number(&ops[0].literal)?;
                    self.emit(&[0x48, 0x81, 0xC0 + 8 * digit + reg]);
                }
                other => {
                    return Err(AsmError::InvalidOperands {
                        mnemonic: mnemonic.to_string(),
                        detail: format!("{} {}, NUMBER not implemented", mnemonic, other),
                    });
                }
            }
            self.emit(&imm);
            return Ok(());
        }

        Err(invalid_operands(mnemonic, ops))
    }

    /// `xor reg, reg` — `48 31 <ModR/M>`.
    fn encode_xor(&mut self, ops: &[Operand]) -> Result<(), AsmError> {
        if ops[0].kind == TokenKind::Register && ops[1].kind == TokenKind::Register {
            let modrm = modrm_reg_reg(&ops[0].literal, &ops[1].literal)?;
            self.emit(&[0x48, 0x31, modrm]);
            return Ok(());
        }
        Err(invalid_operands("xor", ops))
    }

    /// `mov` with its reg,reg / reg,imm32 / reg,identifier forms.
    ///
    /// The identifier form resolves the name against the data items seen so
    /// far (forward references to data are unsupported — this is a single
    /// pass), emits the raw data offset as the immediate, and records a
    /// data patch so the fixup pass can rewrite the slot with the absolute
    /// virtual address.
    fn encode_mov(&mut self, ops: &[Operand]) -> Result<(), AsmError> {
        if ops[0].kind == TokenKind::Register && ops[1].kind == TokenKind::Register {
            let modrm = modrm_reg_reg(&ops[0].literal, &ops[1].literal)?;
            self.emit(&[0x48, 0x89, modrm]);
            return Ok(());
        }

        if ops[0].kind == TokenKind::Register && ops[1].kind == TokenKind::Number {
            let reg = register_number(&ops[0].literal)?;
            let imm = imm32(&ops[1].literal)?;
            self.emit(&[0x48, 0xC7, 0xC0 + reg]);
            self.emit(&imm);
            return Ok(());
        }

        if ops[0].kind == TokenKind::Register && ops[1].kind == TokenKind::Identifier {
            let name = &ops[1].literal;
            let Some(&offset) = self.data_offsets.get(name) else {
                return Err(AsmError::UndefinedData { name: name.clone() });
            };
            let reg = register_number(&ops[0].literal)?;
            self.emit(&[0x48, 0xC7, 0xC0 + reg]);
            let slot = self.code.len();
            let stale = self.data_patches.insert(slot, offset);
            debug_assert!(stale.is_none(), "overlapping data patch at {slot}");
            self.emit(&(offset as u32).to_le_bytes());
            return Ok(());
        }

        Err(invalid_operands("mov", ops))
    }

    /// `inc`/`dec` for a direct register or a sized memory indirection.
    ///
    /// The indirect forms share opcodes; `dec` selects the `/1` form by
    /// adding 8 to the register number byte.
    fn encode_inc_dec(&mut self, mnemonic: &str, op: &Operand, dec: bool) -> Result<(), AsmError> {
        if op.kind != TokenKind::Register {
            return Err(invalid_operands(mnemonic, std::slice::from_ref(op)));
        }
        let reg = register_number(&op.literal)?;
        let form = if dec { 8 } else { 0 };

        if !op.indirection {
            self.emit(&[0x48, 0xFF, 0xC0 + form + reg]);
            return Ok(());
        }

        match op.size {
            8 => self.emit(&[0x67, 0xFE, reg + form]),
            16 => self.emit(&[0x67, 0x66, 0xFF, reg + form]),
            32 => self.emit(&[0x67, 0xFF, reg + form]),
            64 => self.emit(&[0x67, 0x48, 0xFF, reg + form]),
            _ => return Err(invalid_operands(mnemonic, std::slice::from_ref(op))),
        }
        Ok(())
    }

    /// `push imm32`, `push <label>`, or `push reg`.
    ///
    /// The label form reserves a 4-byte slot and records an absolute-label
    /// patch; labels may be defined later in the source.
    fn encode_push(&mut self, op: &Operand) -> Result<(), AsmError> {
        match op.kind {
            TokenKind::Number => {
                let imm = imm32(&op.literal)?;
                self.emit(&[0x68]);
                self.emit(&imm);
                Ok(())
            }
            TokenKind::Identifier => {
                self.emit(&[0x68]);
                let slot = self.code.len();
                let stale = self.abs_label_patches.insert(slot, op.literal.clone());
                debug_assert!(stale.is_none(), "overlapping label patch at {slot}");
                self.emit(&[0x00, 0x00, 0x00, 0x00]);
                Ok(())
            }
            TokenKind::Register => {
                if let Some(reg) = inst::register_number(&op.literal) {
                    self.emit(&[0x50 + reg]);
                } else if let Some(reg) = inst::extended_register_number(&op.literal) {
                    self.emit(&[0x41, 0x50 + reg]);
                } else {
                    return Err(AsmError::UnknownRegister {
                        name: op.literal.clone(),
                    });
                }
                Ok(())
            }
            _ => Err(invalid_operands("push", std::slice::from_ref(op))),
        }
    }

    /// `pop reg`, including `r8`–`r15` behind a REX.B prefix.
    fn encode_pop(&mut self, op: &Operand) -> Result<(), AsmError> {
        if op.kind != TokenKind::Register {
            return Err(invalid_operands("pop", std::slice::from_ref(op)));
        }
        if let Some(reg) = inst::register_number(&op.literal) {
            self.emit(&[0x58 + reg]);
        } else if let Some(reg) = inst::extended_register_number(&op.literal) {
            self.emit(&[0x41, 0x58 + reg]);
        } else {
            return Err(AsmError::UnknownRegister {
                name: op.literal.clone(),
            });
        }
        Ok(())
    }

    /// The short-jump family.  Emits the opcode, records a relative-jump
    /// patch at the displacement slot, and leaves the slot zeroed.
    fn encode_jump(&mut self, mnemonic: &str, op: &Operand) -> Result<(), AsmError> {
        let opcode = match mnemonic {
            "jmp" => 0xEB,
            "je" | "jz" => 0x74,
            // jne / jnz
            _ => 0x75,
        };

        if op.kind != TokenKind::Identifier {
            return Err(AsmError::InvalidOperands {
                mnemonic: mnemonic.to_string(),
                detail: format!("only jumps to labels are supported, got {}", op.kind),
            });
        }

        self.emit(&[opcode]);
        let slot = self.code.len();
        let stale = self.rel_jump_patches.insert(slot, op.literal.clone());
        debug_assert!(stale.is_none(), "overlapping jump patch at {slot}");
        self.emit(&[0x00]);
        Ok(())
    }
}

/// ModR/M byte for the register/register forms: `0xC0 + 8*src + dst`,
/// with operand order `op dst, src`.
fn modrm_reg_reg(dst: &str, src: &str) -> Result<u8, AsmError> {
    let d = register_number(dst)?;
    let s = register_number(src)?;
    Ok(0xC0 + 8 * s + d)
}

/// Number of a low register, as an error rather than an option.
fn register_number(name: &str) -> Result<u8, AsmError> {
    inst::register_number(name).ok_or_else(|| AsmError::UnknownRegister {
        name: name.to_string(),
    })
}

/// A 32-bit little-endian immediate: signed values are truncated to their
/// low 32 bits, which the CPU sign-extends where the instruction demands.
fn imm32(literal: &str) -> Result<[u8; 4], AsmError> {
    let n = parse_number(literal).ok_or_else(|| AsmError::BadImmediate {
        literal: literal.to_string(),
    })?;
    Ok((n as u32).to_le_bytes())
}

fn invalid_operands(mnemonic: &str, ops: &[Operand]) -> AsmError {
    let kinds: Vec<String> = ops.iter().map(|op| op.kind.to_string()).collect();
    AsmError::InvalidOperands {
        mnemonic: mnemonic.to_string(),
        detail: format!("operand kinds [{}] have no encoding", kinds.join(", ")),
    }
}
