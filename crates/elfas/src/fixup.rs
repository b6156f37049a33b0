//! Post-encoding patch resolution.
//!
//! After every statement has been encoded, three passes over the patch
//! maps rewrite the reserved slots in place, using the deterministic
//! virtual-address layout of the emitted ELF (see [`crate::elf`]):
//!
//! 1. data patches — the absolute address of a data item, which sits after
//!    the code in the file image;
//! 2. absolute label patches — the absolute address of a code label;
//! 3. relative jump patches — a signed one-byte displacement from the end
//!    of the jump instruction to the label.
//!
//! Each patch writes into a distinct slot, so pass order cannot affect the
//! output.

use crate::elf::{HEADERS_SIZE, TEXT_VA};
use crate::encoder::Encoder;
use crate::error::AsmError;

/// Apply all recorded patches to the encoder's code buffer.
///
/// Fails if a referenced label was never defined, or if a short jump's
/// displacement does not fit in a signed byte.
pub(crate) fn apply(enc: &mut Encoder) -> Result<(), AsmError> {
    let code_len = enc.code.len();

    // Pass 1: absolute addresses of data items.  The data segment follows
    // the headers and the code in file order, so its bytes land at
    // TEXT_VA + HEADERS_SIZE + len(code) + offset.
    for (&slot, &data_offset) in &enc.data_patches {
        let va = TEXT_VA as usize + data_offset + code_len + HEADERS_SIZE;
        write_u32(&mut enc.code, slot, va as u32);
    }

    // Pass 2: absolute addresses of labels.
    for (&slot, label) in &enc.abs_label_patches {
        let Some(&offset) = enc.labels.get(label) else {
            return Err(AsmError::UndefinedLabel {
                label: label.clone(),
            });
        };
        let va = TEXT_VA as usize + offset + HEADERS_SIZE;
        write_u32(&mut enc.code, slot, va as u32);
    }

    // Pass 3: short relative jumps.  The displacement is measured from the
    // end of the instruction (the byte after the one-byte slot).
    for (&slot, label) in &enc.rel_jump_patches {
        let Some(&target) = enc.labels.get(label) else {
            return Err(AsmError::UndefinedLabel {
                label: label.clone(),
            });
        };
        let disp = target as i64 - (slot as i64 + 1);
        if i8::try_from(disp).is_err() {
            return Err(AsmError::JumpOutOfRange {
                label: label.clone(),
                disp,
            });
        }
        enc.code[slot] = disp as u8;
    }

    Ok(())
}

#[inline]
fn write_u32(code: &mut [u8], slot: usize, value: u32) {
    debug_assert!(slot + 4 <= code.len(), "patch slot {slot} out of bounds");
    code[slot..slot + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::parser::Parser;

    fn encode_and_fix(src: &str) -> Result<Encoder, AsmError> {
        let mut parser = Parser::new(src);
        let mut enc = Encoder::new();
        while let Some(stmt) = parser.next_statement() {
            enc.process(stmt)?;
        }
        apply(&mut enc)?;
        Ok(enc)
    }

    #[test]
    fn data_patch_uses_layout_address() {
        // code: 48 C7 C6 <slot> (7 bytes); data VA = 0x400000 + 0xB0 + 7.
        let enc = encode_and_fix(".msg DB \"Hi\"\nmov rsi, msg").unwrap();
        let expected = (0x400000u32 + 0xB0 + 7).to_le_bytes();
        assert_eq!(&enc.code()[3..7], expected);
    }

    #[test]
    fn second_data_item_adds_its_offset() {
        let enc = encode_and_fix(".a DB \"xy\"\n.b DB \"z\"\nmov rsi, b").unwrap();
        let expected = (0x400000u32 + 0xB0 + 7 + 2).to_le_bytes();
        assert_eq!(&enc.code()[3..7], expected);
    }

    #[test]
    fn absolute_label_patch() {
        // push start (5 bytes), label at offset 5.
        let enc = encode_and_fix("push start\n:start\nnop").unwrap();
        let expected = (0x400000u32 + 0xB0 + 5).to_le_bytes();
        assert_eq!(&enc.code()[1..5], expected);
    }

    #[test]
    fn backward_jump_displacement() {
        // Label at 0, dec rax at 0..3, jmp opcode at 3, slot at 4.
        // disp = 0 - 5 = -5 → 0xFB.
        let enc = encode_and_fix(":loop\ndec rax\njmp loop").unwrap();
        assert_eq!(enc.code(), [0x48, 0xFF, 0xC8, 0xEB, 0xFB]);
    }

    #[test]
    fn forward_jump_displacement() {
        // jmp opcode at 0, slot at 1, target at 2 → disp = 0.
        let enc = encode_and_fix("jmp done\n:done\nret").unwrap();
        assert_eq!(enc.code(), [0xEB, 0x00, 0xC3]);
    }

    #[test]
    fn jump_to_self() {
        let enc = encode_and_fix(":spin\njmp spin").unwrap();
        assert_eq!(enc.code(), [0xEB, 0xFE]);
    }

    #[test]
    fn undefined_label_in_jump_fails() {
        let err = encode_and_fix("jmp nowhere").unwrap_err();
        assert!(matches!(err, AsmError::UndefinedLabel { ref label } if label == "nowhere"));
    }

    #[test]
    fn undefined_label_in_push_fails() {
        let err = encode_and_fix("push nowhere").unwrap_err();
        assert!(matches!(err, AsmError::UndefinedLabel { ref label } if label == "nowhere"));
    }

    #[test]
    fn jump_out_of_range_fails() {
        let mut src = String::from(":top\n");
        for _ in 0..130 {
            src.push_str("nop\n");
        }
        src.push_str("jmp top");
        let err = encode_and_fix(&src).unwrap_err();
        assert!(matches!(err, AsmError::JumpOutOfRange { disp, .. } if disp < -128));
    }

    #[test]
    fn longest_representable_backward_jump() {
        // 126 nops, jmp opcode at 126, slot at 127: disp = 0 - 128 = -128.
        let mut src = String::from(":top\n");
        for _ in 0..126 {
            src.push_str("nop\n");
        }
        src.push_str("jmp top");
        let enc = encode_and_fix(&src).unwrap();
        assert_eq!(enc.code()[127], 0x80);
    }
}
