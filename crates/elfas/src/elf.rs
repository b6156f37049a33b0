//! ELF64 executable serialization.
//!
//! The container is a fixed template: a 64-byte ELF header, two `PT_LOAD`
//! program headers, then the code and data blobs back to back.  No section
//! headers, no symbol table, no relocations — the file is directly
//! executable.  The text segment starts at file offset 0 and is mapped at
//! [`TEXT_VA`], so the ELF headers themselves are part of the mapped
//! segment (the usual tiny-ELF layout).

use std::fs;
use std::io;
use std::path::Path;

/// Size of the ELF64 file header.
pub const ELF_HEADER_SIZE: usize = 0x40;
/// Size of one ELF64 program header.
pub const PROGRAM_HEADER_SIZE: usize = 0x38;
/// Number of program headers emitted (text + data).
pub const PHDR_COUNT: usize = 2;
/// Total header bytes preceding the code in the file image.
pub const HEADERS_SIZE: usize = ELF_HEADER_SIZE + PHDR_COUNT * PROGRAM_HEADER_SIZE;

/// Virtual address where the text segment (headers included) is mapped.
pub const TEXT_VA: u64 = 0x40_0000;
/// Base virtual address of the data segment mapping.
pub const DATA_VA: u64 = 0x60_0000;
/// Segment alignment demanded by the loader.
pub const SEGMENT_ALIGN: u64 = 0x20_0000;

/// The program entry point: the first code byte, right after the headers.
pub const ENTRY: u64 = TEXT_VA + HEADERS_SIZE as u64;

const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 0x3E;
const PT_LOAD: u32 = 1;
const PF_R_X: u32 = 0x5;
const PF_R_W_X: u32 = 0x7;

/// Little-endian byte sink for the fixed-layout header fields.
struct Builder {
    out: Vec<u8>,
}

impl Builder {
    fn with_capacity(cap: usize) -> Self {
        Self {
            out: Vec::with_capacity(cap),
        }
    }

    #[inline]
    fn bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    #[inline]
    fn u16(&mut self, value: u16) {
        self.bytes(&value.to_le_bytes());
    }

    #[inline]
    fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    #[inline]
    fn u64(&mut self, value: u64) {
        self.bytes(&value.to_le_bytes());
    }
}

/// Serialize the executable image for the given code and data blobs.
pub fn build(code: &[u8], data: &[u8]) -> Vec<u8> {
    let code_size = code.len() as u64;
    let data_size = data.len() as u64;
    let data_offset = HEADERS_SIZE as u64 + code_size;

    let mut b = Builder::with_capacity(HEADERS_SIZE + code.len() + data.len());

    // ── ELF header ──────────────────────────────────────────────
    b.bytes(&[0x7F, b'E', b'L', b'F']); // magic
    b.bytes(&[0x02]); // 64-bit
    b.bytes(&[0x01]); // little endian
    b.bytes(&[0x01]); // ELF version
    b.bytes(&[0x00]); // System V ABI
    b.bytes(&[0x00]); // ABI version
    b.bytes(&[0x00; 7]); // padding
    b.u16(ET_EXEC);
    b.u16(EM_X86_64);
    b.u32(1); // e_version
    b.u64(ENTRY);
    b.u64(ELF_HEADER_SIZE as u64); // e_phoff: program headers follow immediately
    b.u64(0); // e_shoff: no section headers
    b.u32(0); // e_flags
    b.u16(ELF_HEADER_SIZE as u16);
    b.u16(PROGRAM_HEADER_SIZE as u16);
    b.u16(PHDR_COUNT as u16);
    b.u16(0); // e_shentsize
    b.u16(0); // e_shnum
    b.u16(0); // e_shstrndx

    // ── Text program header ─────────────────────────────────────
    // Maps from file offset 0, so the ELF headers ride along in the
    // executable segment.
    b.u32(PT_LOAD);
    b.u32(PF_R_X);
    b.u64(0); // p_offset
    b.u64(TEXT_VA); // p_vaddr
    b.u64(TEXT_VA); // p_paddr
    b.u64(code_size); // p_filesz
    b.u64(code_size); // p_memsz
    b.u64(SEGMENT_ALIGN);

    // ── Data program header ─────────────────────────────────────
    let data_vaddr = DATA_VA + data_offset;
    b.u32(PT_LOAD);
    b.u32(PF_R_W_X);
    b.u64(data_offset);
    b.u64(data_vaddr);
    b.u64(data_vaddr);
    b.u64(data_size);
    b.u64(data_size);
    b.u64(SEGMENT_ALIGN);

    // ── Payload ─────────────────────────────────────────────────
    b.bytes(code);
    b.bytes(data);
    b.out
}

/// Serialize and write the executable to `path` with mode 0755.
pub fn write_executable(path: &Path, code: &[u8], data: &[u8]) -> io::Result<()> {
    fs::write(path, build(code, data))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}
