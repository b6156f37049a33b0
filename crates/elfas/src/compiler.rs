//! The driver: source text in, executable out.
//!
//! [`assemble`] runs the pure pipeline (lex → parse → encode → fixup) and
//! returns an [`Image`]; [`Compiler`] wraps it with output-path handling
//! and ELF emission for the command line.

use std::path::{Path, PathBuf};

use crate::elf;
use crate::encoder::Encoder;
use crate::error::AsmError;
use crate::fixup;
use crate::parser::Parser;

/// The result of a successful assembly: the fixed-up code and data blobs,
/// ready for the ELF writer.
#[derive(Debug, Clone)]
#[must_use]
pub struct Image {
    code: Vec<u8>,
    data: Vec<u8>,
    /// Label name → code offset, in name order.
    labels: Vec<(String, usize)>,
    /// Non-fatal parser diagnostics (skipped stray tokens).
    diagnostics: Vec<String>,
}

impl Image {
    /// The text segment, with all patches applied.
    ///
    /// # Examples
    ///
    /// ```
    /// let image = elfas::assemble("nop")?;
    /// assert_eq!(image.code(), [0x90]);
    /// # Ok::<(), elfas::AsmError>(())
    /// ```
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// The data segment.
    ///
    /// # Examples
    ///
    /// ```
    /// let image = elfas::assemble(".msg DB \"Hi\"")?;
    /// assert_eq!(image.data(), b"Hi");
    /// # Ok::<(), elfas::AsmError>(())
    /// ```
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Labels defined by the program (name → code offset).
    pub fn labels(&self) -> &[(String, usize)] {
        &self.labels
    }

    /// Look up one label's code offset.
    ///
    /// # Examples
    ///
    /// ```
    /// let image = elfas::assemble("nop\n:here\nret")?;
    /// assert_eq!(image.label_offset("here"), Some(1));
    /// assert_eq!(image.label_offset("missing"), None);
    /// # Ok::<(), elfas::AsmError>(())
    /// ```
    pub fn label_offset(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, off)| off)
    }

    /// The virtual address execution starts at.
    pub fn entry_point(&self) -> u64 {
        elf::ENTRY
    }

    /// Non-fatal diagnostics recorded while parsing.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Consume the image, returning `(code, data)`.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.code, self.data)
    }
}

/// Assemble a source program into its code and data blobs.
///
/// This is the whole pipeline minus file I/O: statements stream from the
/// parser into the encoder, then the fixup passes rewrite the recorded
/// slots.  The first error aborts and nothing is returned.
///
/// # Errors
///
/// Returns [`AsmError`] on any lex, parse, encoding, or fixup failure.
///
/// # Examples
///
/// ```
/// let image = elfas::assemble("xor rax, rax")?;
/// assert_eq!(image.code(), [0x48, 0x31, 0xC0]);
/// # Ok::<(), elfas::AsmError>(())
/// ```
pub fn assemble(source: &str) -> Result<Image, AsmError> {
    let mut parser = Parser::new(source);
    let mut encoder = Encoder::new();

    while let Some(stmt) = parser.next_statement() {
        encoder.process(stmt)?;
    }

    fixup::apply(&mut encoder)?;

    let labels = encoder
        .labels()
        .iter()
        .map(|(name, &off)| (name.clone(), off))
        .collect();
    let diagnostics = parser.into_diagnostics();
    let (code, data) = (encoder.code, encoder.data);

    Ok(Image {
        code,
        data,
        labels,
        diagnostics,
    })
}

/// Compiles one source program into an executable on disk.
///
/// # Examples
///
/// ```no_run
/// use elfas::Compiler;
///
/// let mut compiler = Compiler::new("mov rax, 60\nint 0x80");
/// compiler.set_output("./exit60");
/// compiler.compile()?;
/// # Ok::<(), elfas::AsmError>(())
/// ```
#[derive(Debug)]
pub struct Compiler {
    source: String,
    output: PathBuf,
}

impl Compiler {
    /// Create a compiler for `source`, writing to `./a.out` by default.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: PathBuf::from("a.out"),
        }
    }

    /// Override the output path.
    pub fn set_output(&mut self, path: impl Into<PathBuf>) {
        self.output = path.into();
    }

    /// The configured output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Run the pipeline and write the executable.
    ///
    /// Parser diagnostics go to stderr; no output file is written when any
    /// stage fails.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError`] on assembly failure or when the output file
    /// cannot be written.
    pub fn compile(&self) -> Result<(), AsmError> {
        let image = assemble(&self.source)?;
        for diag in image.diagnostics() {
            eprintln!("warning: {}", diag);
        }
        elf::write_executable(&self.output, image.code(), image.data()).map_err(|source| {
            AsmError::Io {
                path: self.output.clone(),
                source,
            }
        })
    }
}
