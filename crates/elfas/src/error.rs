//! Error types for every stage of the pipeline.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Assembly error with a descriptive, single-line message.
///
/// Lex failures surface as `ILLEGAL` tokens and parse failures as `Error`
/// statements; both are converted into [`AsmError::Syntax`] when the driver
/// consumes the statement stream.  Encoding and fixup failures are raised
/// directly.  The first error aborts compilation — no partial output file
/// is ever written.
#[derive(Debug)]
pub enum AsmError {
    /// Lexing or parsing failed (unterminated string, wrong token, ...).
    Syntax {
        /// The syntax error message.
        msg: String,
    },

    /// Mnemonic not present in the instruction registry.
    UnknownInstruction {
        /// The mnemonic that was not recognized.
        mnemonic: String,
    },

    /// The mnemonic exists but the operand combination has no encoding.
    InvalidOperands {
        /// The instruction mnemonic.
        mnemonic: String,
        /// Description of the operand forms that were seen.
        detail: String,
    },

    /// Register name outside the encodable set for this instruction form.
    UnknownRegister {
        /// The register name.
        name: String,
    },

    /// An operand literal could not be converted to a number.
    BadImmediate {
        /// The offending literal.
        literal: String,
    },

    /// `mov reg, <identifier>` named a data item that has not been defined.
    UndefinedData {
        /// The identifier that failed to resolve.
        name: String,
    },

    /// A jump or `push` referenced a label that was never defined.
    UndefinedLabel {
        /// The undefined label name.
        label: String,
    },

    /// Short-jump displacement does not fit in a signed byte.
    JumpOutOfRange {
        /// The target label name.
        label: String,
        /// The actual displacement to the target.
        disp: i64,
    },

    /// Reading the source or writing the executable failed.
    Io {
        /// The path that was being read or written.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::Syntax { msg } => {
                write!(f, "{}", msg)
            }
            AsmError::UnknownInstruction { mnemonic } => {
                write!(f, "unknown instruction '{}'", mnemonic)
            }
            AsmError::InvalidOperands { mnemonic, detail } => {
                write!(f, "invalid operand combination for '{}': {}", mnemonic, detail)
            }
            AsmError::UnknownRegister { name } => {
                write!(f, "unknown register '{}'", name)
            }
            AsmError::BadImmediate { literal } => {
                write!(f, "unable to convert '{}' to number", literal)
            }
            AsmError::UndefinedData { name } => {
                write!(f, "reference to unknown label/data: '{}'", name)
            }
            AsmError::UndefinedLabel { label } => {
                write!(f, "undefined label '{}'", label)
            }
            AsmError::JumpOutOfRange { label, disp } => {
                write!(
                    f,
                    "jump to '{}' out of range (displacement={}, max=\u{b1}127)",
                    label, disp
                )
            }
            AsmError::Io { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for AsmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AsmError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_display() {
        let err = AsmError::Syntax {
            msg: "expected DB, got NUMBER '42'".into(),
        };
        assert_eq!(format!("{}", err), "expected DB, got NUMBER '42'");
    }

    #[test]
    fn unknown_instruction_display() {
        let err = AsmError::UnknownInstruction {
            mnemonic: "frobnicate".into(),
        };
        assert_eq!(format!("{}", err), "unknown instruction 'frobnicate'");
    }

    #[test]
    fn undefined_label_display() {
        let err = AsmError::UndefinedLabel {
            label: "exit".into(),
        };
        assert_eq!(format!("{}", err), "undefined label 'exit'");
    }

    #[test]
    fn undefined_data_display() {
        let err = AsmError::UndefinedData { name: "msg".into() };
        assert_eq!(format!("{}", err), "reference to unknown label/data: 'msg'");
    }

    #[test]
    fn jump_out_of_range_display() {
        let err = AsmError::JumpOutOfRange {
            label: "far".into(),
            disp: -300,
        };
        assert_eq!(
            format!("{}", err),
            "jump to 'far' out of range (displacement=-300, max=\u{b1}127)"
        );
    }

    #[test]
    fn io_error_has_source() {
        use std::error::Error;
        let err = AsmError::Io {
            path: PathBuf::from("missing.asm"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.source().is_some());
        assert!(format!("{}", err).starts_with("missing.asm"));
    }
}
