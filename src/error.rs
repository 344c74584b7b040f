use thiserror::Error;

use crate::code::Label;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers every failure that can occur while parsing class files, replaying them
/// through transforms, and encoding the result. All failures are deterministic functions of
/// the input and are reported as values; nothing in this crate aborts the process.
///
/// # Error Categories
///
/// ## Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid class file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::InvalidMagic`] - Input does not start with `0xCAFEBABE`
/// - [`Error::InvalidConstantIndex`] - A constant pool index is out of range or of the wrong kind
/// - [`Error::InvalidDescriptor`] - A field or method descriptor could not be parsed
/// - [`Error::UnknownOpcode`] - Code contains a byte that is not a JVM opcode
/// - [`Error::NotSupported`] - A construct this crate cannot represent
///
/// ## Structural Errors
/// - [`Error::UnresolvedLabel`] - A branch or range refers to a label that was never placed
/// - [`Error::DuplicateLabel`] - A label was placed more than once in one body
/// - [`Error::SlotWidthViolation`] - An instruction addresses the upper half of a wide local
/// - [`Error::MalformedExceptionRange`] - An exception range is empty or inverted
/// - [`Error::InvalidBranch`] - A branch displacement cannot be encoded
/// - [`Error::CodeTooLarge`] - Encoded code exceeds 65535 bytes
/// - [`Error::LimitExceeded`] - A class file limit (pool size, slot index, ...) was exceeded
///
/// ## Composition Errors
/// - [`Error::MissingInstrumentorCode`] - Instrumentor lacks code for a selected method
/// - [`Error::ReturnKindMismatch`] - A spliced return disagrees with the method descriptor
/// - [`Error::MemberCollision`] - Strict collision policy rejected an appended member
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{Container, Error};
///
/// match Container::parse(&[0xCA, 0xFE]) {
///     Ok(container) => println!("parsed {}", container.this_symbol()),
///     Err(Error::OutOfBounds) => eprintln!("truncated input"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Parsing errors
    /// The file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The input does not start with the class file magic number.
    #[error("Invalid class file magic - 0x{0:08X}")]
    InvalidMagic(u32),

    /// A constant pool index is zero, out of range, or points at an entry of the wrong kind.
    #[error("Invalid constant pool index - {0}")]
    InvalidConstantIndex(u16),

    /// A field descriptor, method descriptor, or symbol could not be parsed.
    #[error("Invalid descriptor - {0}")]
    InvalidDescriptor(String),

    /// The code array contains a byte that is not a defined JVM opcode.
    #[error("Unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode {
        /// The offending byte
        opcode: u8,
        /// Offset of the byte within the code array
        offset: usize,
    },

    /// The input uses a construct that cannot be represented by the model.
    #[error("Not supported - {0}")]
    NotSupported(String),

    // Structural errors
    /// A branch, exception range, or local variable scope refers to a label that has no
    /// label mark in the same body.
    ///
    /// Forward references are legal while a body is being built, so this error is only
    /// raised once the whole body has been seen.
    #[error("Unresolved label - {0}")]
    UnresolvedLabel(Label),

    /// A label was marked more than once within the same body.
    ///
    /// This is the typical symptom of splicing the same code twice without relabeling.
    #[error("Label placed more than once - {0}")]
    DuplicateLabel(Label),

    /// An instruction addresses the second half of a category-2 local as if it were an
    /// independent slot.
    #[error("Slot width violation at local {slot} (element {position})")]
    SlotWidthViolation {
        /// The slot being addressed
        slot: u16,
        /// Index of the offending element within the body
        position: usize,
    },

    /// An exception range is empty, inverted, or otherwise unusable.
    #[error("Malformed exception range - {0}")]
    MalformedExceptionRange(String),

    /// A branch displacement could not be encoded.
    #[error("Invalid branch - {0}")]
    InvalidBranch(String),

    /// The encoded code array exceeds the 65535 byte limit of the format.
    #[error("Code too large - {0} bytes")]
    CodeTooLarge(usize),

    /// A class file limit was exceeded (constant pool entries, local slots, stack depth, ...).
    #[error("Limit exceeded - {0}")]
    LimitExceeded(String),

    /// Recursion limit reached while resolving nested constants.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    // Composition errors
    /// A method selected for instrumentation has no counterpart with code in the instrumentor.
    #[error("Instrumentor has no code for {name}{descriptor}")]
    MissingInstrumentorCode {
        /// Name of the selected method
        name: String,
        /// Descriptor of the selected method
        descriptor: String,
    },

    /// A return instruction in spliced code disagrees with the return type of the method.
    #[error("Return kind mismatch - expected {expected}, found {found}")]
    ReturnKindMismatch {
        /// Return kind implied by the method descriptor
        expected: &'static str,
        /// Return kind of the offending instruction
        found: &'static str,
    },

    /// An appended member shares its name with an existing member of a different descriptor.
    #[error("Member collision - {name}{descriptor}")]
    MemberCollision {
        /// Name of the appended member
        name: String,
        /// Descriptor of the appended member
        descriptor: String,
    },
}
