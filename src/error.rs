use thiserror::Error;

use crate::metadata::MethodRef;

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
/// Every variant describes a *structural* failure: a malformed instruction stream, a
/// violated stack discipline, or an optimization whose postcondition did not hold. These
/// indicate a bug in the producer of the code or in an earlier pass, they are never retried,
/// and they abort compilation of the enclosing unit.
///
/// Policy decisions (for example an allocation that is not eligible for class inlining) are
/// *not* errors and never surface through this type.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Generic structural problem, annotated with the source location of the check
/// - [`Error::MalformedCode`] - A method body that cannot be lifted
/// - [`Error::StackUnderflow`] / [`Error::StackOverflow`] / [`Error::StackMismatch`] - Operand stack violations
///
/// ## Optimization Errors
/// - [`Error::InliningPostcondition`] - The class inliner left the graph in an inconsistent state
/// - [`Error::SsaVerification`] - The SSA verifier rejected a function
///
/// ## Lookup Errors
/// - [`Error::InvalidLens`] - A lens identifier that does not belong to the chain
/// - [`Error::NotFound`] - A definition the caller required is absent
///
/// # Examples
///
/// ```rust,ignore
/// use cfopt::{Error, analysis::Lifter};
///
/// match Lifter::new(&method, &code).lift() {
///     Ok(ssa) => println!("{} blocks", ssa.block_count()),
///     Err(Error::StackUnderflow { method, offset }) => {
///         eprintln!("{method} pops an empty stack at {offset}");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is structurally broken.
    ///
    /// Carries the source file and line of the check that failed, which makes producer
    /// bugs easy to trace back.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A method body could not be lifted.
    #[error("Malformed code in {method} at {offset}: {message}")]
    MalformedCode {
        /// The method whose body is malformed
        method: MethodRef,
        /// Index of the offending instruction in the stream
        offset: usize,
        /// What was wrong
        message: String,
    },

    /// An instruction popped more values than the simulated stack holds.
    #[error("Stack underflow in {method} at {offset}")]
    StackUnderflow {
        /// The method being lifted
        method: MethodRef,
        /// Index of the offending instruction
        offset: usize,
    },

    /// The simulated stack grew beyond the declared maximum depth.
    #[error("Stack overflow in {method} at {offset} (max_stack {max_stack})")]
    StackOverflow {
        /// The method being lifted
        method: MethodRef,
        /// Index of the offending instruction
        offset: usize,
        /// The declared maximum
        max_stack: u16,
    },

    /// Two control-flow paths reach the same instruction with different stack depths.
    #[error("Stack depth mismatch in {method} at {offset}: expected {expected}, found {found}")]
    StackMismatch {
        /// The method being lifted
        method: MethodRef,
        /// Index of the merge point
        offset: usize,
        /// Depth recorded by the first path
        expected: usize,
        /// Depth carried by the conflicting path
        found: usize,
    },

    /// The class inliner violated one of its own postconditions.
    #[error("Inlining postcondition violated in {method} at {offset}: {message}")]
    InliningPostcondition {
        /// The method being optimized
        method: MethodRef,
        /// Position of the allocation being inlined
        offset: usize,
        /// Which postcondition failed
        message: String,
    },

    /// The SSA verifier rejected a function.
    #[error("SSA verification failed for {method}: {message}")]
    SsaVerification {
        /// The function that failed verification
        method: MethodRef,
        /// The first violation found
        message: String,
    },

    /// A lens identifier does not exist or is not an ancestor of the queried layer.
    #[error("Invalid lens - {0}")]
    InvalidLens(String),

    /// A required definition was not found.
    #[error("Not found - {0}")]
    NotFound(String),
}
