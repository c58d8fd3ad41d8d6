use snafu::Snafu;

use crate::kernel::{ArgKind, DevicePtr};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The device compiler rejected a kernel recipe.
    #[snafu(display("failed to compile {program}::{entry_point}: {reason}"))]
    Compilation { program: String, entry_point: String, reason: String },

    #[snafu(display("unknown kernel program: {program}"))]
    UnknownProgram { program: String },

    #[snafu(display("program {program} has no entry point {entry_point}"))]
    UnknownEntryPoint { program: String, entry_point: String },

    /// Argument list length differs from the launch function's arity.
    #[snafu(display("argument count mismatch: expected {expected}, got {actual}"))]
    ArgumentCountMismatch { expected: usize, actual: usize },

    /// Stored argument type differs from the launch parameter type.
    #[snafu(display("argument {index} type mismatch: expected {expected}, got {actual}"))]
    ArgumentTypeMismatch { index: usize, expected: ArgKind, actual: ArgKind },

    #[snafu(display("invalid device pointer: {ptr}"))]
    InvalidPointer { ptr: DevicePtr },

    /// Access past the end of a device allocation.
    #[snafu(display("out of bounds: offset {offset} + size {size} exceeds buffer size {buffer_size} at {ptr}"))]
    OutOfBounds { ptr: DevicePtr, offset: usize, size: usize, buffer_size: usize },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Kernel body reported a failure while running.
    #[snafu(display("kernel {kernel} failed: {reason}"))]
    Launch { kernel: String, reason: String },

    #[snafu(display("runtime error: {message}"))]
    Runtime { message: String },
}
