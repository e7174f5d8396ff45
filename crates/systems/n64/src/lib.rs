//! N64 graphics-task high-level emulation.
//!
//! Interprets the display lists that N64 games hand to the RSP graphics
//! microcode and turns them into draw calls on a host [`RenderBackend`]:
//!
//! - **Task dispatch**: parses the task-control block and raises the DP/SP
//!   side effects on the host ([`hle::GraphicsHle`])
//! - **Microcode identification**: version string and code hash select one of
//!   the GBI revisions ([`microcode`])
//! - **Display-list interpreter**: 256-entry dispatch tables, sub-list stack,
//!   triangle batching ([`interpreter`], [`dispatch`])
//! - **Geometry**: fixed-point matrices, vertex transform and lighting
//!   ([`math`], [`vertex`])
//! - **RDP state**: tiles, TMEM loads, texel decoding and the decoded-texture
//!   cache ([`tmem`], [`texture`], [`texture_cache`])
//!
//! # Example
//!
//! ```rust
//! use emu_n64_hle::backend::RecordingBackend;
//! use emu_n64_hle::hle::{GraphicsHle, NullHost};
//!
//! let mut hle = GraphicsHle::default();
//! let mut backend = RecordingBackend::new();
//! let ram = vec![0u8; 0x1000];
//! // An all-zero task block is type 0, which is reported and skipped
//! let outcome = hle
//!     .process_task(&ram, &[0u8; 64], &mut backend, &mut NullHost)
//!     .unwrap();
//! assert!(outcome.run.is_none());
//! ```

#![allow(clippy::upper_case_acronyms)]

pub mod backend;
#[cfg(feature = "opengl")]
pub mod backend_opengl;
pub mod config;
pub mod dispatch;
pub mod gbi;
pub mod hle;
pub mod interpreter;
pub mod math;
pub mod microcode;
mod rdp_commands;
mod rdram;
pub mod render_mode;
mod rsp_commands;
pub mod segment;
pub mod sink;
pub mod state;
pub mod stubs;
pub mod task;
pub mod texture;
pub mod texture_cache;
pub mod tmem;
pub mod triangles;
pub mod vertex;

pub use backend::RenderBackend;
pub use config::HleConfig;
pub use hle::GraphicsHle;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HleError {
    #[error("Unknown microcode hash {hash:#010X}")]
    UnknownMicrocode { hash: u32 },
    #[error("Vertex load overflows cache: v0={v0} count={count}")]
    VertexCacheOverflow { v0: u32, count: u32 },
    #[error("Vertex index {index} out of range")]
    VertexIndexOutOfRange { index: u32 },
    #[error("Unknown opcode {opcode:#04X}")]
    UnknownOpcode { opcode: u8 },
    #[error("Display list stack overflow at depth {depth}")]
    DisplayListStackOverflow { depth: usize },
    #[error("Command fetch at {address:#010X} is outside RDRAM")]
    CommandFetchOutOfRange { address: u32 },
    #[error("Unknown MoveMem type {kind:#04X}")]
    UnknownMoveMem { kind: u32 },
    #[error("Unknown ModifyVtx offset {offset:#04X}")]
    UnknownModifyVertex { offset: u32 },
    #[error("Task block too short: {0} bytes")]
    TruncatedTask(usize),
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HleResult<T> = Result<T, HleError>;

/// How a condition is treated by the interpreter.
///
/// Only `Fatal` and `Setup` are ever carried by an [`HleError`]; the other two
/// classes are logged and execution continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Halts the run and is surfaced to the host
    Fatal,
    /// Recognized command without an implementation; runs as a no-op
    Unimplemented,
    /// Recoverable data problem; the offending operation is skipped
    Anomaly,
    /// Bad input outside a display-list run (task block, config)
    Setup,
}

impl ErrorClass {
    /// Log line prefix
    pub fn prefix(self) -> &'static str {
        match self {
            ErrorClass::Fatal => "[halt]",
            ErrorClass::Unimplemented => "[unimplemented]",
            ErrorClass::Anomaly => "[anomaly]",
            ErrorClass::Setup => "[setup]",
        }
    }
}

impl HleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HleError::TruncatedTask(_)
            | HleError::Config(_)
            | HleError::Json(_)
            | HleError::Io(_) => ErrorClass::Setup,
            _ => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(
            HleError::UnknownOpcode { opcode: 0x42 }.class(),
            ErrorClass::Fatal
        );
        assert_eq!(HleError::TruncatedTask(12).class(), ErrorClass::Setup);
        assert_eq!(ErrorClass::Anomaly.prefix(), "[anomaly]");
    }

    #[test]
    fn test_error_messages() {
        let err = HleError::UnknownMicrocode { hash: 0xDEAD_BEEF };
        assert_eq!(err.to_string(), "Unknown microcode hash 0xDEADBEEF");
        let err = HleError::UnknownOpcode { opcode: 0x0A };
        assert_eq!(err.to_string(), "Unknown opcode 0x0A");
    }
}
