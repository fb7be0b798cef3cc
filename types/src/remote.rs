//! Remote errors
//!
//! An error raised by the callee is carried back to the caller with the frames
//! recorded on the remote side. Before it is handed to the caller, the
//! dispatcher appends a separator frame followed by the caller's local frames,
//! so a single trace reads remote-then-local:
//!
//! ```text
//! AccountService.withdraw (slice-server.rs:120)     <- remote frames
//! ------End remote and begin local stacktrace------ <- separator
//! AccountService.withdraw [proxy]                   <- local frames
//! caller (src/main.rs:42)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Function name of the synthetic frame between remote and local frames
pub const STACK_SEPARATOR: &str = "------End remote and begin local stacktrace------";

/// One entry of a recorded call trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl Frame {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(function: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            file: Some(file.into()),
            line: Some(line),
        }
    }

    /// Frame pointing at a `#[track_caller]` location
    pub fn from_location(function: impl Into<String>, location: &Location<'_>) -> Self {
        Self::at(function, location.file(), location.line())
    }

    pub fn separator() -> Self {
        Self::new(STACK_SEPARATOR)
    }

    pub fn is_separator(&self) -> bool {
        self.function == STACK_SEPARATOR && self.file.is_none()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{} ({}:{})", self.function, file, line),
            (Some(file), None) => write!(f, "{} ({})", self.function, file),
            _ => f.write_str(&self.function),
        }
    }
}

/// Error raised by the callee of a remote call.
///
/// `kind` names the error type on the remote side and survives the trip to
/// the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
    pub frames: Vec<Frame>,
    #[source]
    pub cause: Option<Box<RemoteError>>,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            frames: Vec::new(),
            cause: None,
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = Frame>) -> Self {
        self.frames.extend(frames);
        self
    }

    pub fn caused_by(mut self, cause: RemoteError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Append the separator frame and the caller's local frames.
    pub fn stitch_local(mut self, local: impl IntoIterator<Item = Frame>) -> Self {
        self.frames.push(Frame::separator());
        self.frames.extend(local);
        self
    }

    /// Whether local frames have already been stitched on
    pub fn is_stitched(&self) -> bool {
        self.frames.iter().any(Frame::is_separator)
    }

    /// Frames recorded on the remote side
    pub fn remote_frames(&self) -> &[Frame] {
        match self.frames.iter().position(Frame::is_separator) {
            Some(idx) => &self.frames[..idx],
            None => &self.frames,
        }
    }

    /// Frames stitched on by the caller, empty if not stitched
    pub fn local_frames(&self) -> &[Frame] {
        match self.frames.iter().position(Frame::is_separator) {
            Some(idx) => &self.frames[idx + 1..],
            None => &[],
        }
    }

    /// Render the error and its whole trace, causes included
    pub fn format_trace(&self) -> String {
        let mut out = String::new();
        let mut current = Some(self);
        let mut first = true;
        while let Some(err) = current {
            if !first {
                out.push_str("Caused by: ");
            }
            out.push_str(&format!("{}: {}\n", err.kind, err.message));
            for frame in &err.frames {
                out.push_str(&format!("    at {}\n", frame));
            }
            first = false;
            current = err.cause.as_deref();
        }
        out
    }
}
