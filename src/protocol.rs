//! Binary output protocol.
//!
//! Stdout carries nothing but frames; logging goes to stderr. A frame is a
//! tag byte, one flag byte, UTF-8 payload, and a single zero separator.
//! The parent decodes by splitting on the separator.

use std::io::Write;

use crate::config::types::Result;
use crate::engine::Severity;

/// Frame tag: engine diagnostic.
pub const TAG_MESSAGE: u8 = 1;
/// Frame tag: final result.
pub const TAG_RESULT: u8 = 2;

pub const LEVEL_INFO: u8 = 1;
pub const LEVEL_WARNING: u8 = 2;
pub const LEVEL_ERROR: u8 = 3;
pub const LEVEL_UNKNOWN: u8 = 4;

pub const RESULT_EXACT: u8 = 1;
pub const RESULT_APPROXIMATE: u8 = 2;

/// Frame terminator.
pub const SEPARATOR: u8 = 0;

fn level_byte(severity: Severity) -> u8 {
    match severity {
        Severity::Info => LEVEL_INFO,
        Severity::Warning => LEVEL_WARNING,
        Severity::Error => LEVEL_ERROR,
        Severity::Unknown => LEVEL_UNKNOWN,
    }
}

/// Frame writer over any byte sink.
///
/// Each frame is drafted in full, then written and flushed as one unit. A
/// filter kill between two partial writes must never leave a torn frame on
/// the wire; the draft buffer keeps the write syscall per frame down to one.
pub struct FrameSink<W: Write> {
    out: W,
    buf: Vec<u8>,
}

impl<W: Write> FrameSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buf: Vec::new(),
        }
    }

    /// Message frame: severity byte, then `line <n>: <text>`.
    pub fn message(&mut self, severity: Severity, line: usize, text: &str) -> Result<()> {
        self.buf.clear();
        self.buf.push(TAG_MESSAGE);
        self.buf.push(level_byte(severity));
        self.buf.extend_from_slice(format!("line {line}: ").as_bytes());
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(SEPARATOR);
        self.flush_frame()
    }

    /// Result frame: exactness byte, then the formatted text.
    pub fn result(&mut self, text: &str, approximate: bool) -> Result<()> {
        self.buf.clear();
        self.buf.push(TAG_RESULT);
        self.buf.push(if approximate {
            RESULT_APPROXIMATE
        } else {
            RESULT_EXACT
        });
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(SEPARATOR);
        self.flush_frame()
    }

    fn flush_frame(&mut self) -> Result<()> {
        self.out.write_all(&self.buf)?;
        self.out.flush()?;
        Ok(())
    }
}
