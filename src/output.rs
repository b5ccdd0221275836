// src/output.rs

//! Buffered file/console output
//!
//! [`Tee`] collects text in memory and, when closed or dropped, writes it to
//! a file in one write and optionally echoes it to stdout.

use crate::error::Result;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-memory writer flushed to a file and/or the console exactly once
#[derive(Debug)]
pub struct Tee {
    path: Option<PathBuf>,
    echo: bool,
    buffer: String,
    flushed: bool,
}

impl Tee {
    /// `path: None` only echoes
    pub fn new(path: Option<&Path>, echo: bool) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            echo,
            buffer: String::new(),
            flushed: false,
        }
    }

    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn writeln(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.buffer.push('\n');
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Flush and report any write error
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;

        if let Some(path) = &self.path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &self.buffer)?;
            debug!("Wrote {} bytes to {}", self.buffer.len(), path.display());
        }
        if self.echo {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(self.buffer.as_bytes())?;
            stdout.flush()?;
        }
        Ok(())
    }
}

impl fmt::Write for Tee {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buffer.push_str(s);
        Ok(())
    }
}

impl Drop for Tee {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to write output: {}", e);
        }
    }
}

/// Frame `text` with `#` rules as wide as its longest line
pub fn banner(text: &str) -> String {
    let width = text.lines().map(str::len).max().unwrap_or(0);
    let rule = "#".repeat(width);
    format!("\n{}\n{}\n{}\n", rule, text, rule)
}

/// Print a banner unless output is silenced
pub fn print_banner(text: &str, verbosity: u8) {
    if verbosity >= 1 {
        println!("{}", banner(text));
    }
}
