// src/probe/exec.rs

//! Running external programs

use super::traits::{CommandOutput, CommandRunner, RunOptions};
use crate::error::{Error, Result};
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, warn};

/// Runs commands as child processes
///
/// `brew` as the program name is replaced by the configured Homebrew
/// executable.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    brew: String,
    verbosity: u8,
}

impl SystemRunner {
    pub fn new(verbosity: u8) -> Self {
        Self {
            brew: "brew".to_string(),
            verbosity,
        }
    }

    pub fn with_brew(mut self, brew: impl Into<String>) -> Self {
        self.brew = brew.into();
        self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String], options: &RunOptions) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::InvalidConfig("empty command line".to_string()))?;
        let command_line = argv.join(" ");
        if options.echo && self.verbosity >= 1 {
            println!("$ {}", command_line);
        }
        debug!("Running: {}", command_line);

        let program = if program == "brew" { &self.brew } else { program };
        let mut command = Command::new(program);
        command
            .args(args)
            .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(if options.merge_stderr {
                Stdio::piped()
            } else if options.capture_output {
                Stdio::null()
            } else {
                Stdio::inherit()
            });

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("{}: {}", command_line, e);
                warn!("{}", message);
                let output = CommandOutput {
                    code: -1,
                    lines: vec![message],
                };
                return finish(&command_line, output, options);
            }
        };

        let stderr_reader = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                BufReader::new(stderr)
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<String>>()
            })
        });

        let mut lines = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                let line = line.trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                if !options.capture_output && self.verbosity >= 1 {
                    println!("{}", line);
                }
                lines.push(line);
            }
        }

        let status = child.wait()?;
        if let Some(handle) = stderr_reader {
            if let Ok(err_lines) = handle.join() {
                lines.extend(err_lines.into_iter().filter(|l| !l.trim().is_empty()));
            }
        }

        let output = CommandOutput {
            code: status.code().unwrap_or(-1),
            lines,
        };
        finish(&command_line, output, options)
    }
}

fn finish(display: &str, output: CommandOutput, options: &RunOptions) -> Result<CommandOutput> {
    if options.fail_fast && !output.success() {
        if options.capture_output {
            for line in &output.lines {
                eprintln!("{}", line);
            }
        }
        return Err(Error::CommandFailed {
            command: display.to_string(),
            code: output.code,
        });
    }
    Ok(output)
}
