//! Process execution seam.
//!
//! Every call to an external tool (ipset, iptables, ip) goes through the
//! [`Exec`] trait so the backends can be unit tested against mocks or
//! recording fakes instead of a live kernel.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::TransTunnelError;

#[cfg(test)]
use mockall::automock;

/// Captured result of one external command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Spawning abstraction over external tools.
///
/// `run`/`run_with_input` return `Err` only when the process could not be
/// spawned at all; a spawned command that exits non-zero comes back as
/// `Ok` with `success == false`.
#[cfg_attr(test, automock)]
pub trait Exec: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<ExecOutput>;

    /// Run a command feeding `input` to its stdin.
    fn run_with_input(&self, program: &str, args: &[String], input: &str) -> Result<ExecOutput>;
}

/// Real executor backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExec;

impl Exec for SystemExec {
    fn run(&self, program: &str, args: &[String]) -> Result<ExecOutput> {
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {program}"))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }

    fn run_with_input(&self, program: &str, args: &[String], input: &str) -> Result<ExecOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {program}"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }
}

/// Convert a borrowed argument list into the owned form the trait takes.
///
/// Mockall cannot express the lifetimes of `&[&str]`, so the trait uses
/// `&[String]`.
pub fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Run a command and require success, folding stderr into a backend error.
pub fn run_checked(exec: &dyn Exec, program: &str, arg_list: &[&str]) -> Result<String> {
    let out = exec.run(program, &args(arg_list))?;
    if out.success {
        Ok(out.stdout)
    } else {
        Err(backend_error(program, arg_list, &out))
    }
}

/// Like [`run_checked`], with data written to the command's stdin.
pub fn run_with_input_checked(
    exec: &dyn Exec,
    program: &str,
    arg_list: &[&str],
    input: &str,
) -> Result<String> {
    let out = exec.run_with_input(program, &args(arg_list), input)?;
    if out.success {
        Ok(out.stdout)
    } else {
        Err(backend_error(program, arg_list, &out))
    }
}

fn backend_error(program: &str, arg_list: &[&str], out: &ExecOutput) -> anyhow::Error {
    TransTunnelError::Backend(format!(
        "{} {} exited with an error: {}",
        program,
        arg_list.join(" "),
        out.stderr.trim()
    ))
    .into()
}
