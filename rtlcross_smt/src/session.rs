//! Interactive solver session over a `z3` child process.
//!
//! The session speaks plain SMT-LIBv2 down the child's stdin, which is what
//! lets it replay backend-emitted preambles verbatim before the miter is
//! asserted on top. Every read is bounded by the solver timeout; a stuck
//! solver kills the job, not the harness.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

use rtlcross_common::consts::SMT_SOLVER_TIMEOUT;

use crate::term::{Term, parse_terms};

/// Outcome of a `check-sat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    /// The assertions are satisfiable.
    Sat,
    /// The assertions are unsatisfiable.
    Unsat,
    /// The solver gave up (resource limit or incompleteness).
    Unknown,
}

/// Failures of the solver session.
#[derive(Debug, Error)]
pub enum SmtError {
    /// No solver binary was found.
    #[error("failed to find `z3` binary: {0}")]
    SolverNotFound(#[from] which::Error),
    /// Pipe-level I/O failure.
    #[error("io error talking to the solver: {0}")]
    Io(#[from] std::io::Error),
    /// The solver produced no answer within the timeout.
    #[error("solver timed out after {0} s")]
    Timeout(u64),
    /// The solver reported an error for a command we sent.
    #[error("solver error: {0}")]
    Solver(String),
    /// The solver's reply did not parse.
    #[error("unexpected solver response: {0}")]
    UnexpectedResponse(String),
}

/// One interactive solver process.
#[derive(Debug)]
pub struct SmtSession {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
    timeout: Duration,
    sync_counter: usize,
    fresh_counter: usize,
}

impl SmtSession {
    /// Spawns `z3 -smt2 -in` and prepares the reply reader.
    pub fn spawn() -> Result<Self, SmtError> {
        let z3 = which::which("z3")?;
        let mut child = Command::new(z3)
            .args(["-smt2", "-in"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let (tx, rx) = channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        debug!("solver session started");
        Ok(Self {
            child,
            stdin,
            lines: rx,
            timeout: SMT_SOLVER_TIMEOUT,
            sync_counter: 0,
            fresh_counter: 0,
        })
    }

    /// Overrides the per-read timeout (tests use a short one).
    pub const fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn read_line(&mut self, deadline: Instant) -> Result<String, SmtError> {
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(SmtError::Timeout(self.timeout.as_secs()))?;
            match self.lines.recv_timeout(remaining) {
                Ok(Ok(line)) => {
                    trace!(line = %line, "solver reply");
                    if !line.trim().is_empty() {
                        return Ok(line);
                    }
                }
                Ok(Err(e)) => return Err(SmtError::Io(e)),
                Err(RecvTimeoutError::Timeout) => {
                    let _ = self.child.kill();
                    return Err(SmtError::Timeout(self.timeout.as_secs()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SmtError::UnexpectedResponse(
                        "solver closed its output stream".into(),
                    ));
                }
            }
        }
    }

    /// Writes raw SMT-LIBv2 text and waits for the solver to accept it.
    ///
    /// Errors the solver prints while digesting the text surface here.
    pub fn send_raw(&mut self, text: &str) -> Result<(), SmtError> {
        self.stdin.write_all(text.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.sync()
    }

    /// Round-trips an `(echo ...)` marker to ensure everything sent so far
    /// was consumed without errors.
    fn sync(&mut self) -> Result<(), SmtError> {
        self.sync_counter += 1;
        let marker = format!("rtlcross-sync-{}", self.sync_counter);
        writeln!(self.stdin, "(echo \"{marker}\")")?;
        self.stdin.flush()?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let line = self.read_line(deadline)?;
            if line.contains(&marker) {
                return Ok(());
            }
            if line.trim_start().starts_with("(error") {
                return Err(SmtError::Solver(line));
            }
            // Anything else is a stale reply from an earlier command.
        }
    }

    /// Sends a single command term.
    pub fn command(&mut self, term: &Term) -> Result<(), SmtError> {
        self.send_raw(&term.to_string())
    }

    /// `(assert term)`
    pub fn assert(&mut self, term: &Term) -> Result<(), SmtError> {
        self.command(&Term::app("assert", vec![term.clone()]))
    }

    /// `(declare-const name sort)`, returning the constant as a term.
    pub fn declare_const(&mut self, name: &str, sort: &Term) -> Result<Term, SmtError> {
        self.command(&Term::list(vec![
            Term::atom("declare-const"),
            Term::symbol(name),
            sort.clone(),
        ]))?;
        Ok(Term::symbol(name))
    }

    /// Declares a fresh constant of the given sort.
    pub fn fresh_const(&mut self, prefix: &str, sort: &Term) -> Result<Term, SmtError> {
        self.fresh_counter += 1;
        let name = format!("{prefix}!{}", self.fresh_counter);
        self.declare_const(&name, sort)
    }

    /// `(push 1)`
    pub fn push(&mut self) -> Result<(), SmtError> {
        self.send_raw("(push 1)")
    }

    /// `(pop 1)`
    pub fn pop(&mut self) -> Result<(), SmtError> {
        self.send_raw("(pop 1)")
    }

    /// `(check-sat)`
    pub fn check_sat(&mut self) -> Result<SatResult, SmtError> {
        writeln!(self.stdin, "(check-sat)")?;
        self.stdin.flush()?;
        let deadline = Instant::now() + self.timeout;
        let line = self.read_line(deadline)?;
        match line.trim() {
            "sat" => Ok(SatResult::Sat),
            "unsat" => Ok(SatResult::Unsat),
            "unknown" => Ok(SatResult::Unknown),
            other if other.starts_with("(error") => Err(SmtError::Solver(other.to_owned())),
            other => Err(SmtError::UnexpectedResponse(other.to_owned())),
        }
    }

    /// `(get-value (terms...))`, returning `(term, value)` pairs.
    pub fn get_value(&mut self, terms: &[Term]) -> Result<Vec<(Term, Term)>, SmtError> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        writeln!(
            self.stdin,
            "(get-value ({}))",
            terms
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        )?;
        self.stdin.flush()?;

        let deadline = Instant::now() + self.timeout;
        let mut response = String::new();
        loop {
            let line = self.read_line(deadline)?;
            if line.trim_start().starts_with("(error") {
                return Err(SmtError::Solver(line));
            }
            response.push_str(&line);
            response.push('\n');
            if balanced(&response) {
                break;
            }
        }

        let parsed = parse_terms(&response)
            .map_err(|e| SmtError::UnexpectedResponse(e.to_string()))?;
        let Some(Term::List(pairs)) = parsed.into_iter().next() else {
            return Err(SmtError::UnexpectedResponse(response));
        };
        pairs
            .into_iter()
            .map(|pair| match pair {
                Term::List(mut items) if items.len() == 2 => {
                    let value = items.pop().expect("two items");
                    let term = items.pop().expect("one item");
                    Ok((term, value))
                }
                other => Err(SmtError::UnexpectedResponse(other.to_string())),
            })
            .collect()
    }
}

fn balanced(text: &str) -> bool {
    let mut depth = 0i64;
    let mut any = false;
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '|' => quoted = !quoted,
            '(' if !quoted => {
                depth += 1;
                any = true;
            }
            ')' if !quoted => depth -= 1,
            _ => {}
        }
    }
    any && depth <= 0
}

impl Drop for SmtSession {
    fn drop(&mut self) {
        let _ = self.stdin.write_all(b"(exit)\n");
        let _ = self.stdin.flush();
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_tracker_ignores_quoted_symbols() {
        assert!(balanced("((a b))"));
        assert!(!balanced("((a b)"));
        assert!(balanced("((|a ( b| #b01))"));
        assert!(!balanced("plain text"));
    }
}
