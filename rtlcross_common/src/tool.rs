//! Adapters for the external tools the harness drives.
//!
//! Every adapter is one operation per tool invocation: argv goes in, captured
//! stdout (or a clean-exit flag) comes out. Output is silenced on success and
//! surfaces inside the error on failure; a wall-clock timeout turns into its
//! own error kind. No retries happen at this layer.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::consts::{DEFAULT_TIMEOUT, KLEE_TIMEOUT, SMT_SOLVER_TIMEOUT};

/// Errors produced by external tool invocations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool binary could not be located on the system.
    #[error("failed to find `{tool}` binary: {source}")]
    NotFound {
        /// Name of the binary searched for.
        tool: String,
        /// Lookup failure reported by `which`.
        source: which::Error,
    },
    /// An I/O error occurred while spawning or talking to the child.
    #[error("io error while running `{tool}`: {source}")]
    Io {
        /// Name of the binary.
        tool: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The tool exited with a nonzero status.
    #[error("`{tool}` failed with {status}\nSTDOUT: {stdout}\nSTDERR: {stderr}")]
    Failed {
        /// Name of the binary.
        tool: String,
        /// Exit status description.
        status: String,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// The tool exceeded its wall-clock budget and was killed.
    #[error("`{tool}` timed out after {seconds} s")]
    Timeout {
        /// Name of the binary.
        tool: String,
        /// The budget that was exceeded.
        seconds: u64,
    },
}

/// Captured result of a successful tool run.
#[derive(Debug)]
pub struct ToolOutput {
    /// Verbatim standard output.
    pub stdout: String,
}

/// A single external tool invocation, bounded by a timeout.
#[derive(Debug)]
pub struct ToolCommand {
    program: PathBuf,
    tool: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl ToolCommand {
    /// Locates `tool` in `PATH` and prepares an invocation with the default
    /// timeout.
    pub fn new(tool: &str) -> Result<Self, ToolError> {
        let program = which::which(tool).map_err(|source| ToolError::NotFound {
            tool: tool.to_owned(),
            source,
        })?;
        Ok(Self {
            program,
            tool: tool.to_owned(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Prepares an invocation of a binary at an explicit path (generated
    /// executables that are not in `PATH`).
    pub fn at(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let tool = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            program,
            tool,
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the child.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Overrides the wall-clock budget.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn io_err(&self, source: std::io::Error) -> ToolError {
        ToolError::Io {
            tool: self.tool.clone(),
            source,
        }
    }

    /// Runs the child to completion, enforcing the timeout.
    pub fn run(&self) -> Result<ToolOutput, ToolError> {
        debug!(tool = %self.tool, args = ?self.args, "running external tool");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| self.io_err(e))?;

        // Drain both pipes on side threads so a chatty child cannot block on
        // a full pipe while we poll for its exit.
        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_thread = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });
        let stderr_thread = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait().map_err(|e| self.io_err(e))? {
                Some(status) => break status,
                None => {
                    if started.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ToolError::Timeout {
                            tool: self.tool.clone(),
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_thread.join().unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_thread.join().unwrap_or_default()).into_owned();

        if status.success() {
            Ok(ToolOutput { stdout })
        } else {
            Err(ToolError::Failed {
                tool: self.tool.clone(),
                status: status.to_string(),
                stdout,
                stderr,
            })
        }
    }

    /// Runs the child and reports only whether it exited cleanly.
    ///
    /// Spawn failures and timeouts still surface as errors; a plain nonzero
    /// exit does not.
    pub fn exited_cleanly(&self) -> Result<bool, ToolError> {
        match self.run() {
            Ok(_) => Ok(true),
            Err(ToolError::Failed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Builds the yosys script that produces SMT-LIBv2 output for `top`.
pub fn write_smt2_script(verilog: &Path, top: &str) -> String {
    format!(
        "read_verilog -noassert -mem2reg {}; hierarchy -check -top {}\n\
         proc; opt; dffunmap; write_smt2 -wires",
        display(verilog),
        top
    )
}

/// Builds the yosys script that produces CXXRTL C++ output for `top`.
pub fn write_cxxrtl_script(verilog: &Path, top: &str, output: &Path, extra_args: &[String]) -> String {
    format!(
        "read_verilog -noassert -mem2reg {}; hierarchy -check -top {}\n\
         write_cxxrtl {} {}",
        display(verilog),
        top,
        extra_args.join(" "),
        display(output),
    )
}

/// Builds the yosys synthesis script.
pub fn synthesis_script(verilog: &Path, extra_args: &[String]) -> String {
    format!(
        "read_verilog -noassert -mem2reg {}; hierarchy -check -auto-top\n\
         synth -auto-top {}\n\
         write_verilog -noattr -siminit",
        display(verilog),
        extra_args.join(" "),
    )
}

/// Builds the yosys `mutate` script.
pub fn mutate_script(verilog: &Path, mutation_file: &Path, n: usize) -> String {
    format!(
        "read_verilog -noassert -mem2reg {}; hierarchy -check -auto-top\n\
         mutate -list {} -o {}; script {}; proc\n\
         write_verilog -noattr -siminit",
        display(verilog),
        n,
        display(mutation_file),
        display(mutation_file),
    )
}

/// Builds the yosys systemverilog-plugin lowering script.
pub fn systemverilog_plugin_script(sv_file: &Path, extra_args: &[String]) -> String {
    format!(
        "plugin -i systemverilog; read_systemverilog -nostdout {} {}\n\
         proc; opt; write_verilog -noattr -siminit",
        extra_args.join(" "),
        display(sv_file),
    )
}

/// Builds the yosys miter script proving equivalence of two Verilog designs.
///
/// Both designs' modules are renamed with distinct labels first so the two
/// compilation units can coexist in one yosys session.
pub fn equivalence_script(
    file_a: &Path,
    top_a: &str,
    modules_a: &[String],
    file_b: &Path,
    top_b: &str,
    modules_b: &[String],
) -> String {
    fn new_name(module: &str, label: &str) -> String {
        format!("_${label}_{module}")
    }
    fn rename_commands(modules: &[String], label: &str) -> String {
        modules
            .iter()
            .map(|m| format!("rename {} {}", m, new_name(m, label)))
            .collect::<Vec<_>>()
            .join("; ")
    }

    format!(
        "read_verilog -noassert -mem2reg {}; {}\n\
         read_verilog -noassert -mem2reg {}; {}\n\
         miter -equiv -make_assert -flatten {} {} miter\n\
         sat -verify -prove-asserts miter",
        display(file_a),
        rename_commands(modules_a, "a"),
        display(file_b),
        rename_commands(modules_b, "b"),
        new_name(top_a, "a"),
        new_name(top_b, "b"),
    )
}

/// Builds the yosys script dumping the design as JSON to stdout.
pub fn to_json_script(verilog: &Path) -> String {
    format!(
        "read_verilog -noassert -mem2reg {}; hierarchy -check\n\
         proc; write_json",
        display(verilog),
    )
}

fn yosys_script(script: &str, timeout: Duration) -> Result<ToolOutput, ToolError> {
    ToolCommand::new("yosys")?
        .arg("-qq")
        .arg("-p")
        .arg(script)
        .timeout(timeout)
        .run()
}

/// `yosys write_smt2` on `verilog`, returning the SMT-LIBv2 text.
pub fn yosys_write_smt2(verilog: &Path, top: &str) -> Result<String, ToolError> {
    Ok(yosys_script(&write_smt2_script(verilog, top), DEFAULT_TIMEOUT)?.stdout)
}

/// `yosys write_cxxrtl` on `verilog`, emitting C++ into `output`.
pub fn yosys_write_cxxrtl(
    verilog: &Path,
    top: &str,
    output: &Path,
    extra_args: &[String],
) -> Result<(), ToolError> {
    yosys_script(
        &write_cxxrtl_script(verilog, top, output, extra_args),
        DEFAULT_TIMEOUT,
    )?;
    Ok(())
}

/// `yosys synth` on `verilog`, returning the netlist as Verilog text.
pub fn yosys_synthesis(verilog: &Path, extra_args: &[String]) -> Result<String, ToolError> {
    Ok(yosys_script(&synthesis_script(verilog, extra_args), DEFAULT_TIMEOUT)?.stdout)
}

/// `yosys mutate` on `verilog`, returning the mutated design as Verilog text.
pub fn yosys_mutate(verilog: &Path, mutation_file: &Path, n: usize) -> Result<String, ToolError> {
    Ok(yosys_script(&mutate_script(verilog, mutation_file, n), DEFAULT_TIMEOUT)?.stdout)
}

/// Lowers SystemVerilog to Verilog through the yosys systemverilog plugin.
pub fn yosys_systemverilog_plugin(sv_file: &Path, extra_args: &[String]) -> Result<String, ToolError> {
    Ok(yosys_script(&systemverilog_plugin_script(sv_file, extra_args), DEFAULT_TIMEOUT)?.stdout)
}

/// Proves two Verilog designs equivalent with a yosys miter.
pub fn yosys_equivalence_check(
    file_a: &Path,
    top_a: &str,
    modules_a: &[String],
    file_b: &Path,
    top_b: &str,
    modules_b: &[String],
) -> Result<bool, ToolError> {
    let script = equivalence_script(file_a, top_a, modules_a, file_b, top_b, modules_b);
    ToolCommand::new("yosys")?
        .arg("-qq")
        .arg("-p")
        .arg(script)
        .timeout(SMT_SOLVER_TIMEOUT)
        .exited_cleanly()
}

/// Dumps the yosys JSON representation of `verilog`.
pub fn verilog_to_json(verilog: &Path) -> Result<String, ToolError> {
    Ok(yosys_script(&to_json_script(verilog), DEFAULT_TIMEOUT)?.stdout)
}

/// `yosys-config --datdir`, used to locate the CXXRTL runtime headers.
pub fn yosys_datdir() -> Result<PathBuf, ToolError> {
    let out = ToolCommand::new("yosys-config")?.arg("--datdir").run()?;
    Ok(PathBuf::from(out.stdout.trim()))
}

/// Generates C++ from a Verilog source through Verilator.
///
/// Only a single input file is supported. The caller is expected to have
/// annotated registers with `/*verilator public_flat*/` beforehand.
pub fn verilator_elaborate(
    top: &str,
    verilog: &Path,
    target_dir: &Path,
    extra_args: &[String],
) -> Result<(), ToolError> {
    ToolCommand::new("verilator")?
        .args([
            "-cc",
            "-exe",
            "-sym-exec-main",
            "--no-timing",
            "-Wno-fatal",
            "-Wno-lint",
            "-Wno-style",
            "-top-module",
        ])
        .arg(top)
        .arg("-Mdir")
        .arg(display(target_dir))
        .arg("--waiver-output")
        .arg(format!("{}/warnings.waiver", display(target_dir)))
        .args(extra_args.iter().cloned())
        .arg(display(verilog))
        .args(["-CFLAGS", "-g -O0 -w"])
        .args(["-LDFLAGS", "-lkleeRuntest"])
        .run()?;
    Ok(())
}

/// Builds the Verilated C++ model with `wllvm++` and extracts readable LLVM
/// assembly from the executable.
pub fn verilator_compile(top: &str, target_dir: &Path) -> Result<(), ToolError> {
    let makefile = format!("V{top}.mk");
    ToolCommand::new("make")?
        .arg("-C")
        .arg(display(target_dir))
        .arg("-f")
        .arg(makefile)
        .arg("CXX=wllvm++")
        .arg("LINK=wllvm++")
        .env("CCACHE_DISABLE", "1")
        .run()?;
    extract_bitcode(&format!("V{top}"), target_dir)
}

/// Builds a CXXRTL harness (`main.cpp`) with `wllvm++` and extracts readable
/// LLVM assembly from the executable.
pub fn cxxrtl_compile(top: &str, target_dir: &Path) -> Result<(), ToolError> {
    let datdir = yosys_datdir()?;
    let include = format!(
        "-I{}/include/backends/cxxrtl/runtime",
        datdir.display()
    );
    ToolCommand::new("wllvm++")?
        .cwd(target_dir)
        .args(["-w", "-g", "-o"])
        .arg(top)
        .arg("main.cpp")
        .arg(include)
        .arg("-lkleeRuntest")
        .run()?;
    extract_bitcode(top, target_dir)
}

/// Compiles and runs the CXXRTL `debug.cpp` harness, which writes
/// `debug_info.csv` next to itself.
pub fn cxxrtl_debug_dump(obj_dir: &Path) -> Result<String, ToolError> {
    let datdir = yosys_datdir()?;
    ToolCommand::new("wllvm++")?
        .cwd(obj_dir)
        .args(["-w", "-o", "debug", "debug.cpp"])
        .arg(format!(
            "-I{}/include/backends/cxxrtl/runtime",
            datdir.display()
        ))
        .run()?;
    ToolCommand::at(obj_dir.join("debug")).cwd(obj_dir).run()?;
    let csv = obj_dir.join("debug_info.csv");
    std::fs::read_to_string(&csv).map_err(|source| ToolError::Io {
        tool: "debug".to_owned(),
        source,
    })
}

/// `extract-bc` + `llvm-dis` on an executable built with wllvm.
pub fn extract_bitcode(executable: &str, target_dir: &Path) -> Result<(), ToolError> {
    ToolCommand::new("extract-bc")?
        .cwd(target_dir)
        .arg("-v")
        .arg(executable)
        .run()?;
    ToolCommand::new("llvm-dis")?
        .cwd(target_dir)
        .arg(format!("{executable}.bc"))
        .run()?;
    Ok(())
}

/// Runs one design file through its language frontend as a pure syntax and
/// semantics check: iverilog for `.v`, the yosys systemverilog plugin for
/// everything else.
///
/// A rejected or timed-out input is an ordinary `false`; only spawn-level
/// failures error.
pub fn semantic_check(src_file: &Path) -> Result<bool, ToolError> {
    let verdict = if src_file.extension().and_then(|e| e.to_str()) == Some("v") {
        let out_file = src_file.with_extension("check.out");
        let accepted = ToolCommand::new("iverilog")?
            .arg("-o")
            .arg(display(&out_file))
            .arg(display(src_file))
            .exited_cleanly();
        let _ = std::fs::remove_file(out_file);
        accepted
    } else {
        let script = format!(
            "plugin -i systemverilog; read_systemverilog -synth {}",
            display(src_file),
        );
        ToolCommand::new("yosys")?
            .arg("-qq")
            .arg("-p")
            .arg(script)
            .exited_cleanly()
    };
    match verdict {
        Err(ToolError::Timeout { .. }) => Ok(false),
        other => other,
    }
}

/// Runs KLEE over the given bitcode file.
///
/// KLEE must run in the directory holding the bitcode so its relative
/// artifact paths resolve.
pub fn symbolic_execution(
    input_file: &Path,
    output_dir: &Path,
    working_dir: &Path,
    extra_args: &[String],
) -> Result<(), ToolError> {
    ToolCommand::new("klee")?
        .cwd(working_dir)
        .args([
            "--posix-runtime",
            "--libc=uclibc",
            "--libcxx",
            "--write-smt2s",
            "--write-snapshots",
            "--disable-verify",
            "--check-div-zero=false",
            "--check-overshift=false",
            "--warnings-only-to-file",
        ])
        .args(extra_args.iter().cloned())
        .arg(format!("--output-dir={}", display(output_dir)))
        .arg(display(input_file))
        .timeout(KLEE_TIMEOUT)
        .run()?;
    Ok(())
}

/// Converts SystemVerilog to Verilog with sv2v, returning the Verilog text.
pub fn sv2v(sv_file: &Path, extra_args: &[String]) -> Result<String, ToolError> {
    let out = ToolCommand::new("sv2v")?
        .args(extra_args.iter().cloned())
        .arg(display(sv_file))
        .run()?;
    Ok(out.stdout)
}
