//! The external compiler seam.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::errors::BuildError;
use crate::scan::Job;

/// Turns source files into artifacts.
///
/// Implementations must write each job's artifact; the pipeline checks that
/// every expected artifact exists after a successful call.
pub trait ExternalCompiler: Send + Sync {
    fn compile(&self, jobs: &[Job]) -> Result<(), BuildError>;
}

/// Runs a program once per batch.
///
/// The batch is written to the program's stdin as a JSON array of
/// `{"source": ..., "output": ...}` objects. Exit status 0 means success;
/// stderr is carried in the error otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandCompiler {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandCompiler {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a whitespace-separated command line; `None` when blank.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(CommandCompiler::new(program).with_args(words))
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl ExternalCompiler for CommandCompiler {
    fn compile(&self, jobs: &[Job]) -> Result<(), BuildError> {
        let failed = |message: String| BuildError::Compiler {
            program: self.program_name(),
            message,
        };
        let payload = serde_json::to_vec(jobs).map_err(|e| failed(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("could not start: {e}")))?;
        // stdin is fed from its own thread so a child that fills its stderr
        // pipe before reading the batch cannot block us; the child is reaped
        // whether or not the write succeeds.
        let stdin = child.stdin.take();
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(|| match stdin {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });
        let output = output.map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!("{}: {}", output.status, stderr.trim())));
        }
        // A child that exits 0 without draining its input has still succeeded.
        match written {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                Err(failed(format!("could not write batch: {e}")))
            }
            _ => Ok(()),
        }
    }
}
