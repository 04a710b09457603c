//! Subprocess invocation of the Terraform binary.
//!
//! The binary is resolved once: `RT_TERRAFORM_BIN` when set, otherwise the
//! first `terraform` on `PATH`. Both output streams are pumped by reader
//! threads and handed back to the calling thread, which forwards them to the
//! caller's writers while keeping a copy for parsing after the process exits.

use crate::error::{Result, RtError};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

pub const BIN_ENV: &str = "RT_TERRAFORM_BIN";

/// Buffered result of one engine invocation. A non-zero exit is data, not an
/// error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait Engine {
    /// Run `terraform <subcommand> <args..>` in `dir`, streaming output to the
    /// given writers. Failing to start the process is an error.
    fn run(
        &self,
        subcommand: &str,
        args: &[String],
        dir: &Path,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<RawOutput>;
}

#[derive(Debug, Clone)]
pub struct TerraformBinary {
    path: PathBuf,
    env: Vec<(String, String)>,
}

impl TerraformBinary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TerraformBinary {
            path: path.into(),
            env: Vec::new(),
        }
    }

    /// `RT_TERRAFORM_BIN`, else `terraform` from `PATH`.
    pub fn locate() -> Result<Self> {
        if let Ok(bin) = std::env::var(BIN_ENV) {
            if !bin.is_empty() {
                return Ok(TerraformBinary::new(bin));
            }
        }
        let path = which::which("terraform").map_err(|_| RtError::EngineNotFound)?;
        Ok(TerraformBinary::new(path))
    }

    /// Extra environment passed to every invocation.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

enum Chunk {
    Out(Vec<u8>),
    Err(Vec<u8>),
}

fn pump<R>(mut reader: R, tx: Sender<Chunk>, wrap: fn(Vec<u8>) -> Chunk) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(wrap(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

impl Engine for TerraformBinary {
    fn run(
        &self,
        subcommand: &str,
        args: &[String],
        dir: &Path,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<RawOutput> {
        tracing::debug!(bin = %self.path.display(), subcommand, ?args, dir = %dir.display(), "running terraform");

        let mut cmd = Command::new(&self.path);
        cmd.arg(subcommand)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| RtError::EngineSpawn(format!("{}: {e}", self.path.display())))?;

        let (tx, rx) = mpsc::channel();
        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(pump(out, tx.clone(), Chunk::Out));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(pump(err, tx.clone(), Chunk::Err));
        }
        drop(tx);

        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        for chunk in rx {
            match chunk {
                Chunk::Out(bytes) => {
                    stdout.write_all(&bytes)?;
                    out_buf.extend_from_slice(&bytes);
                }
                Chunk::Err(bytes) => {
                    stderr.write_all(&bytes)?;
                    err_buf.extend_from_slice(&bytes);
                }
            }
        }
        for p in pumps {
            let _ = p.join();
        }
        stdout.flush()?;
        stderr.flush()?;

        let status = child
            .wait()
            .map_err(|e| RtError::EngineSpawn(e.to_string()))?;
        let exit_code = status.code().unwrap_or(1);
        tracing::debug!(subcommand, exit_code, "terraform finished");

        Ok(RawOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&out_buf).into_owned(),
            stderr: String::from_utf8_lossy(&err_buf).into_owned(),
        })
    }
}
