//! Driver for the Terraform command line.
//!
//! Every operation is a single subprocess run through an [`Engine`]; the
//! `fresh_*` variants first point the working tree at the right remote state
//! (`reenable_remote_state`) and refresh modules (`get -update`).
//!
//! A non-zero exit of plan, apply or destroy is returned in the output struct
//! for the caller to judge. Helper commands whose failure leaves nothing to
//! judge (init, get, show, output, validate, taint) turn it into
//! [`RtError::Engine`].

pub mod engine;
pub mod parse;
pub mod remote_state;

pub use engine::{Engine, RawOutput, TerraformBinary};
pub use remote_state::RemoteState;

use crate::error::{Result, RtError};
use crate::paths;
use crate::schema::ResourceDiff;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PlanResourceDiff {
    pub to_create: u64,
    pub to_change: u64,
    pub to_remove: u64,
}

impl PlanResourceDiff {
    pub fn is_empty(&self) -> bool {
        self.to_create == 0 && self.to_change == 0 && self.to_remove == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanInput {
    pub root: PathBuf,
    pub plan_file: Option<PathBuf>,
    pub variables: BTreeMap<String, String>,
    pub refresh: bool,
    pub target: Option<String>,
    pub destroy: bool,
    pub xlegacy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlanOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub warnings: Vec<String>,
    pub diff: PlanResourceDiff,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyInput {
    pub root: PathBuf,
    /// Applied positionally; when set, `variables` are already baked in.
    pub plan_file: Option<PathBuf>,
    pub variables: BTreeMap<String, String>,
    pub refresh: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub warnings: Vec<String>,
    pub outputs: BTreeMap<String, String>,
    pub diff: ResourceDiff,
}

#[derive(Debug, Clone, Default)]
pub struct DestroyInput {
    pub root: PathBuf,
    pub variables: BTreeMap<String, String>,
    pub refresh: bool,
    pub target: Option<String>,
    pub xlegacy: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DestroyOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub warnings: Vec<String>,
    pub diff: ResourceDiff,
}

/// How the engine is started and where its chatter goes.
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Verbose file logging: the engine logs at DEBUG into this file too.
    pub log_path: Option<PathBuf>,
    /// Forward engine output to the terminal while it runs.
    pub echo: bool,
}

fn var_args(variables: &BTreeMap<String, String>) -> impl Iterator<Item = String> + '_ {
    variables.iter().map(|(k, v)| format!("-var={k}={v}"))
}

fn check(operation: &str, out: CmdOutput) -> Result<CmdOutput> {
    if out.exit_code != 0 {
        return Err(RtError::Engine {
            operation: operation.to_string(),
            exit_code: out.exit_code,
            stderr: out.stderr,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct Driver {
    engine: Box<dyn Engine>,
    echo: bool,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver").field("echo", &self.echo).finish()
    }
}

impl Driver {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Driver {
            engine,
            echo: false,
        }
    }

    /// Locate the Terraform binary and configure it from `opts`.
    pub fn from_options(opts: &DriverOptions) -> Result<Self> {
        let mut bin = TerraformBinary::locate()?;
        if let Some(log_path) = &opts.log_path {
            bin = bin
                .with_env("TF_LOG", "DEBUG")
                .with_env("TF_LOG_PATH", &log_path.display().to_string());
        }
        Ok(Driver::new(Box::new(bin)).echo(opts.echo))
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Run any subcommand with explicit writers; warnings are parsed from stdout.
    pub fn cmd(
        &self,
        name: &str,
        args: &[String],
        root: &Path,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<CmdOutput> {
        let raw = self.engine.run(name, args, root, stdout, stderr)?;
        let warnings = parse::warnings(&raw.stdout);
        Ok(CmdOutput {
            exit_code: raw.exit_code,
            stdout: raw.stdout,
            stderr: raw.stderr,
            warnings,
        })
    }

    fn streamed(&self, name: &str, args: &[String], root: &Path) -> Result<CmdOutput> {
        if self.echo {
            self.cmd(name, args, root, &mut std::io::stdout(), &mut std::io::stderr())
        } else {
            self.quiet(name, args, root)
        }
    }

    fn quiet(&self, name: &str, args: &[String], root: &Path) -> Result<CmdOutput> {
        self.cmd(name, args, root, &mut std::io::sink(), &mut std::io::sink())
    }

    // -----------------------------------------------------------------------
    // Remote state
    // -----------------------------------------------------------------------

    /// Drop the cached `.terraform`, write the backend config and `init`.
    pub fn reenable_remote_state(&self, remote: &RemoteState, root: &Path) -> Result<String> {
        crate::io::remove_paths(&[paths::engine_cache_dir(root)])?;
        remote.write_backend_config(root)?;
        let out = self.streamed("init", &["-input=false".to_string()], root)?;
        let out = check("Initialising backend", out)?;
        Ok(out.stdout)
    }

    pub fn get(&self, root: &Path) -> Result<()> {
        let out = self.streamed("get", &["-update".to_string()], root)?;
        check("Updating modules", out)?;
        Ok(())
    }

    fn refresh_tree(&self, remote: &RemoteState, root: &Path) -> Result<()> {
        self.reenable_remote_state(remote, root)?;
        self.get(root)
    }

    // -----------------------------------------------------------------------
    // Plan / apply / destroy
    // -----------------------------------------------------------------------

    pub fn plan(&self, input: &PlanInput) -> Result<PlanOutput> {
        let mut args: Vec<String> = var_args(&input.variables).collect();
        args.push("-input=false".into());
        args.push("-module-depth=-1".into());
        if let Some(plan_file) = &input.plan_file {
            args.push(format!("-out={}", plan_file.display()));
        }
        args.push(format!("-refresh={}", input.refresh));
        if input.destroy {
            args.push("-destroy".into());
        }
        if let Some(target) = input.target.as_deref().filter(|t| !t.is_empty()) {
            args.push(format!("-target={target}"));
        }
        if input.xlegacy {
            args.push("-Xlegacy-graph".into());
        }

        let out = self.streamed("plan", &args, &input.root)?;
        Ok(PlanOutput {
            diff: parse::plan_diff(&out.stdout),
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
            warnings: out.warnings,
        })
    }

    pub fn fresh_plan(&self, remote: &RemoteState, input: &PlanInput) -> Result<PlanOutput> {
        self.refresh_tree(remote, &input.root)?;
        self.plan(input)
    }

    pub fn apply(&self, input: &ApplyInput) -> Result<ApplyOutput> {
        let mut args = vec!["-input=false".to_string(), format!("-refresh={}", input.refresh)];
        if let Some(plan_file) = &input.plan_file {
            args.push(plan_file.display().to_string());
        }
        args.extend(var_args(&input.variables));

        let out = self.streamed("apply", &args, &input.root)?;
        Ok(ApplyOutput {
            diff: parse::apply_diff(&out.stdout),
            outputs: parse::apply_outputs(&out.stdout),
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
            warnings: out.warnings,
        })
    }

    pub fn fresh_apply(&self, remote: &RemoteState, input: &ApplyInput) -> Result<ApplyOutput> {
        self.refresh_tree(remote, &input.root)?;
        self.apply(input)
    }

    pub fn destroy(&self, input: &DestroyInput) -> Result<DestroyOutput> {
        let mut args = vec![
            "-input=false".to_string(),
            "-force".to_string(),
            format!("-refresh={}", input.refresh),
        ];
        args.extend(var_args(&input.variables));
        if let Some(target) = input.target.as_deref().filter(|t| !t.is_empty()) {
            args.push(format!("-target={target}"));
        }
        if input.xlegacy {
            args.push("-Xlegacy-graph".into());
        }

        let out = self.streamed("destroy", &args, &input.root)?;
        Ok(DestroyOutput {
            diff: parse::apply_diff(&out.stdout),
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: out.stderr,
            warnings: out.warnings,
        })
    }

    pub fn fresh_destroy(&self, remote: &RemoteState, input: &DestroyInput) -> Result<DestroyOutput> {
        self.refresh_tree(remote, &input.root)?;
        self.destroy(input)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn show(&self, root: &Path) -> Result<String> {
        let out = self.quiet("show", &["-no-color".to_string()], root)?;
        let out = check("Show", out)?;
        Ok(out.stdout.trim().to_string())
    }

    pub fn is_state_empty(&self, root: &Path) -> Result<bool> {
        Ok(parse::is_empty_state(&self.show(root)?))
    }

    pub fn output(&self, root: &Path) -> Result<BTreeMap<String, String>> {
        let out = self.quiet("output", &["-no-color".to_string()], root)?;
        if out.exit_code != 0 {
            if out.stdout == "The module root could not be found. There is nothing to output.\n"
                || out.stdout.starts_with("The state file has no outputs defined.")
            {
                return Ok(BTreeMap::new());
            }
            return Err(RtError::Engine {
                operation: "Output".into(),
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        Ok(parse::output_command(&out.stdout))
    }

    pub fn fresh_output(&self, remote: &RemoteState, root: &Path) -> Result<BTreeMap<String, String>> {
        self.reenable_remote_state(remote, root)?;
        self.output(root)
    }

    pub fn validate(&self, root: &Path) -> Result<CmdOutput> {
        let out = self.streamed("validate", &[], root)?;
        check("Validate", out)
    }

    // -----------------------------------------------------------------------
    // Taint
    // -----------------------------------------------------------------------

    pub fn taint(&self, root: &Path, resource: &str, module: Option<&str>) -> Result<CmdOutput> {
        self.mark("taint", root, resource, module)
    }

    pub fn untaint(&self, root: &Path, resource: &str, module: Option<&str>) -> Result<CmdOutput> {
        self.mark("untaint", root, resource, module)
    }

    fn mark(&self, action: &str, root: &Path, resource: &str, module: Option<&str>) -> Result<CmdOutput> {
        let mut args = Vec::new();
        if let Some(m) = module.filter(|m| !m.is_empty()) {
            args.push(format!("-module={m}"));
        }
        args.push("-no-color".into());
        args.push(resource.to_string());
        let out = self.quiet(action, &args, root)?;
        check(&format!("{action} of {resource}"), out)
    }

    // -----------------------------------------------------------------------
    // Version
    // -----------------------------------------------------------------------

    /// `terraform version`, first line, leading `v` stripped.
    pub fn version(&self) -> Result<String> {
        let cwd = std::env::current_dir()?;
        let out = self.quiet("version", &[], &cwd)?;
        let out = check("Reading terraform version", out)?;
        parse::engine_version(&out.stdout).ok_or_else(|| RtError::Engine {
            operation: "Reading terraform version".into(),
            exit_code: out.exit_code,
            stderr: format!("unexpected output: {}", out.stdout.trim()),
        })
    }
}
