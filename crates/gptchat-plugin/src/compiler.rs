//! Build Invoker: turn a persisted `plugin.rs` into a loadable library.
//!
//! [`CargoToolchain`] writes a manifest next to the source declaring a `cdylib`
//! built against `gptchat-plugin-sdk`, runs `cargo build --release` with a
//! per-plugin target dir, and copies the library to `<compiled-root>/<id>.<ext>`.
//! Combined stdout/stderr is captured so compiler diagnostics can go back to
//! the requester verbatim.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gptchat_core::CoreConfig;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::error::PluginError;
use crate::layout::{MANIFEST_FILE, SOURCE_FILE};

/// Library name inside every generated manifest; the artifact is renamed on copy.
const LIB_NAME: &str = "gptchat_plugin";

/// What to build and where the loadable artifact must end up.
#[derive(Debug, Clone)]
pub struct BuildJob<'a> {
    pub identifier: &'a str,
    pub source_path: &'a Path,
    pub artifact_path: &'a Path,
}

/// Outcome of one compiler run. `artifact_path` is set iff `success`.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub success: bool,
    pub diagnostic_output: Vec<u8>,
    pub artifact_path: Option<PathBuf>,
}

impl CompilationResult {
    pub fn diagnostics(&self) -> String {
        String::from_utf8_lossy(&self.diagnostic_output).into_owned()
    }
}

/// Produces a dynamically loadable artifact from persisted source.
pub trait Toolchain: Send + Sync {
    fn build(&self, job: &BuildJob<'_>) -> Result<PathBuf, PluginError>;
}

pub struct CargoToolchain {
    program: String,
    leading_args: Vec<String>,
    sdk_path: PathBuf,
    build_root: PathBuf,
    timeout: Duration,
}

impl CargoToolchain {
    pub fn new(program: impl Into<String>, sdk_path: impl Into<PathBuf>, build_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            sdk_path: absolute(sdk_path.into()),
            build_root: build_root.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &CoreConfig, build_root: impl Into<PathBuf>) -> Self {
        Self::new(&cfg.compiler, &cfg.plugin_sdk_path, build_root, cfg.compile_timeout())
    }

    /// Arguments placed before `build`, e.g. `+stable` to pick a rustup toolchain.
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    /// Manifest for a plugin crate rooted at the source directory.
    pub fn manifest(&self, id: &str) -> String {
        let mut package = toml::Table::new();
        package.insert("name".into(), format!("gptchat-plugin-{}", id.replace('_', "-")).into());
        package.insert("version".into(), "0.1.0".into());
        package.insert("edition".into(), "2021".into());
        package.insert("publish".into(), false.into());

        let mut lib = toml::Table::new();
        lib.insert("name".into(), LIB_NAME.into());
        lib.insert("path".into(), SOURCE_FILE.into());
        lib.insert("crate-type".into(), toml::Value::Array(vec!["cdylib".into()]));

        let mut sdk = toml::Table::new();
        sdk.insert("path".into(), self.sdk_path.to_string_lossy().into_owned().into());
        let mut deps = toml::Table::new();
        deps.insert("gptchat-plugin-sdk".into(), toml::Value::Table(sdk));
        deps.insert("serde_json".into(), "1".into());

        let mut root = toml::Table::new();
        root.insert("package".into(), toml::Value::Table(package));
        root.insert("lib".into(), toml::Value::Table(lib));
        root.insert("dependencies".into(), toml::Value::Table(deps));
        // Keeps cargo from attaching the plugin to an enclosing workspace.
        root.insert("workspace".into(), toml::Value::Table(toml::Table::new()));
        root.to_string()
    }

    /// Run the compiler and collect its output without interpreting failure.
    pub fn compile(&self, job: &BuildJob<'_>) -> Result<CompilationResult, PluginError> {
        let crate_dir = job
            .source_path
            .parent()
            .ok_or_else(|| PluginError::compilation("source file has no parent directory", ""))?;
        let manifest_path = crate_dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, self.manifest(job.identifier)).map_err(|source| PluginError::Persistence {
            path: manifest_path.clone(),
            source,
        })?;

        let target_dir = self.build_root.join(job.identifier);
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("build")
            .arg("--release")
            .arg("--manifest-path")
            .arg(&manifest_path)
            .arg("--target-dir")
            .arg(&target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Leader of its own group, so a timeout reaches rustc and build scripts too.
            cmd.process_group(0);
        }

        debug!(target: "gptchat::plugin", plugin = %job.identifier, program = %self.program, "spawning compiler");
        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| PluginError::compilation(format!("failed to start '{}': {}", self.program, e), ""))?;
        let output = Arc::new(Mutex::new(Vec::new()));
        let readers = capture(&mut child, &output);

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill_tree(&mut child);
                let diagnostics = drain(readers, &output);
                return Err(PluginError::compilation(
                    format!("compiler timed out after {} seconds", self.timeout.as_secs()),
                    String::from_utf8_lossy(&diagnostics).into_owned(),
                ));
            }
            Err(e) => {
                kill_tree(&mut child);
                drain(readers, &output);
                return Err(PluginError::compilation(format!("failed waiting for compiler: {}", e), ""));
            }
        };
        let diagnostic_output = drain(readers, &output);
        debug!(
            target: "gptchat::plugin",
            plugin = %job.identifier,
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compiler finished"
        );

        if !status.success() {
            return Ok(CompilationResult {
                success: false,
                diagnostic_output,
                artifact_path: None,
            });
        }

        let built = target_dir.join("release").join(format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            LIB_NAME,
            std::env::consts::DLL_SUFFIX
        ));
        if !built.is_file() {
            return Err(PluginError::compilation(
                format!("build succeeded but produced no library at {}", built.display()),
                String::from_utf8_lossy(&diagnostic_output).into_owned(),
            ));
        }
        install(&built, job.artifact_path)?;
        Ok(CompilationResult {
            success: true,
            diagnostic_output,
            artifact_path: Some(job.artifact_path.to_path_buf()),
        })
    }
}

impl Toolchain for CargoToolchain {
    fn build(&self, job: &BuildJob<'_>) -> Result<PathBuf, PluginError> {
        let result = self.compile(job)?;
        match result.artifact_path {
            Some(path) if result.success => {
                info!(target: "gptchat::plugin", plugin = %job.identifier, artifact = %path.display(), "compiled plugin");
                Ok(path)
            }
            _ => {
                info!(target: "gptchat::plugin", plugin = %job.identifier, "compiler rejected plugin source");
                Err(PluginError::compilation(
                    format!("'{}' reported errors", self.program),
                    result.diagnostics(),
                ))
            }
        }
    }
}

/// Copy next to the destination and rename, so a previously mapped artifact is
/// replaced rather than rewritten in place.
fn install(built: &Path, dest: &Path) -> Result<(), PluginError> {
    let staging = dest.with_extension("partial");
    fs::copy(built, &staging).map_err(|source| PluginError::Persistence {
        path: staging.clone(),
        source,
    })?;
    fs::rename(&staging, dest).map_err(|source| PluginError::Persistence {
        path: dest.to_path_buf(),
        source,
    })
}

/// Kill the compiler and everything it forked. Workers left alive would hold
/// the output pipes open and keep the readers from finishing.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: plain syscall on the group this child leads.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Pump stdout and stderr into one buffer as the compiler writes them.
fn capture(child: &mut Child, output: &Arc<Mutex<Vec<u8>>>) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::new();
    let streams: [Option<Box<dyn Read + Send>>; 2] = [
        child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
    ];
    for mut stream in streams.into_iter().flatten() {
        let sink = Arc::clone(output);
        readers.push(std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&buf[..n]),
                }
            }
        }));
    }
    readers
}

fn drain(readers: Vec<JoinHandle<()>>, output: &Arc<Mutex<Vec<u8>>>) -> Vec<u8> {
    for reader in readers {
        let _ = reader.join();
    }
    std::mem::take(&mut *output.lock().unwrap_or_else(PoisonError::into_inner))
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    fs::canonicalize(&path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    })
}
