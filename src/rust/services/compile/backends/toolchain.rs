use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::{BackendKind, CompileBackend, TOOLCHAIN_DEADLINE};
use crate::engine::runtime::CompiledModule;
use crate::services::compile::diagnostics;
use crate::services::compile::{
    CompileFailure, CompileRequest, CompileResult, CompileSuccess, FailureKind,
};

/// Translation unit that includes `user.h` and exports the module ABI.
pub const HARNESS_SOURCE: &str = include_str!("../../../../assets/harness.cpp");

const TARGET: &str = "wasm32-wasi";
const SYSROOT_DIR: &str = "sysroot";
const MODULE_FILE: &str = "module.wasm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainSettings {
    /// Base URL the tool binaries and sysroot archive are downloaded from.
    pub cdn_url: String,
    pub cache_dir: PathBuf,
    pub clang: String,
    pub linker: String,
    /// `.tar`, `.tar.gz` or `.tgz`.
    pub sysroot: String,
    pub timeout: Duration,
}

impl ToolchainSettings {
    pub fn new(cdn_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cdn_url: cdn_url.into(),
            cache_dir: cache_dir.into(),
            clang: "clang".to_string(),
            linker: "wasm-ld".to_string(),
            sysroot: "sysroot.tar".to_string(),
            timeout: TOOLCHAIN_DEADLINE,
        }
    }

    /// `<user cache>/hear-c/toolchain`, or the temp dir when the platform
    /// has no cache directory.
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hear-c")
            .join("toolchain")
    }

    fn asset_url(&self, name: &str) -> String {
        format!("{}/{}", self.cdn_url.trim_end_matches('/'), name)
    }
}

/// Paths of a prepared toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainAssets {
    pub clang: PathBuf,
    pub linker: PathBuf,
    pub sysroot: PathBuf,
}

/// Runs clang in-process on the host, fetching it on first use.
pub struct ToolchainBackend {
    settings: ToolchainSettings,
    client: reqwest::Client,
    assets: OnceCell<ToolchainAssets>,
}

impl ToolchainBackend {
    pub fn new(settings: ToolchainSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
            assets: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &ToolchainSettings {
        &self.settings
    }

    pub fn assets(&self) -> Option<&ToolchainAssets> {
        self.assets.get()
    }

    /// Downloads whatever is missing from the cache. Only the first
    /// successful call does any work.
    pub async fn ensure_assets(&self) -> Result<&ToolchainAssets> {
        self.assets.get_or_try_init(|| self.fetch_assets()).await
    }

    async fn fetch_assets(&self) -> Result<ToolchainAssets> {
        if self.settings.cdn_url.trim().is_empty() {
            bail!("toolchain CDN URL not configured");
        }
        let cache = &self.settings.cache_dir;
        fs::create_dir_all(cache)
            .with_context(|| format!("failed to create cache directory: {}", cache.display()))?;

        let clang = cache.join(&self.settings.clang);
        let linker = cache.join(&self.settings.linker);
        for tool in [&clang, &linker] {
            if !tool.is_file() {
                let name = file_name(tool)?;
                self.download(&self.settings.asset_url(name), tool).await?;
                make_executable(tool)?;
            }
        }

        let sysroot = cache.join(SYSROOT_DIR);
        if !sysroot.is_dir() {
            let archive = cache.join(&self.settings.sysroot);
            if !archive.is_file() {
                self.download(&self.settings.asset_url(&self.settings.sysroot), &archive)
                    .await?;
            }
            let target = sysroot.clone();
            tokio::task::spawn_blocking(move || unpack_sysroot(&archive, &target))
                .await
                .context("sysroot unpack task panicked")??;
        }

        Ok(ToolchainAssets {
            clang,
            linker,
            sysroot,
        })
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to download {}: {}", url, e))?;
        if !response.status().is_success() {
            bail!("Failed to download {}: HTTP {}", url, response.status());
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow!("Failed to read {}: {}", url, e))?;

        // Write next to the target first so a broken download never looks cached.
        let partial = destination.with_extension("part");
        fs::write(&partial, &bytes)
            .with_context(|| format!("failed to write {}", partial.display()))?;
        fs::rename(&partial, destination)
            .with_context(|| format!("failed to move {}", destination.display()))?;
        Ok(())
    }

    fn command(&self, assets: &ToolchainAssets, workdir: &Path, request: &CompileRequest) -> Command {
        let options = &request.options;
        let mut cmd = Command::new(&assets.clang);
        cmd.current_dir(workdir)
            .arg("--driver-mode=g++")
            .arg(format!("--target={TARGET}"))
            .arg(format!("--sysroot={}", assets.sysroot.display()))
            .arg(format!("--ld-path={}", assets.linker.display()))
            .arg(format!("-O{}", options.optimization_level.min(3)))
            .arg("-fno-exceptions")
            .arg("-I.")
            .arg("harness.cpp")
            .arg("-o")
            .arg(MODULE_FILE);
        if options.sdl_enabled {
            cmd.arg("-DHEAR_C_SDL=1");
        }
        for symbol in &options.exported_functions {
            let symbol = symbol.trim_start_matches('_');
            if !symbol.is_empty() {
                cmd.arg(format!("-Wl,--export={symbol}"));
            }
        }
        cmd.args(&options.additional_flags)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_clang(&self, assets: &ToolchainAssets, request: &CompileRequest) -> CompileResult {
        let workdir = match tempfile::Builder::new().prefix("hear-c-build").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return CompileResult::failure(
                    FailureKind::Compile,
                    format!("failed to create build directory: {e}"),
                );
            }
        };
        let staged = fs::write(workdir.path().join("user.h"), &request.source)
            .and_then(|_| fs::write(workdir.path().join("harness.cpp"), HARNESS_SOURCE));
        if let Err(e) = staged {
            return CompileResult::failure(
                FailureKind::Compile,
                format!("failed to stage sources: {e}"),
            );
        }

        let mut cmd = self.command(assets, workdir.path(), request);
        let output = match tokio::time::timeout(self.settings.timeout, cmd.output()).await {
            Err(_) => return CompileResult::Failure(CompileFailure::timeout(self.settings.timeout)),
            Ok(Err(e)) => {
                return CompileResult::failure(
                    FailureKind::AssetLoad,
                    format!("failed to run {}: {e}", assets.clang.display()),
                );
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let parsed = diagnostics::parse(&stderr);
        let module_path = workdir.path().join(MODULE_FILE);

        if !output.status.success() || !module_path.is_file() {
            let mut details = diagnostics::errors(&parsed);
            if details.is_empty() {
                details = stderr
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(str::to_string)
                    .collect();
            }
            return CompileResult::Failure(CompileFailure {
                kind: FailureKind::Compile,
                error: "Compilation failed".to_string(),
                error_details: details,
                stdout: Some(stdout),
                stderr: Some(stderr),
            });
        }

        let bytes = match fs::read(&module_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return CompileResult::failure(
                    FailureKind::Compile,
                    format!("failed to read {}: {e}", module_path.display()),
                );
            }
        };
        match CompiledModule::from_bytes(bytes) {
            Ok(artifact) => CompileResult::Success(CompileSuccess {
                output: if stdout.trim().is_empty() {
                    format!("Compiled {} bytes", artifact.len())
                } else {
                    stdout
                },
                artifact,
                warnings: diagnostics::warnings(&parsed),
            }),
            Err(e) => CompileResult::failure(
                FailureKind::Compile,
                format!("compiler produced an invalid module: {e}"),
            ),
        }
    }
}

#[async_trait]
impl CompileBackend for ToolchainBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Toolchain
    }

    async fn prepare(&self) -> Result<(), CompileFailure> {
        self.ensure_assets()
            .await
            .map(|_| ())
            .map_err(|e| CompileFailure::new(FailureKind::AssetLoad, format!("{e:#}")))
    }

    async fn compile(&self, request: &CompileRequest) -> CompileResult {
        let assets = match self.ensure_assets().await {
            Ok(assets) => assets.clone(),
            Err(e) => return CompileResult::failure(FailureKind::AssetLoad, format!("{e:#}")),
        };
        self.run_clang(&assets, request).await
    }
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("invalid asset path: {}", path.display()))
}

/// Unpacks a plain or gzipped tar into `target`.
fn unpack_sysroot(archive: &Path, target: &Path) -> Result<()> {
    let file = fs::File::open(archive)
        .with_context(|| format!("failed to open archive: {}", archive.display()))?;
    let gzipped = archive
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(".gz") || n.ends_with(".tgz"))
        .unwrap_or(false);

    let staging = target.with_extension("unpacking");
    if staging.exists() {
        fs::remove_dir_all(&staging)
            .with_context(|| format!("failed to clear {}", staging.display()))?;
    }
    fs::create_dir_all(&staging)?;

    let unpacked = if gzipped {
        tar::Archive::new(flate2::read::GzDecoder::new(file)).unpack(&staging)
    } else {
        tar::Archive::new(file).unpack(&staging)
    };
    unpacked.with_context(|| format!("failed to extract {}", archive.display()))?;

    fs::rename(&staging, target)
        .with_context(|| format!("failed to move sysroot into {}", target.display()))?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "test_toolchain.rs"]
mod tests;
