use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::services::compile::backends::{HttpSettings, ToolchainSettings};
use crate::services::compile::{CompileMode, CompileOptions, DispatcherConfig};

pub const TOML_CONFIG: &str = "hearc.toml";
pub const JSON_CONFIG: &str = "hearc.json";
pub const DOT_CONFIG: &str = ".hearc";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub compilation: CompilationSection,
    pub toolchain: ToolchainSection,
    pub remote: RemoteSection,
    pub local: LocalSection,
    pub audio: AudioSection,
    pub paths: PathsSection,
    pub live: LiveSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationSection {
    pub mode: CompileMode,
    pub optimization_level: u8,
    pub sdl_enabled: bool,
    pub exported_functions: Vec<String>,
    pub additional_flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSection {
    pub enabled: bool,
    pub cdn_url: String,
    pub clang: String,
    pub linker: String,
    pub sysroot: String,
    /// Defaults to the user cache directory.
    pub cache_dir: Option<PathBuf>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub enabled: bool,
    pub endpoint: String,
    pub artifact_url: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSection {
    pub enabled: bool,
    pub url: String,
    pub artifact_path: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: usize,
    pub volume: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub entry: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSection {
    pub debounce_ms: u64,
}

impl Default for CompilationSection {
    fn default() -> Self {
        let options = CompileOptions::default();
        Self {
            mode: CompileMode::Auto,
            optimization_level: options.optimization_level,
            sdl_enabled: options.sdl_enabled,
            exported_functions: options.exported_functions,
            additional_flags: options.additional_flags,
        }
    }
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            enabled: false,
            cdn_url: "https://your-cdn.com/wasm-clang/".to_string(),
            clang: "clang".to_string(),
            linker: "wasm-ld".to_string(),
            sysroot: "sysroot.tar".to_string(),
            cache_dir: None,
            timeout_ms: 300_000,
        }
    }
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://your-worker.workers.dev/compile".to_string(),
            artifact_url: None,
            timeout_ms: 30_000,
        }
    }
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:3000".to_string(),
            artifact_path: Some("/build/index.wasm".to_string()),
            timeout_ms: 30_000,
        }
    }
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            buffer_size: 128,
            volume: 1.0,
        }
    }
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            entry: PathBuf::from("src/user.h"),
            output: PathBuf::from("build/module.wasm"),
        }
    }
}

impl Default for LiveSection {
    fn default() -> Self {
        Self { debounce_ms: 250 }
    }
}

impl AppConfig {
    /// Loads the project config from `root`. With several config files
    /// present the priority is `hearc.toml` > `hearc.json` > `.hearc`; with
    /// none, defaults apply.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        match Self::find(root) {
            Some(path) => load_config_by_path(&path),
            None => Ok(AppConfig::default()),
        }
    }

    /// The config file `load` would read, if any.
    pub fn find(root: impl AsRef<Path>) -> Option<PathBuf> {
        let root = root.as_ref();
        [TOML_CONFIG, JSON_CONFIG, DOT_CONFIG]
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
    }

    pub fn write_toml(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).context("serialize config")?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory: {}", parent.display())
                })?;
            }
        }
        fs::write(path, text)
            .with_context(|| format!("unable to write config file: {}", path.display()))
    }

    pub fn entry_path(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(&self.paths.entry)
    }

    pub fn output_path(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(&self.paths.output)
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate.clamp(8_000, 192_000)
    }

    pub fn channels(&self) -> u16 {
        self.audio.channels.clamp(1, 8)
    }

    pub fn buffer_size(&self) -> usize {
        self.audio.buffer_size.clamp(16, 8_192)
    }

    pub fn volume(&self) -> f32 {
        self.audio.volume.clamp(0.0, 1.0)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.live.debounce_ms.max(10))
    }

    /// Options for every compile of this project. The configured sample
    /// rate is passed down as `SAMPLE_RATE` unless a flag already sets it.
    pub fn compile_options(&self) -> CompileOptions {
        let section = &self.compilation;
        let mut additional_flags = section.additional_flags.clone();
        if !additional_flags
            .iter()
            .any(|flag| flag.starts_with("-DSAMPLE_RATE"))
        {
            additional_flags.push(format!("-DSAMPLE_RATE={}", self.sample_rate()));
        }
        CompileOptions {
            optimization_level: section.optimization_level.min(3),
            sdl_enabled: section.sdl_enabled,
            exported_functions: section.exported_functions.clone(),
            additional_flags,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let toolchain = &self.toolchain;
        let cache_dir = toolchain
            .cache_dir
            .clone()
            .unwrap_or_else(ToolchainSettings::default_cache_dir);

        DispatcherConfig {
            mode: self.compilation.mode,
            toolchain_enabled: toolchain.enabled,
            remote_enabled: self.remote.enabled,
            local_enabled: self.local.enabled,
            toolchain: ToolchainSettings {
                cdn_url: toolchain.cdn_url.clone(),
                cache_dir,
                clang: toolchain.clang.clone(),
                linker: toolchain.linker.clone(),
                sysroot: toolchain.sysroot.clone(),
                timeout: Duration::from_millis(toolchain.timeout_ms.max(1)),
            },
            remote: HttpSettings {
                endpoint: self.remote.endpoint.clone(),
                artifact_url: self.remote.artifact_url.clone(),
                timeout: Duration::from_millis(self.remote.timeout_ms.max(1)),
            },
            local_url: self.local.url.clone(),
            local_artifact_path: self.local.artifact_path.clone(),
            local_timeout: Duration::from_millis(self.local.timeout_ms.max(1)),
            options: self.compile_options(),
        }
    }
}

fn load_json(path: &Path, raw: &str) -> Result<AppConfig> {
    serde_json::from_str(raw).with_context(|| format!("invalid JSON config: {}", path.display()))
}

fn load_toml(path: &Path, raw: &str) -> Result<AppConfig> {
    toml::from_str(raw).with_context(|| format!("invalid TOML config: {}", path.display()))
}

fn load_config_by_path(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match extension.as_deref() {
        Some("json") => load_json(path, &raw),
        Some("toml") => load_toml(path, &raw),
        // dotfile: sniff the content
        _ => {
            let trimmed = raw.trim_start();
            if trimmed.starts_with('{') {
                load_json(path, &raw)
            } else {
                load_toml(path, &raw)
            }
        }
    }
}

#[cfg(test)]
#[path = "test_config.rs"]
mod tests;
