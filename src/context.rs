//! Explicit state threaded through every pipeline stage.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::RedistConfig;
use crate::logging;
use crate::platform::{BuildBits, PlatformProfile};
use crate::toolchain::{Toolchain, ToolchainVersion};
use crate::version::Version;

/// Command-line switches of a redist run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedistOptions {
    pub docs: bool,
    pub bits: BuildBits,
    pub rebuild: bool,
    pub toolchain: ToolchainVersion,
}

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: RedistConfig,
    pub profile: PlatformProfile,
    pub options: RedistOptions,
    pub version: Version,
    pub toolchain: Toolchain,
    /// `<work>/Platform/<platform dir>`.
    pub platform_root: PathBuf,
    pub redist_root: PathBuf,
    pub output_dir: PathBuf,
    pub final_dir: PathBuf,
    pub log_path: PathBuf,
    /// Whether the managed (.NET) samples and wrappers can be built. Always
    /// true on Windows.
    pub managed_available: bool,
}

impl PipelineContext {
    pub fn new(
        config: RedistConfig,
        profile: PlatformProfile,
        options: RedistOptions,
        toolchain: Toolchain,
    ) -> Result<Self> {
        let version = Version::read_header(&config.work_dir.join(&config.version_header))?;
        let platform_root = config.platform_root(&profile.platform_dir);
        let redist_root = profile.redist_root(&platform_root, &config.project, &version);
        let output_dir = config.script_dir.join(&profile.output_dir);
        let final_dir = config.script_dir.join(&profile.final_dir);
        let log_path = logging::log_path(&output_dir, &config.project);
        let managed_available =
            profile.family.is_windows() || which::which("gmcs").is_ok();

        Ok(Self {
            config,
            profile,
            options,
            version,
            toolchain,
            platform_root,
            redist_root,
            output_dir,
            final_dir,
            log_path,
            managed_available,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// `<work>/Samples`, the sample sources.
    pub fn samples_source_dir(&self) -> PathBuf {
        self.work_dir().join("Samples")
    }

    /// `<platform>/Build/Samples`, the per-sample build descriptors.
    pub fn samples_build_dir(&self) -> PathBuf {
        self.platform_root.join("Build").join("Samples")
    }

    /// `<redist>/Samples`.
    pub fn redist_samples_dir(&self) -> PathBuf {
        self.redist_root.join("Samples")
    }

    /// Tool output file under the output directory.
    pub fn output_log(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}
