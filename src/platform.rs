//! Per-platform build profile.
//!
//! The redist layout, binary naming conventions and build output locations
//! differ between Windows (Visual Studio) and Unix (make) builds. Everything
//! that varies lives in [`PlatformProfile`] so the pipeline itself stays
//! platform-agnostic.

use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::version::Version;

/// Operating system family the redist is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFamily {
    Windows,
    Linux,
    MacOs,
}

impl HostFamily {
    /// Family of the machine running this binary.
    pub fn current() -> Self {
        if cfg!(windows) {
            HostFamily::Windows
        } else if cfg!(target_os = "macos") {
            HostFamily::MacOs
        } else {
            HostFamily::Linux
        }
    }

    pub fn is_windows(self) -> bool {
        self == HostFamily::Windows
    }
}

impl fmt::Display for HostFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostFamily::Windows => write!(f, "Windows"),
            HostFamily::Linux => write!(f, "Linux"),
            HostFamily::MacOs => write!(f, "MacOSX"),
        }
    }
}

/// Target bitness given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildBits {
    X32,
    X64,
}

impl BuildBits {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "32" => Ok(BuildBits::X32),
            "64" => Ok(BuildBits::X64),
            other => bail!("BuildTarget param must be 32 or 64, got '{}'", other),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildBits::X32 => "32",
            BuildBits::X64 => "64",
        }
    }
}

/// Everything that differs between the per-platform redist scripts.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub family: HostFamily,
    pub bits: BuildBits,
    /// Tag matched against `SKIP=` / `TOOL=` sidecar directives.
    pub platform_tag: String,
    /// Directory under `<work>/Platform` holding build files.
    pub platform_dir: String,
    /// Platform label passed to the IDE (`Win32`, `x64`).
    pub build_platform: String,
    /// Redist directory receiving executables.
    pub bin_dir: String,
    /// Redist directory receiving libraries.
    pub lib_dir: String,
    /// Release build outputs, relative to the platform directory.
    pub release_bin_dir: PathBuf,
    /// Release import/static libraries, relative to the platform directory.
    pub release_lib_dir: PathBuf,
    pub shared_lib_prefix: &'static str,
    pub shared_lib_ext: &'static str,
    pub exe_ext: &'static str,
    /// Sample output directories (debug, release), relative to `Samples/`.
    pub sample_bin_dirs: [PathBuf; 2],
    /// Where logs and tool output go, relative to the script directory.
    pub output_dir: String,
    /// Where packages go, relative to the script directory.
    pub final_dir: String,
}

impl PlatformProfile {
    /// Profile for the machine running this binary.
    pub fn detect(bits: BuildBits) -> Self {
        match HostFamily::current() {
            HostFamily::Windows => Self::windows(bits),
            family => Self::unix(family, unix_platform_tag(bits, std::env::consts::ARCH)),
        }
    }

    pub fn windows(bits: BuildBits) -> Self {
        let (bin, lib, platform, suffix) = match bits {
            BuildBits::X32 => ("Bin", "Lib", "Win32", "32"),
            BuildBits::X64 => ("Bin64", "Lib64", "x64", "64"),
        };
        Self {
            family: HostFamily::Windows,
            bits,
            platform_tag: platform.to_string(),
            platform_dir: "Win32".to_string(),
            build_platform: platform.to_string(),
            bin_dir: bin.to_string(),
            lib_dir: lib.to_string(),
            release_bin_dir: Path::new(bin).join("Release"),
            release_lib_dir: Path::new(lib).join("Release"),
            shared_lib_prefix: "",
            shared_lib_ext: ".dll",
            exe_ext: ".exe",
            sample_bin_dirs: [
                Path::new(bin).join("Debug"),
                Path::new(bin).join("Release"),
            ],
            output_dir: format!("Output{suffix}"),
            final_dir: format!("Final{suffix}"),
        }
    }

    pub fn unix(family: HostFamily, platform_tag: String) -> Self {
        let release = PathBuf::from("Bin").join(format!("{platform_tag}-Release"));
        let bits = if platform_tag == "x86" {
            BuildBits::X32
        } else {
            BuildBits::X64
        };
        Self {
            family,
            bits,
            platform_dir: "Linux".to_string(),
            build_platform: platform_tag.clone(),
            bin_dir: "Bin".to_string(),
            lib_dir: "Lib".to_string(),
            release_bin_dir: release.clone(),
            release_lib_dir: release,
            shared_lib_prefix: "lib",
            shared_lib_ext: if family == HostFamily::MacOs {
                ".dylib"
            } else {
                ".so"
            },
            exe_ext: "",
            sample_bin_dirs: [
                PathBuf::from("Bin").join(format!("{platform_tag}-Debug")),
                PathBuf::from("Bin").join(format!("{platform_tag}-Release")),
            ],
            output_dir: "Output".to_string(),
            final_dir: "Final".to_string(),
            platform_tag,
        }
    }

    /// Name used in package file names (`Win32`, `Linux-x64`, `MacOSX`).
    pub fn target_name(&self) -> String {
        match self.family {
            HostFamily::Windows => format!("Win{}", self.bits.as_str()),
            HostFamily::Linux => format!("Linux-{}", self.platform_tag),
            HostFamily::MacOs => "MacOSX".to_string(),
        }
    }

    /// Root of the redist tree for this platform.
    pub fn redist_root(&self, platform_root: &Path, project: &str, version: &Version) -> PathBuf {
        match self.family {
            HostFamily::Windows => platform_root.join("Redist"),
            _ => platform_root
                .join("Redist")
                .join(self.redist_name(project, version)),
        }
    }

    /// Directory name of the packaged redist.
    pub fn redist_name(&self, project: &str, version: &Version) -> String {
        format!("{}-Bin-Dev-{}-v{}", project, self.target_name(), version)
    }

    /// File name of a shared library built from `stem`.
    pub fn shared_library(&self, stem: &str) -> String {
        format!("{}{}{}", self.shared_lib_prefix, stem, self.shared_lib_ext)
    }

    pub fn executable(&self, stem: &str) -> String {
        format!("{}{}", stem, self.exe_ext)
    }

    /// Redist directory receiving shared libraries. Windows keeps DLLs next
    /// to the executables.
    pub fn shared_lib_dest(&self) -> &str {
        if self.family.is_windows() {
            &self.bin_dir
        } else {
            &self.lib_dir
        }
    }

    /// Redist directory receiving sample configuration data.
    pub fn data_dest(&self) -> PathBuf {
        if self.family.is_windows() {
            PathBuf::from("Data")
        } else {
            Path::new("Samples").join("Config")
        }
    }
}

fn unix_platform_tag(bits: BuildBits, arch: &str) -> String {
    if arch.starts_with("arm") || arch == "aarch64" {
        return "Arm".to_string();
    }
    match bits {
        BuildBits::X32 => "x86".to_string(),
        BuildBits::X64 => "x64".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_profiles_follow_bitness() {
        let p32 = PlatformProfile::windows(BuildBits::X32);
        assert_eq!(p32.bin_dir, "Bin");
        assert_eq!(p32.build_platform, "Win32");
        assert_eq!(p32.output_dir, "Output32");
        assert_eq!(p32.shared_library("OpenNI*"), "OpenNI*.dll");

        let p64 = PlatformProfile::windows(BuildBits::X64);
        assert_eq!(p64.lib_dir, "Lib64");
        assert_eq!(p64.release_bin_dir, Path::new("Bin64").join("Release"));
        assert_eq!(p64.target_name(), "Win64");
    }

    #[test]
    fn unix_profile_names_redist_by_target() {
        let profile = PlatformProfile::unix(HostFamily::Linux, "x64".to_string());
        let version = Version::new(1, 5, 7, 10).unwrap();
        assert_eq!(profile.shared_library("OpenNI"), "libOpenNI.so");
        assert_eq!(
            profile.redist_name("OpenNI", &version),
            "OpenNI-Bin-Dev-Linux-x64-v1.5.7.10"
        );
        assert_eq!(profile.shared_lib_dest(), "Lib");
        assert_eq!(profile.data_dest(), Path::new("Samples").join("Config"));
    }

    #[test]
    fn arm_hosts_map_to_arm_tag() {
        assert_eq!(unix_platform_tag(BuildBits::X32, "arm"), "Arm");
        assert_eq!(unix_platform_tag(BuildBits::X64, "aarch64"), "Arm");
        assert_eq!(unix_platform_tag(BuildBits::X32, "x86"), "x86");
    }

    #[test]
    fn build_bits_rejects_other_values() {
        assert!(BuildBits::parse("16").is_err());
        assert_eq!(BuildBits::parse("64").unwrap(), BuildBits::X64);
    }
}
