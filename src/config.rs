//! `redist.toml` configuration.
//!
//! Every field is optional; missing values fall back to the stock OpenNI
//! layout for the host family. Relative paths in the file resolve against
//! the directory holding it, except artifact patterns which are relative to
//! the work directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::platform::HostFamily;
use crate::version::VersionTarget;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "OPENNI_REDIST_CONFIG";
pub const CONFIG_FILE: &str = "redist.toml";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RedistToml {
    redist: Option<ProjectToml>,
    artifacts: Option<ArtifactsToml>,
    tools: Option<ToolsToml>,
    installer: Option<InstallerToml>,
    version: Option<VersionToml>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ProjectToml {
    project: Option<String>,
    product: Option<String>,
    work_dir: Option<PathBuf>,
    project_solution: Option<PathBuf>,
    project_is_2010: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ArtifactsToml {
    licenses: Option<Vec<String>>,
    shared_libraries: Option<Vec<String>>,
    executables: Option<Vec<String>>,
    import_libraries: Option<Vec<String>>,
    managed_wrappers: Option<Vec<String>>,
    jars: Option<Vec<String>>,
    sample_runtime: Option<Vec<String>>,
    documentation: Option<Vec<String>>,
    doc_html_dir: Option<PathBuf>,
    release_notes: Option<PathBuf>,
    header_subdirs: Option<Vec<String>>,
    data_files: Option<Vec<String>>,
    extra_trees: Option<Vec<TreeCopy>>,
    extra_files: Option<Vec<TreeCopy>>,
    optional: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ToolsToml {
    devenv: Option<PathBuf>,
    doxygen: Option<String>,
    make: Option<String>,
    doxygen_dir: Option<PathBuf>,
    upgrade_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InstallerToml {
    project_dir: Option<PathBuf>,
    wix_project: Option<String>,
    variables_file: Option<PathBuf>,
    msi_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VersionToml {
    header: Option<PathBuf>,
    targets: Option<Vec<VersionTarget>>,
}

/// A file or directory copied verbatim into the redist tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreeCopy {
    /// Relative to the work directory.
    pub from: PathBuf,
    /// Relative to the redist root.
    pub to: PathBuf,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub executable: bool,
}

/// What gets copied where. Patterns are globs; the platform profile adds
/// library prefixes and extensions to `shared_libraries` and `executables`.
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Relative to the work directory.
    pub licenses: Vec<String>,
    /// Stems, looked up in the release binaries directory.
    pub shared_libraries: Vec<String>,
    pub executables: Vec<String>,
    /// Looked up in the release library directory.
    pub import_libraries: Vec<String>,
    /// Wrapper assemblies copied to the redist bin directory and the sample
    /// bin directories.
    pub managed_wrappers: Vec<String>,
    /// Java wrappers copied to `Jar/` and the sample bin directories.
    pub jars: Vec<String>,
    /// Copied to the sample bin directories only.
    pub sample_runtime: Vec<String>,
    /// Relative to the work directory.
    pub documentation: Vec<String>,
    pub doc_html_dir: Option<PathBuf>,
    pub release_notes: Option<PathBuf>,
    /// Globs relative to `Include/`.
    pub header_subdirs: Vec<String>,
    pub data_files: Vec<String>,
    pub extra_trees: Vec<TreeCopy>,
    pub extra_files: Vec<TreeCopy>,
    /// Patterns allowed to match nothing.
    pub optional: Vec<String>,
}

impl ArtifactConfig {
    pub fn defaults(family: HostFamily) -> Self {
        let s = |items: &[&str]| items.iter().map(|i| i.to_string()).collect::<Vec<_>>();
        if family.is_windows() {
            Self {
                licenses: s(&["GPL.txt", "LGPL.txt"]),
                shared_libraries: s(&["OpenNI*", "nimCodecs*", "nimMockNodes*", "nimRecorder*"]),
                executables: s(&["niReg*", "niLicense*"]),
                import_libraries: s(&["*.*"]),
                managed_wrappers: s(&["OpenNI.net.dll"]),
                jars: Vec::new(),
                sample_runtime: s(&["glut*.dll"]),
                documentation: s(&[
                    "Documentation/*.pdf",
                    "Documentation/*.chi",
                    "Documentation/*.chm",
                ]),
                doc_html_dir: None,
                release_notes: Some(PathBuf::from("Platform/Win32/CreateRedist/ReleaseNotes.txt")),
                header_subdirs: s(&["*"]),
                data_files: s(&["Data/SamplesConfig.xml"]),
                extra_trees: vec![TreeCopy {
                    from: PathBuf::from("Platform/Win32/Driver/Bin"),
                    to: PathBuf::from("Driver"),
                    optional: true,
                    executable: false,
                }],
                extra_files: Vec::new(),
                optional: s(&["Documentation/*.chi", "Documentation/*.pdf"]),
            }
        } else {
            Self {
                licenses: s(&["LICENSE", "NOTICE"]),
                shared_libraries: s(&["nimCodecs", "nimMockNodes", "nimRecorder", "OpenNI", "OpenNI.jni"]),
                executables: s(&["niReg", "niLicense"]),
                import_libraries: Vec::new(),
                managed_wrappers: s(&["OpenNI.net.dll"]),
                jars: s(&["org.openni.jar"]),
                sample_runtime: Vec::new(),
                documentation: Vec::new(),
                doc_html_dir: Some(PathBuf::from("Source/DoxyGen/html")),
                release_notes: None,
                header_subdirs: s(&["Linux-x86", "Linux-Arm", "MacOSX"]),
                data_files: s(&["Data/SamplesConfig.xml"]),
                extra_trees: vec![TreeCopy {
                    from: PathBuf::from("Platform/Linux/Build/Common"),
                    to: PathBuf::from("Samples/Build/Common"),
                    optional: false,
                    executable: false,
                }],
                extra_files: vec![TreeCopy {
                    from: PathBuf::from("Platform/Linux/CreateRedist/install.sh"),
                    to: PathBuf::from("install.sh"),
                    optional: false,
                    executable: true,
                }],
                optional: Vec::new(),
            }
        }
    }

    pub fn is_optional(&self, pattern: &str) -> bool {
        self.optional.iter().any(|p| p == pattern)
    }
}

#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Explicit IDE executable; otherwise located from the environment.
    pub devenv: Option<PathBuf>,
    pub doxygen: String,
    pub make: String,
    /// Directory holding the Doxyfile, relative to the work directory.
    pub doxygen_dir: PathBuf,
    pub upgrade_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Relative to the work directory.
    pub project_dir: PathBuf,
    pub wix_project: String,
    /// Relative to `project_dir`.
    pub variables_file: PathBuf,
    pub msi_name: String,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct RedistConfig {
    /// File the configuration came from, if any.
    pub source: Option<PathBuf>,
    /// Directory receiving `Output*` and `Final*`.
    pub script_dir: PathBuf,
    pub work_dir: PathBuf,
    pub project: String,
    pub product: String,
    /// Relative to the work directory.
    pub project_solution: PathBuf,
    pub project_is_2010: bool,
    pub version_header: PathBuf,
    pub artifacts: ArtifactConfig,
    pub tools: ToolConfig,
    pub installer: InstallerConfig,
    pub version_targets: Vec<VersionTarget>,
}

impl RedistConfig {
    /// Load from `$OPENNI_REDIST_CONFIG`, else `./redist.toml`, else defaults
    /// rooted at the current directory.
    pub fn load(family: HostFamily) -> Result<Self> {
        let cwd = env::current_dir().context("reading current directory")?;
        let path = match env::var_os(CONFIG_ENV) {
            Some(p) => {
                let p = PathBuf::from(p);
                if !p.is_file() {
                    bail!("{} points at missing file '{}'", CONFIG_ENV, p.display());
                }
                Some(p)
            }
            None => Some(cwd.join(CONFIG_FILE)).filter(|p| p.is_file()),
        };

        match path {
            Some(path) => Self::load_file(&path, family),
            None => Self::from_toml_str("", &cwd, family),
        }
    }

    pub fn load_file(path: &Path, family: HostFamily) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml_str(&text, base, family)
            .with_context(|| format!("parsing config '{}'", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Resolve a configuration whose relative paths are anchored at `base`.
    pub fn from_toml_str(text: &str, base: &Path, family: HostFamily) -> Result<Self> {
        let parsed: RedistToml = toml::from_str(text)?;

        let project = parsed.redist.unwrap_or_default();
        let project_name = project.project.unwrap_or_else(|| "OpenNI".to_string());
        if project_name.trim().is_empty() {
            bail!("redist.project must not be empty");
        }
        let work_dir = base.join(project.work_dir.unwrap_or_else(|| PathBuf::from("../../..")));
        let platform_dir = if family.is_windows() { "Win32" } else { "Linux" };

        let defaults = ArtifactConfig::defaults(family);
        let a = parsed.artifacts.unwrap_or_default();
        let artifacts = ArtifactConfig {
            licenses: a.licenses.unwrap_or(defaults.licenses),
            shared_libraries: a.shared_libraries.unwrap_or(defaults.shared_libraries),
            executables: a.executables.unwrap_or(defaults.executables),
            import_libraries: a.import_libraries.unwrap_or(defaults.import_libraries),
            managed_wrappers: a.managed_wrappers.unwrap_or(defaults.managed_wrappers),
            jars: a.jars.unwrap_or(defaults.jars),
            sample_runtime: a.sample_runtime.unwrap_or(defaults.sample_runtime),
            documentation: a.documentation.unwrap_or(defaults.documentation),
            doc_html_dir: a.doc_html_dir.or(defaults.doc_html_dir),
            release_notes: a.release_notes.or(defaults.release_notes),
            header_subdirs: a.header_subdirs.unwrap_or(defaults.header_subdirs),
            data_files: a.data_files.unwrap_or(defaults.data_files),
            extra_trees: a.extra_trees.unwrap_or(defaults.extra_trees),
            extra_files: a.extra_files.unwrap_or(defaults.extra_files),
            optional: a.optional.unwrap_or(defaults.optional),
        };

        let t = parsed.tools.unwrap_or_default();
        let tools = ToolConfig {
            devenv: t.devenv.map(|p| base.join(p)),
            doxygen: t.doxygen.unwrap_or_else(|| "doxygen".to_string()),
            make: t.make.unwrap_or_else(|| "make".to_string()),
            doxygen_dir: t.doxygen_dir.unwrap_or_else(|| PathBuf::from("Source/DoxyGen")),
            upgrade_timeout_secs: t.upgrade_timeout_secs.unwrap_or(180),
        };
        if tools.upgrade_timeout_secs == 0 {
            bail!("tools.upgrade_timeout_secs must be positive");
        }

        let i = parsed.installer.unwrap_or_default();
        let installer = InstallerConfig {
            project_dir: i
                .project_dir
                .unwrap_or_else(|| PathBuf::from("Platform/Win32/Install/OpenNI")),
            wix_project: i.wix_project.unwrap_or_else(|| format!("{}.wixproj", project_name)),
            variables_file: i
                .variables_file
                .unwrap_or_else(|| PathBuf::from(format!("Includes/{}Variables.wxi", project_name))),
            msi_name: i.msi_name.unwrap_or_else(|| format!("{}.msi", project_name)),
        };

        let v = parsed.version.unwrap_or_default();

        Ok(Self {
            source: None,
            script_dir: base.to_path_buf(),
            work_dir,
            product: project.product.unwrap_or_else(|| project_name.clone()),
            project_solution: project.project_solution.unwrap_or_else(|| {
                Path::new("Platform")
                    .join(platform_dir)
                    .join("Build")
                    .join(format!("{}.sln", project_name))
            }),
            project_is_2010: project.project_is_2010.unwrap_or(false),
            version_header: v
                .header
                .unwrap_or_else(|| PathBuf::from("Include/XnVersion.h")),
            project: project_name,
            artifacts,
            tools,
            installer,
            version_targets: v.targets.unwrap_or_else(VersionTarget::defaults),
        })
    }

    /// `Platform/<dir>` below the work directory.
    pub fn platform_root(&self, platform_dir: &str) -> PathBuf {
        self.work_dir.join("Platform").join(platform_dir)
    }
}
