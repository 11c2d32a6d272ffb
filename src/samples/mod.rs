//! Sample discovery.
//!
//! Every directory under `<platform>/Build/Samples` is a sample. Its build
//! descriptor decides how it is built and what goes into the generated
//! solutions; an optional `.redist` sidecar next to its sources adds
//! dependencies or excludes it on some platforms.

pub mod descriptor;
pub mod sidecar;

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::PipelineContext;
use descriptor::search_order;
pub use descriptor::{DescriptorInfo, DescriptorParser};
pub use sidecar::Sidecar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// `.vcproj` / `.vcxproj`
    NativeIde,
    /// `.csproj`
    Managed,
    /// `Build.bat`, `Makefile`
    OtherBuildScript,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleProject {
    pub name: String,
    /// `<work>/Samples/<name>`
    pub source_dir: PathBuf,
    /// `<platform>/Build/Samples/<name>`
    pub build_dir: PathBuf,
    pub project_file: PathBuf,
    pub kind: SampleKind,
    pub project_name: Option<String>,
    pub project_guid: Option<String>,
    pub is_managed: bool,
    pub dependencies: Vec<String>,
    /// `<redist>/Samples/<name>`
    pub redist_dir: PathBuf,
    /// Copied like any sample but not part of the aggregate build.
    pub is_tool: bool,
}

impl SampleProject {
    /// Whether the sample appears in generated solutions / Makefiles.
    pub fn in_aggregate_build(&self) -> bool {
        !self.is_tool
    }

    /// Name of the per-solution copy of the descriptor, e.g.
    /// `NiViewer_2008.vcproj`.
    pub fn project_copy_name(&self, suffix: &str) -> String {
        format!("{}{}.{}", self.name, suffix, self.project_extension())
    }

    /// Extension of the descriptor file (`vcproj`, `csproj`, ...).
    pub fn project_extension(&self) -> &str {
        self.project_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
    }
}

/// Samples keyed by directory name. Ordered, so everything generated from it
/// is deterministic.
pub type SampleMap = BTreeMap<String, SampleProject>;

/// Scan the samples build directory.
pub fn discover_samples(ctx: &PipelineContext) -> Result<SampleMap> {
    let build_root = ctx.samples_build_dir();
    let tag = ctx.profile.platform_tag.as_str();
    let mut samples = SampleMap::new();

    for name in list_sample_dirs(&build_root)? {
        let source_dir = ctx.samples_source_dir().join(&name);
        let sidecar = Sidecar::load(&source_dir)?;

        if sidecar.skips(tag) {
            log::info!("Skipping sample {} on {}", name, tag);
            continue;
        }
        if !ctx.managed_available && name.contains(".net") {
            log::info!("Skipping sample {}: no managed toolchain", name);
            continue;
        }

        let build_dir = build_root.join(&name);
        let (parser, project_file) = find_descriptor(ctx, &name, &build_dir)?;
        let text = fs::read_to_string(&project_file)
            .with_context(|| format!("reading descriptor '{}'", project_file.display()))?;
        let info = parser.parse(&name, &text);
        let kind = parser.kind();

        let sample = SampleProject {
            redist_dir: ctx.redist_samples_dir().join(&name),
            name: name.clone(),
            source_dir,
            build_dir,
            project_file,
            kind,
            project_name: info.project_name,
            project_guid: info.project_guid,
            is_managed: kind == SampleKind::Managed,
            dependencies: sidecar.depends.clone(),
            is_tool: sidecar.is_tool(tag),
        };
        samples.insert(name, sample);
    }

    log::info!(
        "Samples: {}",
        samples.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    Ok(samples)
}

fn list_sample_dirs(build_root: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(build_root)
        .with_context(|| format!("listing samples in '{}'", build_root.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("listing samples in '{}'", build_root.display()))?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

fn find_descriptor(
    ctx: &PipelineContext,
    name: &str,
    build_dir: &Path,
) -> Result<(&'static dyn DescriptorParser, PathBuf)> {
    for parser in search_order(ctx.profile.family) {
        let candidate = build_dir.join(parser.file_name(name));
        if candidate.is_file() {
            return Ok((*parser, candidate));
        }
    }
    bail!("Sample {} does not have a valid project file", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{linux_context, windows_context};
    use crate::platform::BuildBits;
    use tempfile::TempDir;

    fn add_sample(root: &Path, platform: &str, name: &str, descriptor: (&str, &str)) {
        let build = root.join("Platform").join(platform).join("Build/Samples").join(name);
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join(descriptor.0), descriptor.1).unwrap();
        fs::create_dir_all(root.join("Samples").join(name)).unwrap();
    }

    fn sidecar(root: &Path, name: &str, text: &str) {
        fs::write(root.join("Samples").join(name).join(".redist"), text).unwrap();
    }

    #[test]
    fn windows_samples_are_classified_by_descriptor() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        add_sample(
            root,
            "Win32",
            "NiSimpleRead",
            (
                "NiSimpleRead.vcproj",
                "\tName=\"NiSimpleRead\"\n\tProjectGUID=\"{1111}\"\n",
            ),
        );
        add_sample(
            root,
            "Win32",
            "SimpleRead.net",
            (
                "SimpleRead.net.csproj",
                "<ProjectGuid>{2222}</ProjectGuid>\n<AssemblyName>SimpleRead.net</AssemblyName>\n",
            ),
        );
        add_sample(root, "Win32", "NiBackRecorder", ("Build.bat", "@echo off\n"));
        fs::create_dir_all(root.join("Platform/Win32/Build/Samples/.svn")).unwrap();
        sidecar(root, "SimpleRead.net", "DEPENDS=NiSimpleRead\n");

        let ctx = windows_context(root, BuildBits::X32);
        let samples = discover_samples(&ctx).unwrap();

        assert_eq!(
            samples.keys().collect::<Vec<_>>(),
            vec!["NiBackRecorder", "NiSimpleRead", "SimpleRead.net"]
        );
        let native = &samples["NiSimpleRead"];
        assert_eq!(native.kind, SampleKind::NativeIde);
        assert_eq!(native.project_guid.as_deref(), Some("{1111}"));
        assert_eq!(native.project_extension(), "vcproj");

        let managed = &samples["SimpleRead.net"];
        assert!(managed.is_managed);
        assert_eq!(managed.dependencies, vec!["NiSimpleRead"]);
        assert_eq!(managed.redist_dir, root.join("Platform/Win32/Redist/Samples/SimpleRead.net"));

        let script = &samples["NiBackRecorder"];
        assert_eq!(script.kind, SampleKind::OtherBuildScript);
        assert_eq!(script.project_guid, None);
    }

    #[test]
    fn vcproj_wins_over_csproj() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        add_sample(root, "Win32", "Both", ("Both.vcproj", "ProjectGUID=\"{V}\"\n"));
        fs::write(
            root.join("Platform/Win32/Build/Samples/Both/Both.csproj"),
            "<ProjectGuid>{C}</ProjectGuid>\n",
        )
        .unwrap();

        let ctx = windows_context(root, BuildBits::X32);
        let samples = discover_samples(&ctx).unwrap();
        assert_eq!(samples["Both"].project_guid.as_deref(), Some("{V}"));
        assert!(!samples["Both"].is_managed);
    }

    #[test]
    fn skip_and_tool_directives_follow_platform_tag() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        add_sample(root, "Linux", "NiViewer", ("Makefile", "all:\n"));
        add_sample(root, "Linux", "NiReg", ("Makefile", "all:\n"));
        add_sample(root, "Linux", "NiHandTracker", ("Makefile", "all:\n"));
        sidecar(root, "NiViewer", "SKIP=Arm|x64\n");
        sidecar(root, "NiReg", "TOOL=ALL\n");
        sidecar(root, "NiHandTracker", "SKIP=Arm\n");

        let ctx = linux_context(root);
        let samples = discover_samples(&ctx).unwrap();

        assert_eq!(
            samples.keys().collect::<Vec<_>>(),
            vec!["NiHandTracker", "NiReg"]
        );
        assert!(samples["NiReg"].is_tool);
        assert!(!samples["NiReg"].in_aggregate_build());
        assert!(samples["NiHandTracker"].in_aggregate_build());
    }

    #[test]
    fn managed_samples_drop_without_managed_toolchain() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        add_sample(root, "Linux", "UserTracker.net", ("Makefile", "all:\n"));
        add_sample(root, "Linux", "NiUserTracker", ("Makefile", "all:\n"));

        let mut ctx = linux_context(root);
        ctx.managed_available = false;
        let samples = discover_samples(&ctx).unwrap();
        assert_eq!(samples.keys().collect::<Vec<_>>(), vec!["NiUserTracker"]);
    }

    #[test]
    fn directory_without_descriptor_is_fatal() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("Platform/Linux/Build/Samples/Broken")).unwrap();

        let ctx = linux_context(root);
        let err = discover_samples(&ctx).unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }
}
