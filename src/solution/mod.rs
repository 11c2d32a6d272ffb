//! Aggregate build files for the redist samples: Visual Studio solutions on
//! Windows, a Makefile elsewhere.

pub mod makefile;

use anyhow::{bail, Result};
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::context::PipelineContext;
use crate::rewrite::write_atomic;
use crate::samples::{SampleKind, SampleMap, SampleProject};

/// Project type GUID written for every sample project.
pub const PROJECT_TYPE_GUID: &str = "{19091980-2008-4CFA-1491-04CC20D8BCF9}";

const CONFIGURATIONS: [&str; 2] = ["Debug", "Release"];
const PLATFORMS: [&str; 2] = ["Win32", "x64"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionFormat {
    Vs2008,
    Vs2010,
}

impl SolutionFormat {
    fn header(self) -> &'static str {
        match self {
            SolutionFormat::Vs2008 => {
                "Microsoft Visual Studio Solution File, Format Version 10.00\n# Visual Studio 2008\n"
            }
            SolutionFormat::Vs2010 => {
                "Microsoft Visual Studio Solution File, Format Version 11.00\n# Visual Studio 2010\n"
            }
        }
    }
}

/// One solution file to generate and the suffix of the descriptor copies it
/// references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionTarget {
    pub format: SolutionFormat,
    pub file_name: String,
    pub project_suffix: String,
}

/// Solutions to generate. Projects already in 2010 format get a single
/// solution; older ones get one per IDE generation.
pub fn solution_targets(project_is_2010: bool) -> Vec<SolutionTarget> {
    if project_is_2010 {
        vec![SolutionTarget {
            format: SolutionFormat::Vs2010,
            file_name: "All.sln".to_string(),
            project_suffix: String::new(),
        }]
    } else {
        vec![
            SolutionTarget {
                format: SolutionFormat::Vs2008,
                file_name: "All_2008.sln".to_string(),
                project_suffix: "_2008".to_string(),
            },
            SolutionTarget {
                format: SolutionFormat::Vs2010,
                file_name: "All_2010.sln".to_string(),
                project_suffix: "_2010".to_string(),
            },
        ]
    }
}

fn in_solution(sample: &SampleProject) -> bool {
    sample.kind != SampleKind::OtherBuildScript && sample.in_aggregate_build()
}

fn require_guid<'a>(sample: &'a SampleProject) -> Result<&'a str> {
    match sample.project_guid.as_deref() {
        Some(guid) if !guid.is_empty() => Ok(guid),
        _ => bail!("Sample {} has no project GUID", sample.name),
    }
}

fn resolve_dependency<'a>(
    samples: &'a SampleMap,
    sample: &SampleProject,
    dep: &str,
) -> Result<&'a SampleProject> {
    match samples.get(dep) {
        Some(found) => Ok(found),
        None => bail!("Sample {} depends on unknown sample {}", sample.name, dep),
    }
}

/// Solution file text for `target`.
pub fn render_solution(samples: &SampleMap, target: &SolutionTarget) -> Result<String> {
    let mut out = String::from(target.format.header());
    let members: Vec<&SampleProject> = samples.values().filter(|s| in_solution(s)).collect();

    for sample in &members {
        let guid = require_guid(sample)?;
        let name = sample.project_name.as_deref().unwrap_or(&sample.name);
        let path = format!(
            "..\\{}\\{}",
            sample.name,
            sample.project_copy_name(&target.project_suffix)
        );
        let _ = writeln!(
            out,
            "Project(\"{}\") = \"{}\", \"{}\", \"{}\"",
            PROJECT_TYPE_GUID, name, path, guid
        );

        if !sample.dependencies.is_empty() {
            out.push_str("\tProjectSection(ProjectDependencies) = postProject\n");
            for dep in &sample.dependencies {
                let dep_sample = resolve_dependency(samples, sample, dep)?;
                let dep_guid = require_guid(dep_sample).map_err(|_| {
                    anyhow::anyhow!(
                        "Sample {} depends on {}, which has no project GUID",
                        sample.name,
                        dep
                    )
                })?;
                let _ = writeln!(out, "\t\t{} = {}", dep_guid, dep_guid);
            }
            out.push_str("\tEndProjectSection\n");
        }
        out.push_str("EndProject\n");
    }

    out.push_str("Global\n");
    out.push_str("\tGlobalSection(SolutionConfigurationPlatforms) = preSolution\n");
    for cfg in CONFIGURATIONS {
        for platform in PLATFORMS {
            let _ = writeln!(out, "\t\t{cfg}|{platform} = {cfg}|{platform}");
        }
    }
    out.push_str("\tEndGlobalSection\n");

    out.push_str("\tGlobalSection(ProjectConfigurationPlatforms) = postSolution\n");
    for sample in &members {
        let guid = require_guid(sample)?;
        for cfg in CONFIGURATIONS {
            for platform in PLATFORMS {
                let mapped = if sample.is_managed && platform == "Win32" {
                    "x86"
                } else {
                    platform
                };
                let _ = writeln!(out, "\t\t{guid}.{cfg}|{platform}.ActiveCfg = {cfg}|{mapped}");
                let _ = writeln!(out, "\t\t{guid}.{cfg}|{platform}.Build.0 = {cfg}|{mapped}");
            }
        }
    }
    out.push_str("\tEndGlobalSection\n");

    out.push_str("\tGlobalSection(SolutionProperties) = preSolution\n");
    out.push_str("\t\tHideSolutionNode = FALSE\n");
    out.push_str("\tEndGlobalSection\n");
    // Trailing tab kept so regenerated solutions diff clean against shipped ones.
    out.push_str("EndGlobal\t\n");
    Ok(out)
}

/// Write the aggregate build files into `<redist>/Samples/Build`.
pub fn write_build_files(ctx: &PipelineContext, samples: &SampleMap) -> Result<Vec<PathBuf>> {
    let build_dir = ctx.redist_samples_dir().join("Build");
    let mut written = Vec::new();

    if ctx.profile.family.is_windows() {
        for target in solution_targets(ctx.config.project_is_2010) {
            let text = render_solution(samples, &target)?;
            let path = build_dir.join(&target.file_name);
            write_atomic(&path, text.as_bytes())?;
            log::info!("Wrote solution {}", path.display());
            written.push(path);
        }
    } else {
        let text = makefile::render_samples_makefile(samples)?;
        let path = build_dir.join("Makefile");
        write_atomic(&path, text.as_bytes())?;
        log::info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
