//! Preflight checks.
//!
//! Validates that the host has the tools and inputs a redist run needs
//! before anything is built, so a missing `doxygen` is reported up front
//! instead of half way through the pipeline.

use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

use crate::context::PipelineContext;
use crate::package::WIX_ENV;
use crate::toolchain::Toolchain;

/// Check if a command exists on the host system, either as a path or on
/// `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools the run will invoke, as (command, hint) pairs.
pub fn required_tools(ctx: &PipelineContext) -> Vec<(String, &'static str)> {
    let mut tools = Vec::new();
    match &ctx.toolchain {
        Toolchain::VisualStudio { devenv, .. } => {
            tools.push((devenv.display().to_string(), "Visual Studio"));
            tools.push(("cmd".to_string(), "Windows command processor"));
        }
        Toolchain::Make { make, .. } => {
            tools.push((make.clone(), "GNU make"));
        }
    }
    if ctx.options.docs {
        tools.push((ctx.config.tools.doxygen.clone(), "doxygen"));
    }
    tools
}

/// Check that specific tools are available.
pub fn check_required_tools(tools: &[(String, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, hint)| format!("  {} ({})", t, hint))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }
    Ok(())
}

/// Inputs that must exist before the build starts.
fn required_inputs(ctx: &PipelineContext) -> Vec<PathBuf> {
    let mut inputs = vec![ctx.samples_build_dir(), ctx.samples_source_dir()];
    if ctx.profile.family.is_windows() {
        inputs.push(ctx.work_dir().join(&ctx.config.project_solution));
    } else {
        inputs.push(ctx.platform_root.join("Build"));
    }
    inputs
}

/// All checks for a redist run.
pub fn run_preflight(ctx: &PipelineContext) -> Result<()> {
    log::info!("* Preflight checks...");
    check_required_tools(&required_tools(ctx))?;

    let missing: Vec<_> = required_inputs(ctx)
        .into_iter()
        .filter(|p| !p.exists())
        .map(|p| format!("  {}", p.display()))
        .collect();
    if !missing.is_empty() {
        bail!("Missing build inputs:\n{}", missing.join("\n"));
    }

    if ctx.profile.family.is_windows() && env::var_os(WIX_ENV).is_none() {
        log::warn!(
            "*** no {} env. var. defined, the installer stage is expected to fail ***",
            WIX_ENV
        );
    }
    if !ctx.managed_available {
        log::info!("gmcs not found, managed samples and wrappers are skipped");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::linux_context;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_tools_are_listed_with_hints() {
        let tools = vec![
            ("definitely-not-a-real-tool-1".to_string(), "hint one"),
            ("definitely-not-a-real-tool-2".to_string(), "hint two"),
        ];
        let err = check_required_tools(&tools).unwrap_err().to_string();
        assert!(err.contains("definitely-not-a-real-tool-1 (hint one)"));
        assert!(err.contains("definitely-not-a-real-tool-2 (hint two)"));
    }

    #[test]
    fn doxygen_is_required_only_with_docs() {
        let temp = TempDir::new().unwrap();
        let mut ctx = linux_context(temp.path());
        let names = |ctx: &PipelineContext| {
            required_tools(ctx)
                .into_iter()
                .map(|(t, _)| t)
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&ctx), vec!["make"]);
        ctx.options.docs = true;
        assert_eq!(names(&ctx), vec!["make", "doxygen"]);
    }

    #[test]
    fn missing_inputs_fail_before_building() {
        let temp = TempDir::new().unwrap();
        let mut ctx = linux_context(temp.path());
        ctx.toolchain = Toolchain::Make {
            make: "sh".to_string(),
            jobs: 1,
        };
        let err = run_preflight(&ctx).unwrap_err().to_string();
        assert!(err.contains("Missing build inputs"));

        fs::create_dir_all(ctx.samples_build_dir()).unwrap();
        fs::create_dir_all(ctx.samples_source_dir()).unwrap();
        run_preflight(&ctx).unwrap();
    }
}
