//! Host build toolchain: locating it and driving the build stages with it.

use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::config::RedistConfig;
use crate::context::PipelineContext;
use crate::invoke::{run_logged, run_with_timeout, OutputCapture, ScanPolicy};
use crate::platform::HostFamily;
use crate::redist::copy;
use crate::rewrite::rewrite_file_with;
use crate::samples::{SampleKind, SampleMap};
use crate::solution::solution_targets;

const INTEL_LICENSE_VAR: &str = "INTEL_LICENSE_FILE";
const INTEL_LICENSE_DIR: &str = "C:\\Program Files\\Common Files\\Intel\\Licenses";

/// Doxygen leftovers not shipped with the HTML docs.
const DOXYGEN_JUNK: [&str; 5] = ["*.map", "*.md5", "*.hhc", "*.hhk", "*.hhp"];

/// Visual Studio generation requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolchainVersion {
    /// Visual Studio 2008.
    #[default]
    Vc9,
    /// Visual Studio 2010.
    Vc10,
}

impl ToolchainVersion {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "9" => Ok(ToolchainVersion::Vc9),
            "10" => Ok(ToolchainVersion::Vc10),
            other => bail!("VCVersion param must be 9 or 10, got '{}'", other),
        }
    }

    /// Environment variable pointing at `Common7\Tools` of the install.
    pub fn comntools_var(self) -> &'static str {
        match self {
            ToolchainVersion::Vc9 => "VS90COMNTOOLS",
            ToolchainVersion::Vc10 => "VS100COMNTOOLS",
        }
    }
}

impl fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainVersion::Vc9 => write!(f, "9"),
            ToolchainVersion::Vc10 => write!(f, "10"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toolchain {
    VisualStudio {
        devenv: PathBuf,
        version: ToolchainVersion,
        /// Solutions are in 2008 format and must be upgraded before a 2010
        /// build.
        needs_upgrade: bool,
    },
    Make {
        make: String,
        jobs: usize,
    },
}

impl Toolchain {
    /// Find the toolchain for `family`. On Windows a missing VC9 install
    /// falls back to VC10, as long as the latter is present.
    pub fn detect(
        config: &RedistConfig,
        family: HostFamily,
        requested: ToolchainVersion,
    ) -> Result<Self> {
        if !family.is_windows() {
            return Ok(Toolchain::Make {
                make: config.tools.make.clone(),
                jobs: make_jobs(),
            });
        }

        let (devenv, version) = match locate_devenv(config, requested) {
            Ok(found) => (found, requested),
            Err(e) if requested == ToolchainVersion::Vc9 => {
                log::warn!("{:#}; trying Visual Studio 2010", e);
                (
                    locate_devenv(config, ToolchainVersion::Vc10)?,
                    ToolchainVersion::Vc10,
                )
            }
            Err(e) => return Err(e),
        };

        Ok(Toolchain::VisualStudio {
            devenv,
            version,
            needs_upgrade: version == ToolchainVersion::Vc10 && !config.project_is_2010,
        })
    }

    pub fn devenv(&self) -> Option<&Path> {
        match self {
            Toolchain::VisualStudio { devenv, .. } => Some(devenv),
            Toolchain::Make { .. } => None,
        }
    }

    pub fn needs_upgrade(&self) -> bool {
        matches!(
            self,
            Toolchain::VisualStudio {
                needs_upgrade: true,
                ..
            }
        )
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toolchain::VisualStudio {
                devenv, version, ..
            } => write!(f, "Visual Studio (VC{}) {}", version, devenv.display()),
            Toolchain::Make { make, jobs } => write!(f, "{} -j{}", make, jobs),
        }
    }
}

/// Two jobs per core.
fn make_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 2
}

fn locate_devenv(config: &RedistConfig, version: ToolchainVersion) -> Result<PathBuf> {
    if let Some(path) = &config.tools.devenv {
        if path.is_file() {
            return Ok(path.clone());
        }
        bail!("Configured devenv '{}' does not exist", path.display());
    }

    if let Some(tools) = env::var_os(version.comntools_var()) {
        let candidate = PathBuf::from(tools)
            .join("..")
            .join("IDE")
            .join("devenv.exe");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    which::which("devenv").map_err(|_| {
        anyhow!(
            "Visual Studio {} not found: set {} or put devenv on PATH",
            version,
            version.comntools_var()
        )
    })
}

/// `devenv <file>` run from the file's directory.
pub fn devenv_command(devenv: &Path, target: &Path) -> Result<Command> {
    let dir = target
        .parent()
        .ok_or_else(|| anyhow!("no parent directory for '{}'", target.display()))?;
    let name = target
        .file_name()
        .ok_or_else(|| anyhow!("no file name in '{}'", target.display()))?;

    let mut cmd = Command::new(devenv);
    cmd.current_dir(dir).arg(name);
    if env::var_os(INTEL_LICENSE_VAR).is_none() {
        cmd.env(INTEL_LICENSE_VAR, INTEL_LICENSE_DIR);
    }
    Ok(cmd)
}

/// Build one configuration of a solution or project with devenv.
pub fn devenv_build(
    devenv: &Path,
    target: &Path,
    action: &str,
    configuration: &str,
    log: &Path,
    what: &str,
) -> Result<()> {
    let mut cmd = devenv_command(devenv, target)?;
    cmd.arg(action).arg(configuration).arg("/out").arg(log);
    run_logged(cmd, log, OutputCapture::ToolWrites, ScanPolicy::ExpectSummary)?
        .ensure_success(what)
}

/// Convert a solution to the running IDE's format. Bounded by the
/// configured timeout.
fn upgrade_solution(ctx: &PipelineContext, devenv: &Path, solution: &Path, log: &Path) -> Result<()> {
    log::info!("Upgrading {}", solution.display());
    if let Some(dir) = solution.parent() {
        copy::clear_readonly(dir)?;
    }

    let out = File::create(log).with_context(|| format!("creating log '{}'", log.display()))?;
    let err = out
        .try_clone()
        .with_context(|| format!("duplicating log handle '{}'", log.display()))?;
    let mut cmd = devenv_command(devenv, solution)?;
    cmd.arg("/upgrade")
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err));

    let timeout = Duration::from_secs(ctx.config.tools.upgrade_timeout_secs);
    let status = run_with_timeout(cmd, timeout)?;
    if !status.success() {
        log::warn!(
            "Upgrade of {} exited with {}, continuing",
            solution.display(),
            status
        );
    }
    Ok(())
}

fn build_action(ctx: &PipelineContext) -> &'static str {
    if ctx.options.rebuild {
        "/Rebuild"
    } else {
        "/Build"
    }
}

fn make_command(make: &str, jobs: usize) -> Command {
    let mut cmd = Command::new(make);
    cmd.arg(format!("-j{jobs}"));
    cmd
}

/// Build the SDK itself in release configuration.
pub fn build_project(ctx: &PipelineContext) -> Result<()> {
    let project = &ctx.config.project;
    log::info!("* Building {}...", project);
    let log = ctx.output_log(&format!("Build{project}.txt"));

    match &ctx.toolchain {
        Toolchain::VisualStudio {
            devenv,
            needs_upgrade,
            ..
        } => {
            let solution = ctx.work_dir().join(&ctx.config.project_solution);
            if *needs_upgrade {
                let upgrade_log = ctx.output_log(&format!("Build{project}UPG.txt"));
                upgrade_solution(ctx, devenv, &solution, &upgrade_log)?;
            }
            devenv_build(
                devenv,
                &solution,
                build_action(ctx),
                &format!("release|{}", ctx.profile.build_platform),
                &log,
                &format!("Building {project}"),
            )
        }
        Toolchain::Make { make, jobs } => {
            let build_dir = ctx.platform_root.join("Build");
            if ctx.options.rebuild {
                let mut clean = make_command(make, *jobs);
                clean.arg("-C").arg(&build_dir).arg("clean");
                let clean_log = ctx.output_log(&format!("Build{project}_clean.txt"));
                run_logged(clean, &clean_log, OutputCapture::Redirect, ScanPolicy::ExitCode)?
                    .ensure_success("Cleaning")?;
            }
            let mut cmd = make_command(make, *jobs);
            cmd.arg("-C").arg(&build_dir);
            run_logged(cmd, &log, OutputCapture::Redirect, ScanPolicy::ExitCode)?
                .ensure_success(&format!("Building {project}"))
        }
    }
}

const DOXY_TITLE_SUFFIX: &str = r" \d*\.\d*\.\d*(\s)";

/// Stamp the project title line of the Doxyfile with the short version.
pub fn stamp_doxyfile(doxyfile: &Path, project: &str, short_version: &str) -> Result<bool> {
    let pattern = format!("{}{}", regex::escape(project), DOXY_TITLE_SUFFIX);
    let re = regex::Regex::new(&pattern)
        .with_context(|| format!("building Doxyfile pattern for '{}'", project))?;
    let replacement = format!("{} {}${{1}}", project.replace('$', "$$"), short_version);
    rewrite_file_with(doxyfile, |text| re.replace_all(text, replacement.as_str()).into_owned())
}

/// Generate the API documentation, or skip when disabled.
pub fn build_docs(ctx: &PipelineContext) -> Result<()> {
    if !ctx.options.docs {
        log::info!("* Skipping Doxygen...");
        return Ok(());
    }
    log::info!("* Creating Doxygen...");

    let doxy_dir = ctx.work_dir().join(&ctx.config.tools.doxygen_dir);
    let doxyfile = doxy_dir.join("Doxyfile");
    if !doxyfile.is_file() {
        bail!("Missing Doxyfile '{}'", doxyfile.display());
    }
    copy::clear_readonly(&doxyfile)?;
    stamp_doxyfile(&doxyfile, &ctx.config.project, &ctx.version.short())?;

    let html = doxy_dir.join("html");
    if html.exists() {
        fs::remove_dir_all(&html).with_context(|| format!("removing '{}'", html.display()))?;
    }
    fs::create_dir_all(&html).with_context(|| format!("creating '{}'", html.display()))?;

    let mut cmd = Command::new(&ctx.config.tools.doxygen);
    cmd.arg("Doxyfile").current_dir(&doxy_dir);
    run_logged(
        cmd,
        &ctx.output_log("EngineDoxy.txt"),
        OutputCapture::Redirect,
        ScanPolicy::ExitCode,
    )?
    .ensure_success("Creating Documentation")?;

    let mut removed = 0;
    for pattern in DOXYGEN_JUNK {
        removed += copy::remove_matching(&html, pattern)?;
    }
    log::info!("Removed {} Doxygen intermediate files", removed);

    if ctx.profile.family.is_windows() {
        let docs = ctx.work_dir().join("Documentation");
        for chm in copy::glob_files(&html, "*.chm")? {
            if let Some(name) = chm.file_name() {
                copy::copy_file(&chm, &docs.join(name))?;
            }
        }
    }
    Ok(())
}

/// Samples solution built by the IDE for the detected toolchain.
fn samples_solution(ctx: &PipelineContext, version: ToolchainVersion) -> Result<PathBuf> {
    let targets = solution_targets(ctx.config.project_is_2010);
    let target = match version {
        ToolchainVersion::Vc9 => targets.first(),
        ToolchainVersion::Vc10 => targets.last(),
    }
    .ok_or_else(|| anyhow!("no samples solution configured"))?;
    Ok(ctx.redist_samples_dir().join("Build").join(&target.file_name))
}

/// Build the samples against the redist tree, release then debug.
pub fn build_samples(ctx: &PipelineContext, samples: &SampleMap) -> Result<()> {
    match &ctx.toolchain {
        Toolchain::VisualStudio {
            devenv,
            version,
            needs_upgrade,
        } => {
            let solution = samples_solution(ctx, *version)?;
            if *needs_upgrade {
                upgrade_solution(ctx, devenv, &solution, &ctx.output_log("UpgradeSamples.txt"))?;
            }
            for (cfg, log_name) in [("release", "BuildSmpRelease.txt"), ("debug", "BuildSmpDebug.txt")] {
                log::info!("* Building Samples in {} configuration...", cfg);
                devenv_build(
                    devenv,
                    &solution,
                    build_action(ctx),
                    &format!("{}|{}", cfg, ctx.profile.build_platform),
                    &ctx.output_log(log_name),
                    &format!("Building samples ({cfg})"),
                )?;
            }
            build_script_samples(ctx, samples)
        }
        Toolchain::Make { make, jobs } => {
            let build_dir = ctx.redist_samples_dir().join("Build");
            for (debug, log_name) in [(false, "BuildSmpRelease.txt"), (true, "BuildSmpDebug.txt")] {
                let cfg = if debug { "debug" } else { "release" };
                log::info!("* Building Samples in {} configuration...", cfg);
                let mut cmd = make_command(make, *jobs);
                if debug {
                    cmd.arg("CFG=Debug");
                }
                cmd.arg("-C").arg(&build_dir);
                run_logged(cmd, &ctx.output_log(log_name), OutputCapture::Redirect, ScanPolicy::ExitCode)?
                    .ensure_success(&format!("Building samples ({cfg})"))?;
            }
            Ok(())
        }
    }
}

/// Samples built by their own `Build.bat`, run inside the redist copy.
fn build_script_samples(ctx: &PipelineContext, samples: &SampleMap) -> Result<()> {
    for sample in samples
        .values()
        .filter(|s| s.kind == SampleKind::OtherBuildScript && s.in_aggregate_build())
    {
        let script = sample.redist_dir.join("Build.bat");
        if !script.is_file() {
            bail!("Sample {} lost its Build.bat in the redist copy", sample.name);
        }
        let mut cmd = Command::new("cmd");
        cmd.arg("/C")
            .arg("Build.bat")
            .arg(ctx.profile.bits.as_str())
            .current_dir(&sample.redist_dir);
        run_logged(
            cmd,
            &ctx.output_log(&format!("Build{}.txt", sample.name)),
            OutputCapture::Redirect,
            ScanPolicy::ExitCode,
        )?
        .ensure_success(&format!("Building project {}", sample.name))?;
    }
    Ok(())
}

/// Delete build intermediates the sample builds left in the redist tree.
pub fn clean_intermediates(ctx: &PipelineContext, samples: &SampleMap) -> Result<usize> {
    let redist = &ctx.redist_root;
    let mut removed = 0;

    if ctx.profile.family.is_windows() {
        let [debug, release] = &ctx.profile.sample_bin_dirs;
        let samples_dir = ctx.redist_samples_dir();
        removed += copy::remove_matching(&samples_dir.join(release), "*.pdb")?;
        removed += copy::remove_matching(&samples_dir.join(debug), "*.pdb")?;
        removed += copy::remove_matching(&samples_dir.join(debug), "*.ilk")?;
        removed += copy::remove_matching(&redist.join(&ctx.profile.lib_dir), "nim*.*")?;
    } else {
        for sample in samples.values() {
            let obj = sample.redist_dir.join(&ctx.profile.platform_tag);
            for cfg in ["Debug", "Release"] {
                let dir = obj.join(cfg);
                if dir.is_dir() {
                    fs::remove_dir_all(&dir)
                        .with_context(|| format!("removing '{}'", dir.display()))?;
                    removed += 1;
                }
            }
        }
    }

    log::info!("Removed {} intermediate entries", removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{linux_context, windows_context};
    use crate::platform::BuildBits;
    use crate::samples::SampleProject;
    use tempfile::TempDir;

    #[test]
    fn toolchain_version_parses_nine_and_ten() {
        assert_eq!(ToolchainVersion::parse("9").unwrap(), ToolchainVersion::Vc9);
        assert_eq!(ToolchainVersion::parse("10").unwrap(), ToolchainVersion::Vc10);
        assert!(ToolchainVersion::parse("11").is_err());
        assert_eq!(ToolchainVersion::Vc10.comntools_var(), "VS100COMNTOOLS");
    }

    #[test]
    fn unix_detects_make_with_two_jobs_per_core() {
        let config =
            RedistConfig::from_toml_str("", Path::new("/w"), HostFamily::Linux).unwrap();
        match Toolchain::detect(&config, HostFamily::Linux, ToolchainVersion::Vc9).unwrap() {
            Toolchain::Make { make, jobs } => {
                assert_eq!(make, "make");
                assert!(jobs >= 2 && jobs % 2 == 0);
            }
            other => panic!("unexpected toolchain {other:?}"),
        }
    }

    #[test]
    fn configured_devenv_is_used_and_upgrade_follows_project_format() {
        let temp = TempDir::new().unwrap();
        let devenv = temp.path().join("devenv.exe");
        fs::write(&devenv, "").unwrap();
        let text = format!("[tools]\ndevenv = {:?}\n", devenv.display().to_string());
        let config = RedistConfig::from_toml_str(&text, temp.path(), HostFamily::Windows).unwrap();

        let vc10 = Toolchain::detect(&config, HostFamily::Windows, ToolchainVersion::Vc10).unwrap();
        assert_eq!(vc10.devenv(), Some(devenv.as_path()));
        assert!(vc10.needs_upgrade());

        let vc9 = Toolchain::detect(&config, HostFamily::Windows, ToolchainVersion::Vc9).unwrap();
        assert!(!vc9.needs_upgrade());
    }

    #[test]
    fn doxyfile_title_gets_short_version() {
        let temp = TempDir::new().unwrap();
        let doxyfile = temp.path().join("Doxyfile");
        fs::write(
            &doxyfile,
            "PROJECT_NAME = \"OpenNI 1.3.2 \"\nPROJECT_NUMBER =\n",
        )
        .unwrap();

        assert!(stamp_doxyfile(&doxyfile, "OpenNI", "1.5.7").unwrap());
        assert_eq!(
            fs::read_to_string(&doxyfile).unwrap(),
            "PROJECT_NAME = \"OpenNI 1.5.7 \"\nPROJECT_NUMBER =\n"
        );
        assert!(!stamp_doxyfile(&doxyfile, "OpenNI", "1.5.7").unwrap());
    }

    #[test]
    fn devenv_command_runs_from_solution_dir() {
        let cmd = devenv_command(
            Path::new("devenv.exe"),
            Path::new("/w/Platform/Win32/Build/OpenNI.sln"),
        )
        .unwrap();
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/w/Platform/Win32/Build")));
        assert_eq!(
            cmd.get_args().collect::<Vec<_>>(),
            vec![std::ffi::OsStr::new("OpenNI.sln")]
        );
    }

    #[test]
    fn samples_solution_matches_toolchain() {
        let temp = TempDir::new().unwrap();
        let ctx = windows_context(temp.path(), BuildBits::X32);
        assert!(samples_solution(&ctx, ToolchainVersion::Vc9)
            .unwrap()
            .ends_with("Samples/Build/All_2008.sln"));
        assert!(samples_solution(&ctx, ToolchainVersion::Vc10)
            .unwrap()
            .ends_with("Samples/Build/All_2010.sln"));
    }

    #[test]
    fn disabled_docs_do_nothing() {
        let temp = TempDir::new().unwrap();
        let ctx = linux_context(temp.path());
        build_docs(&ctx).unwrap();
        assert!(!ctx.output_log("EngineDoxy.txt").exists());
    }

    #[test]
    fn windows_cleanup_removes_debug_symbols_and_module_libs() {
        let temp = TempDir::new().unwrap();
        let ctx = windows_context(temp.path(), BuildBits::X64);
        let redist = &ctx.redist_root;
        for f in [
            "Samples/Bin64/Release/NiViewer.pdb",
            "Samples/Bin64/Release/NiViewer.exe",
            "Samples/Bin64/Debug/NiViewer.pdb",
            "Samples/Bin64/Debug/NiViewer.ilk",
            "Lib64/nimCodecs64.lib",
            "Lib64/openNI64.lib",
        ] {
            let path = redist.join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }

        assert_eq!(clean_intermediates(&ctx, &SampleMap::new()).unwrap(), 4);
        assert!(redist.join("Samples/Bin64/Release/NiViewer.exe").exists());
        assert!(redist.join("Lib64/openNI64.lib").exists());
    }

    #[test]
    fn unix_cleanup_removes_object_dirs() {
        let temp = TempDir::new().unwrap();
        let ctx = linux_context(temp.path());
        let redist_dir = ctx.redist_samples_dir().join("NiViewer");
        fs::create_dir_all(redist_dir.join("x64/Release")).unwrap();
        fs::write(redist_dir.join("main.cpp"), "").unwrap();

        let mut samples = SampleMap::new();
        samples.insert(
            "NiViewer".to_string(),
            SampleProject {
                name: "NiViewer".to_string(),
                source_dir: PathBuf::new(),
                build_dir: PathBuf::new(),
                project_file: PathBuf::from("Makefile"),
                kind: SampleKind::OtherBuildScript,
                project_name: None,
                project_guid: None,
                is_managed: false,
                dependencies: Vec::new(),
                redist_dir: redist_dir.clone(),
                is_tool: false,
            },
        );

        assert_eq!(clean_intermediates(&ctx, &samples).unwrap(), 1);
        assert!(!redist_dir.join("x64/Release").exists());
        assert!(redist_dir.join("main.cpp").exists());
    }
}
