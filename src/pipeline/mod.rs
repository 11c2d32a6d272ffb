//! The redist run, stage by stage.
//!
//! Stage order is fixed: preflight, main build, docs, redist tree, sample
//! discovery, artifact and sample copies, normalisation, path rewriting,
//! aggregate build files, sample build, cleanup, packaging. Any failure
//! aborts the run; nothing is retried or rolled back.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::PipelineContext;
use crate::logging;
use crate::package;
use crate::preflight;
use crate::redist::{self, samples::copy_samples, RedistLayout, RedistTarget};
use crate::rewrite::{rewrite_tree, RewritePlan};
use crate::samples::{discover_samples, SampleMap};
use crate::solution::{self, solution_targets};
use crate::toolchain;

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub redist_root: PathBuf,
    pub samples: usize,
    pub rewritten: usize,
    pub build_files: Vec<PathBuf>,
    pub packages: Vec<PathBuf>,
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("removing '{}'", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("creating '{}'", dir.display()))
}

/// Start from empty output and final directories and point the log file
/// into the former.
pub fn prepare_output(ctx: &PipelineContext) -> Result<()> {
    recreate_dir(&ctx.output_dir)?;
    recreate_dir(&ctx.final_dir)?;
    logging::init(&ctx.log_path)
}

fn welcome(ctx: &PipelineContext) {
    println!();
    println!("*********************************");
    println!("*   PrimeSense {} Redist    *", ctx.config.project);
    println!("*     {}       *", logging::timestamp());
    println!("*********************************");
    println!();
    log::info!("{} Redist Started", ctx.config.project);
    log::info!(
        "Target: {}  Version: {}  Docs: {}  Rebuild: {}",
        ctx.profile.target_name(),
        ctx.version,
        ctx.options.docs,
        ctx.options.rebuild
    );
    log::info!("Toolchain: {}", ctx.toolchain);
}

/// Replace any previous redist tree with a bare skeleton, then scan the
/// samples. A failed scan leaves only the skeleton behind.
pub fn create_tree_and_find_samples(ctx: &PipelineContext) -> Result<(RedistTarget, SampleMap)> {
    log::info!("* Creating Redist Dir...");
    let target = RedistTarget::create(&ctx.redist_root, &RedistLayout::for_profile(&ctx.profile))?;

    log::info!("* Finding samples...");
    let samples = discover_samples(ctx)?;
    Ok((target, samples))
}

/// Directory whose files get their relative paths rewritten. Windows fixes
/// the whole redist; elsewhere only the samples reference build-tree paths.
pub fn rewrite_root(ctx: &PipelineContext) -> PathBuf {
    if ctx.profile.family.is_windows() {
        ctx.redist_root.clone()
    } else {
        ctx.redist_samples_dir()
    }
}

/// Run every stage against `ctx`.
pub fn run(ctx: &PipelineContext) -> Result<RunSummary> {
    prepare_output(ctx)?;
    welcome(ctx);

    preflight::run_preflight(ctx)?;
    toolchain::build_project(ctx)?;
    toolchain::build_docs(ctx)?;

    let (mut target, samples) = create_tree_and_find_samples(ctx)?;

    log::info!("* Copying files to redist dir...");
    redist::copy_artifacts(ctx, &mut target)?;
    let solutions = if ctx.profile.family.is_windows() {
        solution_targets(ctx.config.project_is_2010)
    } else {
        Vec::new()
    };
    copy_samples(&samples, &solutions, &mut target)?;

    log::info!("* Removing Read Only Attributes...");
    target.normalize()?;

    log::info!("* Fixing Files...");
    let plan = RewritePlan::for_profile(&ctx.profile)?;
    let rewrite = rewrite_tree(&rewrite_root(ctx), &plan)?;
    log::info!(
        "Rewrote {} of {} files",
        rewrite.rewritten,
        rewrite.scanned
    );

    log::info!("* Creating samples build files...");
    let build_files = solution::write_build_files(ctx, &samples)?;

    toolchain::build_samples(ctx, &samples)?;
    toolchain::clean_intermediates(ctx, &samples)?;

    let packages = package::package(ctx, &target)?;

    log::info!("* Redist {} Ended.   !!", ctx.config.project);
    Ok(RunSummary {
        redist_root: target.root.clone(),
        samples: samples.len(),
        rewritten: rewrite.rewritten,
        build_files,
        packages,
    })
}
