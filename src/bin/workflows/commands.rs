use anyhow::{bail, Context, Result};

use openni_redist::config::RedistConfig;
use openni_redist::context::{PipelineContext, RedistOptions};
use openni_redist::logging;
use openni_redist::pipeline;
use openni_redist::platform::{HostFamily, PlatformProfile};
use openni_redist::toolchain::Toolchain;
use openni_redist::version::{update_version, Version};

pub(crate) fn dispatch(args: &[String]) -> Result<()> {
    match args {
        [cmd, major, minor, maintenance, build] if cmd == "update-version" => {
            let version = Version::from_args(major, minor, maintenance, build)?;
            run_update_version(&version)
        }
        [cmd, ..] if cmd == "update-version" => bail!(crate::usage()),
        _ => {
            let options = crate::workflows::parse_redist_args(args)?;
            run_redist(options)
                .with_context(|| format!("redist run '{}'", args.join(" ")))
        }
    }
}

fn run_redist(options: RedistOptions) -> Result<()> {
    let family = HostFamily::current();
    let profile = PlatformProfile::detect(options.bits);
    let config = RedistConfig::load(family)?;
    let toolchain = Toolchain::detect(&config, family, options.toolchain)?;
    let ctx = PipelineContext::new(config, profile, options, toolchain)?;

    let summary = pipeline::run(&ctx).inspect_err(|e| {
        log::error!("{:#}", e);
    })?;

    println!();
    println!("Redist: {}", summary.redist_root.display());
    println!(
        "Samples: {}  Rewritten files: {}",
        summary.samples, summary.rewritten
    );
    for file in &summary.build_files {
        println!("Build file: {}", file.display());
    }
    for package in &summary.packages {
        println!("Package: {}", package.display());
    }
    Ok(())
}

fn run_update_version(version: &Version) -> Result<()> {
    logging::init_console();
    let config = RedistConfig::load(HostFamily::current())?;
    let report = update_version(&config.work_dir, &config.version_targets, version)?;

    println!();
    println!(
        "Updated {} files, {} already current, {} skipped",
        report.updated.len(),
        report.unchanged.len(),
        report.skipped.len()
    );
    Ok(())
}
