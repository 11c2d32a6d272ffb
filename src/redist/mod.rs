//! The redist tree: skeleton creation, artifact copies and the manifest of
//! everything copied.

pub mod copy;
pub mod samples;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::PipelineContext;
use crate::platform::PlatformProfile;

/// Manifest file written next to the packages.
pub const MANIFEST_FILE: &str = "redist-manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    Licenses,
    Binaries,
    Libraries,
    Headers,
    Documentation,
    Samples,
    Resources,
    Data,
}

/// Directories created in a fresh redist tree, relative to its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedistLayout {
    pub dirs: Vec<PathBuf>,
}

impl RedistLayout {
    pub fn for_profile(profile: &PlatformProfile) -> Self {
        let samples = Path::new("Samples");
        let mut dirs = vec![
            PathBuf::from(&profile.bin_dir),
            PathBuf::from(&profile.lib_dir),
            PathBuf::from("Include"),
            PathBuf::from("Documentation"),
            samples.to_path_buf(),
        ];
        dirs.extend(profile.sample_bin_dirs.iter().map(|d| samples.join(d)));
        dirs.push(samples.join("Build"));
        dirs.push(samples.join("Res"));
        if profile.family.is_windows() {
            dirs.push(PathBuf::from("Data"));
        } else {
            dirs.push(samples.join("Config"));
            dirs.push(PathBuf::from("Jar"));
        }
        Self { dirs }
    }
}

/// A freshly created redist tree and what has been copied into it.
#[derive(Debug)]
pub struct RedistTarget {
    pub root: PathBuf,
    manifest: BTreeMap<ArtifactCategory, Vec<PathBuf>>,
}

#[derive(Serialize)]
struct ManifestFile<'a> {
    root: String,
    version: String,
    target: String,
    artifacts: BTreeMap<ArtifactCategory, Vec<String>>,
    #[serde(skip_serializing_if = "no_packages")]
    packages: &'a [PathBuf],
}

fn no_packages(packages: &&[PathBuf]) -> bool {
    packages.is_empty()
}

impl RedistTarget {
    /// Delete whatever is at `root` and create the skeleton.
    pub fn create(root: &Path, layout: &RedistLayout) -> Result<Self> {
        if root.exists() {
            fs::remove_dir_all(root)
                .with_context(|| format!("removing old redist '{}'", root.display()))?;
        }
        fs::create_dir_all(root)
            .with_context(|| format!("creating redist '{}'", root.display()))?;
        for dir in &layout.dirs {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .with_context(|| format!("creating redist dir '{}'", path.display()))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            manifest: BTreeMap::new(),
        })
    }

    pub fn record(&mut self, category: ArtifactCategory, path: PathBuf) {
        let rel = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or(path);
        self.manifest.entry(category).or_default().push(rel);
    }

    /// Paths recorded under `category`, relative to the root.
    pub fn recorded(&self, category: ArtifactCategory) -> &[PathBuf] {
        self.manifest
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn manifest(&self) -> &BTreeMap<ArtifactCategory, Vec<PathBuf>> {
        &self.manifest
    }

    /// Copy one file to `dest_rel` (relative to the root, including the
    /// file name).
    pub fn copy_file(
        &mut self,
        category: ArtifactCategory,
        src: &Path,
        dest_rel: &Path,
    ) -> Result<()> {
        let dest = self.root.join(dest_rel);
        copy::copy_file(src, &dest)?;
        self.record(category, dest);
        Ok(())
    }

    /// Copy every file matching `pattern` below `base` into `dest_dir_rel`.
    /// A pattern that matches nothing is an error unless `optional`.
    pub fn copy_glob(
        &mut self,
        category: ArtifactCategory,
        base: &Path,
        pattern: &str,
        dest_dir_rel: &Path,
        optional: bool,
    ) -> Result<usize> {
        let files = copy::glob_files(base, pattern)?;
        if files.is_empty() {
            if optional {
                log::warn!("No files match optional '{}' in '{}'", pattern, base.display());
                return Ok(0);
            }
            bail!(
                "Missing artifact: nothing matches '{}' in '{}'",
                pattern,
                base.display()
            );
        }
        for file in &files {
            let name = file
                .file_name()
                .ok_or_else(|| anyhow!("glob returned '{}'", file.display()))?;
            self.copy_file(category, file, &dest_dir_rel.join(name))?;
        }
        Ok(files.len())
    }

    /// Copy a directory tree to `dest_rel`.
    pub fn copy_tree(
        &mut self,
        category: ArtifactCategory,
        src: &Path,
        dest_rel: &Path,
    ) -> Result<usize> {
        if !src.is_dir() {
            bail!("Missing artifact directory '{}'", src.display());
        }
        let written = copy::copy_dir_recursive(src, &self.root.join(dest_rel))?;
        let count = written.len();
        for path in written {
            self.record(category, path);
        }
        Ok(count)
    }

    /// Clear read-only flags and drop `.svn` directories.
    pub fn normalize(&self) -> Result<()> {
        let removed = copy::remove_svn_dirs(&self.root)?;
        let cleared = copy::clear_readonly(&self.root)?;
        log::info!(
            "Removed {} .svn directories, cleared read-only on {} entries",
            removed,
            cleared
        );
        Ok(())
    }

    /// Write the manifest as JSON, atomically.
    pub fn write_manifest(
        &self,
        path: &Path,
        ctx: &PipelineContext,
        packages: &[PathBuf],
    ) -> Result<()> {
        let file = ManifestFile {
            root: self.root.display().to_string(),
            version: ctx.version.to_string(),
            target: ctx.profile.target_name(),
            artifacts: self
                .manifest
                .iter()
                .map(|(category, paths)| {
                    (
                        *category,
                        paths.iter().map(|p| p.display().to_string()).collect(),
                    )
                })
                .collect(),
            packages,
        };
        write_json_atomic(path, &file)
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating parent directory '{}'", parent.display()))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(value).context("serializing redist manifest")?;
    fs::write(&tmp, payload).with_context(|| format!("writing temp file '{}'", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "renaming temp file '{}' to '{}'",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

/// Copy every configured artifact except the samples into `target`.
pub fn copy_artifacts(ctx: &PipelineContext, target: &mut RedistTarget) -> Result<()> {
    let cfg = &ctx.config.artifacts;
    let profile = &ctx.profile;
    let work = ctx.work_dir();
    let release_bin = ctx.platform_root.join(&profile.release_bin_dir);
    let release_lib = ctx.platform_root.join(&profile.release_lib_dir);
    let bin = PathBuf::from(&profile.bin_dir);
    let sample_bins: Vec<PathBuf> = profile
        .sample_bin_dirs
        .iter()
        .map(|d| Path::new("Samples").join(d))
        .collect();

    for pattern in &cfg.licenses {
        target.copy_glob(
            ArtifactCategory::Licenses,
            work,
            pattern,
            Path::new(""),
            cfg.is_optional(pattern),
        )?;
    }

    for stem in &cfg.shared_libraries {
        let pattern = profile.shared_library(stem);
        target.copy_glob(
            ArtifactCategory::Libraries,
            &release_bin,
            &pattern,
            Path::new(profile.shared_lib_dest()),
            cfg.is_optional(stem),
        )?;
    }

    for stem in &cfg.executables {
        let pattern = profile.executable(stem);
        target.copy_glob(
            ArtifactCategory::Binaries,
            &release_bin,
            &pattern,
            &bin,
            cfg.is_optional(stem),
        )?;
    }

    for pattern in &cfg.import_libraries {
        target.copy_glob(
            ArtifactCategory::Libraries,
            &release_lib,
            pattern,
            Path::new(&profile.lib_dir),
            cfg.is_optional(pattern),
        )?;
    }

    if ctx.managed_available {
        for pattern in &cfg.managed_wrappers {
            let optional = cfg.is_optional(pattern);
            target.copy_glob(ArtifactCategory::Binaries, &release_bin, pattern, &bin, optional)?;
            for dir in &sample_bins {
                target.copy_glob(ArtifactCategory::Samples, &release_bin, pattern, dir, optional)?;
            }
        }
    } else {
        log::info!("No managed toolchain, skipping managed wrappers");
    }

    for pattern in &cfg.jars {
        let optional = cfg.is_optional(pattern);
        target.copy_glob(
            ArtifactCategory::Binaries,
            &release_bin,
            pattern,
            Path::new("Jar"),
            optional,
        )?;
        for dir in &sample_bins {
            target.copy_glob(ArtifactCategory::Samples, &release_bin, pattern, dir, optional)?;
        }
    }

    for pattern in &cfg.sample_runtime {
        for dir in &sample_bins {
            target.copy_glob(
                ArtifactCategory::Samples,
                &release_bin,
                pattern,
                dir,
                cfg.is_optional(pattern),
            )?;
        }
    }

    copy_documentation(ctx, target)?;
    copy_headers(ctx, target)?;

    for pattern in &cfg.data_files {
        target.copy_glob(
            ArtifactCategory::Data,
            work,
            pattern,
            &profile.data_dest(),
            cfg.is_optional(pattern),
        )?;
    }

    let res = ctx.platform_root.join("Build").join("Res");
    target.copy_tree(ArtifactCategory::Resources, &res, &Path::new("Samples").join("Res"))?;

    for tree in &cfg.extra_trees {
        let src = work.join(&tree.from);
        if !src.is_dir() && tree.optional {
            log::warn!("Skipping missing optional tree '{}'", src.display());
            continue;
        }
        target.copy_tree(ArtifactCategory::Resources, &src, &tree.to)?;
    }

    for file in &cfg.extra_files {
        let src = work.join(&file.from);
        if !src.is_file() && file.optional {
            log::warn!("Skipping missing optional file '{}'", src.display());
            continue;
        }
        target.copy_file(ArtifactCategory::Resources, &src, &file.to)?;
        if file.executable {
            make_executable(&target.root.join(&file.to))?;
        }
    }

    Ok(())
}

fn copy_documentation(ctx: &PipelineContext, target: &mut RedistTarget) -> Result<()> {
    let cfg = &ctx.config.artifacts;
    let work = ctx.work_dir();
    let docs = Path::new("Documentation");

    for pattern in &cfg.documentation {
        target.copy_glob(
            ArtifactCategory::Documentation,
            work,
            pattern,
            docs,
            cfg.is_optional(pattern),
        )?;
    }

    if let Some(html) = &cfg.doc_html_dir {
        let src = work.join(html);
        if src.is_dir() {
            target.copy_tree(ArtifactCategory::Documentation, &src, &docs.join("html"))?;
        } else if ctx.options.docs {
            bail!("Missing generated documentation '{}'", src.display());
        } else {
            log::warn!("Documentation disabled and '{}' absent, skipping", src.display());
        }
    }

    if let Some(notes) = &cfg.release_notes {
        let src = work.join(notes);
        let name = notes
            .file_name()
            .ok_or_else(|| anyhow!("release_notes has no file name"))?;
        target.copy_file(ArtifactCategory::Documentation, &src, &docs.join(name))?;
    }
    Ok(())
}

fn copy_headers(ctx: &PipelineContext, target: &mut RedistTarget) -> Result<()> {
    let include_src = ctx.work_dir().join("Include");
    let include = Path::new("Include");

    target.copy_glob(ArtifactCategory::Headers, &include_src, "*", include, false)?;

    for pattern in &ctx.config.artifacts.header_subdirs {
        let dirs = copy::glob_dirs(&include_src, pattern)?;
        if dirs.is_empty() && !ctx.config.artifacts.is_optional(pattern) {
            bail!(
                "Missing artifact: no header directory matches '{}' in '{}'",
                pattern,
                include_src.display()
            );
        }
        for dir in dirs {
            let name = dir
                .file_name()
                .ok_or_else(|| anyhow!("glob returned '{}'", dir.display()))?
                .to_owned();
            target.copy_tree(ArtifactCategory::Headers, &dir, &include.join(name))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("marking '{}' executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
