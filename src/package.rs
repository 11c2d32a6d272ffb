//! Packaging the finished redist: WiX installers on Windows, a `tar.zst`
//! archive elsewhere. Packages land in the final directory next to the
//! manifest.

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::env;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

use crate::context::PipelineContext;
use crate::platform::BuildBits;
use crate::redist::{copy, RedistTarget, MANIFEST_FILE};
use crate::rewrite::{rewrite_file_with, write_atomic};
use crate::toolchain::devenv_build;

/// Environment variable pointing at the WiX toolset.
pub const WIX_ENV: &str = "WIX";

static BINARY_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"BinaryOnlyRedist=([^\r\n]*)").expect("valid regex"));

/// Installer flavours, in build order. The last one leaves the variables
/// file in its checked-in state.
const INSTALLERS: [(&str, bool); 2] = [("Redist", true), ("Dev", false)];

/// Build the packages for the host platform and write the manifest.
pub fn package(ctx: &PipelineContext, target: &RedistTarget) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&ctx.final_dir)
        .with_context(|| format!("creating '{}'", ctx.final_dir.display()))?;

    let packages = if ctx.profile.family.is_windows() {
        build_installers(ctx)?
    } else {
        build_archive(ctx, target)?
    };

    let manifest = ctx.final_dir.join(MANIFEST_FILE);
    target.write_manifest(&manifest, ctx, &packages)?;
    log::info!("Wrote manifest {}", manifest.display());
    Ok(packages)
}

fn build_archive(ctx: &PipelineContext, target: &RedistTarget) -> Result<Vec<PathBuf>> {
    log::info!("* Creating tar...");
    let name = ctx.profile.redist_name(&ctx.config.project, &ctx.version);
    let archive = ctx.final_dir.join(format!("{name}.tar.zst"));
    create_tar_zst(&target.root, &name, &archive)?;

    let checksum = write_checksum(&archive)?;
    log::info!("Created {}", archive.display());
    Ok(vec![archive, checksum])
}

/// Archive `src_dir` with every entry under `prefix/`. Entries are sorted
/// and timestamps zeroed so the same tree gives the same archive.
pub fn create_tar_zst(src_dir: &Path, prefix: &str, out_path: &Path) -> Result<()> {
    if !src_dir.is_dir() {
        bail!("Redist directory not found: {}", src_dir.display());
    }
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create {}", out_path.display()))?;
    let encoder = zstd::stream::Encoder::new(out, 19)?;
    let mut builder = TarBuilder::new(encoder);

    let mut entries = Vec::new();
    for entry in WalkDir::new(src_dir).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking '{}'", src_dir.display()))?;
        entries.push(entry.into_path());
    }

    for path in entries {
        let rel = path.strip_prefix(src_dir).unwrap_or(&path);
        let name = if rel.as_os_str().is_empty() {
            prefix.to_string()
        } else {
            format!("{}/{}", prefix, rel.to_string_lossy().replace('\\', "/"))
        };

        let md = fs::symlink_metadata(&path)
            .with_context(|| format!("reading metadata of '{}'", path.display()))?;
        if md.is_dir() {
            let mut header = entry_header(tar::EntryType::Directory, 0, mode_of(&md, 0o755));
            builder.append_data(&mut header, &name, std::io::empty())?;
        } else if md.file_type().is_symlink() {
            let link = fs::read_link(&path)?;
            let mut header = entry_header(tar::EntryType::Symlink, 0, mode_of(&md, 0o777));
            header.set_link_name(&link)?;
            header.set_cksum();
            builder.append_data(&mut header, &name, std::io::empty())?;
        } else if md.is_file() {
            let mut file = File::open(&path)
                .with_context(|| format!("opening '{}'", path.display()))?;
            let mut header = entry_header(tar::EntryType::Regular, md.len(), mode_of(&md, 0o644));
            builder.append_data(&mut header, &name, &mut file)?;
        }
    }

    let encoder = builder
        .into_inner()
        .context("Failed to finalize tar builder")?;
    encoder.finish()?;
    Ok(())
}

fn entry_header(kind: tar::EntryType, size: u64, mode: u32) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header.set_cksum();
    header
}

#[cfg(unix)]
fn mode_of(md: &fs::Metadata, _fallback: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_md: &fs::Metadata, fallback: u32) -> u32 {
    fallback
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write `<archive>.sha256` in `sha256sum` format.
fn write_checksum(archive: &Path) -> Result<PathBuf> {
    let sha = sha256_file(archive)?;
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("archive without a file name '{}'", archive.display()))?;
    let path = archive.with_file_name(format!("{name}.sha256"));
    write_atomic(&path, format!("{sha}  {name}\n").as_bytes())?;
    Ok(path)
}

/// Point the installer at the full or the binary-only redist.
pub fn set_binary_only(variables: &Path, binary_only: bool) -> Result<bool> {
    let value = if binary_only { "True" } else { "False" };
    log::info!("setting WIX BinaryOnlyRedist={}", value);
    let replacement = format!("BinaryOnlyRedist={value}?>");
    rewrite_file_with(variables, |text| {
        BINARY_ONLY
            .replace_all(text, regex::NoExpand(&replacement))
            .into_owned()
    })
}

/// `<product>-Win<bits>-<version>-<flavour>.msi`
pub fn installer_name(ctx: &PipelineContext, flavour: &str) -> String {
    format!(
        "{}-Win{}-{}-{}.msi",
        ctx.config.product,
        ctx.profile.bits.as_str(),
        ctx.version,
        flavour
    )
}

fn build_installers(ctx: &PipelineContext) -> Result<Vec<PathBuf>> {
    log::info!("* Making Installer...");
    let devenv = ctx
        .toolchain
        .devenv()
        .ok_or_else(|| anyhow!("installers need Visual Studio"))?;

    match env::var_os(WIX_ENV) {
        Some(wix) => log::info!("WIX={}", wix.to_string_lossy()),
        None => log::warn!(
            "no {} env. var. defined, the installer build is expected to fail",
            WIX_ENV
        ),
    }

    let installer = &ctx.config.installer;
    let project_dir = ctx.work_dir().join(&installer.project_dir);
    let wixproj = project_dir.join(&installer.wix_project);
    let variables = project_dir.join(&installer.variables_file);
    if !variables.is_file() {
        bail!("Missing WiX variables file '{}'", variables.display());
    }
    copy::clear_readonly(&variables)?;

    let platform = match ctx.profile.bits {
        BuildBits::X32 => "x86",
        BuildBits::X64 => "x64",
    };
    let built = project_dir
        .join("bin")
        .join("Release")
        .join("en-US")
        .join(&installer.msi_name);

    let mut packages = Vec::new();
    for (flavour, binary_only) in INSTALLERS {
        set_binary_only(&variables, binary_only)?;
        let stem = wixproj
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        devenv_build(
            devenv,
            &wixproj,
            "/Build",
            &format!("release|{platform}"),
            &ctx.output_log(&format!("Build{stem}WIX{flavour}.txt")),
            &format!("Building {flavour} installer"),
        )?;

        let dest = ctx.final_dir.join(installer_name(ctx, flavour));
        log::info!("moving {} Msi", flavour);
        move_file(&built, &dest)?;
        packages.push(dest);
    }
    Ok(packages)
}

fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_file() {
        bail!("Installer was not produced at '{}'", src.display());
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    fs::remove_file(src).with_context(|| format!("Failed to remove {}", src.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{linux_context, windows_context};
    use crate::redist::RedistLayout;
    use tempfile::TempDir;

    fn archive_entries(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        let decoder = zstd::stream::Decoder::new(file).unwrap();
        let mut archive = tar::Archive::new(decoder);
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect()
    }

    #[test]
    fn unix_package_is_a_prefixed_archive_with_checksum() {
        let temp = TempDir::new().unwrap();
        let ctx = linux_context(temp.path());
        let mut target =
            RedistTarget::create(&ctx.redist_root, &RedistLayout::for_profile(&ctx.profile))
                .unwrap();
        fs::write(target.root.join("LICENSE"), "license").unwrap();
        target.record(crate::redist::ArtifactCategory::Licenses, target.root.join("LICENSE"));

        let packages = package(&ctx, &target).unwrap();
        let name = "OpenNI-Bin-Dev-Linux-x64-v1.5.7.10";
        assert_eq!(
            packages,
            vec![
                ctx.final_dir.join(format!("{name}.tar.zst")),
                ctx.final_dir.join(format!("{name}.tar.zst.sha256")),
            ]
        );

        let entries = archive_entries(&packages[0]);
        assert!(entries.iter().all(|e| e.starts_with(name)));
        assert!(entries.contains(&format!("{name}/LICENSE")));

        let checksum = fs::read_to_string(&packages[1]).unwrap();
        assert_eq!(
            checksum,
            format!("{}  {name}.tar.zst\n", sha256_file(&packages[0]).unwrap())
        );

        let manifest: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(ctx.final_dir.join(MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["packages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn archives_are_reproducible() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("tree");
        fs::create_dir_all(src.join("Include")).unwrap();
        fs::write(src.join("Include/XnOS.h"), "#pragma once\n").unwrap();

        let a = temp.path().join("a.tar.zst");
        let b = temp.path().join("b.tar.zst");
        create_tar_zst(&src, "Redist", &a).unwrap();
        create_tar_zst(&src, "Redist", &b).unwrap();
        assert_eq!(sha256_file(&a).unwrap(), sha256_file(&b).unwrap());
    }

    #[test]
    fn binary_only_flag_is_toggled() {
        let temp = TempDir::new().unwrap();
        let wxi = temp.path().join("OpenNIVariables.wxi");
        fs::write(
            &wxi,
            "<Include>\n<?define BinaryOnlyRedist=False?>\n<?define MajorVersion=1?>\n</Include>\n",
        )
        .unwrap();

        assert!(set_binary_only(&wxi, true).unwrap());
        let text = fs::read_to_string(&wxi).unwrap();
        assert!(text.contains("<?define BinaryOnlyRedist=True?>\n"));
        assert!(text.contains("<?define MajorVersion=1?>"));
        assert!(!set_binary_only(&wxi, true).unwrap());
    }

    #[test]
    fn binary_only_toggle_keeps_crlf() {
        let temp = TempDir::new().unwrap();
        let wxi = temp.path().join("OpenNIVariables.wxi");
        fs::write(
            &wxi,
            "<Include>\r\n<?define BinaryOnlyRedist=True?>\r\n<?define MajorVersion=1?>\r\n</Include>\r\n",
        )
        .unwrap();

        assert!(set_binary_only(&wxi, false).unwrap());
        assert_eq!(
            fs::read_to_string(&wxi).unwrap(),
            "<Include>\r\n<?define BinaryOnlyRedist=False?>\r\n<?define MajorVersion=1?>\r\n</Include>\r\n"
        );
    }

    #[test]
    fn installer_names_carry_bits_version_and_flavour() {
        let temp = TempDir::new().unwrap();
        let ctx = windows_context(temp.path(), BuildBits::X64);
        assert_eq!(installer_name(&ctx, "Dev"), "OpenNI-Win64-1.5.7.10-Dev.msi");
    }
}
