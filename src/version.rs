//! SDK version number: reading it from the source tree and stamping a new
//! one into every file that duplicates it.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::rewrite::{rewrite_file_with, RewriteRule, RuleSet};

const MAX_MAJOR: u32 = 9;
const MAX_MINOR: u32 = 99;
const MAX_MAINTENANCE: u32 = 99;
const MAX_BUILD: u32 = 9999;

/// Four-part version. Only constructed through [`Version::new`], so every
/// value in the program is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    maintenance: u32,
    build: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32, maintenance: u32, build: u32) -> Result<Self> {
        if major > MAX_MAJOR {
            bail!("Illegal major version {} (max {})", major, MAX_MAJOR);
        }
        if minor > MAX_MINOR {
            bail!("Illegal minor version {} (max {})", minor, MAX_MINOR);
        }
        if maintenance > MAX_MAINTENANCE {
            bail!(
                "Illegal maintenance version {} (max {})",
                maintenance,
                MAX_MAINTENANCE
            );
        }
        if build > MAX_BUILD {
            bail!("Illegal build version {} (max {})", build, MAX_BUILD);
        }
        Ok(Self {
            major,
            minor,
            maintenance,
            build,
        })
    }

    /// Parse the four command-line components.
    pub fn from_args(major: &str, minor: &str, maintenance: &str, build: &str) -> Result<Self> {
        let part = |name: &str, value: &str| -> Result<u32> {
            value
                .parse::<u32>()
                .with_context(|| format!("{} version '{}' is not a number", name, value))
        };
        Self::new(
            part("major", major)?,
            part("minor", minor)?,
            part("maintenance", maintenance)?,
            part("build", build)?,
        )
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn maintenance(&self) -> u32 {
        self.maintenance
    }

    pub fn build(&self) -> u32 {
        self.build
    }

    /// `major.minor.maintenance`, as used in documentation titles.
    pub fn short(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.maintenance)
    }

    /// Read the version from the `XN_*_VERSION` defines of a version header.
    pub fn read_header(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading version header '{}'", path.display()))?;
        Self::parse_header(&text)
            .with_context(|| format!("parsing version header '{}'", path.display()))
    }

    pub fn parse_header(text: &str) -> Result<Self> {
        let field = |name: &str| -> Result<u32> {
            let re = Regex::new(&format!(r"define XN_{}_VERSION (\d+)", name))
                .with_context(|| format!("compiling pattern for {}", name))?;
            let Some(caps) = re.captures(text) else {
                bail!("XN_{}_VERSION not defined", name);
            };
            caps[1]
                .parse()
                .with_context(|| format!("XN_{}_VERSION is not a number", name))
        };
        Self::new(
            field("MAJOR")?,
            field("MINOR")?,
            field("MAINTENANCE")?,
            field("BUILD")?,
        )
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.maintenance, self.build
        )
    }
}

/// How the version is spelled inside a particular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionTargetKind {
    /// `#define XN_MAJOR_VERSION 1` ...
    SourceHeader,
    /// `set MAJOR_VERSION=1` ...
    BatchDefs,
    /// `<VERSION_NUMBER>1.5.7</VERSION_NUMBER>`
    RedistConfig,
    /// `[assembly: AssemblyVersion("1.5.7.10")]`
    AssemblyInfo,
    /// `<?define MajorVersion=1?>` ...
    WixVariables,
    PublisherPolicy,
    Doxyfile,
    /// Only the first line carrying a four-part version is touched.
    ReleaseNotes,
}

/// One file the updater rewrites, relative to the work directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionTarget {
    pub path: PathBuf,
    pub kind: VersionTargetKind,
    #[serde(default)]
    pub optional: bool,
}

impl VersionTarget {
    fn new(path: &str, kind: VersionTargetKind, optional: bool) -> Self {
        Self {
            path: PathBuf::from(path),
            kind,
            optional,
        }
    }

    /// Files that carry the version in a stock source tree.
    pub fn defaults() -> Vec<Self> {
        use VersionTargetKind::*;
        vec![
            Self::new("Include/XnVersion.h", SourceHeader, false),
            Self::new("Platform/Win32/CreateRedist/RedistMaker.bat", BatchDefs, true),
            Self::new("Platform/Win32/CreateRedist/OpenNi_Config.xml", RedistConfig, true),
            Self::new("Platform/Win32/Build/Res/AssemblyInfo-OpenNI.cs", AssemblyInfo, true),
            Self::new("Platform/Linux/Build/Res/AssemblyInfo-OpenNI.cs", AssemblyInfo, true),
            Self::new(
                "Platform/Win32/Install/OpenNI/Includes/OpenNIVariables.wxi",
                WixVariables,
                true,
            ),
            Self::new("Wrappers/OpenNI.Net/PublisherPolicy.config", PublisherPolicy, true),
            Self::new("Source/DoxyGen/Doxyfile", Doxyfile, true),
            Self::new("Platform/Win32/CreateRedist/ReleaseNotes.txt", ReleaseNotes, true),
            Self::new("ExportOpenSource.bat", BatchDefs, true),
        ]
    }
}

fn rules_for(kind: VersionTargetKind, v: &Version) -> Result<RuleSet> {
    use VersionTargetKind::*;
    let parts = [
        ("MAJOR", v.major),
        ("MINOR", v.minor),
        ("MAINTENANCE", v.maintenance),
        ("BUILD", v.build),
    ];
    let rules = match kind {
        SourceHeader => parts
            .iter()
            .map(|(name, n)| {
                RewriteRule::regex(
                    &format!("#define XN_{name}_VERSION (.*)"),
                    &format!("#define XN_{name}_VERSION {n}"),
                )
            })
            .collect::<Result<Vec<_>>>()?,
        BatchDefs => parts
            .iter()
            .map(|(name, n)| {
                RewriteRule::regex(
                    &format!("set {name}_VERSION=(.*)"),
                    &format!("set {name}_VERSION={n}"),
                )
            })
            .collect::<Result<Vec<_>>>()?,
        RedistConfig => vec![RewriteRule::regex(
            r"<VERSION_NUMBER>(\d+)\.(\d+)\.(\d+)</VERSION_NUMBER>",
            &format!("<VERSION_NUMBER>{}</VERSION_NUMBER>", v.short()),
        )?],
        AssemblyInfo => vec![
            RewriteRule::regex(
                r#"^\[assembly: AssemblyVersion\("(.*)"\)\]"#,
                &format!(r#"[assembly: AssemblyVersion("{v}")]"#),
            )?,
            RewriteRule::regex(
                r#"^\[assembly: AssemblyFileVersion\("(.*)"\)\]"#,
                &format!(r#"[assembly: AssemblyFileVersion("{v}")]"#),
            )?,
        ],
        WixVariables => [
            ("Major", v.major),
            ("Minor", v.minor),
            ("Maintenance", v.maintenance),
            ("Build", v.build),
        ]
        .iter()
        .map(|(name, n)| {
            RewriteRule::regex(
                &format!("define {name}Version=(.*)"),
                &format!("define {name}Version={n}?>"),
            )
        })
        .collect::<Result<Vec<_>>>()?,
        PublisherPolicy => vec![
            RewriteRule::regex(
                r#"oldVersion="1\.1\.0\.31 - ([^"]*)""#,
                &format!(r#"oldVersion="1.1.0.31 - {v}""#),
            )?,
            RewriteRule::regex(r#"newVersion="([^"]*)""#, &format!(r#"newVersion="{v}""#))?,
        ],
        Doxyfile => vec![RewriteRule::regex(
            r#"PROJECT_NAME\s*=\s*"(\S+) \d+\.\d+\.\d+""#,
            &format!(r#"PROJECT_NAME = "${{1}} {}""#, v.short()),
        )?],
        ReleaseNotes => Vec::new(),
    };
    Ok(RuleSet::new(rules))
}

static FOUR_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d+\.\d+\.\d+").expect("valid regex"));

fn stamp_release_notes(text: &str, version: &Version) -> String {
    let mut out = String::with_capacity(text.len());
    let mut stamped = false;
    for line in text.split_inclusive('\n') {
        if !stamped && FOUR_PART.is_match(line) {
            out.push_str(&FOUR_PART.replace(line, version.to_string().as_str()));
            stamped = true;
        } else {
            out.push_str(line);
        }
    }
    out
}

/// What happened to each target.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VersionUpdateReport {
    pub updated: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Stamp `version` into every target below `work_dir`.
///
/// Required targets are checked up front so a missing one aborts before
/// any file is modified.
pub fn update_version(
    work_dir: &Path,
    targets: &[VersionTarget],
    version: &Version,
) -> Result<VersionUpdateReport> {
    let missing: Vec<_> = targets
        .iter()
        .filter(|t| !t.optional && !work_dir.join(&t.path).is_file())
        .map(|t| t.path.display().to_string())
        .collect();
    if !missing.is_empty() {
        bail!("Missing version files: {}", missing.join(", "));
    }

    println!("Going to update files to version: {}", version);
    let mut report = VersionUpdateReport::default();

    for target in targets {
        let path = work_dir.join(&target.path);
        if !path.is_file() {
            log::warn!("Skipping missing version file '{}'", path.display());
            report.skipped.push(target.path.clone());
            continue;
        }

        log::info!("Updating {:?} version: {}", target.kind, path.display());
        let changed = match target.kind {
            VersionTargetKind::ReleaseNotes => {
                rewrite_file_with(&path, |text| stamp_release_notes(text, version))?
            }
            kind => {
                let rules = rules_for(kind, version)?;
                rewrite_file_with(&path, |text| rules.apply(text))?
            }
        };

        if changed {
            report.updated.push(target.path.clone());
        } else {
            report.unchanged.push(target.path.clone());
        }
    }

    Ok(report)
}
