//! `.redist` sidecar files.
//!
//! Line oriented, one directive per line:
//!
//! ```text
//! DEPENDS=NiSampleModule
//! SKIP=Arm|CE4100
//! TOOL=ALL
//! ```
//!
//! Unknown directives are ignored.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const SIDECAR_FILE: &str = ".redist";

/// Tag matching every platform in `SKIP=` / `TOOL=`.
const ALL_PLATFORMS: &str = "ALL";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sidecar {
    pub depends: Vec<String>,
    skip: Vec<Vec<String>>,
    tool: Vec<Vec<String>>,
}

impl Sidecar {
    pub fn parse(text: &str) -> Self {
        let mut sidecar = Sidecar::default();
        for line in text.lines() {
            let line = line.trim_end();
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "DEPENDS" if !value.is_empty() => sidecar.depends.push(value.to_string()),
                "SKIP" => sidecar.skip.push(split_tags(value)),
                "TOOL" => sidecar.tool.push(split_tags(value)),
                _ => {}
            }
        }
        sidecar
    }

    /// Sidecar of the sample whose sources live in `source_dir`; empty if
    /// there is none.
    pub fn load(source_dir: &Path) -> Result<Self> {
        let path = source_dir.join(SIDECAR_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading sidecar '{}'", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn skips(&self, platform_tag: &str) -> bool {
        matches_platform(&self.skip, platform_tag)
    }

    pub fn is_tool(&self, platform_tag: &str) -> bool {
        matches_platform(&self.tool, platform_tag)
    }
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split('|')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn matches_platform(lines: &[Vec<String>], platform_tag: &str) -> bool {
    lines
        .iter()
        .flatten()
        .any(|tag| tag == platform_tag || tag == ALL_PLATFORMS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_are_collected_in_order() {
        let sidecar = Sidecar::parse("DEPENDS=A\r\nFOO=bar\nDEPENDS=B\nSKIP=Arm|CE4100\n");
        assert_eq!(sidecar.depends, vec!["A", "B"]);
        assert!(sidecar.skips("Arm"));
        assert!(sidecar.skips("CE4100"));
        assert!(!sidecar.skips("x64"));
        assert!(!sidecar.is_tool("x64"));
    }

    #[test]
    fn all_matches_every_platform() {
        let sidecar = Sidecar::parse("TOOL=ALL\n");
        assert!(sidecar.is_tool("Win32"));
        assert!(sidecar.is_tool("Arm"));
        assert!(!sidecar.skips("Win32"));
    }

    #[test]
    fn tags_must_match_exactly() {
        let sidecar = Sidecar::parse("SKIP=x86\n");
        assert!(!sidecar.skips("x64"));
        assert!(!sidecar.skips("x8"));
    }

    #[test]
    fn missing_sidecar_is_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        assert_eq!(Sidecar::load(temp.path()).unwrap(), Sidecar::default());
    }
}
