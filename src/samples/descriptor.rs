//! Sample build descriptors and the metadata extracted from them.
//!
//! Extraction is a line scan for a couple of attributes, not an XML parse;
//! the first match in file order wins.

use once_cell::sync::Lazy;
use regex::Regex;

use super::SampleKind;
use crate::platform::HostFamily;

static VCPROJ_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bName="([^"]*)""#).expect("valid regex"));
static VCPROJ_GUID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"ProjectGUID="([^"]*)""#).expect("valid regex"));
static MSBUILD_GUID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<ProjectGuid>(.*)</ProjectGuid>").expect("valid regex"));
static ASSEMBLY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<AssemblyName>(.*)</AssemblyName>").expect("valid regex"));

/// Name and GUID found in a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub project_name: Option<String>,
    pub project_guid: Option<String>,
}

/// One descriptor format.
pub trait DescriptorParser: Sync {
    fn kind(&self) -> SampleKind;

    /// File name of the descriptor for sample `sample`.
    fn file_name(&self, sample: &str) -> String;

    fn parse(&self, sample: &str, text: &str) -> DescriptorInfo;
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| re.captures(line).map(|c| c[1].to_string()))
}

/// Visual Studio 2008 C++ project.
pub struct VcprojParser;

impl DescriptorParser for VcprojParser {
    fn kind(&self) -> SampleKind {
        SampleKind::NativeIde
    }

    fn file_name(&self, sample: &str) -> String {
        format!("{sample}.vcproj")
    }

    fn parse(&self, _sample: &str, text: &str) -> DescriptorInfo {
        DescriptorInfo {
            project_name: first_capture(&VCPROJ_NAME, text),
            project_guid: first_capture(&VCPROJ_GUID, text),
        }
    }
}

/// MSBuild C++ project; carries no name attribute.
pub struct VcxprojParser;

impl DescriptorParser for VcxprojParser {
    fn kind(&self) -> SampleKind {
        SampleKind::NativeIde
    }

    fn file_name(&self, sample: &str) -> String {
        format!("{sample}.vcxproj")
    }

    fn parse(&self, sample: &str, text: &str) -> DescriptorInfo {
        DescriptorInfo {
            project_name: Some(sample.to_string()),
            project_guid: first_capture(&MSBUILD_GUID, text),
        }
    }
}

pub struct CsprojParser;

impl DescriptorParser for CsprojParser {
    fn kind(&self) -> SampleKind {
        SampleKind::Managed
    }

    fn file_name(&self, sample: &str) -> String {
        format!("{sample}.csproj")
    }

    fn parse(&self, _sample: &str, text: &str) -> DescriptorInfo {
        DescriptorInfo {
            project_name: first_capture(&ASSEMBLY_NAME, text),
            project_guid: first_capture(&MSBUILD_GUID, text),
        }
    }
}

/// `Build.bat`, `Makefile` and similar.
pub struct BuildScriptParser {
    pub file: &'static str,
}

impl DescriptorParser for BuildScriptParser {
    fn kind(&self) -> SampleKind {
        SampleKind::OtherBuildScript
    }

    fn file_name(&self, _sample: &str) -> String {
        self.file.to_string()
    }

    fn parse(&self, sample: &str, _text: &str) -> DescriptorInfo {
        DescriptorInfo {
            project_name: Some(sample.to_string()),
            project_guid: None,
        }
    }
}

static WINDOWS_SEARCH: [&dyn DescriptorParser; 4] = [
    &VcprojParser,
    &VcxprojParser,
    &CsprojParser,
    &BuildScriptParser { file: "Build.bat" },
];

static UNIX_SEARCH: [&dyn DescriptorParser; 1] = [&BuildScriptParser { file: "Makefile" }];

/// Descriptor formats to try, in order, for `family`.
pub fn search_order(family: HostFamily) -> &'static [&'static dyn DescriptorParser] {
    if family.is_windows() {
        &WINDOWS_SEARCH
    } else {
        &UNIX_SEARCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VCPROJ: &str = r#"<?xml version="1.0" encoding="Windows-1252"?>
<VisualStudioProject
	ProjectType="Visual C++"
	Version="9.00"
	Name="NiSimpleRead"
	ProjectGUID="{6E2F1A7B-1CF4-4F7C-8B4A-3B1E1D2C0A11}"
	RootNamespace="NiSimpleRead"
	>
	<Platforms>
		<Platform
			Name="Win32"
		/>
"#;

    #[test]
    fn vcproj_takes_first_name_and_guid() {
        let info = VcprojParser.parse("NiSimpleRead", VCPROJ);
        assert_eq!(info.project_name.as_deref(), Some("NiSimpleRead"));
        assert_eq!(
            info.project_guid.as_deref(),
            Some("{6E2F1A7B-1CF4-4F7C-8B4A-3B1E1D2C0A11}")
        );
    }

    #[test]
    fn csproj_uses_assembly_name() {
        let text = "<Project>\n  <PropertyGroup>\n    <ProjectGuid>{AAAA}</ProjectGuid>\n    <AssemblyName>SimpleRead.net</AssemblyName>\n";
        let info = CsprojParser.parse("SimpleRead.net", text);
        assert_eq!(info.project_name.as_deref(), Some("SimpleRead.net"));
        assert_eq!(info.project_guid.as_deref(), Some("{AAAA}"));
        assert_eq!(CsprojParser.kind(), SampleKind::Managed);
    }

    #[test]
    fn vcxproj_name_defaults_to_sample() {
        let info = VcxprojParser.parse("NiViewer", "<ProjectGuid>{BBBB}</ProjectGuid>\n");
        assert_eq!(info.project_name.as_deref(), Some("NiViewer"));
        assert_eq!(info.project_guid.as_deref(), Some("{BBBB}"));
    }

    #[test]
    fn missing_matches_stay_absent() {
        let info = CsprojParser.parse("X", "<Project />\n");
        assert_eq!(info, DescriptorInfo::default());
    }

    #[test]
    fn search_order_is_fixed_per_family() {
        let names: Vec<_> = search_order(HostFamily::Windows)
            .iter()
            .map(|p| p.file_name("S"))
            .collect();
        assert_eq!(names, vec!["S.vcproj", "S.vcxproj", "S.csproj", "Build.bat"]);

        let unix: Vec<_> = search_order(HostFamily::Linux)
            .iter()
            .map(|p| p.file_name("S"))
            .collect();
        assert_eq!(unix, vec!["Makefile"]);
    }
}
