//! Rule tables per platform profile.

use anyhow::Result;
use std::path::Path;

use super::{
    collapse_csproj_links, rewrite_file_with, strip_scc_lines, RewriteRule, RuleFlag, RuleSet,
};
use crate::platform::{BuildBits, HostFamily, PlatformProfile};

const WINDOWS_EXTENSIONS: &[&str] = &["icproj", "vcproj", "vcxproj", "csproj", "cpp", "h", "ini", "cs"];
const UNIX_EXTENSIONS: &[&str] = &["c", "cpp", "h", "ini", "cs", "java"];
const UNIX_FILE_NAMES: &[&str] = &["Makefile"];

/// Descriptor extensions that get the structural fix-ups.
const DESCRIPTOR_EXTENSIONS: &[&str] = &["icproj", "vcproj", "vcxproj", "csproj"];

/// Which files to rewrite and how.
#[derive(Debug, Clone)]
pub struct RewritePlan {
    pub rules: RuleSet,
    extensions: &'static [&'static str],
    file_names: &'static [&'static str],
}

impl RewritePlan {
    pub fn for_profile(profile: &PlatformProfile) -> Result<Self> {
        match profile.family {
            HostFamily::Windows => Ok(Self {
                rules: windows_rules(profile.bits)?,
                extensions: WINDOWS_EXTENSIONS,
                file_names: &[],
            }),
            HostFamily::Linux | HostFamily::MacOs => Ok(Self {
                rules: unix_rules()?,
                extensions: UNIX_EXTENSIONS,
                file_names: UNIX_FILE_NAMES,
            }),
        }
    }

    /// Whether `path` is on the allow list.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.file_names.contains(&name) {
            return true;
        }
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Rewrite one file: line rules first, then descriptor fix-ups.
    pub fn rewrite_file(&self, path: &Path) -> Result<bool> {
        let ext = extension_of(path).unwrap_or_default();
        let is_descriptor = DESCRIPTOR_EXTENSIONS.contains(&ext);
        let sample_name = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        rewrite_file_with(path, |text| {
            let mut out = self.rules.apply(text);
            if is_descriptor {
                out = strip_scc_lines(&out).into_owned();
            }
            if ext == "csproj" {
                out = collapse_csproj_links(&out, &sample_name).into_owned();
            }
            out
        })
    }
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Windows rules. `..` in a pattern is two arbitrary characters, exactly as
/// the legacy lists were written.
fn windows_rules(bits: BuildBits) -> Result<RuleSet> {
    let (bin, lib) = match bits {
        BuildBits::X32 => ("Bin", "Lib"),
        BuildBits::X64 => ("Bin64", "Lib64"),
    };

    let mut rules = vec![
        RewriteRule::regex(r"..\\..\\..\\..\\..\\", r"..\..\")?.flagged(RuleFlag::Rematching),
        RewriteRule::regex(r"../../../../../", r"../../")?.flagged(RuleFlag::Rematching),
        RewriteRule::regex(r"..\\\\..\\\\..\\\\..\\\\Data\\", r"..\\..\\..\\Data\")?,
        RewriteRule::regex(r"..\\..\\..\\..\\Data\\", r"..\..\..\Data\")?,
        RewriteRule::regex(r"../../../../Data/", r"../../../Data/")?,
        RewriteRule::regex(r"..\\..\\Res\\", r"..\Res\")?,
        RewriteRule::regex(&format!(r"../../../{bin}/"), &format!("../{bin}/"))?,
        RewriteRule::regex(&format!(r"..\\..\\..\\{bin}\\"), &format!("../{bin}/"))?
            .flagged(RuleFlag::Rematching),
        RewriteRule::regex(
            &format!(r"../../../{lib}/\$\(ConfigurationName\)"),
            &format!("../../{lib}/"),
        )?,
    ];

    let backslash_lib = RewriteRule::regex(
        &format!(r"..\\..\\..\\{lib}\\\$\(ConfigurationName\)"),
        &match bits {
            BuildBits::X32 => format!("../../{lib}/"),
            BuildBits::X64 => format!(";../../{lib}/"),
        },
    )?;
    rules.push(match bits {
        BuildBits::X32 => backslash_lib,
        BuildBits::X64 => backslash_lib.flagged(RuleFlag::LegacyQuirk),
    });

    Ok(RuleSet::new(rules))
}

fn unix_rules() -> Result<RuleSet> {
    Ok(RuleSet::new(vec![
        RewriteRule::regex(r"../../../Bin", "../Bin")?.flagged(RuleFlag::Rematching),
        RewriteRule::regex(r"../../../../../Include", "../../Include =/usr/include/ni")?,
        RewriteRule::regex(r"../../../../../Samples/[\w.]+/?", "./")?,
        RewriteRule::regex(
            r"../../../../Data/SamplesConfig.xml",
            "../../Config/SamplesConfig.xml",
        )?,
        RewriteRule::regex(r"../../Res/", "../Res/")?,
        RewriteRule::regex(
            r"include ../../Common/CommonDefs.mak",
            "include ../Build/Common/CommonDefs.mak",
        )?,
        RewriteRule::regex(
            r"include ../../Common/CommonCppMakefile",
            "LIB_DIRS += ../../Lib\ninclude ../Build/Common/CommonCppMakefile",
        )?,
        RewriteRule::regex(
            r"include ../../Common/CommonCSMakefile",
            "LIB_DIRS += ../../Lib\ninclude ../Build/Common/CommonCSMakefile",
        )?,
        RewriteRule::regex(
            r"include ../../Common/CommonJavaMakefile",
            "LIB_DIRS += ../../Lib\ninclude ../Build/Common/CommonJavaMakefile",
        )?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::rewrite_tree;
    use std::fs;
    use tempfile::TempDir;

    fn linux() -> PlatformProfile {
        PlatformProfile::unix(HostFamily::Linux, "x64".to_string())
    }

    #[test]
    fn unix_allow_list_includes_makefiles_only_by_name() {
        let plan = RewritePlan::for_profile(&linux()).unwrap();
        assert!(plan.accepts(Path::new("Samples/NiViewer/Makefile")));
        assert!(plan.accepts(Path::new("Samples/NiViewer/main.cpp")));
        assert!(plan.accepts(Path::new("Samples/SimpleRead.java/Main.java")));
        assert!(!plan.accepts(Path::new("Samples/NiViewer/NiViewer.vcproj")));
        assert!(!plan.accepts(Path::new("Samples/NiViewer/Makefile.bak")));
    }

    #[test]
    fn windows_allow_list_includes_descriptors() {
        let plan = RewritePlan::for_profile(&PlatformProfile::windows(BuildBits::X32)).unwrap();
        assert!(plan.accepts(Path::new("Samples/NiViewer/NiViewer_2008.vcproj")));
        assert!(plan.accepts(Path::new("Samples/NiViewer/NiViewer.vcxproj")));
        assert!(!plan.accepts(Path::new("Samples/NiViewer/Makefile")));
        assert!(!plan.accepts(Path::new("Samples/NiViewer/NiViewer.ico")));
    }

    #[test]
    fn unix_makefile_references_are_relocated() {
        let plan = RewritePlan::for_profile(&linux()).unwrap();
        let input = "BIN_DIR = ../../../Bin\n\
                     INC_DIRS = ../../../../../Include\n\
                     SRC_FILES = ../../../../../Samples/NiViewer/*.cpp\n\
                     include ../../Common/CommonCppMakefile\n";
        let out = plan.rules.apply(input);
        assert_eq!(
            out,
            "BIN_DIR = ../Bin\n\
             INC_DIRS = ../../Include =/usr/include/ni\n\
             SRC_FILES = ./*.cpp\n\
             LIB_DIRS += ../../Lib\n\
             include ../Build/Common/CommonCppMakefile\n"
        );
    }

    #[test]
    fn windows_32_rules_flatten_bin_and_lib_paths() {
        let rules = windows_rules(BuildBits::X32).unwrap();
        assert_eq!(
            rules.apply_line(r#"OutputFile="..\..\..\Bin\$(ConfigurationName)\NiViewer.exe""#),
            r#"OutputFile="../Bin/$(ConfigurationName)\NiViewer.exe""#
        );
        assert_eq!(
            rules.apply_line(r#"AdditionalLibraryDirectories="..\..\..\Lib\$(ConfigurationName)""#),
            r#"AdditionalLibraryDirectories="../../Lib/""#
        );
        assert_eq!(
            rules.apply_line(r#"#define SAMPLE_XML_PATH "..\\..\\..\\..\\Data\\SamplesConfig.xml""#),
            r#"#define SAMPLE_XML_PATH "..\\..\\..\\Data\\SamplesConfig.xml""#
        );
    }

    #[test]
    fn windows_64_backslash_lib_rule_keeps_leading_separator() {
        let rules = windows_rules(BuildBits::X64).unwrap();
        let quirk = rules
            .rules()
            .iter()
            .find(|r| r.flag() == Some(RuleFlag::LegacyQuirk))
            .unwrap();
        assert!(quirk.pattern().contains("Lib64"));
        assert_eq!(
            rules.apply_line(r#"Dirs="..\..\..\Lib64\$(ConfigurationName)""#),
            r#"Dirs=";../../Lib64/""#
        );
    }

    const UNIX_SAMPLE_LINES: &[&str] = &[
        "INC_DIRS = ../../../../../Include",
        "SRC_FILES = ../../../../../Samples/NiViewer/*.cpp",
        "#define SAMPLE_XML_PATH \"../../../../Data/SamplesConfig.xml\"",
        "ICON = ../../Res/NiViewer.png",
        "include ../../Common/CommonDefs.mak",
        "include ../../Common/CommonCppMakefile",
        "include ../../Common/CommonCSMakefile",
        "include ../../Common/CommonJavaMakefile",
    ];

    const WINDOWS_SAMPLE_LINES: &[&str] = &[
        r#"#define SAMPLE_XML_PATH "..\\..\\..\\..\\Data\\SamplesConfig.xml""#,
        r#"RelativePath="..\..\..\..\Data\SamplesConfig.xml""#,
        r#"xml = "../../../../Data/SamplesConfig.xml""#,
        r#"<File RelativePath="..\..\Res\NiViewer.ico">"#,
        r#"OutputFile="../../../Bin/$(ConfigurationName)/NiViewer.exe""#,
        r#"AdditionalLibraryDirectories="../../../Lib/$(ConfigurationName)""#,
        r#"AdditionalLibraryDirectories="..\..\..\Lib\$(ConfigurationName)""#,
    ];

    #[test]
    fn rules_without_flag_are_idempotent_on_their_output() {
        let tables = [
            (unix_rules().unwrap(), UNIX_SAMPLE_LINES),
            (windows_rules(BuildBits::X32).unwrap(), WINDOWS_SAMPLE_LINES),
        ];
        for (rules, lines) in tables {
            for rule in rules.rules().iter().filter(|r| r.flag().is_none()) {
                let single = RuleSet::new(vec![rule.clone()]);
                let hits: Vec<&str> = lines.iter().copied().filter(|l| rule.is_match(l)).collect();
                assert!(!hits.is_empty(), "no sample line for rule '{}'", rule.pattern());

                for line in hits {
                    let once = single.apply_line(line);
                    assert_ne!(once, line, "rule '{}' left '{}' alone", rule.pattern(), line);
                    let twice = single.apply_line(&once);
                    assert_eq!(twice, once, "rule '{}' re-matched '{}'", rule.pattern(), once);
                }
            }
        }
    }

    #[test]
    fn tree_rewrite_touches_only_allow_listed_files() {
        let temp = TempDir::new().unwrap();
        let sample = temp.path().join("Samples").join("NiSimpleRead");
        fs::create_dir_all(&sample).unwrap();
        fs::write(sample.join("Makefile"), "BIN_DIR = ../../../Bin\n").unwrap();
        fs::write(sample.join("notes.txt"), "BIN_DIR = ../../../Bin\n").unwrap();
        fs::write(sample.join("main.cpp"), "int main() { return 0; }\n").unwrap();

        let plan = RewritePlan::for_profile(&linux()).unwrap();
        let summary = rewrite_tree(temp.path(), &plan).unwrap();

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.rewritten, 1);
        assert_eq!(
            fs::read_to_string(sample.join("Makefile")).unwrap(),
            "BIN_DIR = ../Bin\n"
        );
        assert_eq!(
            fs::read_to_string(sample.join("notes.txt")).unwrap(),
            "BIN_DIR = ../../../Bin\n"
        );
    }

    #[test]
    fn descriptor_fixups_run_after_line_rules() {
        let temp = TempDir::new().unwrap();
        let sample = temp.path().join("UserTracker.net");
        fs::create_dir_all(&sample).unwrap();
        let csproj = sample.join("UserTracker.net_2008.csproj");
        fs::write(
            &csproj,
            "<Project>\n\
             \x20 <SccProjectName=\"SAK\">\n\
             \x20 <Compile Include=\"..\\..\\..\\..\\..\\Samples\\UserTracker.net\\MainWindow.cs\">\n\
             \x20   <Link>MainWindow.cs</Link>\n\
             \x20 </Compile>\n\
             </Project>\n",
        )
        .unwrap();

        let plan = RewritePlan::for_profile(&PlatformProfile::windows(BuildBits::X32)).unwrap();
        assert!(plan.rewrite_file(&csproj).unwrap());
        assert_eq!(
            fs::read_to_string(&csproj).unwrap(),
            "<Project>\n\
             \x20 <Compile Include=\"MainWindow.cs\">\n\
             \x20 </Compile>\n\
             </Project>\n"
        );
    }
}
