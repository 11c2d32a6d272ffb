//! Top-level Makefile for the redist samples on Unix hosts.

use anyhow::{bail, Result};
use std::fmt::Write as _;

use crate::samples::{SampleMap, SampleProject};

const MANAGED_COMPILER: &str = "/usr/bin/gmcs";

fn is_managed_sample(sample: &SampleProject) -> bool {
    sample.name.contains(".net")
}

/// Render `Samples/Build/Makefile`. Managed samples only join `all` when the
/// managed compiler is present at make time.
pub fn render_samples_makefile(samples: &SampleMap) -> Result<String> {
    let members: Vec<&SampleProject> = samples
        .values()
        .filter(|s| s.in_aggregate_build())
        .collect();

    let mut out = String::new();
    out.push_str("include Common/CommonDefs.mak\n\n");
    out.push_str(".PHONY: all\n\n");
    out.push_str("NETPROJ = \n");
    let _ = writeln!(out, "ifneq \"$(realpath {MANAGED_COMPILER})\" \"\"");
    for sample in members.iter().filter(|s| is_managed_sample(s)) {
        let _ = writeln!(out, "\tNETPROJ += {}", sample.name);
    }
    out.push_str("endif\n\n");

    out.push_str("all: $(NETPROJ)");
    for sample in members.iter().filter(|s| !is_managed_sample(s)) {
        out.push(' ');
        out.push_str(&sample.name);
    }
    out.push_str("\n\n");

    for sample in &members {
        let mut prerequisites = Vec::new();
        for dep in &sample.dependencies {
            match samples.get(dep) {
                Some(found) if found.in_aggregate_build() => prerequisites.push(dep.as_str()),
                Some(_) => {}
                None => bail!("Sample {} depends on unknown sample {}", sample.name, dep),
            }
        }

        let _ = writeln!(out, ".PHONY: {}", sample.name);
        if prerequisites.is_empty() {
            let _ = writeln!(out, "{}:", sample.name);
        } else {
            let _ = writeln!(out, "{}: {}", sample.name, prerequisites.join(" "));
        }
        let _ = writeln!(out, "\t$(MAKE) -C ../{}", sample.name);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::SampleKind;
    use std::path::PathBuf;

    fn sample(name: &str, deps: &[&str], is_tool: bool) -> SampleProject {
        SampleProject {
            name: name.to_string(),
            source_dir: PathBuf::from("Samples").join(name),
            build_dir: PathBuf::from("Build/Samples").join(name),
            project_file: PathBuf::from("Build/Samples").join(name).join("Makefile"),
            kind: SampleKind::OtherBuildScript,
            project_name: Some(name.to_string()),
            project_guid: None,
            is_managed: false,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            redist_dir: PathBuf::from("Redist/Samples").join(name),
            is_tool,
        }
    }

    fn map(samples: Vec<SampleProject>) -> SampleMap {
        samples.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    #[test]
    fn makefile_layout() {
        let samples = map(vec![
            sample("NiSimpleRead", &[], false),
            sample("NiViewer", &["NiSimpleRead"], false),
            sample("SimpleRead.net", &[], false),
            sample("NiReg", &[], true),
        ]);
        let text = render_samples_makefile(&samples).unwrap();

        assert!(text.starts_with("include Common/CommonDefs.mak\n\n.PHONY: all\n\nNETPROJ = \n"));
        assert!(text.contains(
            "ifneq \"$(realpath /usr/bin/gmcs)\" \"\"\n\tNETPROJ += SimpleRead.net\nendif\n"
        ));
        assert!(text.contains("all: $(NETPROJ) NiSimpleRead NiViewer\n"));
        assert!(text.contains(".PHONY: NiViewer\nNiViewer: NiSimpleRead\n\t$(MAKE) -C ../NiViewer\n"));
        assert!(text.contains(".PHONY: SimpleRead.net\nSimpleRead.net:\n\t$(MAKE) -C ../SimpleRead.net\n"));
        assert!(!text.contains("NiReg"));
    }

    #[test]
    fn unknown_dependency_is_fatal() {
        let samples = map(vec![sample("NiViewer", &["Nope"], false)]);
        assert!(render_samples_makefile(&samples).is_err());
    }
}
