//! Copying samples into the redist tree.

use anyhow::{anyhow, Result};
use std::path::Path;

use super::{ArtifactCategory, RedistTarget};
use crate::samples::{SampleKind, SampleMap};
use crate::solution::SolutionTarget;

/// Copy each sample's sources and descriptor into `<redist>/Samples/<name>`.
///
/// IDE descriptors get one copy per solution, named with that solution's
/// suffix, so every generated solution references its own project file.
/// Build scripts are copied once under their own name.
pub fn copy_samples(
    samples: &SampleMap,
    solutions: &[SolutionTarget],
    target: &mut RedistTarget,
) -> Result<usize> {
    let mut copied = 0;
    for sample in samples.values() {
        let dest = Path::new("Samples").join(&sample.name);
        copied += target.copy_tree(ArtifactCategory::Samples, &sample.source_dir, &dest)?;

        match sample.kind {
            SampleKind::NativeIde | SampleKind::Managed => {
                for solution in solutions {
                    let name = sample.project_copy_name(&solution.project_suffix);
                    target.copy_file(ArtifactCategory::Samples, &sample.project_file, &dest.join(name))?;
                    copied += 1;
                }
            }
            SampleKind::OtherBuildScript => {
                let name = sample
                    .project_file
                    .file_name()
                    .ok_or_else(|| anyhow!("descriptor without a name for {}", sample.name))?;
                target.copy_file(ArtifactCategory::Samples, &sample.project_file, &dest.join(name))?;
                copied += 1;
            }
        }
        log::info!("Copied sample {}", sample.name);
    }
    Ok(copied)
}
