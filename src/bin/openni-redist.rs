use anyhow::Result;

mod workflows;

pub(crate) fn usage() -> &'static str {
    "Usage:\n  openni-redist <Doxygen:y/n> <BuildTarget:32/64> <FullRebuild:y/n> [<VCVersion:9/10>]\n  openni-redist update-version <major> <minor> <maintenance> <build>"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    workflows::dispatch(&args)
}
