use anyhow::{bail, Result};

use openni_redist::context::RedistOptions;
use openni_redist::platform::BuildBits;
use openni_redist::toolchain::ToolchainVersion;

pub(crate) fn parse_yes_no(value: &str, param: &str) -> Result<bool> {
    match value {
        "y" | "Y" | "yes" | "Yes" => Ok(true),
        "n" | "N" | "no" | "No" => Ok(false),
        other => bail!("{} param must be y or n, got '{}'", param, other),
    }
}

pub(crate) fn parse_redist_args(args: &[String]) -> Result<RedistOptions> {
    let (docs, bits, rebuild, toolchain) = match args {
        [docs, bits, rebuild] => (docs, bits, rebuild, None),
        [docs, bits, rebuild, vc] => (docs, bits, rebuild, Some(vc)),
        _ => bail!(crate::usage()),
    };

    Ok(RedistOptions {
        docs: parse_yes_no(docs, "Doxygen")?,
        bits: BuildBits::parse(bits)?,
        rebuild: parse_yes_no(rebuild, "FullRebuild")?,
        toolchain: match toolchain {
            Some(vc) => ToolchainVersion::parse(vc)?,
            None => ToolchainVersion::default(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn three_args_default_to_vc9() {
        let options = parse_redist_args(&args(&["y", "64", "No"])).unwrap();
        assert!(options.docs);
        assert_eq!(options.bits, BuildBits::X64);
        assert!(!options.rebuild);
        assert_eq!(options.toolchain, ToolchainVersion::Vc9);
    }

    #[test]
    fn fourth_arg_selects_toolchain() {
        let options = parse_redist_args(&args(&["Yes", "32", "y", "10"])).unwrap();
        assert_eq!(options.toolchain, ToolchainVersion::Vc10);
        assert!(options.rebuild);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse_redist_args(&args(&["maybe", "32", "y"])).is_err());
        assert!(parse_redist_args(&args(&["y", "16", "y"])).is_err());
        assert!(parse_redist_args(&args(&["y", "32"])).is_err());
        assert!(parse_redist_args(&args(&["y", "32", "y", "11"])).is_err());
    }
}
