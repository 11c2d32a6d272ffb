//! Path rewriting for files copied into the redist tree.
//!
//! Samples are compiled from a shallower location once copied, so relative
//! references to binaries, headers and data need adjusting. Rewriting is a
//! fixed ordered list of [`RewriteRule`]s applied to every line, followed by
//! a few structural fix-ups for project descriptors.
//!
//! Every file is replaced atomically: the new content is written to a
//! temporary sibling which is renamed over the original only once fully
//! written.

pub mod rules;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use rules::RewritePlan;

/// Why a rule is called out in its rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFlag {
    /// The replacement can be matched again by this or an earlier rule, so
    /// running the rewriter twice may rewrite twice.
    Rematching,
    /// Kept exactly as the legacy scripts had it even though the output
    /// looks wrong.
    LegacyQuirk,
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Regex(Regex),
}

/// A single `(pattern, replacement)` rule.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    matcher: Matcher,
    replacement: String,
    flag: Option<RuleFlag>,
}

impl RewriteRule {
    pub fn literal(pattern: &str, replacement: &str) -> Self {
        Self {
            matcher: Matcher::Literal(pattern.to_string()),
            replacement: replacement.to_string(),
            flag: None,
        }
    }

    /// Regex rule; `replacement` may reference capture groups as `$1`/`${name}`.
    pub fn regex(pattern: &str, replacement: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("compiling rewrite pattern '{}'", pattern))?;
        Ok(Self {
            matcher: Matcher::Regex(regex),
            replacement: replacement.to_string(),
            flag: None,
        })
    }

    pub fn flagged(mut self, flag: RuleFlag) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn flag(&self) -> Option<RuleFlag> {
        self.flag
    }

    pub fn pattern(&self) -> &str {
        match &self.matcher {
            Matcher::Literal(s) => s,
            Matcher::Regex(r) => r.as_str(),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Literal(s) => text.contains(s.as_str()),
            Matcher::Regex(r) => r.is_match(text),
        }
    }

    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.matcher {
            Matcher::Literal(s) => {
                if text.contains(s.as_str()) {
                    Cow::Owned(text.replace(s.as_str(), &self.replacement))
                } else {
                    Cow::Borrowed(text)
                }
            }
            Matcher::Regex(r) => r.replace_all(text, self.replacement.as_str()),
        }
    }
}

/// Ordered list of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule, in order, to one line. Later rules see the output
    /// of earlier ones. A trailing `\n` or `\r\n` is held back from the rules
    /// and put back unchanged.
    pub fn apply_line(&self, line: &str) -> String {
        let (body, ending) = split_line_ending(line);
        let mut current = body.to_string();
        for rule in &self.rules {
            if let Cow::Owned(next) = rule.apply(&current) {
                current = next;
            }
        }
        current.push_str(ending);
        current
    }

    /// Apply the rules line by line. Line endings survive as they were, so
    /// CRLF files stay CRLF.
    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            out.push_str(&self.apply_line(line));
        }
        out
    }
}

fn split_line_ending(line: &str) -> (&str, &str) {
    let body = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);
    (body, &line[body.len()..])
}

static SCC_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^.*(SccProjectName|SccAuxPath|SccLocalPath|SccProvider)="[^\n]*(\n|$)"#)
        .expect("valid regex")
});

/// Delete lines carrying source-control integration metadata.
pub fn strip_scc_lines(text: &str) -> Cow<'_, str> {
    SCC_LINE.replace_all(text, "")
}

/// Collapse the `<Compile Include=...>` + `<Link>...</Link>` idiom of managed
/// descriptors that referenced sources in the original samples directory.
pub fn collapse_csproj_links<'a>(text: &'a str, sample_name: &str) -> Cow<'a, str> {
    let pattern = format!(
        r#"<Compile Include="..\\..\\Samples\\{}\\.*">\r?\n\s*<Link>(.*)</Link>"#,
        regex::escape(sample_name)
    );
    match Regex::new(&pattern) {
        Ok(re) => Cow::Owned(re.replace_all(text, r#"<Compile Include="$1">"#).into_owned()),
        Err(_) => Cow::Borrowed(text),
    }
}

/// Rewrite `path` in place through `transform`.
///
/// Returns `Ok(false)` when the content did not change (the file is left
/// untouched) or the file is not UTF-8 text.
pub fn rewrite_file_with<F>(path: &Path, transform: F) -> Result<bool>
where
    F: FnOnce(&str) -> String,
{
    let bytes = fs::read(path).with_context(|| format!("reading '{}'", path.display()))?;
    let Ok(original) = String::from_utf8(bytes) else {
        log::warn!("skipping non UTF-8 file '{}'", path.display());
        return Ok(false);
    };

    let rewritten = transform(&original);
    if rewritten == original {
        return Ok(false);
    }

    write_atomic(path, rewritten.as_bytes())?;
    Ok(true)
}

/// Replace `path` with `contents` via a temporary sibling and a rename. The
/// original is untouched if anything fails before the rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path)?;
    let result = (|| -> Result<()> {
        fs::write(&tmp, contents)
            .with_context(|| format!("writing temp file '{}'", tmp.display()))?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp, meta.permissions()).with_context(|| {
                format!("copying permissions onto '{}'", tmp.display())
            })?;
        }
        fs::rename(&tmp, path).with_context(|| {
            format!(
                "renaming temp file '{}' to '{}'",
                tmp.display(),
                path.display()
            )
        })
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path without parent '{}'", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("path without file name '{}'", path.display()))?;
    Ok(parent.join(format!(".{}.rewrite-{}", name, std::process::id())))
}

/// Counts reported after rewriting a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub scanned: usize,
    pub rewritten: usize,
}

/// Rewrite every allow-listed file below `root`.
pub fn rewrite_tree(root: &Path, plan: &RewritePlan) -> Result<RewriteSummary> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("walking '{}'", root.display()))?;
        if entry.file_type().is_file() && plan.accepts(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut summary = RewriteSummary::default();
    for file in &files {
        summary.scanned += 1;
        if plan.rewrite_file(file)? {
            summary.rewritten += 1;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rules_apply_in_order_and_see_earlier_output() {
        let rules = RuleSet::new(vec![
            RewriteRule::literal("alpha", "beta"),
            RewriteRule::regex(r"beta(\d)", "gamma$1").unwrap(),
        ]);
        assert_eq!(rules.apply("alpha7 alpha\n"), "gamma7 beta\n");
    }

    #[test]
    fn rules_are_applied_per_line() {
        let rules = RuleSet::new(vec![RewriteRule::regex(r"^x", "y").unwrap()]);
        assert_eq!(rules.apply("x1\nx2\nz3"), "y1\ny2\nz3");
    }

    #[test]
    fn line_endings_are_not_seen_by_rules() {
        let rules = RuleSet::new(vec![RewriteRule::regex(r"=(.*)$", "=new").unwrap()]);
        assert_eq!(rules.apply("a=1\r\nb=2\nc=3"), "a=new\r\nb=new\nc=new");
    }

    #[test]
    fn scc_lines_are_deleted_not_blanked() {
        let text = "<VisualStudioProject\n\tSccProjectName=\"$/OpenNI\"\n\tSccLocalPath=\".\"\n\tName=\"NiViewer\"\n";
        assert_eq!(
            strip_scc_lines(text),
            "<VisualStudioProject\n\tName=\"NiViewer\"\n"
        );
    }

    #[test]
    fn csproj_link_idiom_collapses_to_single_include() {
        let text = "    <Compile Include=\"..\\..\\Samples\\UserTracker.net\\MainWindow.cs\">\r\n      <Link>MainWindow.cs</Link>\r\n    </Compile>\r\n";
        let fixed = collapse_csproj_links(text, "UserTracker.net");
        assert_eq!(fixed, "    <Compile Include=\"MainWindow.cs\">\r\n    </Compile>\r\n");
    }

    #[test]
    fn unchanged_files_are_not_rewritten() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("main.cpp");
        fs::write(&path, "int main() {}\n").unwrap();

        let changed = rewrite_file_with(&path, |s| s.to_string()).unwrap();
        assert!(!changed);
        assert_eq!(fs::read_to_string(&path).unwrap(), "int main() {}\n");
    }

    #[test]
    fn failed_rename_leaves_original_and_no_temp_file() {
        let temp = TempDir::new().unwrap();
        // A directory cannot be replaced by a file rename.
        let target = temp.path().join("target.h");
        fs::create_dir_all(target.join("child")).unwrap();

        assert!(write_atomic(&target, b"new").is_err());
        assert!(target.join("child").is_dir());

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".rewrite-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn interrupted_rewrite_keeps_original_intact() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Makefile");
        let original = b"BIN_DIR = ../../../Bin\r\nLIB_DIRS = ../../../Lib\r\n";
        fs::write(&path, original).unwrap();

        // Occupy the temp sibling so the new content cannot be written.
        let tmp = temp_sibling(&path).unwrap();
        fs::create_dir_all(tmp.join("busy")).unwrap();

        let err = rewrite_file_with(&path, |text| text.replace("../../../", "../")).unwrap_err();
        assert!(err.to_string().contains("writing temp file"));
        assert_eq!(fs::read(&path).unwrap(), original);
    }
}
