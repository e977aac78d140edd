use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SOURCE_DIRS: [&str; 4] = ["solve", "cli", "tests", "benches"];

/// Source policies enforced on every Rust file of the crate.
#[derive(Clone, Copy)]
enum Rule {
    UnderscoreBinding,
    ReleaseNoteComment,
    StarsInComment,
    ShoutingComment,
    AllowDeadCode,
}

impl Rule {
    const ALL: [Rule; 5] = [
        Rule::UnderscoreBinding,
        Rule::ReleaseNoteComment,
        Rule::StarsInComment,
        Rule::ShoutingComment,
        Rule::AllowDeadCode,
    ];

    fn pattern(self) -> &'static str {
        match self {
            Rule::UnderscoreBinding => r"\b_[a-zA-Z0-9_]+\b",
            Rule::ReleaseNoteComment => {
                r"(//|/\*).*\b(FIXED|FIXES|FIX|CORRECTED|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)\b"
            }
            Rule::StarsInComment => r"(//|/\*).*\*\*",
            Rule::ShoutingComment => r"(//|/\*).*[A-Z]",
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        }
    }

    fn message(self) -> &'static str {
        match self {
            Rule::UnderscoreBinding => {
                "underscore-prefixed identifiers; use the binding or remove it"
            }
            Rule::ReleaseNoteComment => {
                "release-note words (FIX, NEW, CHANGE, UPDATE, ...) in comments"
            }
            Rule::StarsInComment => "`**` in a non-doc comment",
            Rule::ShoutingComment => "comments written entirely in uppercase",
            Rule::AllowDeadCode => "#[allow(dead_code)]; use the code or delete it",
        }
    }

    /// Second-stage filter for lines the regex matched.
    fn applies_to(self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self {
            Rule::UnderscoreBinding => {
                !trimmed.starts_with("//") && !inside_string_literal(line)
            }
            Rule::StarsInComment => {
                !trimmed.starts_with("///") && !trimmed.starts_with("//!")
            }
            Rule::ShoutingComment => comment_text(line).is_some_and(|text| {
                let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
                letters.peek().is_some() && letters.all(char::is_uppercase)
            }),
            Rule::ReleaseNoteComment | Rule::AllowDeadCode => true,
        }
    }
}

// Odd-numbered segments between double quotes are string contents.
fn inside_string_literal(line: &str) -> bool {
    line.split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_text(line: &str) -> Option<&str> {
    if let Some(start) = line.find("//") {
        return Some(line[start..].trim_start_matches(['/', '!']).trim());
    }
    let start = line.find("/*")? + 2;
    let rest = &line[start..];
    Some(rest.find("*/").map_or(rest, |end| &rest[..end]).trim())
}

struct RuleCollector {
    rule: Rule,
    file_path: PathBuf,
    violations: Vec<String>,
}

impl RuleCollector {
    fn new(rule: Rule, file_path: &Path) -> Self {
        Self {
            rule,
            file_path: file_path.to_path_buf(),
            violations: Vec::new(),
        }
    }

    fn into_error(self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut msg = format!(
            "\n❌ ERROR: {} violation(s) in {}: {}\n",
            self.violations.len(),
            self.file_path.display(),
            self.rule.message()
        );
        for violation in &self.violations {
            msg.push_str(&format!("   {violation}\n"));
        }
        Some(msg)
    }
}

impl Sink for RuleCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.rule.applies_to(line) {
            let line_number = mat.line_number().unwrap_or(0);
            self.violations.push(format!("{line_number}:{line}"));
        }
        Ok(true)
    }
}

fn source_files() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check_sources() -> Result<(), Box<dyn Error>> {
    let files = source_files();
    let mut searcher = Searcher::new();
    let mut report = String::new();

    for rule in Rule::ALL {
        let matcher = RegexMatcher::new_line_matcher(rule.pattern())?;
        for path in &files {
            let mut collector = RuleCollector::new(rule, path);
            searcher.search_path(&matcher, path, &mut collector)?;
            if let Some(msg) = collector.into_error() {
                report.push_str(&msg);
            }
        }
    }

    if report.is_empty() {
        Ok(())
    } else {
        Err(report.into())
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if let Err(e) = check_sources() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
