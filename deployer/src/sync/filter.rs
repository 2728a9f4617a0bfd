//! Glob-based exclusion rules over relative paths

use glob::Pattern;

use crate::errors::DeployerError;
use crate::storage::layout::DEPENDENCY_DIR;

/// One rule compiled under its four interpretations
#[derive(Debug, Clone)]
struct CompiledRule {
    exact: Pattern,
    prefix: Pattern,
    suffix: Pattern,
    segment: Pattern,
}

impl CompiledRule {
    fn compile(rule: &str) -> Result<Self, glob::PatternError> {
        Ok(Self {
            exact: Pattern::new(rule)?,
            prefix: Pattern::new(&format!("{rule}/*"))?,
            suffix: Pattern::new(&format!("*/{rule}"))?,
            segment: Pattern::new(&format!("*/{rule}/*"))?,
        })
    }

    fn matches(&self, path: &str) -> bool {
        self.exact.matches(path)
            || self.prefix.matches(path)
            || self.suffix.matches(path)
            || self.segment.matches(path)
    }
}

/// Exclusion test for relative, slash-separated paths.
///
/// A rule matches a path exactly, as a directory prefix (`rule/*`), as a
/// trailing component (`*/rule`) or as any inner segment (`*/rule/*`), so a
/// bare `logs` suppresses that name anywhere in the tree. `*` also matches
/// `/`. The dependency directory is always excluded because it ships
/// through its own policy.
#[derive(Debug, Clone)]
pub struct PathFilter {
    rules: Vec<String>,
    compiled: Vec<CompiledRule>,
}

impl PathFilter {
    /// Compile exclusion rules
    pub fn new<I, S>(rules: I) -> Result<Self, DeployerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = rules
            .into_iter()
            .map(|rule| rule.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|rule| !rule.is_empty())
            .collect();

        let vendor_prefix = format!("{DEPENDENCY_DIR}/*");
        if !normalized
            .iter()
            .any(|rule| rule == DEPENDENCY_DIR || *rule == vendor_prefix)
        {
            normalized.push(DEPENDENCY_DIR.to_string());
        }

        let compiled = normalized
            .iter()
            .map(|rule| {
                CompiledRule::compile(rule).map_err(|e| {
                    DeployerError::ConfigError(format!("Invalid exclude rule '{rule}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules: normalized,
            compiled,
        })
    }

    /// Rules in effect, including the implicit dependency directory
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Whether a relative path is excluded
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        let path = relative_path.replace('\\', "/");
        let path = path.trim_start_matches("./");
        self.compiled.iter().any(|rule| rule.matches(path))
    }
}
