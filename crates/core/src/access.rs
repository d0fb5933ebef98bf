use regex::{Regex, RegexBuilder};

/// Path matchers deciding which pages require a verified token.
#[derive(Debug, Clone)]
pub struct ProtectedPaths {
    parents: Vec<String>,
    module_patterns: Vec<Regex>,
    standalone: Vec<String>,
}

impl ProtectedPaths {
    /// Builds matchers from raw values. Fixed paths are compared lower-cased,
    /// patterns case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` when a module pattern does not compile.
    pub fn new<P, M, S>(parents: P, module_patterns: M, standalone: S) -> Result<Self, regex::Error>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let module_patterns = module_patterns
            .into_iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            parents: lowered(parents),
            module_patterns,
            standalone: lowered(standalone),
        })
    }

    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.parents.iter().any(|p| path.contains(p.as_str()))
            || self.module_patterns.iter().any(|re| re.is_match(&path))
            || self.standalone.iter().any(|p| path.contains(p.as_str()))
    }
}

impl Default for ProtectedPaths {
    fn default() -> Self {
        let module = RegexBuilder::new(r"/module-\d+/")
            .case_insensitive(true)
            .build()
            .expect("default module pattern is valid");
        Self {
            parents: vec!["/modules-home/".to_owned()],
            module_patterns: vec![module],
            standalone: vec!["/my-progress/".to_owned(), "/quiz-responses/".to_owned()],
        }
    }
}

fn lowered<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}
