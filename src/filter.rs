/// Filter line compilation
///
/// Syntax of a single (trimmed) filter line:
/// - `# anything`  → comment, kept for display only
/// - `/source/`    → `source` is used verbatim as a regular expression
/// - anything else → literal substring, regex metacharacters escaped
use crate::error::FilterError;
use regex::Regex;

/// A compiled filter that remembers the exact line it came from
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// The original filter line, byte for byte
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

/// Result of compiling one filter line
#[derive(Debug, Clone, PartialEq)]
pub enum FilterLine {
    Pattern(Pattern),
    Comment(String),
}

impl FilterLine {
    pub fn source(&self) -> &str {
        match self {
            FilterLine::Pattern(pattern) => pattern.source(),
            FilterLine::Comment(text) => text,
        }
    }
}

pub fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Compile a single filter line.
///
/// Wrapping needs two slashes, so a lone `/` is a literal slash that matches
/// any URL containing one. It is deliberately not read as an empty regex,
/// which would match every URL including those without a slash. `//` is
/// the empty regex.
pub fn compile(line: &str) -> Result<FilterLine, FilterError> {
    if is_comment(line) {
        return Ok(FilterLine::Comment(line.to_string()));
    }

    let expression = if line.len() >= 2 && line.starts_with('/') && line.ends_with('/') {
        line[1..line.len() - 1].to_string()
    } else {
        regex::escape(line)
    };

    let regex = Regex::new(&expression).map_err(|e| FilterError {
        filter: line.to_string(),
        message: e.to_string(),
    })?;

    Ok(FilterLine::Pattern(Pattern {
        source: line.to_string(),
        regex,
    }))
}

/// Split a multi-line filter block into trimmed, non-empty lines
pub fn split_filter_text(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Compile every line, returning the matchable patterns and the untouched
/// originals (comments included). The first invalid line aborts the whole set.
pub fn compile_all<S: AsRef<str>>(lines: &[S]) -> Result<(Vec<Pattern>, Vec<String>), FilterError> {
    let mut patterns = Vec::new();
    let mut originals = Vec::with_capacity(lines.len());

    for line in lines {
        let line = line.as_ref().trim();
        if let FilterLine::Pattern(pattern) = compile(line)? {
            patterns.push(pattern);
        }
        originals.push(line.to_string());
    }

    Ok((patterns, originals))
}
