//! Include/exclude filters applied to every listed file.
//!
//! Two filter types are supported:
//! - `path_template`: globs matched against the file path (`*` stays inside
//!   one segment, `**` spans directories)
//! - `size`: a comparison such as `>100` or `<= 2048` against the byte size
//!
//! A file is indexed when it matches at least one include pattern (or no
//! include patterns are configured) and matches none of the exclude
//! patterns. A pattern listed under both include and exclude for the same
//! filter type only counts as an include.

use std::sync::OnceLock;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::document::FileDetails;
use crate::error::{ConnectorError, Result};

/// Patterns for one side (include or exclude) as configured
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPatterns {
    #[serde(default)]
    pub path_template: Vec<String>,
    #[serde(default)]
    pub size: Vec<String>,
}

impl FilterPatterns {
    pub fn is_empty(&self) -> bool {
        self.path_template.is_empty() && self.size.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
}

/// Compiled size filter, e.g. `>100`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRule {
    comparator: Comparator,
    value: u64,
}

fn size_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(>=|<=|!=|==|>|<|=|!)\s*([0-9]+)\s*$").expect("Invalid regex pattern")
    })
}

impl SizeRule {
    pub fn parse(pattern: &str) -> Result<Self> {
        let caps = size_pattern().captures(pattern).ok_or_else(|| {
            ConnectorError::Config(format!(
                "Invalid size pattern {:?}: expected an operator (> >= < <= = == ! !=) followed by a byte count",
                pattern
            ))
        })?;
        let comparator = match &caps[1] {
            ">" => Comparator::Greater,
            ">=" => Comparator::GreaterOrEqual,
            "<" => Comparator::Less,
            "<=" => Comparator::LessOrEqual,
            "=" | "==" => Comparator::Equal,
            _ => Comparator::NotEqual,
        };
        let value = caps[2].parse::<u64>().map_err(|e| {
            ConnectorError::Config(format!("Invalid size in pattern {:?}: {}", pattern, e))
        })?;
        Ok(Self { comparator, value })
    }

    pub fn matches(&self, file_size: u64) -> bool {
        match self.comparator {
            Comparator::Greater => file_size > self.value,
            Comparator::GreaterOrEqual => file_size >= self.value,
            Comparator::Less => file_size < self.value,
            Comparator::LessOrEqual => file_size <= self.value,
            Comparator::Equal => file_size == self.value,
            Comparator::NotEqual => file_size != self.value,
        }
    }
}

/// One compiled side of the rule set
#[derive(Debug, Clone)]
struct CompiledFilters {
    paths: GlobSet,
    sizes: Vec<SizeRule>,
}

impl CompiledFilters {
    fn compile(patterns: &FilterPatterns) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns.path_template {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    ConnectorError::Config(format!("Invalid path_template {:?}: {}", pattern, e))
                })?;
            builder.add(glob);
        }
        let paths = builder
            .build()
            .map_err(|e| ConnectorError::Config(format!("Invalid path_template set: {}", e)))?;
        let sizes = patterns
            .size
            .iter()
            .map(|p| SizeRule::parse(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { paths, sizes })
    }

    fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.sizes.is_empty()
    }

    fn any_match(&self, file: &FileDetails) -> bool {
        let path = file.file_path.replace('\\', "/");
        self.paths.is_match(path.trim_start_matches('/'))
            || self.sizes.iter().any(|rule| rule.matches(file.file_size))
    }
}

/// Compiled include/exclude rules
#[derive(Debug, Clone)]
pub struct IndexingRules {
    include: CompiledFilters,
    exclude: CompiledFilters,
}

impl IndexingRules {
    /// Compile the configured rules. Invalid globs or size patterns are
    /// configuration errors.
    pub fn new(include: &FilterPatterns, exclude: &FilterPatterns) -> Result<Self> {
        let effective_exclude = FilterPatterns {
            path_template: without_duplicates(&exclude.path_template, &include.path_template),
            size: without_duplicates(&exclude.size, &include.size),
        };
        Ok(Self {
            include: CompiledFilters::compile(include)?,
            exclude: CompiledFilters::compile(&effective_exclude)?,
        })
    }

    /// Rules that admit every file
    pub fn allow_all() -> Self {
        let empty = || CompiledFilters {
            paths: GlobSet::empty(),
            sizes: Vec::new(),
        };
        Self {
            include: empty(),
            exclude: empty(),
        }
    }

    pub fn should_index(&self, file: &FileDetails) -> bool {
        let included = self.include.is_empty() || self.include.any_match(file);
        included && !self.exclude.any_match(file)
    }
}

fn without_duplicates(exclude: &[String], include: &[String]) -> Vec<String> {
    exclude
        .iter()
        .filter(|p| !include.contains(p))
        .cloned()
        .collect()
}
