//! Parsed retention directives.
//!
//! The textual rule language is parsed by an excluded layer; what arrives
//! here is an abstract list of rules with class and member patterns.
//! Patterns may carry `*` (within one package segment for class names) and
//! `**` (across segments) wildcards; they are compiled once, at
//! construction time, into anchored regexes.

use crate::error::ShakeError;
use regex::Regex;

/// Index of a rule in the list handed to the engine. Diagnostics and
/// provenance refer to rules by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub usize);

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule #{}", self.0)
    }
}

/// Kind of a retention directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Unconditional keep: matched items become roots.
    Keep,
    /// Conditional keep: consequences are rooted only once every matched
    /// precondition is live.
    KeepIf,
    /// Matched members are assumed free of side effects; calls to them are
    /// not traced. Never roots anything.
    AssumeNoSideEffects,
    /// Matched members are assumed constant-valued. Never roots anything.
    AssumeValues,
    /// Matched items are expected to be absent from the final live set.
    CheckDiscard,
}

/// A class-name pattern. Exact match when it carries no wildcard.
#[derive(Debug, Clone)]
pub struct ClassPattern {
    raw: String,
    regex: Option<Regex>,
}

impl ClassPattern {
    pub fn new(pattern: &str) -> Result<Self, ShakeError> {
        let regex = if pattern.contains('*') {
            Some(compile_wildcards(pattern, true)?)
        } else {
            None
        };
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, class_name: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(class_name),
            None => self.raw == class_name,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.regex.is_none()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Which member kinds a member pattern applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Any,
    Method,
    Field,
}

/// A member pattern: name (wildcarded), optional exact descriptor, kind.
#[derive(Debug, Clone)]
pub struct MemberPattern {
    name_raw: String,
    name_regex: Option<Regex>,
    pub descriptor: Option<String>,
    pub kind: MemberKind,
}

impl MemberPattern {
    pub fn new(name: &str, descriptor: Option<&str>, kind: MemberKind) -> Result<Self, ShakeError> {
        let name_regex = if name.contains('*') {
            Some(compile_wildcards(name, false)?)
        } else {
            None
        };
        Ok(Self {
            name_raw: name.to_string(),
            name_regex,
            descriptor: descriptor.map(str::to_string),
            kind,
        })
    }

    pub fn matches_name(&self, name: &str) -> bool {
        match &self.name_regex {
            Some(regex) => regex.is_match(name),
            None => self.name_raw == name,
        }
    }

    pub fn matches_method(&self, name: &str, descriptor: &str) -> bool {
        if self.kind == MemberKind::Field {
            return false;
        }
        if let Some(expected) = &self.descriptor {
            if expected != descriptor {
                return false;
            }
        }
        self.matches_name(name)
    }

    pub fn matches_field(&self, name: &str) -> bool {
        self.kind != MemberKind::Method && self.descriptor.is_none() && self.matches_name(name)
    }

    pub fn raw(&self) -> &str {
        &self.name_raw
    }
}

/// One parsed retention directive.
#[derive(Debug, Clone)]
pub struct Rule {
    pub kind: RuleKind,
    pub class_pattern: ClassPattern,
    /// Member patterns; empty means the rule is about the class itself.
    pub members: Vec<MemberPattern>,
    /// Precondition patterns, for `KeepIf` rules.
    pub condition: Option<Condition>,
    /// Original rule text, for diagnostics. Optional.
    pub origin: Option<String>,
}

/// The precondition side of a conditional rule.
#[derive(Debug, Clone)]
pub struct Condition {
    pub class_pattern: ClassPattern,
    /// Empty means "the class itself is live".
    pub members: Vec<MemberPattern>,
}

impl Rule {
    pub fn keep_class(class: &str) -> Result<Self, ShakeError> {
        Ok(Self {
            kind: RuleKind::Keep,
            class_pattern: ClassPattern::new(class)?,
            members: Vec::new(),
            condition: None,
            origin: None,
        })
    }

    pub fn keep_members(class: &str, members: Vec<MemberPattern>) -> Result<Self, ShakeError> {
        Ok(Self {
            kind: RuleKind::Keep,
            class_pattern: ClassPattern::new(class)?,
            members,
            condition: None,
            origin: None,
        })
    }

    pub fn keep_if(condition: Condition, class: &str, members: Vec<MemberPattern>) -> Result<Self, ShakeError> {
        Ok(Self {
            kind: RuleKind::KeepIf,
            class_pattern: ClassPattern::new(class)?,
            members,
            condition: Some(condition),
            origin: None,
        })
    }

    pub fn check_discard(class: &str) -> Result<Self, ShakeError> {
        Ok(Self {
            kind: RuleKind::CheckDiscard,
            class_pattern: ClassPattern::new(class)?,
            members: Vec::new(),
            condition: None,
            origin: None,
        })
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// How the rule is named in diagnostics.
    pub fn describe(&self, id: RuleId) -> String {
        match &self.origin {
            Some(origin) => format!("{id} ({origin})"),
            None => format!("{id} ({:?} {})", self.kind, self.class_pattern.raw()),
        }
    }
}

/// Translate a wildcard pattern to an anchored regex. `**` crosses package
/// separators, `*` stays within one segment (class names only; member names
/// contain no dots, so `*` is unrestricted there).
fn compile_wildcards(pattern: &str, dots_are_boundaries: bool) -> Result<Regex, ShakeError> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    translated.push_str(".*");
                } else if dots_are_boundaries {
                    translated.push_str("[^.]*");
                } else {
                    translated.push_str(".*");
                }
            }
            c => translated.push_str(&regex::escape(&c.to_string())),
        }
    }
    translated.push('$');
    Regex::new(&translated).map_err(|source| ShakeError::BadPattern {
        pattern: pattern.to_string(),
        source,
    })
}
