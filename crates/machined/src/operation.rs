//! The operation table shared by every transport.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::handler::Handler;
use crate::params::NamedParams;

/// HTTP verb an operation answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Verb {
    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "DELETE" => Ok(Verb::Delete),
            other => Err(format!("unsupported verb: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A path with `{name}`-style placeholders, e.g. `/machine/{name}/start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern. A segment wrapped in braces is a placeholder.
    pub fn parse(raw: &str) -> Self {
        let segments = split_path(raw)
            .map(|segment| {
                match segment
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                {
                    Some(name) if !name.is_empty() => Segment::Placeholder(name.to_string()),
                    _ => Segment::Literal(segment.to_string()),
                }
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in the order they appear.
    pub fn placeholders(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name.clone()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match a concrete path, returning the bound placeholders.
    pub fn matches(&self, path: &str) -> Option<NamedParams> {
        let mut named = NamedParams::new();
        let mut parts = split_path(path);
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(name) => {
                    named.insert(name.clone(), part.to_string());
                }
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Some(named)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// One logical operation: a verb and path for HTTP, a name for SSH, and the
/// handler both resolve to.
#[derive(Clone)]
pub struct Operation {
    verb: Verb,
    pattern: PathPattern,
    name: String,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("verb", &self.verb)
            .field("pattern", &self.pattern.as_str())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Operation {
    /// HTTP verb.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// HTTP path pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// SSH command token.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler behind this operation.
    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

/// Ordered, immutable collection of operations.
///
/// Built once at startup through [`OperationTableBuilder`] and shared
/// read-only (typically behind an `Arc`) by every listener. There is no
/// way to add operations once built.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    operations: Vec<Operation>,
}

impl OperationTable {
    /// Start building a table.
    pub fn builder() -> OperationTableBuilder {
        OperationTableBuilder::default()
    }

    /// All operations in registration order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// First operation whose verb equals `verb` and whose pattern matches
    /// `path`, together with the bound placeholders.
    pub fn resolve_route(&self, verb: Verb, path: &str) -> Option<(&Operation, NamedParams)> {
        self.operations.iter().find_map(|operation| {
            if operation.verb != verb {
                return None;
            }
            operation
                .pattern
                .matches(path)
                .map(|named| (operation, named))
        })
    }

    /// Verbs of every operation whose pattern matches `path`, deduplicated
    /// and sorted. Empty when no operation serves the path at all.
    pub fn allowed_verbs(&self, path: &str) -> Vec<Verb> {
        let mut verbs: Vec<Verb> = self
            .operations
            .iter()
            .filter(|operation| operation.pattern.matches(path).is_some())
            .map(|operation| operation.verb)
            .collect();
        verbs.sort();
        verbs.dedup();
        verbs
    }

    /// First operation registered under the SSH command `name`.
    pub fn resolve_command(&self, name: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|operation| operation.name == name)
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the table has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Builder for [`OperationTable`].
#[derive(Debug, Default)]
pub struct OperationTableBuilder {
    operations: Vec<Operation>,
}

impl OperationTableBuilder {
    /// Register an operation. Its SSH name is the path without the leading
    /// slash.
    pub fn register(self, verb: Verb, path: &str, handler: impl Handler + 'static) -> Self {
        let name = path.trim_start_matches('/').to_string();
        self.register_named(verb, path, name, Arc::new(handler))
    }

    /// Register an operation with an explicit SSH name and a shared handler.
    pub fn register_named(
        mut self,
        verb: Verb,
        path: &str,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        self.operations.push(Operation {
            verb,
            pattern: PathPattern::parse(path),
            name: name.into(),
            handler,
        });
        self
    }

    /// Freeze the table.
    pub fn build(self) -> OperationTable {
        OperationTable {
            operations: self.operations,
        }
    }
}
