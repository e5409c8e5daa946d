use std::collections::HashSet;

/// Which indices a request applies to, before registry resolution.
///
/// Built only through the normalizing constructors, so downstream code never
/// has to care whether the client sent one name, a list, or a comma-joined
/// string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TargetSelector {
    #[default]
    All,
    Names(Vec<String>),
}

impl TargetSelector {
    /// Deduplicates while keeping first-occurrence order. Each item may itself
    /// be a comma-separated list. `_all` and `*` select every index, as does
    /// an empty input.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for raw in names {
            for name in raw.as_ref().split(',').map(str::trim) {
                if name.is_empty() {
                    continue;
                }
                if name == "_all" || name == "*" {
                    return Self::All;
                }
                if seen.insert(name.to_string()) {
                    ordered.push(name.to_string());
                }
            }
        }
        if ordered.is_empty() {
            Self::All
        } else {
            Self::Names(ordered)
        }
    }

    /// Parses an optional path/query parameter such as `a,b`.
    pub fn from_param(param: Option<&str>) -> Self {
        param.map_or(Self::All, |p| Self::from_names([p]))
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self::from_names([name.into()])
    }

    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}
