use super::domain::{FactTree, FactValue, FieldPath};

/// Result of looking a dotted path up in a fact tree. Absence is a value, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Value(&'a FactValue),
    Unknown,
}

impl<'a> Resolved<'a> {
    pub fn value(self) -> Option<&'a FactValue> {
        match self {
            Resolved::Value(value) => Some(value),
            Resolved::Unknown => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Resolved::Unknown)
    }
}

/// Descend `facts` along `path`. Any absent segment, or an attempt to descend through a
/// scalar or list, resolves to [`Resolved::Unknown`].
pub fn resolve<'a>(facts: &'a FactTree, path: &FieldPath) -> Resolved<'a> {
    let mut segments = path.segments();
    let Some(first) = segments.next() else {
        return Resolved::Unknown;
    };

    let mut current = match facts.get(first) {
        Some(value) => value,
        None => return Resolved::Unknown,
    };

    for segment in segments {
        current = match current {
            FactValue::Tree(tree) => match tree.get(segment) {
                Some(value) => value,
                None => return Resolved::Unknown,
            },
            _ => return Resolved::Unknown,
        };
    }

    Resolved::Value(current)
}
