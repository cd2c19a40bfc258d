//! Directory search filters
//!
//! A batch of references is always translated into one filter so that a
//! resolver issues a single subtree search per call: one term for a single
//! reference, a disjunction for several.

use std::fmt;

/// Attribute access used to evaluate a [`Filter`] against an in-memory entry
pub trait Attributes {
    fn attribute(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Attribute equality
    Eq(String, String),
    /// Disjunction; an empty disjunction matches nothing
    Or(Vec<Filter>),
    /// Conjunction; an empty conjunction matches everything
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq(attr.into(), value.into())
    }

    /// Combine terms: the term itself when there is one, a disjunction otherwise
    pub fn any_of(mut terms: Vec<Filter>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Self::Or(terms)
        }
    }

    pub fn matches<E: Attributes + ?Sized>(&self, entry: &E) -> bool {
        match self {
            Self::Eq(attr, value) => entry.attribute(attr).as_deref() == Some(value.as_str()),
            Self::Or(terms) => terms.iter().any(|t| t.matches(entry)),
            Self::And(terms) => terms.iter().all(|t| t.matches(entry)),
        }
    }

    /// Number of equality terms in the tree
    pub fn term_count(&self) -> usize {
        match self {
            Self::Eq(..) => 1,
            Self::Or(terms) | Self::And(terms) => terms.iter().map(Filter::term_count).sum(),
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '*' => f.write_str("\\2a")?,
            '(' => f.write_str("\\28")?,
            ')' => f.write_str("\\29")?,
            '\\' => f.write_str("\\5c")?,
            '\0' => f.write_str("\\00")?,
            _ => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(attr, value) => {
                write!(f, "({}=", attr)?;
                write_escaped(f, value)?;
                f.write_str(")")
            }
            Self::Or(terms) | Self::And(terms) => {
                let op = if matches!(self, Self::Or(_)) { '|' } else { '&' };
                write!(f, "({}", op)?;
                for term in terms {
                    write!(f, "{}", term)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Entry(HashMap<&'static str, &'static str>);

    impl Attributes for Entry {
        fn attribute(&self, name: &str) -> Option<String> {
            self.0.get(name).map(|v| v.to_string())
        }
    }

    #[test]
    fn test_single_term_is_not_wrapped() {
        let filter = Filter::any_of(vec![Filter::eq("name", "admin")]);
        assert_eq!(filter, Filter::eq("name", "admin"));
        assert_eq!(filter.to_string(), "(name=admin)");
    }

    #[test]
    fn test_disjunction_rendering() {
        let filter = Filter::any_of(vec![Filter::eq("name", "admin"), Filter::eq("name", "ops")]);
        assert_eq!(filter.to_string(), "(|(name=admin)(name=ops))");
        assert_eq!(filter.term_count(), 2);
    }

    #[test]
    fn test_values_are_escaped() {
        let filter = Filter::eq("name", "a*(b)");
        assert_eq!(filter.to_string(), "(name=a\\2a\\28b\\29)");
    }

    #[test]
    fn test_matching() {
        let entry = Entry(HashMap::from([("name", "admin"), ("uuid", "1")]));

        assert!(Filter::eq("name", "admin").matches(&entry));
        assert!(!Filter::eq("name", "ops").matches(&entry));
        assert!(Filter::any_of(vec![Filter::eq("name", "ops"), Filter::eq("uuid", "1")]).matches(&entry));
        assert!(!Filter::Or(vec![]).matches(&entry));
        assert!(Filter::And(vec![Filter::eq("name", "admin"), Filter::eq("uuid", "1")]).matches(&entry));
        assert!(!Filter::eq("login", "admin").matches(&entry));
    }
}
