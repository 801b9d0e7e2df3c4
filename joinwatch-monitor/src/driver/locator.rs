//! Element locators
//!
//! A [`Locator`] is a plain value describing how to find elements; nothing is
//! resolved until a [`Page`](super::Page) method receives it. Each step
//! searches the descendants of whatever the previous step matched and may be
//! narrowed to its n-th match.

use std::fmt;

/// One element query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// ARIA role, optionally with an accessible-name substring (case-insensitive)
    Role { role: String, name: Option<String> },
    /// Exact `aria-label`
    Label(String),
    /// Attribute contains `value` (case-insensitive)
    AttrContains { attr: String, value: String },
    /// Raw CSS selector
    Css(String),
    /// Element whose own text starts with the prefix
    TextPrefix(String),
}

impl Query {
    pub fn role(role: &str) -> Self {
        Query::Role {
            role: role.to_string(),
            name: None,
        }
    }

    pub fn role_named(role: &str, name: &str) -> Self {
        Query::Role {
            role: role.to_string(),
            name: Some(name.to_string()),
        }
    }

    pub fn label(label: &str) -> Self {
        Query::Label(label.to_string())
    }

    pub fn attr_contains(attr: &str, value: &str) -> Self {
        Query::AttrContains {
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }

    /// Shorthand for a `class` substring match
    pub fn class_contains(value: &str) -> Self {
        Self::attr_contains("class", value)
    }

    pub fn css(selector: &str) -> Self {
        Query::Css(selector.to_string())
    }

    pub fn text_prefix(prefix: &str) -> Self {
        Query::TextPrefix(prefix.to_string())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Role { role, name: None } => write!(f, "role={}", role),
            Query::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name*=\"{}\" i]", role, name),
            Query::Label(label) => write!(f, "label=\"{}\"", label),
            Query::AttrContains { attr, value } => write!(f, "[{}*=\"{}\" i]", attr, value),
            Query::Css(selector) => write!(f, "{}", selector),
            Query::TextPrefix(prefix) => write!(f, "text=/^{}/", prefix),
        }
    }
}

/// A query plus an optional index into its matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub query: Query,
    pub nth: Option<usize>,
}

/// Chain of steps, resolved left to right
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    /// Locator searching the whole page
    pub fn new(query: Query) -> Self {
        Self {
            steps: vec![Step { query, nth: None }],
        }
    }

    /// Search inside the elements this locator matches
    pub fn locate(&self, query: Query) -> Self {
        let mut steps = self.steps.clone();
        steps.push(Step { query, nth: None });
        Self { steps }
    }

    /// Narrow the last step to its `index`-th match (replaces any earlier index)
    pub fn nth(&self, index: usize) -> Self {
        let mut steps = self.steps.clone();
        if let Some(last) = steps.last_mut() {
            last.nth = Some(index);
        }
        Self { steps }
    }

    pub fn first(&self) -> Self {
        self.nth(0)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " >> ")?;
            }
            write!(f, "{}", step.query)?;
            if let Some(n) = step.nth {
                write!(f, " >> nth={}", n)?;
            }
        }
        Ok(())
    }
}
