//! `{name}` placeholder templates for endpoint paths.

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("malformed path template '{template}' at byte {position}")]
    Malformed { template: String, position: usize },

    #[error(
        "path '{template}' expects {} value(s) for {expected:?}; provided {} value(s): {provided:?}",
        .expected.len(),
        .provided.len()
    )]
    /// `expected` holds every placeholder of the template; `provided`
    /// every supplied value, named ones as `name=value` ahead of the
    /// positional ones.
    Mismatch {
        template: String,
        expected: Vec<String>,
        provided: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed path such as `/users/{user_id}/posts/{post_id}`.
///
/// `{{` and `}}` stand for literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

/// Values for a template: named values fill their placeholders, positional
/// values fill the remaining ones in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathArgs {
    pub positional: Vec<String>,
    pub named: IndexMap<String, String>,
}

impl PathArgs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.positional.push(value.to_string());
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.named.insert(name.into(), value.to_string());
        self
    }
}

impl PathTemplate {
    /// # Errors
    ///
    /// Returns [`PathError::Malformed`] for an unbalanced brace or an empty
    /// placeholder.
    pub fn parse(template: &str) -> Result<Self, PathError> {
        let malformed = |position| PathError::Malformed {
            template: template.to_string(),
            position,
        };
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();
        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().is_some_and(|&(_, n)| n == '{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().is_some_and(|&(_, n)| n == '}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        if n == '{' {
                            return Err(malformed(pos));
                        }
                        name.push(n);
                    }
                    if !closed || name.trim().is_empty() {
                        return Err(malformed(pos));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(malformed(pos)),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Distinct placeholder names in order of first appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute every placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Mismatch`] unless the positional values exactly
    /// cover the placeholders left after named substitution.
    pub fn render(&self, args: &PathArgs) -> Result<String, PathError> {
        let placeholders = self.placeholders();
        let unmatched: Vec<&str> = placeholders
            .iter()
            .copied()
            .filter(|name| !args.named.contains_key(*name))
            .collect();
        if unmatched.len() != args.positional.len() {
            return Err(PathError::Mismatch {
                template: self.raw.clone(),
                expected: placeholders.iter().map(ToString::to_string).collect(),
                provided: args
                    .named
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .chain(args.positional.iter().cloned())
                    .collect(),
            });
        }
        let by_position: IndexMap<&str, &str> = unmatched
            .into_iter()
            .zip(args.positional.iter().map(String::as_str))
            .collect();

        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = args
                        .named
                        .get(name)
                        .map(String::as_str)
                        .or_else(|| by_position.get(name.as_str()).copied())
                        .unwrap_or_default();
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_values_fill_in_order() {
        let t = PathTemplate::parse("/users/{user_id}/posts/{post_id}").unwrap();
        let path = t.render(&PathArgs::new().arg(7).arg("abc")).unwrap();
        assert_eq!(path, "/users/7/posts/abc");
    }

    #[test]
    fn named_values_take_precedence() {
        let t = PathTemplate::parse("/users/{user_id}/posts/{post_id}").unwrap();
        let args = PathArgs::new().named("post_id", 9).arg(1);
        assert_eq!(t.render(&args).unwrap(), "/users/1/posts/9");
    }

    #[test]
    fn repeated_placeholder_takes_one_value() {
        let t = PathTemplate::parse("/{id}/copy/{id}").unwrap();
        assert_eq!(t.render(&PathArgs::new().arg(3)).unwrap(), "/3/copy/3");
    }

    #[test]
    fn count_mismatch_names_both_sides() {
        let t = PathTemplate::parse("/a/{x}/{y}").unwrap();
        let err = t.render(&PathArgs::new().arg(1)).unwrap_err();
        assert_eq!(
            err,
            PathError::Mismatch {
                template: "/a/{x}/{y}".into(),
                expected: vec!["x".into(), "y".into()],
                provided: vec!["1".into()],
            }
        );
        assert_eq!(
            err.to_string(),
            r#"path '/a/{x}/{y}' expects 2 value(s) for ["x", "y"]; provided 1 value(s): ["1"]"#
        );
        assert!(t.render(&PathArgs::new().arg(1).arg(2).arg(3)).is_err());
    }

    #[test]
    fn mismatch_reports_named_values_and_every_placeholder() {
        let t = PathTemplate::parse("/users/{id}/posts/{post_id}").unwrap();
        let err = t.render(&PathArgs::new().named("id", 1)).unwrap_err();
        assert_eq!(
            err,
            PathError::Mismatch {
                template: "/users/{id}/posts/{post_id}".into(),
                expected: vec!["id".into(), "post_id".into()],
                provided: vec!["id=1".into()],
            }
        );

        let err = t.render(&PathArgs::new().named("id", 1).arg(2).arg(3)).unwrap_err();
        let PathError::Mismatch { expected, provided, .. } = err else {
            panic!("expected a mismatch");
        };
        assert_eq!(expected.len(), 2);
        assert_eq!(provided, ["id=1", "2", "3"]);
    }

    #[test]
    fn no_placeholders_means_no_arguments() {
        let t = PathTemplate::parse("/health").unwrap();
        assert_eq!(t.render(&PathArgs::new()).unwrap(), "/health");
        assert!(t.render(&PathArgs::new().arg(1)).is_err());
    }

    #[test]
    fn escaped_braces_are_literal() {
        let t = PathTemplate::parse("/q/{{raw}}/{id}").unwrap();
        assert_eq!(t.placeholders(), vec!["id"]);
        assert_eq!(t.render(&PathArgs::new().arg(5)).unwrap(), "/q/{raw}/5");
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(PathTemplate::parse("/a/{id").is_err());
        assert!(PathTemplate::parse("/a/{}").is_err());
        assert!(PathTemplate::parse("/a/}").is_err());
    }
}
