//! Label-selector parser.
//!
//! Translates selector strings like `y=hello, x>1, !a, z in (foo, bar)`
//! into a [`Query`]. The parser is a hand-written scanner: requirements are
//! split on commas outside parentheses, then each requirement is classified
//! by its first delimiter. `!=` is recognized before `!`, and two-character
//! operators before their one-character prefixes.

use crate::error::{QueryError, QueryResult};
use crate::predicate::{Predicate, Query};

/// Symbolic operators in match order. Two-character operators come first so
/// that at any position the longest token wins.
const OPERATORS: [&str; 7] = ["!=", "==", "<=", ">=", "=", "<", ">"];

/// Translates a label-selector string into a query.
///
/// An empty (or all-whitespace) selector produces the empty query, which
/// matches all entities. Any malformed requirement fails the whole
/// translation; no partial trees are returned.
///
/// # Examples
///
/// ```
/// use labeldb_query::translate;
///
/// let q = translate("y = hello, x > 1, !a").unwrap();
/// assert_eq!(q.labels(), ["y", "x", "a"]);
/// ```
pub fn translate(selector: &str) -> QueryResult<Query> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Ok(Query::default());
    }
    let mut predicates = Vec::new();
    for requirement in split_requirements(selector)? {
        predicates.push(parse_requirement(requirement.trim())?);
    }
    Ok(Query::new(predicates))
}

/// Splits the selector on commas at parenthesis depth zero.
fn split_requirements(selector: &str) -> QueryResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth: u32 = 0;
    let mut start = 0;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| QueryError::parse("unbalanced ')'"))?;
            }
            ',' if depth == 0 => {
                parts.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(QueryError::parse("unterminated '('"));
    }
    parts.push(&selector[start..]);
    Ok(parts)
}

/// Parses one requirement into a predicate.
fn parse_requirement(req: &str) -> QueryResult<Predicate> {
    if req.is_empty() {
        return Err(QueryError::parse("empty requirement"));
    }

    // "!label" is absence, unless the '!' opens a "!=".
    if let Some(rest) = req.strip_prefix('!') {
        if !rest.starts_with('=') {
            return Ok(Predicate::NotExists {
                label: valid_label(rest.trim())?,
            });
        }
    }

    if let Some((idx, op)) = find_operator(req) {
        let label = valid_label(req[..idx].trim())?;
        let literal = req[idx + op.len()..].trim();
        if literal.is_empty() {
            return Err(QueryError::parse(format!("missing value after '{op}'")));
        }
        let predicate = match op {
            "=" | "==" => Predicate::Equal {
                label,
                value: literal.to_string(),
            },
            "!=" => Predicate::NotEqual {
                label,
                value: literal.to_string(),
            },
            "<" => Predicate::LessThan {
                label,
                value: parse_number(literal)?,
            },
            "<=" => Predicate::LessOrEqual {
                label,
                value: parse_number(literal)?,
            },
            ">" => Predicate::GreaterThan {
                label,
                value: parse_number(literal)?,
            },
            ">=" => Predicate::GreaterOrEqual {
                label,
                value: parse_number(literal)?,
            },
            _ => unreachable!("operator table covers all matches"),
        };
        return Ok(predicate);
    }

    if let Some(result) = parse_set(req) {
        return result;
    }

    // Bare label: existence.
    Ok(Predicate::Exists {
        label: valid_label(req)?,
    })
}

/// Returns the position and token of the first symbolic operator.
fn find_operator(req: &str) -> Option<(usize, &'static str)> {
    req.char_indices().find_map(|(i, _)| {
        OPERATORS
            .iter()
            .find(|op| req[i..].starts_with(**op))
            .map(|op| (i, *op))
    })
}

/// Attempts to parse `LABEL (in|notin) "(" LITERAL, ... ")"`.
///
/// Returns `None` when the requirement is not a set expression so the caller
/// can fall through to the bare-label case.
fn parse_set(req: &str) -> Option<QueryResult<Predicate>> {
    let (label_token, rest) = req.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (negated, rest) = if let Some(r) = rest.strip_prefix("notin") {
        (true, r)
    } else if let Some(r) = rest.strip_prefix("in") {
        (false, r)
    } else {
        return None;
    };
    let rest = rest.trim_start();
    Some(build_set(label_token, negated, rest))
}

fn build_set(label_token: &str, negated: bool, list: &str) -> QueryResult<Predicate> {
    let label = valid_label(label_token)?;
    let keyword = if negated { "notin" } else { "in" };
    let inner = list
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| {
            QueryError::parse(format!("'{keyword}' requires a parenthesized list"))
        })?;
    let mut values = Vec::new();
    for raw in inner.split(',') {
        let value = raw.trim();
        if value.is_empty() {
            return Err(QueryError::parse(format!("empty value in '{keyword}' list")));
        }
        values.push(value.to_string());
    }
    Ok(if negated {
        Predicate::NotIn { label, values }
    } else {
        Predicate::In { label, values }
    })
}

/// Validates a label against `[A-Za-z_][A-Za-z0-9_.-]*`.
fn valid_label(label: &str) -> QueryResult<String> {
    if label.is_empty() {
        return Err(QueryError::parse("empty label"));
    }
    let mut chars = label.chars();
    let head_ok = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if head_ok && tail_ok {
        Ok(label.to_string())
    } else {
        Err(QueryError::parse(format!("invalid label '{label}'")))
    }
}

fn parse_number(literal: &str) -> QueryResult<f64> {
    literal
        .parse::<f64>()
        .map_err(|_| QueryError::parse(format!("'{literal}' is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map, Value};

    fn entity() -> Map<String, Value> {
        let Value::Object(map) = json!({"x": 2, "y": "hello", "z": ["foo", "bar"]}) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn empty_selector_matches_all() {
        let q = translate("").unwrap();
        assert!(q.is_empty());
        assert!(q.matches(&entity()));

        let q = translate("   ").unwrap();
        assert!(q.is_empty());
    }

    #[test]
    fn all_operators_match_seed_entity() {
        // One entity, many selectors; each must match it.
        let selectors = [
            "y in (hello, goodbye)",
            "y notin (morning, night)",
            "y = hello",
            "y == hello",
            "y != goodbye",
            "y",
            "!a",
            "x > 1",
            "x < 3",
            "x >= 2",
            "x <= 2",
        ];
        let e = entity();
        for s in selectors {
            let q = translate(s).unwrap();
            assert!(q.matches(&e), "selector {s:?} should match");
        }
    }

    #[test]
    fn equality_synonyms() {
        let single = translate("y=hello").unwrap();
        let double = translate("y==hello").unwrap();
        assert_eq!(single.predicates(), double.predicates());
    }

    #[test]
    fn complex_selector() {
        let q = translate("y, !a, x>1").unwrap();
        assert_eq!(q.predicates().len(), 3);
        assert_eq!(q.labels(), ["y", "a", "x"]);
        assert!(q.matches(&entity()));
    }

    #[test]
    fn not_equal_wins_over_absence() {
        let q = translate("a!=b").unwrap();
        assert_eq!(
            q.predicates(),
            [Predicate::NotEqual {
                label: "a".into(),
                value: "b".into(),
            }]
        );
    }

    #[test]
    fn whitespace_is_insignificant() {
        let q = translate("  y   in   ( hello ,  goodbye )  ").unwrap();
        assert_eq!(
            q.predicates(),
            [Predicate::In {
                label: "y".into(),
                values: vec!["hello".into(), "goodbye".into()],
            }]
        );
    }

    #[test]
    fn set_values_keep_requirement_splitting_intact() {
        // Commas inside parens must not split requirements.
        let q = translate("y in (a, b), x > 1").unwrap();
        assert_eq!(q.predicates().len(), 2);
    }

    #[test]
    fn dotted_and_dashed_labels() {
        let q = translate("app.kubernetes-io_name=web").unwrap();
        assert_eq!(q.labels(), ["app.kubernetes-io_name"]);
    }

    #[test]
    fn reserved_meta_labels_are_queryable() {
        let q = translate("_rev > 3").unwrap();
        assert_eq!(q.labels(), ["_rev"]);
    }

    #[test]
    fn parse_failures() {
        let bad = [
            "y in (a",      // unterminated paren
            "y in a)",      // unbalanced close
            "y in ()",      // empty list
            "y in (a,,b)",  // empty value
            "y=",           // empty literal
            "=hello",       // empty label
            "y,,x",         // empty requirement
            "x > banana",   // non-numeric bound
            "9lives",       // label starts with digit
            "a b",          // junk after bare label
            "y ~ 2",        // unknown operator
        ];
        for s in bad {
            assert!(translate(s).is_err(), "selector {s:?} should fail");
        }
    }

    #[test]
    fn no_partial_trees_on_failure() {
        // Valid first requirement, invalid second: the whole parse fails.
        assert!(translate("y=hello, x >").is_err());
    }

    proptest! {
        #[test]
        fn equality_round_trips(
            label in "[A-Za-z_][A-Za-z0-9_.-]{0,12}",
            value in "[A-Za-z][A-Za-z0-9]{0,12}",
        ) {
            let q = translate(&format!("{label} = {value}")).unwrap();
            prop_assert_eq!(
                q.predicates(),
                &[Predicate::Equal { label, value }]
            );
        }

        #[test]
        fn arbitrary_input_never_panics(s in "\\PC{0,40}") {
            let _ = translate(&s);
        }
    }
}
