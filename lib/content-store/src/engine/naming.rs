//! Sibling name de-duplication.

use std::cmp::Ordering;

use crate::rows::NodeRow;
use crate::{ContentError, ContentRepository, Query, TransactionExecutor};

/// Split `"Name (3)"` into `("Name", Some(3))`.
fn split_suffix(name: &str) -> (&str, Option<u32>) {
    let Some(stripped) = name.strip_suffix(')') else {
        return (name, None);
    };
    let Some(open) = stripped.rfind(" (") else {
        return (name, None);
    };
    match stripped[open + 2..].parse::<u32>() {
        Ok(n) => (&name[..open], Some(n)),
        Err(_) => (name, None),
    }
}

/// Orders `"X"`, `"X (1)"`, `"X (2)"`, `"X (10)"` numerically when the bases
/// match case-insensitively; everything else compares by lowercased name.
pub fn compare_similar_names(a: &str, b: &str) -> Ordering {
    let (base_a, n_a) = split_suffix(a);
    let (base_b, n_b) = split_suffix(b);

    if base_a.to_lowercase() == base_b.to_lowercase() {
        return match (n_a, n_b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        };
    }

    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Pick the name a node should get among `siblings`, given as `(id, name)`.
///
/// Walks the siblings in similar-name order and bumps the ` (n)` suffix each
/// time the current candidate is taken. The node's own row is ignored so
/// re-saving keeps its name.
pub fn resolve_unique_name(candidate: &str, own_id: i64, siblings: &[(i64, String)]) -> String {
    let mut sorted: Vec<&(i64, String)> = siblings.iter().collect();
    sorted.sort_by(|a, b| compare_similar_names(&a.1, &b.1));

    let mut current = candidate.to_string();
    let mut n = 1u32;
    for (id, name) in sorted {
        if *id == own_id {
            continue;
        }
        if name.to_lowercase() == current.to_lowercase() {
            current = format!("{candidate} ({n})");
            n += 1;
        }
    }
    current
}

impl ContentRepository {
    /// Unique name for a node under `parent_id`, or `name` unchanged when
    /// unique naming is off.
    pub(crate) async fn ensure_unique_name<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        parent_id: i64,
        name: &str,
        own_id: i64,
    ) -> Result<String, ContentError> {
        if !self.config.ensure_unique_naming {
            return Ok(name.to_string());
        }

        let siblings = tx
            .fetch(
                Query::<NodeRow>::new()
                    .eq("parent_id", parent_id)
                    .eq("node_object_type", self.config.object_type)
                    .starts_with("text", name),
            )
            .await?;

        let siblings: Vec<(i64, String)> = siblings.into_iter().map(|n| (n.id, n.text)).collect();
        let resolved = resolve_unique_name(name, own_id, &siblings);
        if resolved != name {
            tracing::debug!(parent_id, from = name, to = %resolved, "renamed to avoid sibling collision");
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn siblings(names: &[&str]) -> Vec<(i64, String)> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as i64 + 100, n.to_string()))
            .collect()
    }

    #[test]
    fn suffix_is_split_only_when_numeric() {
        assert_eq!(split_suffix("Home (2)"), ("Home", Some(2)));
        assert_eq!(split_suffix("Home (x)"), ("Home (x)", None));
        assert_eq!(split_suffix("Home"), ("Home", None));
        assert_eq!(split_suffix("(3)"), ("(3)", None));
    }

    #[test]
    fn similar_names_sort_numerically() {
        let mut names = vec!["Home (10)", "home", "Home (2)", "Home (1)", "About"];
        names.sort_by(|a, b| compare_similar_names(a, b));
        assert_eq!(names, vec!["About", "home", "Home (1)", "Home (2)", "Home (10)"]);
    }

    #[test]
    fn free_name_is_kept() {
        assert_eq!(resolve_unique_name("Home", 0, &siblings(&["Homepage"])), "Home");
    }

    #[test]
    fn taken_names_get_the_next_suffix() {
        let existing = siblings(&["Home", "Home (1)"]);
        assert_eq!(resolve_unique_name("Home", 0, &existing), "Home (2)");
    }

    #[test]
    fn collisions_are_case_insensitive() {
        assert_eq!(resolve_unique_name("home", 0, &siblings(&["Home"])), "home (1)");
    }

    #[test]
    fn first_free_suffix_fills_a_gap() {
        let existing = siblings(&["Home", "Home (2)"]);
        assert_eq!(resolve_unique_name("Home", 0, &existing), "Home (1)");
    }

    #[test]
    fn own_row_is_ignored() {
        let existing = siblings(&["Home"]);
        assert_eq!(resolve_unique_name("Home", 100, &existing), "Home");
    }
}
