//! Parsing of dotted relation paths into per-level plan nodes.
//!
//! `["authors.ownPosts", "authors", "meta"]` becomes two nodes at the top
//! level, `authors` with the sub-path `ownPosts` and `meta` with none. Each
//! level is fetched as one concurrent fan-out; a node's sub-paths are parsed
//! again when the loader recurses into its rows.

use std::fmt;

use tracing::trace;

/// One relation name at one nesting level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanNode {
    /// Relation name at this level.
    pub name: String,
    /// Remaining dotted paths beneath this relation, without duplicates.
    pub sub_paths: Vec<String>,
}

impl PlanNode {
    /// Whether the loader must recurse beneath this node.
    pub fn has_sub_paths(&self) -> bool {
        !self.sub_paths.is_empty()
    }
}

/// Relation nodes of one eager-load level, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EagerPlan {
    nodes: Vec<PlanNode>,
}

impl EagerPlan {
    /// Parse relation paths.
    ///
    /// The first occurrence of a name fixes its position; later occurrences
    /// only add their tails. Empty segments are skipped.
    ///
    /// ```rust
    /// use trellis_query::relations::EagerPlan;
    ///
    /// let plan = EagerPlan::parse(["tags", "tags.posts", "blog", "tags.posts"]);
    /// let names: Vec<_> = plan.nodes().iter().map(|n| n.name.as_str()).collect();
    /// assert_eq!(names, ["tags", "blog"]);
    /// assert_eq!(plan.nodes()[0].sub_paths, ["posts"]);
    /// ```
    pub fn parse<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut nodes: Vec<PlanNode> = Vec::new();

        for path in paths {
            let path = path.as_ref().trim();
            let (head, tail) = match path.split_once('.') {
                Some((head, tail)) => (head.trim(), Some(tail.trim())),
                None => (path, None),
            };
            if head.is_empty() {
                continue;
            }

            let index = match nodes.iter().position(|node| node.name == head) {
                Some(index) => index,
                None => {
                    nodes.push(PlanNode {
                        name: head.to_string(),
                        sub_paths: Vec::new(),
                    });
                    nodes.len() - 1
                }
            };

            if let Some(tail) = tail.filter(|tail| !tail.is_empty()) {
                let sub_paths = &mut nodes[index].sub_paths;
                if !sub_paths.iter().any(|existing| existing == tail) {
                    sub_paths.push(tail.to_string());
                }
            }
        }

        trace!(nodes = nodes.len(), "Parsed eager-load plan");
        Self { nodes }
    }

    /// The nodes of this level.
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over the nodes.
    pub fn iter(&self) -> std::slice::Iter<'_, PlanNode> {
        self.nodes.iter()
    }
}

impl IntoIterator for EagerPlan {
    type Item = PlanNode;
    type IntoIter = std::vec::IntoIter<PlanNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// Stage of an eager load, reported in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Plan parsed, nothing built yet.
    Init,
    /// Placeholders and constraints are being built.
    BuildingNodes,
    /// The level's fetches are in flight.
    FetchingLevel,
    /// Nested paths are being loaded beneath fetched rows.
    Recursing,
    /// Fetched rows are being attached to parents.
    Matching,
    /// Every relation of the level is attached.
    Done,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::BuildingNodes => "building_nodes",
            Self::FetchingLevel => "fetching_level",
            Self::Recursing => "recursing",
            Self::Matching => "matching",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nested_paths_group_under_head() {
        let plan = EagerPlan::parse(["authors.ownPosts", "authors", "meta", "authors.site.blogs"]);
        assert_eq!(
            plan.nodes(),
            &[
                PlanNode {
                    name: "authors".into(),
                    sub_paths: vec!["ownPosts".into(), "site.blogs".into()],
                },
                PlanNode {
                    name: "meta".into(),
                    sub_paths: vec![],
                },
            ]
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let plan = EagerPlan::parse(["tags", "tags.posts", "tags", "tags.posts"]);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.nodes()[0].sub_paths, vec!["posts".to_string()]);
        assert!(plan.nodes()[0].has_sub_paths());
    }

    #[test]
    fn test_empty_segments_skipped() {
        let plan = EagerPlan::parse(["", ".blog", "site.", " posts "]);
        let names: Vec<_> = plan.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["site", "posts"]);
        assert!(!plan.nodes()[0].has_sub_paths());
    }

    #[test]
    fn test_empty_plan() {
        assert!(EagerPlan::parse(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_load_state_display() {
        assert_eq!(LoadState::FetchingLevel.to_string(), "fetching_level");
    }
}
