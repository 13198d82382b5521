use std::collections::HashMap;

use crate::{NonIdle, RawSpan, ReferenceKind, Span};

/// Stable index of a span within a [`SpanTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    span: Span,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena of spans with resolved parent/child edges.
///
/// Spans are stored in input order and referenced by [`NodeId`]. Edges only
/// connect spans of the same trace, so a single tree may hold any number of
/// traces side by side. The tree has no mutation API once built; call
/// [`SpanTree::finalize`] to compute the derived non-idle data.
#[derive(Debug, Clone, Default)]
pub struct SpanTree {
    nodes: Vec<Node>,
    index: HashMap<(String, String), NodeId>,
    roots: Vec<NodeId>,
}

impl SpanTree {
    /// Builds a tree by resolving each span's `CHILD_OF` references.
    ///
    /// Resolution is tolerant of partial fetches:
    ///
    /// * a reference to a parent that is not in `spans` is skipped with a warning
    /// * a span whose id was already seen in the same trace is dropped with a warning
    /// * a span that references itself keeps no edge for that reference
    /// * if a span has several resolvable `CHILD_OF` references, the first wins
    ///
    /// Spans left without a parent are roots.
    pub fn build(spans: Vec<RawSpan>) -> Self {
        let mut tree = SpanTree::default();
        let mut references = Vec::with_capacity(spans.len());

        for raw in spans {
            let key = (raw.span.trace_id.clone(), raw.span.span_id.clone());
            if tree.index.contains_key(&key) {
                log::warn!(
                    "Dropping duplicate span {} in trace {}",
                    raw.span.span_id,
                    raw.span.trace_id
                );
                continue;
            }

            let id = NodeId(tree.nodes.len());
            tree.index.insert(key, id);
            tree.nodes.push(Node {
                span: raw.span,
                parent: None,
                children: Vec::new(),
            });
            references.push(raw.references);
        }

        for (position, refs) in references.into_iter().enumerate() {
            let child = NodeId(position);
            for reference in refs {
                if reference.kind != ReferenceKind::ChildOf {
                    continue;
                }

                let trace_id = &tree.nodes[position].span.trace_id;
                let Some(&parent) = tree
                    .index
                    .get(&(trace_id.clone(), reference.span_id.clone()))
                else {
                    log::warn!(
                        "Skipping CHILD_OF reference from span {} to missing parent {} in trace {}",
                        tree.nodes[position].span.span_id,
                        reference.span_id,
                        trace_id
                    );
                    continue;
                };

                if parent == child {
                    log::warn!(
                        "Skipping self reference on span {}",
                        tree.nodes[position].span.span_id
                    );
                    continue;
                }

                if let Some(existing) = tree.nodes[position].parent {
                    log::debug!(
                        "Span {} already has parent {}, ignoring additional parent {}",
                        tree.nodes[position].span.span_id,
                        tree.nodes[existing.0].span.span_id,
                        reference.span_id
                    );
                    continue;
                }

                tree.nodes[position].parent = Some(parent);
                tree.nodes[parent.0].children.push(child);
            }
        }

        tree.roots = tree
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(position, _)| NodeId(position))
            .collect();

        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn span(&self, id: NodeId) -> &Span {
        &self.nodes[id.0].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Looks up a span by trace and span id.
    pub fn find(&self, trace_id: &str, span_id: &str) -> Option<NodeId> {
        self.index
            .get(&(trace_id.to_string(), span_id.to_string()))
            .copied()
    }

    /// Iterates over all spans in input order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Span)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (NodeId(position), &node.span))
    }

    /// Computes non-idle data for every span in a single pass.
    ///
    /// Consumes the tree so the derived data can never go stale.
    pub fn finalize(self) -> FinalizedSpanTree {
        let non_idle = (0..self.nodes.len())
            .map(|position| {
                let node = &self.nodes[position];
                let children: Vec<&Span> = node
                    .children
                    .iter()
                    .map(|child| &self.nodes[child.0].span)
                    .collect();
                NonIdle::compute(&node.span, &children)
            })
            .collect();

        FinalizedSpanTree {
            tree: self,
            non_idle,
        }
    }
}

/// A read-only [`SpanTree`] with non-idle data computed for every span
#[derive(Debug, Clone)]
pub struct FinalizedSpanTree {
    tree: SpanTree,
    non_idle: Vec<NonIdle>,
}

impl FinalizedSpanTree {
    pub fn tree(&self) -> &SpanTree {
        &self.tree
    }

    pub fn non_idle(&self, id: NodeId) -> &NonIdle {
        &self.non_idle[id.0]
    }

    /// Iterates over all spans in input order together with their non-idle data.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Span, &NonIdle)> {
        self.tree
            .iter()
            .map(move |(id, span)| (id, span, &self.non_idle[id.0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Interval, SpanReference};

    fn span(trace: &str, id: &str, start: i64, duration: i64) -> Span {
        Span::new(trace, id, "svc", "op", start, duration)
    }

    #[test]
    fn test_build_resolves_child_of_edges() {
        let tree = SpanTree::build(vec![
            RawSpan::child_of(span("t", "b", 10, 20), "a"),
            RawSpan::root(span("t", "a", 0, 100)),
            RawSpan::child_of(span("t", "c", 50, 10), "a"),
        ]);

        let a = tree.find("t", "a").unwrap();
        let b = tree.find("t", "b").unwrap();
        let c = tree.find("t", "c").unwrap();

        assert_eq!(tree.roots(), &[a]);
        assert_eq!(tree.children(a), &[b, c]);
        assert_eq!(tree.parent(b), Some(a));
        assert_eq!(tree.parent(a), None);
    }

    #[test]
    fn test_missing_parent_becomes_root_with_warning() {
        testing_logger::setup();

        let tree = SpanTree::build(vec![
            RawSpan::root(span("t", "a", 0, 100)),
            RawSpan::child_of(span("t", "orphan", 10, 5), "gone"),
        ]);

        assert_eq!(tree.roots().len(), 2);

        testing_logger::validate(|captured_logs| {
            let warnings: Vec<_> = captured_logs
                .iter()
                .filter(|log| log.level == log::Level::Warn)
                .collect();
            assert_eq!(warnings.len(), 1);
            assert!(warnings[0].body.contains("missing parent gone"));
        });
    }

    #[test]
    fn test_edges_never_cross_traces() {
        let tree = SpanTree::build(vec![
            RawSpan::root(span("t1", "a", 0, 100)),
            RawSpan::child_of(span("t2", "b", 10, 5), "a"),
        ]);

        let a = tree.find("t1", "a").unwrap();
        assert!(tree.children(a).is_empty());
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn test_duplicate_span_is_dropped() {
        let tree = SpanTree::build(vec![
            RawSpan::root(span("t", "a", 0, 100)),
            RawSpan::root(span("t", "a", 5, 10)),
        ]);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.span(tree.find("t", "a").unwrap()).start_time, 0);
    }

    #[test]
    fn test_follows_from_does_not_create_edge() {
        let follows = SpanReference {
            kind: ReferenceKind::FollowsFrom,
            span_id: "a".to_string(),
        };
        let tree = SpanTree::build(vec![
            RawSpan::root(span("t", "a", 0, 100)),
            RawSpan::new(span("t", "b", 100, 10), vec![follows]),
        ]);

        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn test_finalize_computes_every_span() {
        let tree = SpanTree::build(vec![
            RawSpan::root(span("t", "root", 0, 100)),
            RawSpan::child_of(span("t", "x", 10, 20), "root"),
            RawSpan::child_of(span("t", "y", 20, 5), "root"),
            RawSpan::child_of(span("t", "z", 12, 4), "x"),
        ]);
        let finalized = tree.finalize();

        let root = finalized.tree().find("t", "root").unwrap();
        let x = finalized.tree().find("t", "x").unwrap();
        let y = finalized.tree().find("t", "y").unwrap();

        assert_eq!(finalized.non_idle(root).execution_time, 80);
        assert_eq!(
            finalized.non_idle(root).intervals,
            vec![
                Interval { start: 0, end: 10 },
                Interval {
                    start: 30,
                    end: 100
                }
            ]
        );
        assert_eq!(finalized.non_idle(x).execution_time, 16);
        assert_eq!(finalized.non_idle(y).execution_time, 5);
        assert_eq!(finalized.iter().count(), 4);
    }
}
