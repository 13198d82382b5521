use std::collections::HashMap;

use spans::{FinalizedSpanTree, Interval, Span};

/// One row of the span table
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRow {
    pub span: Span,
    /// Time the span spent executing its own work, if computed
    pub non_idle_execution_time: Option<i64>,
    /// Intervals during which the span was not waiting on a child
    pub non_idle_intervals: Vec<Interval>,
    /// Container the span's service runs in, if known
    pub container_name: Option<String>,
}

impl SpanRow {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            non_idle_execution_time: None,
            non_idle_intervals: Vec::new(),
            container_name: None,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.span.trace_id
    }
}

/// Produces one row per span of a finalized tree.
///
/// `containers` maps service names to container names; services without an
/// entry get no container.
pub fn span_rows(tree: &FinalizedSpanTree, containers: &HashMap<String, String>) -> Vec<SpanRow> {
    tree.iter()
        .map(|(_, span, non_idle)| {
            let mut row = SpanRow::new(span.clone());
            row.non_idle_execution_time = Some(non_idle.execution_time);
            row.non_idle_intervals = non_idle.intervals.clone();
            row.container_name = containers.get(&span.service).cloned();
            row
        })
        .collect()
}

/// Groups rows by trace id, preserving the order traces first appear in
pub fn group_by_trace(rows: &[SpanRow]) -> Vec<(&str, Vec<&SpanRow>)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&SpanRow>)> = Vec::new();

    for row in rows {
        let trace_id = row.trace_id();
        let position = *positions.entry(trace_id).or_insert_with(|| {
            groups.push((trace_id, Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(row);
    }

    groups
}

/// Keeps only the rows of one container, or all rows if `container` is `None`
pub fn filter_container(rows: Vec<SpanRow>, container: Option<&str>) -> Vec<SpanRow> {
    let Some(container) = container else {
        return rows;
    };

    let before = rows.len();
    let kept: Vec<SpanRow> = rows
        .into_iter()
        .filter(|row| row.container_name.as_deref() == Some(container))
        .collect();
    log::info!(
        "Kept {} of {} spans belonging to container {}",
        kept.len(),
        before,
        container
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use spans::{RawSpan, SpanTree};

    fn row(trace_id: &str, span_id: &str, container: Option<&str>) -> SpanRow {
        let mut row = SpanRow::new(Span::new(trace_id, span_id, "svc", "op", 0, 10));
        row.container_name = container.map(str::to_string);
        row
    }

    #[test]
    fn test_group_by_trace_preserves_first_appearance() {
        let rows = vec![row("b", "1", None), row("a", "2", None), row("b", "3", None)];
        let groups = group_by_trace(&rows);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "a");
    }

    #[test]
    fn test_filter_container() {
        let rows = vec![row("t", "1", Some("web")), row("t", "2", Some("db")), row("t", "3", None)];

        let kept = filter_container(rows.clone(), Some("web"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].span.span_id, "1");
        assert_eq!(filter_container(rows, None).len(), 3);
    }

    #[test]
    fn test_span_rows_carry_non_idle_results() {
        let tree = SpanTree::build(vec![
            RawSpan::root(Span::new("t", "p", "frontend", "GET", 0, 100)),
            RawSpan::child_of(Span::new("t", "c", "backend", "query", 20, 30), "p"),
        ])
        .finalize();
        let containers = HashMap::from([("frontend".to_string(), "web".to_string())]);

        let rows = span_rows(&tree, &containers);
        let parent = rows.iter().find(|row| row.span.span_id == "p").unwrap();
        let child = rows.iter().find(|row| row.span.span_id == "c").unwrap();

        assert_eq!(parent.non_idle_execution_time, Some(70));
        assert_eq!(
            parent.non_idle_intervals,
            vec![
                Interval { start: 0, end: 20 },
                Interval {
                    start: 50,
                    end: 100
                }
            ]
        );
        assert_eq!(parent.container_name.as_deref(), Some("web"));
        assert_eq!(child.container_name, None);
    }
}
