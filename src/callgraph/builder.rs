use super::resolver::ServiceResolver;
use crate::error_handling::types::GraphError;
use crate::trace::{Direction, EventRecord};
use log::{debug, info};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

/// A directed service-to-service call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Deduplicated callgraph. Edges keep the order of their first insertion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallGraph {
    edges: Vec<Edge>,
    seen: HashSet<(String, String)>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the pair was already present.
    pub fn insert(&mut self, edge: Edge) -> bool {
        if !self.seen.insert((edge.from.clone(), edge.to.clone())) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Renders the graph as a Graphviz `digraph`.
    pub fn render(&self) -> String {
        let mut out = String::from("digraph G {\n");
        for edge in &self.edges {
            let _ = writeln!(
                out,
                "    \"{}\" -> \"{}\"",
                escape(&edge.from),
                escape(&edge.to)
            );
        }
        out.push_str("}\n");
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), GraphError> {
        std::fs::write(path, self.render())
            .map_err(|e| GraphError::WriteFailed(path.to_path_buf(), e))?;
        info!("Wrote {} edges to {}", self.len(), path.display());
        Ok(())
    }
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Maps event records onto service names and collects the resulting edges.
///
/// Outbound events make the local container the caller of the service that
/// owns the remote port; inbound events make that service the caller.
pub struct CallgraphBuilder<'a> {
    resolver: &'a ServiceResolver,
    graph: CallGraph,
    unmapped: usize,
}

impl<'a> CallgraphBuilder<'a> {
    pub fn new(resolver: &'a ServiceResolver) -> Self {
        Self {
            resolver,
            graph: CallGraph::new(),
            unmapped: 0,
        }
    }

    pub fn add(&mut self, record: &EventRecord) {
        let Some(service) = self.resolver.resolve(record.port) else {
            debug!(
                "No service on port {} ({} {}), dropping record",
                record.port, record.container, record.direction
            );
            self.unmapped += 1;
            return;
        };

        let edge = match record.direction {
            Direction::Outbound => Edge::new(record.container.as_str(), service),
            Direction::Inbound => Edge::new(service, record.container.as_str()),
        };
        self.graph.insert(edge);
    }

    pub fn extend<'r, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = &'r EventRecord>,
    {
        for record in records {
            self.add(record);
        }
    }

    /// Number of records dropped because their port is not mapped.
    pub fn unmapped(&self) -> usize {
        self.unmapped
    }

    pub fn build(self) -> CallGraph {
        if self.unmapped > 0 {
            debug!("{} records had no mapped service", self.unmapped);
        }
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn nova_resolver() -> ServiceResolver {
        [(8774, "nova-api".to_string()), (5000, "keystone".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_direction_rule() {
        let resolver = nova_resolver();
        let mut builder = CallgraphBuilder::new(&resolver);
        builder.add(&EventRecord::new("web1", Direction::Inbound, 8774));
        builder.add(&EventRecord::new("web1", Direction::Outbound, 8774));
        let graph = builder.build();

        assert_eq!(
            graph.edges(),
            &[Edge::new("nova-api", "web1"), Edge::new("web1", "nova-api")]
        );
    }

    #[test]
    fn test_duplicate_pairs_collapse() {
        let resolver = nova_resolver();
        let records = vec![
            EventRecord::new("web1", Direction::Outbound, 8774),
            EventRecord::new("web1", Direction::Outbound, 8774),
            EventRecord::new("web1", Direction::Outbound, 5000),
            EventRecord::new("web1", Direction::Outbound, 8774),
        ];
        let mut builder = CallgraphBuilder::new(&resolver);
        builder.extend(&records);
        let graph = builder.build();

        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.render(),
            "digraph G {\n    \"web1\" -> \"nova-api\"\n    \"web1\" -> \"keystone\"\n}\n"
        );
    }

    #[test]
    fn test_unmapped_port_contributes_nothing() {
        let resolver = nova_resolver();
        let mut builder = CallgraphBuilder::new(&resolver);
        builder.add(&EventRecord::new("web1", Direction::Inbound, 49152));
        assert_eq!(builder.unmapped(), 1);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_empty_graph_render() {
        assert_eq!(CallGraph::new().render(), "digraph G {\n}\n");
    }

    #[test]
    fn test_names_are_escaped() {
        let mut graph = CallGraph::new();
        graph.insert(Edge::new("we\"ird", "back\\slash"));
        assert_eq!(
            graph.render(),
            "digraph G {\n    \"we\\\"ird\" -> \"back\\\\slash\"\n}\n"
        );
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let mut graph = CallGraph::new();
        assert!(graph.insert(Edge::new("a", "b")));
        assert!(!graph.insert(Edge::new("a", "b")));
        assert!(graph.insert(Edge::new("b", "a")));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_write_to() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("callgraph.dot");
        let mut graph = CallGraph::new();
        graph.insert(Edge::new("a", "b"));
        graph.write_to(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), graph.render());
    }

    #[test]
    fn test_write_to_missing_dir() {
        let err = CallGraph::new()
            .write_to(Path::new("/nonexistent/dir/graph.dot"))
            .unwrap_err();
        assert!(matches!(err, GraphError::WriteFailed(_, _)));
    }
}
