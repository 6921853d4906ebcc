use crate::services::extractor::page_label;
use crate::types::{
    FlowchartReport, FlowchartStats, Page, PageGraph, Transition, TransitionKind,
};
use std::collections::HashSet;

pub const MAX_RENDERED_MODALS: usize = 8;

const PAGE_CLASS: &str =
    "classDef pageNode fill:#e0e7ff,stroke:#6366f1,stroke-width:2px";
const MODAL_CLASS: &str =
    "classDef modalNode fill:#fef3c7,stroke:#f59e0b,stroke-width:1px,stroke-dasharray:5 5";

/// Renders a page graph as Mermaid flowchart text.
pub struct DiagramRenderer {
    max_modals: usize,
}

impl DiagramRenderer {
    pub fn new(max_modals: usize) -> Self {
        Self { max_modals }
    }

    pub fn render(&self, graph: &PageGraph) -> String {
        let mut lines = vec!["flowchart TD".to_string()];

        for page in &graph.pages {
            lines.push(format!(
                "    {}[\"{}\"]",
                sanitize_node_id(page),
                escape_label(&page_label(page))
            ));
        }

        let modals = &graph.modals[..graph.modals.len().min(self.max_modals)];
        for modal in modals {
            lines.push(format!(
                "    {}(\"{}\")",
                sanitize_node_id(&modal.name),
                escape_label(&modal.label)
            ));
        }

        let mut edges: Vec<&Transition> = graph.transitions.iter().collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        let mut emitted = HashSet::new();
        for edge in edges {
            let from = sanitize_node_id(&edge.from);
            let to = sanitize_node_id(&edge.to);
            if !emitted.insert((from.clone(), to.clone())) {
                continue;
            }
            let arrow = match edge.kind {
                TransitionKind::Inferred => "-.->",
                _ => "-->",
            };
            lines.push(format!("    {} {} {}", from, arrow, to));
        }

        // Mermaid only applies classes declared after the nodes they target.
        lines.push(format!("    {}", PAGE_CLASS));
        lines.push(format!("    {}", MODAL_CLASS));

        if !graph.pages.is_empty() {
            let ids: Vec<String> = graph.pages.iter().map(|p| sanitize_node_id(p)).collect();
            lines.push(format!("    class {} pageNode", ids.join(",")));
        }
        if !modals.is_empty() {
            let ids: Vec<String> = modals.iter().map(|m| sanitize_node_id(&m.name)).collect();
            lines.push(format!("    class {} modalNode", ids.join(",")));
        }

        lines.join("\n")
    }

    pub fn report(&self, graph: &PageGraph) -> FlowchartReport {
        let pages = graph
            .pages
            .iter()
            .map(|name| Page {
                name: name.clone(),
                label: page_label(name),
                route: None,
            })
            .collect();

        FlowchartReport {
            pages,
            transitions: graph.transitions.clone(),
            modals: graph.modals.clone(),
            mermaid: self.render(graph),
            stats: FlowchartStats {
                page_count: graph.pages.len(),
                transition_count: graph.transitions.len(),
                modal_count: graph.modals.len(),
            },
        }
    }
}

impl Default for DiagramRenderer {
    fn default() -> Self {
        Self::new(MAX_RENDERED_MODALS)
    }
}

/// Replaces every character outside `[A-Za-z0-9]` with `_`.
pub fn sanitize_node_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;")
}
