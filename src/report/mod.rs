//! Usage reporting: the pruned side of a liveness result, rendered in the
//! classic usage-list layout (one class per line, removed members indented
//! beneath their class) or as JSON.

use crate::graph::{ClassDef, ProgramGraph};
use crate::shaking::LivenessResult;
use serde_json::json;

/// Renders the items a trace proved dead.
pub struct UsageReport<'a> {
    graph: &'a ProgramGraph,
    result: &'a LivenessResult,
}

impl<'a> UsageReport<'a> {
    pub fn new(graph: &'a ProgramGraph, result: &'a LivenessResult) -> Self {
        Self { graph, result }
    }

    fn sorted_program_classes(&self) -> Vec<&'a ClassDef> {
        let mut classes: Vec<&ClassDef> = self.graph.program_classes().collect();
        classes.sort_by_key(|c| self.graph.class_name(c.id));
        classes
    }

    fn dead_member_lines(&self, class: &ClassDef) -> Vec<String> {
        let mut lines = Vec::new();
        for &field in &class.fields {
            if !self.result.is_field_live(field) {
                lines.push(format!("    {}", self.graph.field_name(field)));
            }
        }
        for &method in &class.methods {
            if !self.result.is_method_live(method) {
                let (name, descriptor) = self.graph.method_signature(method);
                lines.push(format!("    {name}{descriptor}"));
            }
        }
        lines
    }

    /// Text layout: a fully dead class is one line; a live class with dead
    /// members is a class line followed by indented member lines.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for class in self.sorted_program_classes() {
            let name = self.graph.class_name(class.id);
            if !self.result.is_class_live(class.id) {
                out.push_str(name);
                out.push('\n');
                continue;
            }
            let members = self.dead_member_lines(class);
            if !members.is_empty() {
                out.push_str(name);
                out.push('\n');
                for line in members {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut dead_classes = Vec::new();
        let mut partially_dead = Vec::new();
        for class in self.sorted_program_classes() {
            let name = self.graph.class_name(class.id);
            if !self.result.is_class_live(class.id) {
                dead_classes.push(name.to_string());
                continue;
            }
            let members: Vec<String> = self
                .dead_member_lines(class)
                .into_iter()
                .map(|line| line.trim_start().to_string())
                .collect();
            if !members.is_empty() {
                partially_dead.push(json!({ "class": name, "members": members }));
            }
        }
        json!({
            "dead_classes": dead_classes,
            "partially_dead": partially_dead,
            "stats": self.result.stats(self.graph),
        })
    }
}
