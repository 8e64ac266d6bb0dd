//! A minimal in-memory element tree.
//!
//! This is the reference document the selector resolver is exercised and
//! tested against, and the page double behind the fake actuator in engine
//! tests. It implements exactly the query grammar synthesis emits plus the
//! small path-expression subset; the production page uses its native selector
//! engines over CDP.

use std::collections::HashMap;

use crate::selector::{Locator, PathPredicate, PathSegment, SegmentQuery};

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: String,
    pub id: Option<String>,
    pub attrs: HashMap<String, String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Control value, for form elements.
    pub value: String,
    pub checked: bool,
    /// Text content, for content-editable targets.
    pub text: String,
    pub content_editable: bool,
}

impl ElementNode {
    fn new(tag: &str, parent: Option<NodeId>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            id: None,
            attrs: HashMap::new(),
            parent,
            children: Vec::new(),
            value: String::new(),
            checked: false,
            text: String::new(),
            content_editable: false,
        }
    }

    pub fn input_type(&self) -> Option<&str> {
        self.attrs.get("type").map(|s| s.as_str())
    }
}

/// Arena-indexed element tree with a fixed `html` root.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<ElementNode>,
    pub url: String,
    pub title: String,
}

impl Document {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            nodes: vec![ElementNode::new("html", None)],
            url: url.to_string(),
            title: title.to_string(),
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &ElementNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ElementNode {
        &mut self.nodes[id]
    }

    pub fn append(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ElementNode::new(tag, Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    pub fn append_with_id(&mut self, parent: NodeId, tag: &str, element_id: &str) -> NodeId {
        let node = self.append(parent, tag);
        self.nodes[node].id = Some(element_id.to_string());
        node
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.nodes[node]
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    /// 1-based position of a node among siblings sharing its tag.
    pub fn ordinal(&self, node: NodeId) -> usize {
        let Some(parent) = self.nodes[node].parent else {
            return 1;
        };
        let tag = &self.nodes[node].tag;
        let mut nth = 1;
        for &sibling in &self.nodes[parent].children {
            if sibling == node {
                break;
            }
            if &self.nodes[sibling].tag == tag {
                nth += 1;
            }
        }
        nth
    }

    /// Ancestor facts for synthesis, ordered target-first. The walk stops
    /// after the first element carrying an id, mirroring the capture script.
    pub fn element_path(&self, node: NodeId) -> Vec<PathSegment> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let n = &self.nodes[id];
            let has_id = n.id.as_deref().is_some_and(|s| !s.is_empty());
            path.push(PathSegment::new(
                &n.tag,
                n.id.as_deref(),
                self.ordinal(id),
            ));
            if has_id {
                break;
            }
            current = n.parent;
        }
        path
    }

    /// All node ids in document (depth-first) order.
    fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    fn matches(&self, node: NodeId, segment: &SegmentQuery) -> bool {
        let n = &self.nodes[node];
        if let Some(tag) = &segment.tag {
            if &n.tag != tag {
                return false;
            }
        }
        if let Some(id) = &segment.id {
            if n.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if let Some(nth) = segment.nth {
            if self.ordinal(node) != nth {
                return false;
            }
        }
        true
    }

    /// First match for a parsed locator, in document order.
    pub fn query(&self, locator: &Locator) -> Option<NodeId> {
        match locator {
            Locator::Structural(segments) => {
                let (first, rest) = segments.split_first()?;
                for start in self.walk() {
                    if !self.matches(start, first) {
                        continue;
                    }
                    if let Some(found) = self.descend(start, rest) {
                        return Some(found);
                    }
                }
                None
            }
            Locator::Path(expr) => {
                for node in self.walk() {
                    if self.nodes[node].tag != expr.tag {
                        continue;
                    }
                    let ok = match &expr.predicate {
                        None => true,
                        Some(PathPredicate::Id(id)) => {
                            self.nodes[node].id.as_deref() == Some(id.as_str())
                        }
                        Some(PathPredicate::Position(n)) => self.ordinal(node) == *n,
                    };
                    if ok {
                        return Some(node);
                    }
                }
                None
            }
        }
    }

    /// Walk child segments below `from`, one level per segment.
    fn descend(&self, from: NodeId, segments: &[SegmentQuery]) -> Option<NodeId> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(from);
        };
        for &child in &self.nodes[from].children {
            if self.matches(child, first) {
                if let Some(found) = self.descend(child, rest) {
                    return Some(found);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{resolve, synthesize};

    /// html > body with a form (two inputs, a select) and two divs.
    fn sample_document() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("https://example.com/", "Example");
        let body = doc.append(doc.root(), "body");
        let form = doc.append(body, "form");
        let _first_input = doc.append(form, "input");
        let second_input = doc.append(form, "input");
        let select = doc.append_with_id(form, "select", "country");
        let _div_a = doc.append(body, "div");
        let div_b = doc.append(body, "div");
        let _ = doc.append(div_b, "span");
        let _ = select;
        (doc, second_input, div_b)
    }

    #[test]
    fn synthesis_round_trips_through_resolution() {
        let (doc, second_input, div_b) = sample_document();

        for target in [second_input, div_b] {
            let locator = synthesize(&doc.element_path(target));
            let found = resolve(&doc, &[&locator]);
            assert_eq!(found, Some(target), "locator {:?} should round-trip", locator);
        }
    }

    #[test]
    fn id_rooted_paths_resolve() {
        let (doc, ..) = sample_document();
        let locator = Locator::parse("select#country").unwrap();
        let node = doc.query(&locator).expect("select should resolve");
        assert_eq!(doc.node(node).tag, "select");
    }

    #[test]
    fn nth_of_type_distinguishes_siblings() {
        let (doc, second_input, _) = sample_document();
        let first = doc
            .query(&Locator::parse("html > body > form > input").unwrap())
            .unwrap();
        let second = doc
            .query(&Locator::parse("html > body > form > input:nth-of-type(2)").unwrap())
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(second, second_input);
    }

    #[test]
    fn path_expressions_resolve() {
        let (doc, _, div_b) = sample_document();
        let by_id = doc
            .query(&Locator::parse("//select[@id='country']").unwrap())
            .unwrap();
        assert_eq!(doc.node(by_id).id.as_deref(), Some("country"));

        let by_position = doc.query(&Locator::parse("//div[2]").unwrap()).unwrap();
        assert_eq!(by_position, div_b);
    }

    #[test]
    fn misses_and_malformed_candidates_fall_through() {
        let (doc, _, div_b) = sample_document();
        let found = resolve(&doc, &["nav > ul", ":::", "html > body > div:nth-of-type(2)"]);
        assert_eq!(found, Some(div_b));
        assert_eq!(resolve(&doc, &["section"]), None);
    }
}
