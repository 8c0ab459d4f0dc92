//! Positional XPath subset: `/tag[n]`, `//tag[n]` and `*` steps.

use std::collections::HashMap;

use crate::dom::{DomTree, NodeId};
use crate::errors::PerceiverError;

#[derive(Debug, Clone, PartialEq)]
struct Step {
    descendant: bool,
    name: Option<String>,
    position: Option<usize>,
}

pub fn evaluate<T: DomTree + ?Sized>(tree: &T, expression: &str) -> Result<Vec<NodeId>, PerceiverError> {
    let steps = parse(expression)?;
    // `None` stands for the document node above the document element.
    let mut context: Vec<Option<NodeId>> = vec![None];
    for step in &steps {
        let mut next = Vec::new();
        for ctx in &context {
            let bases: Vec<Option<NodeId>> = if step.descendant {
                let mut all = vec![*ctx];
                all.extend(descendants_of(tree, *ctx).into_iter().map(Some));
                all
            } else {
                vec![*ctx]
            };
            for base in bases {
                let matching: Vec<NodeId> = children_of(tree, base)
                    .into_iter()
                    .filter(|child| match &step.name {
                        Some(name) => tree.tag_name(*child).as_deref() == Some(name.as_str()),
                        None => true,
                    })
                    .collect();
                match step.position {
                    Some(n) => next.extend(matching.get(n - 1).copied()),
                    None => next.extend(matching),
                }
            }
        }
        context = dedup(tree, next).into_iter().map(Some).collect();
        if context.is_empty() {
            break;
        }
    }
    Ok(context.into_iter().flatten().collect())
}

fn children_of<T: DomTree + ?Sized>(tree: &T, node: Option<NodeId>) -> Vec<NodeId> {
    match node {
        Some(node) => tree.children(node),
        None => tree.document_element().into_iter().collect(),
    }
}

fn descendants_of<T: DomTree + ?Sized>(tree: &T, node: Option<NodeId>) -> Vec<NodeId> {
    match node {
        Some(node) => tree.descendants(node),
        None => tree.all_elements(),
    }
}

fn dedup<T: DomTree + ?Sized>(tree: &T, nodes: Vec<NodeId>) -> Vec<NodeId> {
    if nodes.len() < 2 {
        return nodes;
    }
    let order: HashMap<NodeId, usize> = tree
        .all_elements()
        .into_iter()
        .enumerate()
        .map(|(i, node)| (node, i))
        .collect();
    let mut nodes = nodes;
    nodes.sort_by_key(|node| order.get(node).copied().unwrap_or(usize::MAX));
    nodes.dedup();
    nodes
}

fn parse(expression: &str) -> Result<Vec<Step>, PerceiverError> {
    let invalid = || PerceiverError::InvalidXPath(expression.to_string());
    let trimmed = expression.trim();
    if !trimmed.starts_with('/') {
        return Err(invalid());
    }
    let mut steps = Vec::new();
    let mut rest = trimmed;
    while !rest.is_empty() {
        let descendant = if let Some(after) = rest.strip_prefix("//") {
            rest = after;
            true
        } else if let Some(after) = rest.strip_prefix('/') {
            rest = after;
            false
        } else {
            return Err(invalid());
        };
        let end = rest.find('/').unwrap_or(rest.len());
        let (raw, tail) = rest.split_at(end);
        rest = tail;
        steps.push(parse_step(raw, descendant).ok_or_else(invalid)?);
    }
    if steps.is_empty() {
        return Err(invalid());
    }
    Ok(steps)
}

fn parse_step(raw: &str, descendant: bool) -> Option<Step> {
    let (name, position) = match raw.find('[') {
        Some(open) => {
            let inner = raw[open + 1..].strip_suffix(']')?;
            let n: usize = inner.trim().parse().ok()?;
            if n == 0 {
                return None;
            }
            (&raw[..open], Some(n))
        }
        None => (raw, None),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let name = if name == "*" {
        None
    } else if name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Some(name.to_ascii_lowercase())
    } else {
        return None;
    };
    Some(Step {
        descendant,
        name,
        position,
    })
}
