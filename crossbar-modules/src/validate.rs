//! Import-graph validation.
//!
//! The builder snapshots the import graph into plain nodes and walks it
//! depth first, marking nodes pending while their imports are on the walk
//! and ready once finished. A pending node reached again closes a cycle;
//! the error carries the full path around it.

use std::collections::HashMap;

use crate::error::ModuleError;

pub(crate) struct GraphNode {
    pub(crate) name: String,
    pub(crate) imports: Vec<u64>,
}

enum Mark {
    Pending,
    Ready,
}

pub(crate) fn detect_cycles(
    root: u64,
    nodes: &HashMap<u64, GraphNode>,
) -> Result<(), ModuleError> {
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    visit(root, nodes, &mut marks, &mut path)
}

fn visit(
    id: u64,
    nodes: &HashMap<u64, GraphNode>,
    marks: &mut HashMap<u64, Mark>,
    path: &mut Vec<String>,
) -> Result<(), ModuleError> {
    let Some(node) = nodes.get(&id) else {
        return Ok(());
    };
    match marks.get(&id) {
        Some(Mark::Ready) => return Ok(()),
        Some(Mark::Pending) => {
            let start = path.iter().position(|name| *name == node.name).unwrap_or(0);
            let mut cycle: Vec<&str> = path[start..].iter().map(String::as_str).collect();
            cycle.push(&node.name);
            return Err(ModuleError::CircularModuleImport {
                path: cycle
                    .iter()
                    .map(|name| format!("\"{name}\""))
                    .collect::<Vec<_>>()
                    .join(" -> "),
            });
        }
        None => {}
    }
    marks.insert(id, Mark::Pending);
    path.push(node.name.clone());
    for import in &node.imports {
        visit(*import, nodes, marks, path)?;
    }
    path.pop();
    marks.insert(id, Mark::Ready);
    Ok(())
}
