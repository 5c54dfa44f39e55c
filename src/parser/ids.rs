use super::hierarchy::Node;

/// One output row. `pid == 0` marks a province.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatRecord {
    pub id: u32,
    pub pid: u32,
    pub code: u32,
    pub name: String,
}

/// Pre-order walk assigning ids from a single counter starting at 1.
pub fn assign(tree: &[Node]) -> Vec<FlatRecord> {
    let mut out = Vec::new();
    let mut next_id = 0;
    for root in tree {
        visit(root, 0, &mut next_id, &mut out);
    }
    out
}

fn visit(node: &Node, pid: u32, next_id: &mut u32, out: &mut Vec<FlatRecord>) {
    *next_id += 1;
    let id = *next_id;
    out.push(FlatRecord {
        id,
        pid,
        code: node.code,
        name: node.name.clone(),
    });
    for child in &node.children {
        visit(child, id, next_id, out);
    }
}

// ── Tests ──
