use crate::domain::models::test_item::{ItemKind, ItemSnapshot};

/// Unicode box-drawing characters for tree visualization
const TREE_BRANCH: &str = "├── ";
const TREE_LAST: &str = "└── ";
const TREE_PIPE: &str = "│   ";
const TREE_SPACE: &str = "    ";

/// Render a forest of test items, one tree per converter root.
pub fn render_item_tree(roots: &[ItemSnapshot], use_color: bool) -> String {
    let mut output = String::new();

    for (i, root) in roots.iter().enumerate() {
        render_node(root, 0, true, "", use_color, &mut output);

        // Blank line between converters
        if i < roots.len() - 1 {
            output.push('\n');
        }
    }

    output
}

fn render_node(
    item: &ItemSnapshot,
    depth: usize,
    is_last: bool,
    prefix: &str,
    use_color: bool,
    output: &mut String,
) {
    let connector = if depth == 0 {
        ""
    } else if is_last {
        TREE_LAST
    } else {
        TREE_BRANCH
    };

    let mut line = format!(
        "{}{}{} {}",
        prefix,
        connector,
        render_kind_colored(item.kind, use_color),
        item.label
    );
    if let Some(description) = &item.description {
        line.push_str(&format!(" ({description})"));
    }
    if item.busy {
        line.push_str(" [discovering]");
    }
    if let Some(error) = item.error.as_deref().and_then(|e| e.lines().next()) {
        line.push_str(&format!(": {error}"));
    }
    output.push_str(&line);
    output.push('\n');

    let child_prefix = if depth == 0 {
        String::new()
    } else if is_last {
        format!("{prefix}{TREE_SPACE}")
    } else {
        format!("{prefix}{TREE_PIPE}")
    };

    for (i, child) in item.children.iter().enumerate() {
        let is_last_child = i == item.children.len() - 1;
        render_node(child, depth + 1, is_last_child, &child_prefix, use_color, output);
    }
}

/// Icon for an item kind, optionally wrapped in ANSI color codes
pub fn render_kind_colored(kind: ItemKind, use_color: bool) -> String {
    let icon = kind_icon(kind);

    if use_color {
        format!("\x1b[{}m{}\x1b[0m", kind_ansi_color(kind), icon)
    } else {
        icon.to_string()
    }
}

fn kind_icon(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Suite => "◆",
        ItemKind::Test => "○",
        ItemKind::DiscoveryError => "✗",
    }
}

fn kind_ansi_color(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Suite => "36",          // Cyan
        ItemKind::Test => "37",           // White
        ItemKind::DiscoveryError => "31", // Red
    }
}

/// Count the items of a forest, roots included.
pub fn count_items(roots: &[ItemSnapshot]) -> usize {
    roots
        .iter()
        .map(|root| 1 + count_items(&root.children))
        .sum()
}
