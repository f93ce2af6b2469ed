//! HTML to normalized text.
//!
//! Page chrome (navigation, headers, footers, sidebars) and non-content
//! elements are skipped, the main content region is preferred when one can be
//! identified, and whitespace is normalized so that layout-only edits do not
//! show up as content changes.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use sha2::{Digest, Sha256};

/// Elements whose subtrees never contribute text.
const EXCLUDED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside",
];

/// Content root candidates, most specific first.
static ROOT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "main",
        "article",
        r#"[role="main"]"#,
        "div.content",
        "div.main-content",
        "div.article-content",
        "body",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("valid content root selector"))
    .collect()
});

/// Extract the significant text of an HTML document.
///
/// Each text node contributes its trimmed lines; blank lines are dropped and
/// the result is joined with `\n`.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let root = content_root(&doc);
    let root_id = root.id();

    let mut lines: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root_id)
            .any(|a| is_excluded(a.value()));
        if hidden {
            continue;
        }

        lines.extend(text.lines().map(str::trim).filter(|l| !l.is_empty()));
    }

    lines.join("\n")
}

/// First content root candidate that is not itself inside page chrome.
fn content_root(doc: &Html) -> ElementRef<'_> {
    ROOT_SELECTORS
        .iter()
        .find_map(|sel| {
            doc.select(sel)
                .find(|el| !el.ancestors().any(|a| is_excluded(a.value())))
        })
        .unwrap_or_else(|| doc.root_element())
}

fn is_excluded(node: &Node) -> bool {
    node.as_element()
        .is_some_and(|el| EXCLUDED_ELEMENTS.contains(&el.name()))
}

/// Lowercase hex SHA-256 of normalized content.
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
