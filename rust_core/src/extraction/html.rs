//! Build a [`PageSnapshot`] from raw HTML.

use super::{PageNode, PageSnapshot};
use scraper::{ElementRef, Html, Selector};

/// Elements whose content is never user-visible text
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

/// Pre-order walk, keeping parent links as snapshot indices.
fn walk(element: ElementRef<'_>, parent: Option<usize>, nodes: &mut Vec<PageNode>) {
    let el = element.value();
    if SKIPPED_TAGS.contains(&el.name()) {
        return;
    }

    let index = nodes.len();
    let mut node = PageNode::new(index, parent, el.name());
    node.attributes = el
        .attrs()
        .map(|(name, value)| (name.to_lowercase(), value.to_string()))
        .collect();
    node.text = collapse(element.text());
    node.own_text = collapse(
        element
            .children()
            .filter_map(|child| child.value().as_text())
            .map(|text| &**text),
    );
    nodes.push(node);

    for child in element.children().filter_map(ElementRef::wrap) {
        walk(child, Some(index), nodes);
    }
}

fn is_error_marker(node: &PageNode) -> bool {
    if node.attr("role") == Some("alert") {
        return true;
    }
    ["class", "data-testid"]
        .iter()
        .filter_map(|name| node.attr(name))
        .any(|value| value.to_lowercase().contains("error"))
}

impl PageSnapshot {
    /// Flatten an HTML document into a snapshot.
    ///
    /// Only `<body>` content is kept; the document `<title>` is recorded
    /// separately. An element with `role="alert"` or an `error` class/test id
    /// becomes the page's error banner.
    pub fn from_html(url: impl Into<String>, html: &str) -> Self {
        let document = Html::parse_document(html);

        let title = select_first(&document, "title")
            .map(|t| collapse(t.text()))
            .filter(|t| !t.is_empty());

        let root = select_first(&document, "body").unwrap_or_else(|| document.root_element());
        let mut nodes = Vec::new();
        walk(root, None, &mut nodes);

        let error_banner = nodes
            .iter()
            .find(|n| is_error_marker(n) && !n.text.is_empty())
            .map(|n| n.text.clone());

        Self {
            url: url.into(),
            title,
            error_banner,
            nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head><title> NFL Odds | Sportsbook </title><script>var x = "+100";</script></head>
  <body>
    <div class="cb-title__simple-title cb-title__nav-title">NFL 2025/26 - AFC East</div>
    <div class="outcome">
      <span data-testid="button-title-market-board">Buffalo   Bills</span>
      <span data-testid="button-odds-market-board">-250</span>
    </div>
    <script>window.odds = ["+999"];</script>
  </body>
</html>"#;

    #[test]
    fn test_snapshot_structure() {
        let snapshot = PageSnapshot::from_html("https://example.test/nfl", PAGE);
        assert_eq!(snapshot.title.as_deref(), Some("NFL Odds | Sportsbook"));
        assert!(snapshot.error_banner.is_none());

        // body, header div, outcome div, two spans; scripts dropped
        assert_eq!(snapshot.nodes.len(), 5);
        assert_eq!(snapshot.nodes[0].tag, "body");

        let label = &snapshot.nodes[3];
        assert_eq!(label.tag, "span");
        assert_eq!(label.parent, Some(2));
        assert_eq!(label.text, "Buffalo Bills");
        assert_eq!(label.attr("data-testid"), Some("button-title-market-board"));

        assert_eq!(snapshot.nodes[2].own_text, "");
        assert_eq!(snapshot.nodes[2].text, "Buffalo Bills -250");
        assert!(snapshot.nodes.iter().all(|n| !n.own_text.contains("+999")));
    }

    #[test]
    fn test_error_banner_detected() {
        let html = r#"<html><head><title>Oops</title></head><body>
            <div role="alert">This market is not available in your location</div>
        </body></html>"#;
        let snapshot = PageSnapshot::from_html("u", html);
        assert_eq!(
            snapshot.error_banner.as_deref(),
            Some("This market is not available in your location")
        );

        let html = r#"<html><body><p class="page-error__message">Something went wrong</p></body></html>"#;
        let snapshot = PageSnapshot::from_html("u", html);
        assert_eq!(snapshot.error_banner.as_deref(), Some("Something went wrong"));
    }

    #[test]
    fn test_headers_found_in_parsed_page() {
        let snapshot = PageSnapshot::from_html("u", PAGE);
        let headers = snapshot.group_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].text, "NFL 2025/26 - AFC East");
        assert_eq!(headers[0].position, 1);
    }
}
