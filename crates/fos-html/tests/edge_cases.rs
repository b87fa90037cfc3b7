//! Edge case and stress tests for fos-html
//!
//! Rare HTML scenarios, malformed content and stress conditions.

use fos_dom::NodeType;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("fos_html=debug,fos_dom=debug")
        .try_init();
}

// ============================================================================
// EMPTY AND MINIMAL INPUT
// ============================================================================

#[test]
fn test_parse_empty() {
    init_tracing();
    let doc = fos_html::parse("").unwrap();
    // html5ever always synthesises html/head/body
    assert!(doc.document_element().is_some());
    assert!(doc.head().is_some());
    assert!(doc.body().is_some());
}

#[test]
fn test_parse_null_bytes() {
    let doc = fos_html::parse("Hello\0World").unwrap();
    let text = doc.text_content(doc.body().unwrap()).unwrap();
    assert!(text.starts_with("Hello"));
    assert!(text.ends_with("World"));
}

#[test]
fn test_parse_only_whitespace() {
    let doc = fos_html::parse("   \t\n\r\n   ").unwrap();
    assert_eq!(doc.child_count(doc.body().unwrap()), 0);
}

#[test]
fn test_parse_only_doctype() {
    let doc = fos_html::parse("<!DOCTYPE html>").unwrap();
    let first = doc.first_child(doc.root()).unwrap();
    assert_eq!(doc.node_type(first), Some(NodeType::DocumentType));
    assert_eq!(doc.node_name(first).as_deref(), Some("html"));
}

#[test]
fn test_comments_kept() {
    let doc = fos_html::parse("<body><!-- note --><p>x</p></body>").unwrap();
    let first = doc.first_child(doc.body().unwrap()).unwrap();
    assert_eq!(doc.node_type(first), Some(NodeType::Comment));
    assert_eq!(doc.node_value(first).as_deref(), Some(" note "));
}

// ============================================================================
// STRESS
// ============================================================================

#[test]
fn test_deep_nesting() {
    init_tracing();
    let depth = 2000;
    let html = format!("{}{}", "<div>".repeat(depth), "</div>".repeat(depth));
    let doc = fos_html::parse(&html).unwrap();
    assert_eq!(doc.get_elements_by_tag_name("div").length(), depth);
}

#[test]
fn test_many_siblings() {
    let html = "<p>x</p>".repeat(5000);
    let doc = fos_html::parse(&html).unwrap();
    assert_eq!(doc.child_count(doc.body().unwrap()), 5000);
}

#[test]
fn test_duplicate_ids_first_wins() {
    let doc = fos_html::parse(r#"<p id="dup">first</p><p id="dup">second</p>"#).unwrap();
    let found = doc.get_element_by_id("dup").unwrap();
    assert_eq!(doc.text_content(found).as_deref(), Some("first"));
}

#[test]
fn test_uppercase_markup_normalised() {
    let doc = fos_html::parse(r#"<DIV ID="Box" CLASS="A">x</DIV>"#).unwrap();
    let div = doc.get_element_by_id("Box").unwrap();
    assert_eq!(doc.tag_name(div).as_deref(), Some("DIV"));
    assert_eq!(doc.get_attribute(div, "class").as_deref(), Some("A"));
}

#[test]
fn test_unicode_text() {
    let doc = fos_html::parse("<p id=\"u\">Hello 世界 🚀</p>").unwrap();
    let p = doc.get_element_by_id("u").unwrap();
    assert_eq!(doc.text_content(p).as_deref(), Some("Hello 世界 🚀"));
}
