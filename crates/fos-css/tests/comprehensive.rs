//! Comprehensive tests for fos-css
//!
//! Parsing edge cases and style computation through a document.

use std::sync::Arc;

use fos_css::{parse_stylesheet, CssCascade, CssParser, Stylesheet};
use fos_dom::{Collaborators, Document, DocumentConfig, NodeId, PseudoElement};

fn document() -> Arc<Document> {
    let cascade = Arc::new(CssCascade::new(Stylesheet::user_agent()));
    Document::with_collaborators(DocumentConfig::default(), Collaborators::default().with_cascade(cascade))
}

/// `<html><body>` skeleton, returning the body
fn body(doc: &Document) -> NodeId {
    let html = doc.create_element("html");
    let body = doc.create_element("body");
    doc.append_child(doc.root(), html).unwrap();
    doc.append_child(html, body).unwrap();
    body
}

fn element(doc: &Document, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
    let node = doc.create_element(tag);
    for (name, value) in attrs {
        doc.set_attribute(node, name, value).unwrap();
    }
    doc.append_child(parent, node).unwrap();
    node
}

fn value(doc: &Document, node: NodeId, property: &str) -> Option<String> {
    doc.computed_style(node, None).unwrap().get(property).map(str::to_string)
}

// ============================================================================
// PARSING
// ============================================================================

#[test]
fn test_parse_empty() {
    let stylesheet = CssParser::new().parse("").unwrap();
    assert_eq!(stylesheet.len(), 0);
}

#[test]
fn test_parse_multiple_rules() {
    let css = r#"
        .foo { color: red; }
        .bar { background: blue; }
        #baz { display: flex; }
    "#;
    let stylesheet = CssParser::new().parse(css).unwrap();
    assert_eq!(stylesheet.len(), 3);
}

#[test]
fn test_parse_complex_selectors() {
    let css = r#"
        div.container > p.text { color: black; }
        ul li a:hover { color: blue; }
        input[type="text"] { border: 1px solid; }
        h1, h2, h3 { margin: 0; }
    "#;
    let stylesheet = parse_stylesheet(css).unwrap();
    assert_eq!(stylesheet.len(), 4);
    assert_eq!(stylesheet.rules[3].selectors.len(), 3);
}

// ============================================================================
// CASCADE
// ============================================================================

#[test]
fn test_user_agent_defaults() {
    let doc = document();
    let body = body(&doc);
    let div = element(&doc, body, "div", &[]);
    let span = element(&doc, body, "span", &[]);
    let head = doc.create_element("head");
    doc.insert_before(doc.document_element().unwrap(), head, Some(body)).unwrap();

    assert_eq!(value(&doc, div, "display").as_deref(), Some("block"));
    assert_eq!(value(&doc, span, "display").as_deref(), Some("inline"));
    assert_eq!(value(&doc, head, "display").as_deref(), Some("none"));
    assert_eq!(value(&doc, body, "margin-top").as_deref(), Some("8px"));
}

#[test]
fn test_specificity_wins_over_order() {
    let doc = document();
    let body = body(&doc);
    let p = element(&doc, body, "p", &[("id", "x"), ("class", "note")]);
    doc.add_stylesheet("#x { width: 30px } .note { width: 20px } p { width: 10px }");
    assert_eq!(value(&doc, p, "width").as_deref(), Some("30px"));
}

#[test]
fn test_later_rule_wins_on_tie() {
    let doc = document();
    let body = body(&doc);
    let p = element(&doc, body, "p", &[]);
    doc.add_stylesheet("p { width: 10px }");
    doc.add_stylesheet("p { width: 20px }");
    assert_eq!(value(&doc, p, "width").as_deref(), Some("20px"));
}

#[test]
fn test_inline_and_important() {
    let doc = document();
    let body = body(&doc);
    let p = element(&doc, body, "p", &[("style", "width: 5px; height: 5px")]);
    doc.add_stylesheet("p { width: 10px !important; height: 10px }");
    assert_eq!(value(&doc, p, "width").as_deref(), Some("10px"));
    assert_eq!(value(&doc, p, "height").as_deref(), Some("5px"));
}

#[test]
fn test_important_inline_beats_important_sheet() {
    let doc = document();
    let body = body(&doc);
    let p = element(&doc, body, "p", &[("style", "width: 5px !important")]);
    doc.add_stylesheet("#x, p { width: 10px !important }");
    assert_eq!(value(&doc, p, "width").as_deref(), Some("5px"));
}

#[test]
fn test_combinators() {
    let doc = document();
    let body = body(&doc);
    let nav = element(&doc, body, "nav", &[]);
    let list = element(&doc, nav, "ul", &[]);
    let item = element(&doc, list, "li", &[]);
    let link = element(&doc, item, "a", &[]);
    let outside = element(&doc, body, "a", &[]);
    doc.add_stylesheet("nav a { width: 1px } nav > a { height: 2px } ul + a { top: 3px }");

    assert_eq!(value(&doc, link, "width").as_deref(), Some("1px"));
    assert_eq!(value(&doc, link, "height"), None);
    assert_eq!(value(&doc, outside, "width"), None);

    let after_list = element(&doc, nav, "a", &[]);
    assert_eq!(value(&doc, after_list, "top").as_deref(), Some("3px"));
    assert_eq!(value(&doc, after_list, "height").as_deref(), Some("2px"));
}

#[test]
fn test_attribute_selectors() {
    let doc = document();
    let body = body(&doc);
    let text = element(&doc, body, "input", &[("type", "text")]);
    let check = element(&doc, body, "input", &[("type", "checkbox")]);
    doc.add_stylesheet("input[type=\"text\"] { width: 100px }");
    assert_eq!(value(&doc, text, "width").as_deref(), Some("100px"));
    assert_eq!(value(&doc, check, "width"), None);
}

#[test]
fn test_inheritance_through_cascade() {
    let doc = document();
    let body = body(&doc);
    let div = element(&doc, body, "div", &[]);
    let span = element(&doc, div, "span", &[]);
    doc.add_stylesheet("div { white-space: nowrap; width: 50px }");
    assert_eq!(value(&doc, span, "white-space").as_deref(), Some("nowrap"));
    assert_eq!(value(&doc, span, "width"), None);
}

#[test]
fn test_focus_rules_follow_focus() {
    let doc = document();
    let body = body(&doc);
    let input = element(&doc, body, "input", &[]);
    doc.add_stylesheet("input:focus { width: 40px }");

    assert_eq!(value(&doc, input, "width"), None);
    doc.focus(input).unwrap();
    assert_eq!(value(&doc, input, "width").as_deref(), Some("40px"));
    doc.blur();
    assert_eq!(value(&doc, input, "width"), None);
}

#[test]
fn test_generated_content() {
    let doc = document();
    let body = body(&doc);
    let quote = element(&doc, body, "q", &[("class", "fancy")]);
    doc.add_stylesheet(r#".fancy::before { content: "<<" } .fancy::after { content: none }"#);

    let before = doc.generated_content(quote, PseudoElement::Before).unwrap().unwrap();
    assert_eq!(before.text, "<<");
    assert!(doc.generated_content(quote, PseudoElement::After).unwrap().is_none());
    // The element's own style is unaffected by pseudo rules
    assert_eq!(value(&doc, quote, "content").as_deref(), Some("normal"));
}

#[test]
fn test_removing_stylesheet_restores_defaults() {
    let doc = document();
    let body = body(&doc);
    let div = element(&doc, body, "div", &[]);
    doc.add_stylesheet("div { display: flex }");
    assert_eq!(value(&doc, div, "display").as_deref(), Some("flex"));
    doc.remove_stylesheet(0).unwrap();
    assert_eq!(value(&doc, div, "display").as_deref(), Some("block"));
}

#[test]
fn test_invalid_sheet_does_not_poison_others() {
    let doc = document();
    let body = body(&doc);
    let div = element(&doc, body, "div", &[]);
    doc.add_stylesheet("div { width: 7px }");
    doc.add_stylesheet("@@@ {{{");
    assert_eq!(value(&doc, div, "width").as_deref(), Some("7px"));
}
