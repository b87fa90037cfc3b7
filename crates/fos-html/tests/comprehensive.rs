//! Comprehensive tests for fos-html
//!
//! Parsing through the document stream and what the parsed tree exposes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fos_dom::{
    Collaborators, Document, DocumentConfig, ListenerError, Notification, NotificationKind, ReadyState,
    ResourceEvent, ResourceFetcher, ResourceKind, ResourceRequest,
};
use fos_html::HtmlParser;

fn document() -> Arc<Document> {
    Document::with_collaborators(
        DocumentConfig::default(),
        Collaborators::default().with_parser(Arc::new(HtmlParser::new())),
    )
}

#[derive(Default)]
struct RecordingFetcher {
    requests: Mutex<Vec<ResourceRequest>>,
}

impl ResourceFetcher for RecordingFetcher {
    fn fetch(&self, request: ResourceRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

// ============================================================================
// DOCUMENT STREAM
// ============================================================================

#[test]
fn test_open_write_close() {
    let doc = document();
    doc.open().unwrap();
    doc.write("<html><head><title>T</title></head><body>hi</body></html>").unwrap();
    doc.close().unwrap();

    let html = doc.document_element().unwrap();
    assert_eq!(doc.tag_name(html).as_deref(), Some("HTML"));
    let titles = doc.titles();
    assert_eq!(titles.length(), 1);
    assert_eq!(doc.text_content(titles.item(0).unwrap()).as_deref(), Some("T"));
    assert_eq!(doc.get_elements_by_tag_name("body").length(), 1);
    assert_eq!(doc.text_content(doc.body().unwrap()).as_deref(), Some("hi"));
}

#[test]
fn test_load_fires_after_close() {
    let doc = document();
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    doc.on_load(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    doc.write("<p>one</p>").unwrap();
    assert!(doc.is_open());
    assert_eq!(doc.ready_state(), ReadyState::Loading);
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    doc.close().unwrap();
    assert!(!doc.is_open());
    assert_eq!(doc.ready_state(), ReadyState::Complete);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_chunked_writes() {
    let doc = document();
    doc.write("<div id=\"out").unwrap();
    doc.write("er\"><span>a</sp").unwrap();
    doc.write("an></div>").unwrap();
    doc.close().unwrap();

    let outer = doc.get_element_by_id("outer").unwrap();
    assert_eq!(doc.text_content(outer).as_deref(), Some("a"));
}

#[test]
fn test_reopen_replaces_content() {
    let doc = document();
    doc.write("<p id=\"first\">1</p>").unwrap();
    doc.close().unwrap();
    assert!(doc.is_loaded());

    doc.open().unwrap();
    assert!(!doc.is_loaded());
    assert!(doc.get_element_by_id("first").is_none());
    assert!(doc.document_element().is_none());
    doc.write("<p id=\"second\">2</p>").unwrap();
    doc.close().unwrap();

    assert!(doc.get_element_by_id("second").is_some());
    assert!(doc.is_loaded());
}

#[test]
fn test_notifications_suspended_while_parsing() {
    let doc = document();
    doc.open().unwrap();
    let structure = Arc::new(AtomicUsize::new(0));
    let seen = structure.clone();
    doc.add_listener(Arc::new(move |_: &Document, n: &Notification| {
        if n.kind == NotificationKind::Structure {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        Ok::<(), ListenerError>(())
    }));

    doc.write("<ul><li>a</li><li>b</li><li>c</li></ul>").unwrap();
    doc.close().unwrap();
    // One catch-up notification on the root instead of one per insertion
    assert_eq!(structure.load(Ordering::SeqCst), 1);
}

#[test]
fn test_parse_helper() {
    let doc = fos_html::parse("<title>  Hello   World </title><p>x</p>").unwrap();
    assert_eq!(doc.title().as_deref(), Some("Hello World"));
    assert!(doc.is_loaded());
}

// ============================================================================
// PARSED CONTENT
// ============================================================================

#[test]
fn test_ids_and_names_registered() {
    let doc = fos_html::parse(
        r#"<div id="main" class="container primary"><form name="login"></form><a name="top"></a></div>"#,
    )
    .unwrap();
    let main = doc.get_element_by_id("main").unwrap();
    assert_eq!(doc.get_attribute(main, "class").as_deref(), Some("container primary"));
    let form = doc.get_named_item("login").unwrap();
    assert_eq!(doc.tag_name(form).as_deref(), Some("FORM"));
    assert_eq!(doc.forms().length(), 1);
    assert_eq!(doc.anchors().length(), 1);
}

#[test]
fn test_parse_entities() {
    let doc = fos_html::parse(r#"<p id="p">&lt;tag&gt; &amp; &quot;quotes&quot;</p>"#).unwrap();
    let p = doc.get_element_by_id("p").unwrap();
    assert_eq!(doc.text_content(p).as_deref(), Some("<tag> & \"quotes\""));
}

#[test]
fn test_script_text_not_parsed() {
    let doc = fos_html::parse(
        r#"<head><script>function f() { return "<div>not parsed</div>"; }</script></head><body></body>"#,
    )
    .unwrap();
    assert_eq!(doc.get_elements_by_tag_name("div").length(), 0);
    assert_eq!(doc.scripts().length(), 1);
}

#[test]
fn test_malformed_html() {
    let doc = fos_html::parse(
        r#"
        <div>
            <p>Unclosed paragraph
            <span>Unclosed span
        </div>
        <p>Another paragraph without closing
    "#,
    )
    .unwrap();
    assert_eq!(doc.get_elements_by_tag_name("p").length(), 2);
    assert_eq!(doc.get_elements_by_tag_name("span").length(), 1);
}

#[test]
fn test_images_fetched_on_parse() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let doc = fos_html::parse_with(
        DocumentConfig::default().with_url("https://example.com/"),
        Collaborators::default().with_fetcher(fetcher.clone()),
        r#"<body><img src="a.png"><img src="b.png"><img></body>"#,
    )
    .unwrap();

    let requests = fetcher.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.kind == ResourceKind::Image));
    assert_eq!(doc.images().length(), 3);
    assert!(!doc.is_loaded());
    assert_eq!(doc.ready_state(), ReadyState::Interactive);

    for request in requests {
        doc.image_loaded(ResourceEvent::new(request.id));
    }
    assert!(doc.is_loaded());
}
