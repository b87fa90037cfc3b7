//! fOS HTML Parser
//!
//! HTML5 parser built on html5ever. Installed into a document as its
//! [`fos_dom::MarkupParser`], it turns `open`/`write`/`close` into a tree.

mod parser;

use std::sync::Arc;

use fos_dom::{Collaborators, Document, DocumentConfig, DomError};

pub use parser::HtmlParser;

/// Parse an HTML string into a new document with default collaborators
pub fn parse(html: &str) -> Result<Arc<Document>, ParseError> {
    parse_with(DocumentConfig::default(), Collaborators::default(), html)
}

/// Parse an HTML string into a new document. The HTML parser is installed
/// in place of any parser in `collaborators`.
pub fn parse_with(config: DocumentConfig, collaborators: Collaborators, html: &str) -> Result<Arc<Document>, ParseError> {
    let document = Document::with_collaborators(config, collaborators.with_parser(Arc::new(HtmlParser::new())));
    document.open()?;
    document.write(html)?;
    document.close()?;
    Ok(document)
}

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Document rejected parsed markup: {0}")]
    Dom(#[from] DomError),
}
