//! fOS CSS Parser & Style System
//!
//! Stylesheet parsing on top of lightningcss, selector matching and the
//! cascade. [`CssCascade`] plugs into a `fos_dom::Document` as its
//! [`fos_dom::CascadeEngine`].

mod cascade;
mod parser;
mod selectors;

use std::sync::Arc;

pub use cascade::{ClassifiedRules, CssCascade};
pub use fos_dom::StyleDeclaration as Declaration;
pub use parser::{parse_inline_style, CssParser};
pub use selectors::{AttributeMatcher, AttributeSelector, Combinator, Compound, PseudoClass, Selector};

/// Built-in defaults applied beneath every author sheet
const USER_AGENT_CSS: &str = r#"
html, body, div, p, h1, h2, h3, h4, h5, h6, ul, ol, li, form, header, footer,
section, article, nav, aside, main, blockquote, pre, table, fieldset { display: block; }
head, script, style, link, meta, title, template { display: none; }
span, a, strong, em, b, i, u, code, label, img, input { display: inline; }
li { display: list-item; }
body { margin: 8px; }
p { margin-top: 16px; margin-bottom: 16px; }
h1 { font-size: 32px; font-weight: 700; }
h2 { font-size: 24px; font-weight: 700; }
h3 { font-size: 19px; font-weight: 700; }
b, strong { font-weight: 700; }
i, em { font-style: italic; }
pre { white-space: pre; }
a { color: blue; }
"#;

/// Parse a CSS stylesheet
pub fn parse_stylesheet(css: &str) -> Result<Stylesheet, CssError> {
    CssParser::new().parse(css)
}

/// Parsed stylesheet
#[derive(Debug, Default)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default stylesheet. Parse it once and share it.
    pub fn user_agent() -> Arc<Stylesheet> {
        match parse_stylesheet(USER_AGENT_CSS) {
            Ok(sheet) => Arc::new(sheet),
            Err(e) => {
                tracing::error!("User agent stylesheet failed to parse: {e}");
                Arc::new(Stylesheet::new())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// CSS style rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    /// Shared with every rule matched from this one
    pub declarations: Arc<[Declaration]>,
}

/// CSS parsing error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CssError {
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: u32, message: String },

    #[error("Unsupported selector `{selector}`: {reason}")]
    UnsupportedSelector { selector: String, reason: String },

    #[error("Serialization failed: {0}")]
    Serialize(String),
}
