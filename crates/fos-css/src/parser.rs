//! CSS Parser using lightningcss
//!
//! Parses CSS stylesheets into our internal representation. Property values
//! are kept as lightningcss serialises them; selectors go through our own
//! matcher so anything it cannot evaluate drops only that selector.

use lightningcss::declaration::DeclarationBlock;
use lightningcss::properties::Property;
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute, StyleSheet};
use lightningcss::traits::ToCss;

use crate::selectors::split_selector_list;
use crate::{CssError, Declaration, Rule, Selector, Stylesheet};

/// CSS Parser
#[derive(Debug, Clone, Copy, Default)]
pub struct CssParser;

impl CssParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a CSS stylesheet
    pub fn parse(&self, css: &str) -> Result<Stylesheet, CssError> {
        let options = ParserOptions { error_recovery: true, ..ParserOptions::default() };
        let stylesheet = StyleSheet::parse(css, options).map_err(|e| CssError::ParseError {
            line: e.loc.as_ref().map_or(0, |loc| loc.line + 1),
            message: e.kind.to_string(),
        })?;

        let mut result = Stylesheet::new();
        for rule in stylesheet.rules.0.iter() {
            match rule {
                CssRule::Style(style_rule) => {
                    let text = style_rule
                        .selectors
                        .to_css_string(PrinterOptions::default())
                        .map_err(|e| CssError::Serialize(e.to_string()))?;
                    let selectors = parse_selectors(&text);
                    if selectors.is_empty() {
                        continue;
                    }
                    result.rules.push(Rule {
                        selectors,
                        declarations: convert_declarations(&style_rule.declarations).into(),
                    });
                }
                // @media, @font-face, @keyframes and friends are not evaluated
                _ => tracing::trace!("Skipping at-rule"),
            }
        }

        tracing::debug!(rules = result.rules.len(), "Parsed stylesheet");
        Ok(result)
    }
}

/// Parse the contents of a `style` attribute
pub fn parse_inline_style(css: &str) -> Result<Vec<Declaration>, CssError> {
    let attribute = StyleAttribute::parse(css, ParserOptions { error_recovery: true, ..ParserOptions::default() })
        .map_err(|e| CssError::ParseError {
            line: e.loc.as_ref().map_or(0, |loc| loc.line + 1),
            message: e.kind.to_string(),
        })?;
    Ok(convert_declarations(&attribute.declarations))
}

fn parse_selectors(list: &str) -> Vec<Selector> {
    split_selector_list(list)
        .into_iter()
        .filter_map(|text| match Selector::parse(text) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::debug!("Dropping selector: {e}");
                None
            }
        })
        .collect()
}

fn convert_declarations(block: &DeclarationBlock<'_>) -> Vec<Declaration> {
    let normal = block.declarations.iter().map(|p| (p, false));
    let important = block.important_declarations.iter().map(|p| (p, true));
    normal
        .chain(important)
        .filter_map(|(property, important)| convert_declaration(property, important))
        .collect()
}

fn convert_declaration(property: &Property<'_>, important: bool) -> Option<Declaration> {
    let name = property.property_id().name().to_ascii_lowercase();
    match property.value_to_css_string(PrinterOptions::default()) {
        Ok(value) => Some(Declaration { property: name, value, important }),
        Err(e) => {
            tracing::debug!(property = %name, "Dropping declaration: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let css = r#"
            .foo { display: block; }
            #bar { color: red; }
        "#;

        let stylesheet = CssParser::new().parse(css).unwrap();
        assert_eq!(stylesheet.len(), 2);
        assert_eq!(stylesheet.rules[0].declarations[0].property, "display");
        assert_eq!(stylesheet.rules[0].declarations[0].value, "block");
    }

    #[test]
    fn test_selector_list_splits() {
        let stylesheet = CssParser::new().parse("h1, h2 > span, p::before { display: none }").unwrap();
        assert_eq!(stylesheet.rules[0].selectors.len(), 3);
    }

    #[test]
    fn test_unsupported_selector_dropped() {
        let stylesheet = CssParser::new().parse("a:not(.x), b { display: block } a:not(.y) { color: red }").unwrap();
        assert_eq!(stylesheet.len(), 1);
        assert_eq!(stylesheet.rules[0].selectors.len(), 1);
    }

    #[test]
    fn test_important_flag() {
        let stylesheet = CssParser::new().parse("p { width: 10px !important; height: 5px }").unwrap();
        let declarations = &stylesheet.rules[0].declarations;
        let width = declarations.iter().find(|d| d.property == "width").unwrap();
        let height = declarations.iter().find(|d| d.property == "height").unwrap();
        assert!(width.important);
        assert!(!height.important);
        assert_eq!(width.value, "10px");
    }

    #[test]
    fn test_media_rules_skipped() {
        let stylesheet = CssParser::new()
            .parse("@media print { p { display: none } } p { display: block }")
            .unwrap();
        assert_eq!(stylesheet.len(), 1);
    }

    #[test]
    fn test_inline_style() {
        let declarations = parse_inline_style("margin: 4px; display: inline-block").unwrap();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].property, "margin");
        assert_eq!(declarations[0].value, "4px");
    }
}
