//! Style Cascade & Resolver
//!
//! Classifies rules by the key of their subject compound, collects the ones
//! that match an element and cascades their declarations by origin,
//! importance, specificity and source order.

use std::collections::HashMap;
use std::sync::Arc;

use fos_dom::{
    CascadeEngine, CascadeOrigin, ComputedStyle, ElementView, MatchCondition, MatchedRule, PseudoElement,
    RuleIndex,
};

use crate::parser::{parse_inline_style, CssParser};
use crate::{Declaration, Selector, Stylesheet};

/// A selector paired with the rule it came from
#[derive(Debug)]
struct IndexedRule {
    origin: CascadeOrigin,
    selector: Selector,
    declarations: Arc<[Declaration]>,
    source_order: usize,
}

/// Rules of every sheet, bucketed by the most selective key of their
/// subject: id, then first class, then tag, else universal
#[derive(Debug, Default)]
pub struct ClassifiedRules {
    rules: Vec<IndexedRule>,
    by_id: HashMap<String, Vec<usize>>,
    by_class: HashMap<String, Vec<usize>>,
    by_tag: HashMap<String, Vec<usize>>,
    universal: Vec<usize>,
}

impl ClassifiedRules {
    fn push(&mut self, origin: CascadeOrigin, sheet: &Stylesheet) {
        for rule in &sheet.rules {
            for selector in &rule.selectors {
                let index = self.rules.len();
                let subject = selector.subject();
                if let Some(id) = &subject.id {
                    self.by_id.entry(id.clone()).or_default().push(index);
                } else if let Some(class) = subject.classes.first() {
                    self.by_class.entry(class.clone()).or_default().push(index);
                } else if let Some(tag) = &subject.tag {
                    self.by_tag.entry(tag.clone()).or_default().push(index);
                } else {
                    self.universal.push(index);
                }
                self.rules.push(IndexedRule {
                    origin,
                    selector: selector.clone(),
                    declarations: Arc::clone(&rule.declarations),
                    source_order: index,
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Indices of rules worth trying against `element`, in source order
    fn candidates(&self, element: &ElementView<'_>) -> Vec<usize> {
        let mut out = self.universal.clone();
        if let Some(ids) = element.id_attr().and_then(|id| self.by_id.get(id)) {
            out.extend_from_slice(ids);
        }
        if let Some(tags) = self.by_tag.get(element.local_name()) {
            out.extend_from_slice(tags);
        }
        if let Some(class) = element.attr("class") {
            for name in class.split_ascii_whitespace() {
                if let Some(classes) = self.by_class.get(name) {
                    out.extend_from_slice(classes);
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// The CSS cascade engine installed into documents
#[derive(Debug, Clone)]
pub struct CssCascade {
    user_agent: Arc<Stylesheet>,
}

impl CssCascade {
    pub fn new(user_agent: Arc<Stylesheet>) -> Self {
        Self { user_agent }
    }

    /// Classify already parsed author sheets
    pub fn classify_sheets(&self, sheets: &[Stylesheet]) -> ClassifiedRules {
        let mut rules = ClassifiedRules::default();
        rules.push(CascadeOrigin::UserAgent, &self.user_agent);
        for sheet in sheets {
            rules.push(CascadeOrigin::Author, sheet);
        }
        rules
    }
}

impl Default for CssCascade {
    fn default() -> Self {
        Self::new(Stylesheet::user_agent())
    }
}

impl CascadeEngine for CssCascade {
    fn classify(&self, sheets: &[Arc<str>]) -> RuleIndex {
        let parser = CssParser::new();
        let parsed: Vec<Stylesheet> = sheets
            .iter()
            .filter_map(|css| match parser.parse(css) {
                Ok(sheet) => Some(sheet),
                Err(e) => {
                    tracing::warn!("Ignoring stylesheet: {e}");
                    None
                }
            })
            .collect();
        let rules = self.classify_sheets(&parsed);
        tracing::debug!(rules = rules.len(), sheets = sheets.len(), "Classified rules");
        Arc::new(rules)
    }

    fn applicable_rules(
        &self,
        element: &ElementView<'_>,
        index: &RuleIndex,
        inline: Option<&str>,
    ) -> Vec<MatchedRule> {
        let mut matched = Vec::new();
        match index.downcast_ref::<ClassifiedRules>() {
            Some(rules) => {
                for i in rules.candidates(element) {
                    let rule = &rules.rules[i];
                    if rule.selector.matches(element) {
                        matched.push(MatchedRule {
                            origin: rule.origin,
                            specificity: rule.selector.specificity(),
                            source_order: rule.source_order,
                            pseudo: rule.selector.pseudo_element(),
                            requires_focus: rule.selector.requires_focus(),
                            requires_hover: rule.selector.requires_hover(),
                            declarations: Arc::clone(&rule.declarations),
                        });
                    }
                }
            }
            None => tracing::warn!("Rule index was not built by the CSS cascade"),
        }

        if let Some(css) = inline.filter(|css| !css.trim().is_empty()) {
            match parse_inline_style(css) {
                Ok(declarations) => matched.push(MatchedRule {
                    origin: CascadeOrigin::Inline,
                    specificity: (0, 0, 0),
                    source_order: usize::MAX,
                    pseudo: None,
                    requires_focus: false,
                    requires_hover: false,
                    declarations: declarations.into(),
                }),
                Err(e) => tracing::debug!("Ignoring inline style: {e}"),
            }
        }
        matched
    }

    fn resolve_style(
        &self,
        _element: &ElementView<'_>,
        pseudo: Option<PseudoElement>,
        condition: &MatchCondition,
        rules: &[MatchedRule],
    ) -> ComputedStyle {
        let mut winners: Vec<(&MatchedRule, usize, &Declaration)> = rules
            .iter()
            .filter(|rule| rule.pseudo == pseudo && condition.admits(rule))
            .flat_map(|rule| rule.declarations.iter().enumerate().map(move |(i, d)| (rule, i, d)))
            .collect();
        winners.sort_by(|a, b| precedence(a.0, a.2).cmp(&precedence(b.0, b.2)).then(a.1.cmp(&b.1)));

        let mut style = ComputedStyle::new();
        for (_, _, declaration) in winners {
            style.set(&declaration.property, &declaration.value);
        }
        style
    }
}

/// Ascending cascade precedence: later entries win
fn precedence(rule: &MatchedRule, declaration: &Declaration) -> (u8, (u32, u32, u32), usize) {
    // Important user-agent declarations beat important author ones. A
    // `style` attribute belongs to the author origin and beats the author
    // sheets at either importance.
    let level = match (declaration.important, rule.origin) {
        (false, CascadeOrigin::UserAgent) => 0,
        (false, CascadeOrigin::Author) => 1,
        (false, CascadeOrigin::Inline) => 2,
        (true, CascadeOrigin::Author) => 3,
        (true, CascadeOrigin::Inline) => 4,
        (true, CascadeOrigin::UserAgent) => 5,
    };
    (level, rule.specificity, rule.source_order)
}
