//! Computed-style cache
//!
//! Styles are memoised per (element, pseudo-element) inside the element's
//! node, guarded by the tree-lock. Rule matching and the cascade itself are
//! delegated to a [`CascadeEngine`]; the cache only decides when a stored
//! result is still good and how loud the invalidation must be.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::document::{Document, TreeState};
use crate::notify::NotificationKind;
use crate::operations::{DomError, DomResult};
use crate::tree::{DomTree, ElementView};
use crate::NodeId;

/// Properties whose change forces relayout. A style change that leaves all
/// of these untouched only needs a repaint.
pub const LAYOUT_AFFECTING_PROPERTIES: &[&str] = &[
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "border-top-width",
    "border-right-width",
    "border-bottom-width",
    "border-left-width",
    "position",
    "display",
    "float",
    "clear",
    "top",
    "right",
    "bottom",
    "left",
    "width",
    "height",
    "min-width",
    "min-height",
    "max-width",
    "max-height",
    "font-size",
    "font-family",
    "font-weight",
    "font-style",
    "line-height",
    "letter-spacing",
    "word-spacing",
    "white-space",
];

const INHERITED_PROPERTIES: &[&str] = &[
    "color",
    "cursor",
    "direction",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "letter-spacing",
    "line-height",
    "list-style-type",
    "quotes",
    "text-align",
    "text-indent",
    "text-transform",
    "visibility",
    "white-space",
    "word-spacing",
];

const INITIAL_VALUES: &[(&str, &str)] = &[
    ("display", "inline"),
    ("position", "static"),
    ("float", "none"),
    ("clear", "none"),
    ("visibility", "visible"),
    ("color", "black"),
    ("background-color", "transparent"),
    ("font-size", "16px"),
    ("font-weight", "400"),
    ("font-style", "normal"),
    ("line-height", "normal"),
    ("white-space", "normal"),
    ("content", "normal"),
];

const BOX_SHORTHANDS: &[(&str, [&str; 4])] = &[
    ("margin", ["margin-top", "margin-right", "margin-bottom", "margin-left"]),
    ("padding", ["padding-top", "padding-right", "padding-bottom", "padding-left"]),
    (
        "border-width",
        ["border-top-width", "border-right-width", "border-bottom-width", "border-left-width"],
    ),
    ("inset", ["top", "right", "bottom", "left"]),
];

/// Pseudo-elements the cache keys on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {
    Before,
    After,
    FirstLine,
    FirstLetter,
}

impl PseudoElement {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_start_matches(':').to_ascii_lowercase().as_str() {
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            "first-line" => Some(Self::FirstLine),
            "first-letter" => Some(Self::FirstLetter),
            _ => None,
        }
    }
}

/// Fully resolved property set of one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputedStyle {
    properties: BTreeMap<String, String>,
}

impl ComputedStyle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specified value. Names are lower-cased.
    pub fn set(&mut self, property: &str, value: &str) {
        self.properties.insert(property.to_ascii_lowercase(), value.trim().to_string());
    }

    /// Value for a property, falling back to its initial value
    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .map(String::as_str)
            .or_else(|| initial_value(property))
    }

    /// Explicitly set properties, in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn display(&self) -> &str {
        self.get("display").unwrap_or("inline")
    }

    /// The `content` value when it generates something
    pub fn content(&self) -> Option<&str> {
        match self.get("content") {
            None | Some("normal") | Some("none") => None,
            Some(value) => Some(value),
        }
    }

    pub fn is_inherited_property(property: &str) -> bool {
        INHERITED_PROPERTIES.contains(&property)
    }

    /// Fill inherited properties and explicit `inherit` values from the
    /// parent's computed style
    pub fn inherit_from(&mut self, parent: &ComputedStyle) {
        for &property in INHERITED_PROPERTIES {
            let unset = self.properties.get(property).is_none_or(|v| v == "inherit");
            if unset {
                if let Some(value) = parent.properties.get(property) {
                    self.properties.insert(property.to_string(), value.clone());
                }
            }
        }
        let explicit: Vec<String> = self
            .properties
            .iter()
            .filter(|(_, v)| v.as_str() == "inherit")
            .map(|(k, _)| k.clone())
            .collect();
        for property in explicit {
            match parent.get(&property) {
                Some(value) => {
                    let value = value.to_string();
                    self.properties.insert(property, value);
                }
                None => {
                    self.properties.remove(&property);
                }
            }
        }
    }

    /// Turn the cascaded values into concrete ones: expand box shorthands
    /// and drop keywords that mean "use the initial value"
    pub fn concretize(&mut self) {
        for &(shorthand, longhands) in BOX_SHORTHANDS {
            if let Some(value) = self.properties.remove(shorthand) {
                for (longhand, part) in longhands.iter().zip(expand_box(&value)) {
                    self.properties.entry(longhand.to_string()).or_insert(part);
                }
            }
        }
        if let Some(value) = self.properties.get("border").cloned() {
            if let Some(width) = value.split_ascii_whitespace().find(|t| is_border_width(t)) {
                for side in ["top", "right", "bottom", "left"] {
                    self.properties
                        .entry(format!("border-{side}-width"))
                        .or_insert_with(|| width.to_string());
                }
            }
        }
        self.properties
            .retain(|_, v| !matches!(v.as_str(), "initial" | "unset" | "inherit"));
    }

    /// Whether any layout-affecting property differs
    pub fn layout_differs(&self, other: &ComputedStyle) -> bool {
        LAYOUT_AFFECTING_PROPERTIES
            .iter()
            .any(|p| self.get(p) != other.get(p))
    }
}

fn initial_value(property: &str) -> Option<&'static str> {
    INITIAL_VALUES
        .iter()
        .find(|(name, _)| *name == property)
        .map(|(_, value)| *value)
}

fn expand_box(value: &str) -> [String; 4] {
    let parts: Vec<&str> = value.split_ascii_whitespace().collect();
    let pick = |i: usize| parts.get(i).copied().unwrap_or("0").to_string();
    match parts.len() {
        1 => [pick(0), pick(0), pick(0), pick(0)],
        2 => [pick(0), pick(1), pick(0), pick(1)],
        3 => [pick(0), pick(1), pick(2), pick(1)],
        _ => [pick(0), pick(1), pick(2), pick(3)],
    }
}

fn is_border_width(token: &str) -> bool {
    matches!(token, "thin" | "medium" | "thick")
        || token.starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

/// Where a matched rule came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CascadeOrigin {
    UserAgent,
    Author,
    Inline,
}

/// One `property: value` pair of a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDeclaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// A rule found applicable to an element
#[derive(Debug, Clone)]
pub struct MatchedRule {
    pub origin: CascadeOrigin,
    /// (ids, classes/attributes/pseudo-classes, types)
    pub specificity: (u32, u32, u32),
    pub source_order: usize,
    /// Pseudo-element the rule targets, `None` for the element itself
    pub pseudo: Option<PseudoElement>,
    pub requires_focus: bool,
    pub requires_hover: bool,
    pub declarations: Arc<[StyleDeclaration]>,
}

/// Dynamic element state that rules may depend on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCondition {
    pub focused: bool,
    pub hovered: bool,
}

impl MatchCondition {
    /// Whether a rule's dynamic requirements hold
    pub fn admits(&self, rule: &MatchedRule) -> bool {
        (!rule.requires_focus || self.focused) && (!rule.requires_hover || self.hovered)
    }
}

/// Engine-specific classified rule set, cached by the document
pub type RuleIndex = Arc<dyn Any + Send + Sync>;

/// The external cascade: rule classification, matching and resolution
pub trait CascadeEngine: Send + Sync {
    /// Build the classified rule index for the document's author sheets
    fn classify(&self, sheets: &[Arc<str>]) -> RuleIndex;

    /// Rules applying to `element`, inline `style` overrides included
    fn applicable_rules(
        &self,
        element: &ElementView<'_>,
        index: &RuleIndex,
        inline: Option<&str>,
    ) -> Vec<MatchedRule>;

    /// Cascade the rules into a style. The cache calls
    /// [`ComputedStyle::inherit_from`] and [`ComputedStyle::concretize`]
    /// on the result before storing it.
    fn resolve_style(
        &self,
        element: &ElementView<'_>,
        pseudo: Option<PseudoElement>,
        condition: &MatchCondition,
        rules: &[MatchedRule],
    ) -> ComputedStyle;
}

/// Engine with no rules: every element gets initial values
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCascade;

impl CascadeEngine for NoCascade {
    fn classify(&self, _sheets: &[Arc<str>]) -> RuleIndex {
        Arc::new(())
    }

    fn applicable_rules(&self, _: &ElementView<'_>, _: &RuleIndex, _: Option<&str>) -> Vec<MatchedRule> {
        Vec::new()
    }

    fn resolve_style(
        &self,
        _: &ElementView<'_>,
        _: Option<PseudoElement>,
        _: &MatchCondition,
        _: &[MatchedRule],
    ) -> ComputedStyle {
        ComputedStyle::default()
    }
}

/// Before/after content generated from a pseudo-element style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub pseudo: PseudoElement,
    pub text: String,
    pub style: Arc<ComputedStyle>,
}

/// Per-element cache entry
#[derive(Debug, Default)]
pub(crate) struct StyleSlot {
    base: Option<Arc<ComputedStyle>>,
    pseudo: HashMap<PseudoElement, Arc<ComputedStyle>>,
    generated: HashMap<PseudoElement, Option<Arc<GeneratedContent>>>,
}

impl StyleSlot {
    pub(crate) fn clear(&mut self) {
        self.base = None;
        self.pseudo.clear();
        self.generated.clear();
    }

    pub(crate) fn base(&self) -> Option<Arc<ComputedStyle>> {
        self.base.clone()
    }

    fn cached(&self, pseudo: Option<PseudoElement>) -> Option<Arc<ComputedStyle>> {
        match pseudo {
            None => self.base.clone(),
            Some(p) => self.pseudo.get(&p).cloned(),
        }
    }

    fn store(&mut self, pseudo: Option<PseudoElement>, style: Arc<ComputedStyle>) {
        match pseudo {
            None => self.base = Some(style),
            Some(p) => {
                self.pseudo.insert(p, style);
            }
        }
    }
}

/// Drop cached styles of `root` and everything below it
pub(crate) fn clear_subtree_styles(tree: &mut DomTree, root: NodeId) {
    for id in tree.subtree(root) {
        if let Ok(element) = tree.element_mut(id) {
            element.styles.clear();
        }
    }
}

fn parse_content(value: &str) -> String {
    let value = value.trim();
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    unquoted.unwrap_or(value).to_string()
}

impl Document {
    /// Computed style of an element, or of one of its pseudo-elements
    pub fn computed_style(
        &self,
        node: NodeId,
        pseudo: Option<PseudoElement>,
    ) -> DomResult<Arc<ComputedStyle>> {
        let mut state = self.lock_tree();
        self.resolve_style_locked(&mut state, node, pseudo)
    }

    /// Whether the element's own style is currently memoised
    pub fn is_style_cached(&self, node: NodeId) -> bool {
        let state = self.lock_tree();
        state
            .tree
            .get(node)
            .and_then(|n| n.as_element())
            .is_some_and(|e| e.styles.base.is_some())
    }

    /// Content generated by the `::before`/`::after` style of an element.
    /// Cached with the host style and dropped whenever it is.
    pub fn generated_content(
        &self,
        node: NodeId,
        pseudo: PseudoElement,
    ) -> DomResult<Option<Arc<GeneratedContent>>> {
        let mut state = self.lock_tree();
        {
            let element = state.tree.node(node)?.as_element().ok_or(DomError::InvalidNodeType)?;
            if let Some(generated) = element.styles.generated.get(&pseudo) {
                return Ok(generated.clone());
            }
        }
        let style = self.resolve_style_locked(&mut state, node, Some(pseudo))?;
        let generated = style.content().map(|content| {
            Arc::new(GeneratedContent {
                pseudo,
                text: parse_content(content),
                style: style.clone(),
            })
        });
        state.tree.element_mut(node)?.styles.generated.insert(pseudo, generated.clone());
        Ok(generated)
    }

    /// Add an author stylesheet; every cached style is dropped
    pub fn add_stylesheet(&self, css: &str) {
        self.change_stylesheets(|sheets| sheets.push(Arc::from(css)));
    }

    /// Remove the author stylesheet at `index`
    pub fn remove_stylesheet(&self, index: usize) -> DomResult<()> {
        {
            let state = self.lock_tree();
            if index >= state.stylesheets.len() {
                return Err(DomError::NotFound);
            }
        }
        self.change_stylesheets(|sheets| {
            sheets.remove(index);
        });
        Ok(())
    }

    pub fn clear_stylesheets(&self) {
        self.change_stylesheets(Vec::clear);
    }

    pub fn stylesheet_count(&self) -> usize {
        self.lock_tree().stylesheets.len()
    }

    fn change_stylesheets(&self, change: impl FnOnce(&mut Vec<Arc<str>>)) {
        let root = {
            let mut state = self.lock_tree();
            change(&mut state.stylesheets);
            state.rules = None;
            let root = state.tree.root();
            clear_subtree_styles(&mut state.tree, root);
            root
        };
        tracing::debug!("Stylesheet set changed, all computed styles dropped");
        self.invalidate(root, NotificationKind::Generic);
    }

    pub(crate) fn resolve_style_locked(
        &self,
        state: &mut TreeState,
        node: NodeId,
        pseudo: Option<PseudoElement>,
    ) -> DomResult<Arc<ComputedStyle>> {
        let element = state.tree.node(node)?.as_element().ok_or(DomError::InvalidNodeType)?;
        if let Some(style) = element.styles.cached(pseudo) {
            return Ok(style);
        }

        // Pseudo-elements inherit from their host, elements from their
        // parent. Uncached ancestors are resolved top-down.
        let mut pending = Vec::new();
        let mut cursor = match pseudo {
            Some(_) => Some(node),
            None => state.tree.parent_element(node),
        };
        let mut inherited = None;
        while let Some(id) = cursor {
            if let Some(style) = state.tree.get(id).and_then(|n| n.as_element()).and_then(|e| e.styles.base()) {
                inherited = Some(style);
                break;
            }
            pending.push(id);
            cursor = state.tree.parent_element(id);
        }
        for &id in pending.iter().rev() {
            inherited = Some(self.compute_style_locked(state, id, None, inherited.as_deref())?);
        }
        self.compute_style_locked(state, node, pseudo, inherited.as_deref())
    }

    /// Cascade one element against its parent's style and store the result
    fn compute_style_locked(
        &self,
        state: &mut TreeState,
        node: NodeId,
        pseudo: Option<PseudoElement>,
        parent: Option<&ComputedStyle>,
    ) -> DomResult<Arc<ComputedStyle>> {
        let index = match &state.rules {
            Some(index) => index.clone(),
            None => {
                let index = self.cascade.classify(&state.stylesheets);
                state.rules = Some(index.clone());
                index
            }
        };
        let condition = MatchCondition {
            focused: state.focused == Some(node),
            hovered: false,
        };

        let mut style = {
            let view = state.tree.element(node).ok_or(DomError::InvalidNodeType)?;
            let rules = self.cascade.applicable_rules(&view, &index, view.attr("style"));
            self.cascade.resolve_style(&view, pseudo, &condition, &rules)
        };
        if let Some(parent) = parent {
            style.inherit_from(parent);
        }
        style.concretize();

        let style = Arc::new(style);
        state.tree.element_mut(node)?.styles.store(pseudo, style.clone());
        Ok(style)
    }
}
