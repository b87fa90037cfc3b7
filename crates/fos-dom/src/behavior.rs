//! Element behaviour table
//!
//! Every element is the same `ElementData`; what differs per tag is looked
//! up here by `ElementKind`: which resource it loads, whether that load
//! blocks layout, and which script-visible properties it exposes. The
//! property table is built once when the registry is created.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::document::Document;
use crate::operations::DomResult;
use crate::resource::ResourceKind;
use crate::tree::ElementView;
use crate::NodeId;

/// Tag-kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Html,
    Head,
    Body,
    Title,
    Meta,
    Link,
    Style,
    Script,
    Img,
    Anchor,
    Area,
    Form,
    Input,
    TextArea,
    Button,
    Select,
    Option,
    Div,
    Span,
    Paragraph,
    Heading,
    List,
    ListItem,
    Table,
    Iframe,
    Unknown,
}

const TAGS: &[(&str, ElementKind)] = &[
    ("html", ElementKind::Html),
    ("head", ElementKind::Head),
    ("body", ElementKind::Body),
    ("title", ElementKind::Title),
    ("meta", ElementKind::Meta),
    ("link", ElementKind::Link),
    ("style", ElementKind::Style),
    ("script", ElementKind::Script),
    ("img", ElementKind::Img),
    ("a", ElementKind::Anchor),
    ("area", ElementKind::Area),
    ("form", ElementKind::Form),
    ("input", ElementKind::Input),
    ("textarea", ElementKind::TextArea),
    ("button", ElementKind::Button),
    ("select", ElementKind::Select),
    ("option", ElementKind::Option),
    ("div", ElementKind::Div),
    ("span", ElementKind::Span),
    ("p", ElementKind::Paragraph),
    ("h1", ElementKind::Heading),
    ("h2", ElementKind::Heading),
    ("h3", ElementKind::Heading),
    ("h4", ElementKind::Heading),
    ("h5", ElementKind::Heading),
    ("h6", ElementKind::Heading),
    ("ul", ElementKind::List),
    ("ol", ElementKind::List),
    ("li", ElementKind::ListItem),
    ("table", ElementKind::Table),
    ("iframe", ElementKind::Iframe),
];

type Getter = Box<dyn Fn(&ElementView<'_>) -> Option<String> + Send + Sync>;
type Setter = Box<dyn Fn(&Document, NodeId, &str) -> DomResult<()> + Send + Sync>;

/// One script-visible property: a getter and an optional setter
pub struct ScriptProperty {
    getter: Getter,
    setter: Option<Setter>,
}

impl ScriptProperty {
    /// Property backed directly by an attribute
    pub fn reflect(attr: &'static str) -> Self {
        Self {
            getter: Box::new(move |el: &ElementView<'_>| el.attr(attr).map(str::to_owned)),
            setter: Some(Box::new(move |doc: &Document, node: NodeId, value: &str| {
                doc.set_attribute(node, attr, value)
            })),
        }
    }

    pub fn read_only(getter: impl Fn(&ElementView<'_>) -> Option<String> + Send + Sync + 'static) -> Self {
        Self { getter: Box::new(getter), setter: None }
    }

    pub fn read_write(
        getter: impl Fn(&ElementView<'_>) -> Option<String> + Send + Sync + 'static,
        setter: impl Fn(&Document, NodeId, &str) -> DomResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self { getter: Box::new(getter), setter: Some(Box::new(setter)) }
    }

    pub fn get(&self, element: &ElementView<'_>) -> Option<String> {
        (self.getter)(element)
    }

    pub fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    pub(crate) fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }
}

impl std::fmt::Debug for ScriptProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptProperty")
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// Behaviour shared by every element of one kind
#[derive(Debug)]
pub struct ElementBehavior {
    pub kind: ElementKind,
    /// Resource fetched from the `src` attribute once attached
    pub resource: Option<ResourceKind>,
    /// Whether that fetch must finish before layout proceeds
    pub layout_blocking: bool,
    properties: HashMap<&'static str, ScriptProperty>,
}

impl ElementBehavior {
    fn new(kind: ElementKind) -> Self {
        let mut properties = HashMap::new();
        properties.insert("id", ScriptProperty::reflect("id"));
        properties.insert("className", ScriptProperty::reflect("class"));
        properties.insert("title", ScriptProperty::reflect("title"));
        properties.insert(
            "tagName",
            ScriptProperty::read_only(|el| Some(el.local_name().to_ascii_uppercase())),
        );
        properties.insert(
            "textContent",
            ScriptProperty::read_write(|el| Some(el.text_content()), |doc, node, value| {
                doc.set_text_content(node, value)
            }),
        );
        Self { kind, resource: None, layout_blocking: false, properties }
    }

    fn with_resource(mut self, resource: ResourceKind, layout_blocking: bool) -> Self {
        self.resource = Some(resource);
        self.layout_blocking = layout_blocking;
        self
    }

    fn reflect(mut self, names: &[(&'static str, &'static str)]) -> Self {
        for &(property, attr) in names {
            self.properties.insert(property, ScriptProperty::reflect(attr));
        }
        self
    }

    /// Look up a script property by name
    pub fn property(&self, name: &str) -> Option<&ScriptProperty> {
        self.properties.get(name)
    }

    /// Property names, sorted
    pub fn property_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.properties.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Tag name -> behaviour registry
#[derive(Debug)]
pub struct BehaviorRegistry {
    tags: HashMap<&'static str, ElementKind>,
    behaviors: HashMap<ElementKind, ElementBehavior>,
    fallback: ElementBehavior,
}

impl BehaviorRegistry {
    /// Registry with the HTML elements the engine knows about
    pub fn standard() -> Self {
        let tags: HashMap<_, _> = TAGS.iter().copied().collect();
        let mut behaviors = HashMap::new();
        for &(_, kind) in TAGS {
            behaviors.entry(kind).or_insert_with(|| Self::behavior_for(kind));
        }
        Self { tags, behaviors, fallback: ElementBehavior::new(ElementKind::Unknown) }
    }

    /// Process-wide standard registry, built on first use
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<BehaviorRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::standard())))
    }

    fn behavior_for(kind: ElementKind) -> ElementBehavior {
        let base = ElementBehavior::new(kind);
        match kind {
            ElementKind::Img => base
                .with_resource(ResourceKind::Image, false)
                .reflect(&[("src", "src"), ("alt", "alt"), ("width", "width"), ("height", "height")]),
            ElementKind::Script => base
                .with_resource(ResourceKind::Script, true)
                .reflect(&[("src", "src"), ("type", "type")])
                .with_text_property("text"),
            ElementKind::Title => base.with_text_property("text"),
            ElementKind::Anchor => base.reflect(&[
                ("href", "href"),
                ("name", "name"),
                ("target", "target"),
                ("rel", "rel"),
            ]),
            ElementKind::Area => base.reflect(&[("href", "href"), ("alt", "alt")]),
            ElementKind::Link => base.reflect(&[("href", "href"), ("rel", "rel"), ("type", "type")]),
            ElementKind::Form => base.reflect(&[
                ("action", "action"),
                ("method", "method"),
                ("name", "name"),
            ]),
            ElementKind::Input | ElementKind::Button | ElementKind::Select | ElementKind::TextArea => {
                base.reflect(&[("name", "name"), ("type", "type"), ("value", "value")])
            }
            ElementKind::Iframe => base.reflect(&[("src", "src"), ("name", "name")]),
            ElementKind::Style => base.reflect(&[("media", "media"), ("type", "type")]),
            ElementKind::Meta => base.reflect(&[("name", "name"), ("content", "content")]),
            _ => base,
        }
    }

    /// Kind for a (lower-cased) tag name
    pub fn kind_for_tag(&self, tag: &str) -> ElementKind {
        self.tags.get(tag).copied().unwrap_or(ElementKind::Unknown)
    }

    pub fn behavior(&self, kind: ElementKind) -> &ElementBehavior {
        self.behaviors.get(&kind).unwrap_or(&self.fallback)
    }
}

impl Default for BehaviorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ElementBehavior {
    fn with_text_property(mut self, name: &'static str) -> Self {
        self.properties.insert(
            name,
            ScriptProperty::read_write(|el| Some(el.text_content()), |doc, node, value| {
                doc.set_text_content(node, value)
            }),
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_lookup() {
        let registry = BehaviorRegistry::standard();
        assert_eq!(registry.kind_for_tag("img"), ElementKind::Img);
        assert_eq!(registry.kind_for_tag("h3"), ElementKind::Heading);
        assert_eq!(registry.kind_for_tag("blink"), ElementKind::Unknown);
    }

    #[test]
    fn test_resource_kinds() {
        let registry = BehaviorRegistry::standard();
        let img = registry.behavior(ElementKind::Img);
        assert_eq!(img.resource, Some(ResourceKind::Image));
        assert!(!img.layout_blocking);

        let script = registry.behavior(ElementKind::Script);
        assert_eq!(script.resource, Some(ResourceKind::Script));
        assert!(script.layout_blocking);

        assert!(registry.behavior(ElementKind::Div).resource.is_none());
    }

    #[test]
    fn test_shared_registry_is_built_once() {
        let a = BehaviorRegistry::shared();
        let b = BehaviorRegistry::shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.kind_for_tag("form"), ElementKind::Form);
    }

    #[test]
    fn test_property_tables() {
        let registry = BehaviorRegistry::standard();
        let img = registry.behavior(ElementKind::Img);
        assert!(img.property("src").is_some_and(ScriptProperty::is_writable));
        assert!(img.property("tagName").is_some_and(|p| !p.is_writable()));
        assert!(img.property("href").is_none());
        assert!(registry.behavior(ElementKind::Unknown).property("id").is_some());
    }
}
