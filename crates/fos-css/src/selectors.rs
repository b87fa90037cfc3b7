//! Selector parsing and matching
//!
//! Complex selectors are kept as compounds joined by combinators and matched
//! right to left against [`ElementView`]s. Dynamic pseudo-classes are only
//! allowed on the subject compound; they are reported as rule requirements
//! rather than evaluated here.

use fos_dom::{ElementView, PseudoElement};

use crate::CssError;

/// How two compounds relate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// `a b`
    Descendant,
    /// `a > b`
    Child,
    /// `a + b`
    NextSibling,
    /// `a ~ b`
    LaterSibling,
}

/// Structural pseudo-classes decided from the tree alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoClass {
    Root,
    FirstChild,
    LastChild,
    OnlyChild,
}

impl PseudoClass {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "root" => Some(Self::Root),
            "first-child" => Some(Self::FirstChild),
            "last-child" => Some(Self::LastChild),
            "only-child" => Some(Self::OnlyChild),
            _ => None,
        }
    }

    fn matches(self, element: &ElementView<'_>) -> bool {
        let first = element.previous_element_sibling().is_none();
        let last = element.next_element_sibling().is_none();
        match self {
            Self::Root => element.is_root(),
            Self::FirstChild => first,
            Self::LastChild => last,
            Self::OnlyChild => first && last,
        }
    }
}

/// Attribute selector
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSelector {
    pub name: String,
    pub matcher: Option<AttributeMatcher>,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeMatcher {
    /// `[attr=value]`
    Exact(String),
    /// `[attr~=value]`, whitespace-separated list contains
    Includes(String),
    /// `[attr|=value]`, exact or prefix with hyphen
    DashMatch(String),
    /// `[attr^=value]`
    Prefix(String),
    /// `[attr$=value]`
    Suffix(String),
    /// `[attr*=value]`
    Substring(String),
}

impl AttributeSelector {
    pub fn matches(&self, value: Option<&str>) -> bool {
        let (Some(matcher), Some(value)) = (&self.matcher, value) else {
            return self.matcher.is_none() && value.is_some();
        };
        let fold = |s: &str| {
            if self.case_insensitive {
                s.to_lowercase()
            } else {
                s.to_string()
            }
        };
        let value = fold(value);
        match matcher {
            AttributeMatcher::Exact(expected) => value == fold(expected),
            AttributeMatcher::Includes(expected) => {
                let expected = fold(expected);
                value.split_ascii_whitespace().any(|w| w == expected)
            }
            AttributeMatcher::DashMatch(expected) => {
                let expected = fold(expected);
                value == expected || value.starts_with(&format!("{expected}-"))
            }
            AttributeMatcher::Prefix(expected) => !expected.is_empty() && value.starts_with(&fold(expected)),
            AttributeMatcher::Suffix(expected) => !expected.is_empty() && value.ends_with(&fold(expected)),
            AttributeMatcher::Substring(expected) => !expected.is_empty() && value.contains(&fold(expected)),
        }
    }
}

/// Simple selectors that must all hold for one element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compound {
    /// Lower-cased type selector, `None` for `*` or no type
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
    pub pseudo_classes: Vec<PseudoClass>,
    pub focus: bool,
    pub hover: bool,
}

impl Compound {
    pub fn matches(&self, element: &ElementView<'_>) -> bool {
        if let Some(tag) = &self.tag {
            if element.local_name() != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id_attr() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| element.has_class(c))
            && self.attributes.iter().all(|a| a.matches(element.attr(&a.name)))
            && self.pseudo_classes.iter().all(|p| p.matches(element))
    }

    fn is_dynamic(&self) -> bool {
        self.focus || self.hover
    }

    fn is_empty(&self) -> bool {
        *self == Compound::default()
    }
}

/// One complex selector out of a selector list
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    text: String,
    /// Rightmost (subject) compound first
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` to `compounds[i + 1]`
    combinators: Vec<Combinator>,
    pseudo: Option<PseudoElement>,
}

impl Selector {
    pub fn parse(text: &str) -> Result<Self, CssError> {
        SelectorParser::new(text).parse()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn subject(&self) -> &Compound {
        &self.compounds[0]
    }

    pub fn pseudo_element(&self) -> Option<PseudoElement> {
        self.pseudo
    }

    pub fn requires_focus(&self) -> bool {
        self.subject().focus
    }

    pub fn requires_hover(&self) -> bool {
        self.subject().hover
    }

    /// (ids, classes/attributes/pseudo-classes, types/pseudo-elements)
    pub fn specificity(&self) -> (u32, u32, u32) {
        let mut weight = (0, 0, 0);
        for compound in &self.compounds {
            weight.0 += u32::from(compound.id.is_some());
            weight.1 += (compound.classes.len() + compound.attributes.len() + compound.pseudo_classes.len()) as u32
                + u32::from(compound.focus)
                + u32::from(compound.hover);
            weight.2 += u32::from(compound.tag.is_some());
        }
        if self.pseudo.is_some() {
            weight.2 += 1;
        }
        weight
    }

    /// Whether the selector matches `element`, ignoring dynamic state
    pub fn matches(&self, element: &ElementView<'_>) -> bool {
        self.matches_from(0, *element)
    }

    fn matches_from(&self, at: usize, element: ElementView<'_>) -> bool {
        if !self.compounds[at].matches(&element) {
            return false;
        }
        let Some(&combinator) = self.combinators.get(at) else {
            return true;
        };
        let next = at + 1;
        match combinator {
            Combinator::Child => element.parent_element().is_some_and(|p| self.matches_from(next, p)),
            Combinator::NextSibling => element
                .previous_element_sibling()
                .is_some_and(|s| self.matches_from(next, s)),
            Combinator::Descendant => {
                let mut current = element.parent_element();
                while let Some(ancestor) = current {
                    if self.matches_from(next, ancestor) {
                        return true;
                    }
                    current = ancestor.parent_element();
                }
                false
            }
            Combinator::LaterSibling => {
                let mut current = element.previous_element_sibling();
                while let Some(sibling) = current {
                    if self.matches_from(next, sibling) {
                        return true;
                    }
                    current = sibling.previous_element_sibling();
                }
                false
            }
        }
    }
}

/// Split a serialised selector list at top-level commas
pub fn split_selector_list(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

struct SelectorParser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, chars: text.trim().chars().collect(), pos: 0 }
    }

    fn unsupported(&self, what: &str) -> CssError {
        CssError::UnsupportedSelector { selector: self.text.trim().to_string(), reason: what.to_string() }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse(mut self) -> Result<Selector, CssError> {
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();
        let mut pseudo = None;

        loop {
            let compound = self.compound(&mut pseudo)?;
            compounds.push(compound);
            let spaced = self.skip_whitespace();
            let Some(c) = self.peek() else {
                break;
            };
            if pseudo.is_some() {
                return Err(self.unsupported("pseudo-element before the subject"));
            }
            let combinator = match c {
                '>' => Combinator::Child,
                '+' => Combinator::NextSibling,
                '~' => Combinator::LaterSibling,
                _ if spaced => Combinator::Descendant,
                _ => return Err(self.unsupported("unexpected character")),
            };
            if combinator != Combinator::Descendant {
                self.bump();
                self.skip_whitespace();
            }
            combinators.push(combinator);
        }

        compounds.reverse();
        combinators.reverse();
        if compounds.iter().skip(1).any(Compound::is_dynamic) {
            return Err(self.unsupported("dynamic pseudo-class outside the subject"));
        }
        Ok(Selector {
            text: self.text.trim().to_string(),
            compounds,
            combinators,
            pseudo,
        })
    }

    fn compound(&mut self, pseudo: &mut Option<PseudoElement>) -> Result<Compound, CssError> {
        let mut compound = Compound::default();
        let mut universal = false;

        if self.peek() == Some('*') {
            self.bump();
            universal = true;
        } else if self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }
        if self.peek() == Some('|') {
            return Err(self.unsupported("namespaces"));
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.ident()?);
                }
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.attribute()?);
                }
                Some(':') => {
                    self.bump();
                    let double = self.peek() == Some(':');
                    if double {
                        self.bump();
                    }
                    let name = self.ident()?.to_ascii_lowercase();
                    if self.peek() == Some('(') {
                        return Err(self.unsupported("functional pseudo-classes"));
                    }
                    if pseudo.is_some() {
                        return Err(self.unsupported("selectors after a pseudo-element"));
                    }
                    match (double, name.as_str()) {
                        (_, "before" | "after" | "first-line" | "first-letter") => {
                            *pseudo = PseudoElement::from_name(&name);
                        }
                        (true, _) => return Err(self.unsupported("pseudo-element")),
                        (false, "focus") => compound.focus = true,
                        (false, "hover") => compound.hover = true,
                        (false, other) => match PseudoClass::parse(other) {
                            Some(pc) => compound.pseudo_classes.push(pc),
                            None => return Err(self.unsupported("pseudo-class")),
                        },
                    }
                }
                _ => break,
            }
        }

        if compound.is_empty() && !universal && pseudo.is_none() {
            return Err(self.unsupported("empty compound"));
        }
        Ok(compound)
    }

    fn ident(&mut self) -> Result<String, CssError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => break,
                }
            } else if is_ident_char(c) {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            Err(self.unsupported("expected identifier"))
        } else {
            Ok(out)
        }
    }

    fn attribute(&mut self) -> Result<AttributeSelector, CssError> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();

        let operator = match (self.peek(), self.peek_at(1)) {
            (Some(']'), _) => {
                self.bump();
                return Ok(AttributeSelector { name, matcher: None, case_insensitive: false });
            }
            (Some('='), _) => {
                self.bump();
                '='
            }
            (Some(op @ ('~' | '|' | '^' | '$' | '*')), Some('=')) => {
                self.pos += 2;
                op
            }
            _ => return Err(self.unsupported("attribute operator")),
        };
        self.skip_whitespace();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == q => break,
                        Some('\\') => {
                            if let Some(c) = self.bump() {
                                value.push(c);
                            }
                        }
                        Some(c) => value.push(c),
                        None => return Err(self.unsupported("unterminated string")),
                    }
                }
                value
            }
            _ => self.ident()?,
        };
        self.skip_whitespace();
        let case_insensitive = match self.peek() {
            Some('i' | 'I') => {
                self.bump();
                true
            }
            Some('s' | 'S') => {
                self.bump();
                false
            }
            _ => false,
        };
        self.skip_whitespace();
        if self.bump() != Some(']') {
            return Err(self.unsupported("unterminated attribute selector"));
        }

        let matcher = match operator {
            '=' => AttributeMatcher::Exact(value),
            '~' => AttributeMatcher::Includes(value),
            '|' => AttributeMatcher::DashMatch(value),
            '^' => AttributeMatcher::Prefix(value),
            '$' => AttributeMatcher::Suffix(value),
            _ => AttributeMatcher::Substring(value),
        };
        Ok(AttributeSelector { name, matcher: Some(matcher), case_insensitive })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
