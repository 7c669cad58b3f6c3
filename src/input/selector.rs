//! Exemption selectors.
//!
//! Exclusion selectors are parsed once, when the configuration is compiled,
//! so a malformed selector fails construction instead of silently never
//! matching. Parsing and matching are done by the `selectors` crate against
//! the host's [`Element`] view, so the full Selectors Level 4 grammar is
//! available: combinators (` `, `>`, `+`, `~`), attribute operators,
//! `:not()`/`:is()`/`:where()`, and the structural pseudo-classes.
//!
//! Interaction-state pseudo-classes (`:hover`, `:focus`, ...) and
//! pseudo-elements parse but never match: the element view carries no
//! interaction state and events never target a pseudo-element.
//!
//! Matching follows `Element.closest()`: a target is exempt when it or any of
//! its ancestors matches.

use crate::host::{Element, ElementRef};
use cssparser::{CowRcStr, ParseError, ParseErrorKind, ParserInput, SourceLocation, ToCss};
use precomputed_hash::PrecomputedHash;
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{
    self, ElementSelectorFlags, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode,
    NeedsSelectorFlags, QuirksMode,
};
use selectors::parser::{self as css, ParseRelative, SelectorParseErrorKind};
use selectors::{NthIndexCache, OpaqueElement};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Selector parse failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason} at line {line}, column {column}")]
pub struct SelectorError {
    pub line: u32,
    pub column: u32,
    pub reason: String,
}

impl SelectorError {
    fn from_parse(err: ParseError<'_, SelectorParseErrorKind<'_>>) -> Self {
        let reason = match err.kind {
            ParseErrorKind::Basic(basic) => format!("{:?}", basic),
            ParseErrorKind::Custom(custom) => format!("{:?}", custom),
        };
        Self {
            line: err.location.line,
            column: err.location.column,
            reason,
        }
    }
}

// ============================================================================
// Selector dialect
// ============================================================================

/// Selector implementation over plain strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelectors;

/// Identifier, tag or namespace name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssName(String);

impl<'a> From<&'a str> for CssName {
    fn from(value: &'a str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for CssName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssName {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        cssparser::serialize_identifier(&self.0, dest)
    }
}

impl PrecomputedHash for CssName {
    // FNV-1a
    fn precomputed_hash(&self) -> u32 {
        self.0
            .bytes()
            .fold(0x811c_9dc5u32, |hash, byte| {
                (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
            })
    }
}

/// Attribute value in an attribute selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssValue(String);

impl<'a> From<&'a str> for CssValue {
    fn from(value: &'a str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for CssValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToCss for CssValue {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        cssparser::serialize_string(&self.0, dest)
    }
}

/// Non tree-structural pseudo-classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoClass {
    Hover,
    Active,
    Focus,
    FocusWithin,
    FocusVisible,
    Visited,
    Link,
    AnyLink,
    Checked,
    Disabled,
    Enabled,
}

impl PseudoClass {
    fn from_name(name: &str) -> Option<Self> {
        let class = match name.to_ascii_lowercase().as_str() {
            "hover" => PseudoClass::Hover,
            "active" => PseudoClass::Active,
            "focus" => PseudoClass::Focus,
            "focus-within" => PseudoClass::FocusWithin,
            "focus-visible" => PseudoClass::FocusVisible,
            "visited" => PseudoClass::Visited,
            "link" => PseudoClass::Link,
            "any-link" => PseudoClass::AnyLink,
            "checked" => PseudoClass::Checked,
            "disabled" => PseudoClass::Disabled,
            "enabled" => PseudoClass::Enabled,
            _ => return None,
        };
        Some(class)
    }

    fn name(&self) -> &'static str {
        match self {
            PseudoClass::Hover => "hover",
            PseudoClass::Active => "active",
            PseudoClass::Focus => "focus",
            PseudoClass::FocusWithin => "focus-within",
            PseudoClass::FocusVisible => "focus-visible",
            PseudoClass::Visited => "visited",
            PseudoClass::Link => "link",
            PseudoClass::AnyLink => "any-link",
            PseudoClass::Checked => "checked",
            PseudoClass::Disabled => "disabled",
            PseudoClass::Enabled => "enabled",
        }
    }

    fn matches(&self, element: &dyn Element) -> bool {
        match self {
            PseudoClass::Link | PseudoClass::AnyLink => is_link(element),
            PseudoClass::Checked => element.attribute("checked").is_some(),
            PseudoClass::Disabled => is_form_control(element) && element.attribute("disabled").is_some(),
            PseudoClass::Enabled => is_form_control(element) && element.attribute("disabled").is_none(),
            _ => false,
        }
    }
}

impl ToCss for PseudoClass {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        dest.write_char(':')?;
        dest.write_str(self.name())
    }
}

impl css::NonTSPseudoClass for PseudoClass {
    type Impl = PageSelectors;

    fn is_active_or_hover(&self) -> bool {
        matches!(self, PseudoClass::Active | PseudoClass::Hover)
    }

    fn is_user_action_state(&self) -> bool {
        matches!(
            self,
            PseudoClass::Active
                | PseudoClass::Hover
                | PseudoClass::Focus
                | PseudoClass::FocusWithin
                | PseudoClass::FocusVisible
        )
    }
}

/// Pseudo-elements accepted by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoElement {
    Before,
    After,
    FirstLine,
    FirstLetter,
    Marker,
    Placeholder,
    Selection,
}

impl PseudoElement {
    fn from_name(name: &str) -> Option<Self> {
        let element = match name.to_ascii_lowercase().as_str() {
            "before" => PseudoElement::Before,
            "after" => PseudoElement::After,
            "first-line" => PseudoElement::FirstLine,
            "first-letter" => PseudoElement::FirstLetter,
            "marker" => PseudoElement::Marker,
            "placeholder" => PseudoElement::Placeholder,
            "selection" => PseudoElement::Selection,
            _ => return None,
        };
        Some(element)
    }

    fn name(&self) -> &'static str {
        match self {
            PseudoElement::Before => "before",
            PseudoElement::After => "after",
            PseudoElement::FirstLine => "first-line",
            PseudoElement::FirstLetter => "first-letter",
            PseudoElement::Marker => "marker",
            PseudoElement::Placeholder => "placeholder",
            PseudoElement::Selection => "selection",
        }
    }
}

impl ToCss for PseudoElement {
    fn to_css<W: fmt::Write>(&self, dest: &mut W) -> fmt::Result {
        dest.write_str("::")?;
        dest.write_str(self.name())
    }
}

impl css::PseudoElement for PseudoElement {
    type Impl = PageSelectors;
}

impl css::SelectorImpl for PageSelectors {
    type ExtraMatchingData<'a> = ();
    type AttrValue = CssValue;
    type Identifier = CssName;
    type LocalName = CssName;
    type NamespaceUrl = CssName;
    type NamespacePrefix = CssName;
    type BorrowedNamespaceUrl = CssName;
    type BorrowedLocalName = CssName;
    type NonTSPseudoClass = PseudoClass;
    type PseudoElement = PseudoElement;
}

struct PageSelectorParser;

impl<'i> css::Parser<'i> for PageSelectorParser {
    type Impl = PageSelectors;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_is_and_where(&self) -> bool {
        true
    }

    fn parse_non_ts_pseudo_class(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoClass, ParseError<'i, Self::Error>> {
        match PseudoClass::from_name(&name) {
            Some(class) => Ok(class),
            None => Err(location.new_custom_error(
                SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name),
            )),
        }
    }

    fn parse_pseudo_element(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoElement, ParseError<'i, Self::Error>> {
        match PseudoElement::from_name(&name) {
            Some(element) => Ok(element),
            None => Err(location.new_custom_error(
                SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name),
            )),
        }
    }
}

fn is_link(element: &dyn Element) -> bool {
    matches!(element.tag_name().as_str(), "a" | "area") && element.attribute("href").is_some()
}

fn is_form_control(element: &dyn Element) -> bool {
    matches!(
        element.tag_name().as_str(),
        "button" | "input" | "select" | "textarea" | "option" | "optgroup" | "fieldset"
    )
}

// ============================================================================
// Element adapter
// ============================================================================

#[derive(Debug, Clone)]
struct Node(ElementRef);

impl selectors::Element for Node {
    type Impl = PageSelectors;

    fn opaque(&self) -> OpaqueElement {
        let ptr = Arc::as_ptr(&self.0) as *const ();
        // SAFETY: `ptr` is the non-null data pointer of a live `Arc`, and
        // `()` is zero-sized with alignment 1.
        OpaqueElement::new(unsafe { &*ptr })
    }

    fn parent_element(&self) -> Option<Self> {
        self.0.parent().map(Node)
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.0.previous_sibling().map(Node)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.0.next_sibling().map(Node)
    }

    fn first_element_child(&self) -> Option<Self> {
        self.0.first_child().map(Node)
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, local_name: &CssName) -> bool {
        self.0.tag_name() == local_name.0
    }

    fn has_namespace(&self, ns: &CssName) -> bool {
        ns.0 == HTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.0.tag_name() == other.0.tag_name()
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&CssName>,
        local_name: &CssName,
        operation: &AttrSelectorOperation<&CssValue>,
    ) -> bool {
        if let NamespaceConstraint::Specific(url) = ns {
            if !url.0.is_empty() {
                return false;
            }
        }
        self.0
            .attribute(&local_name.0)
            .map_or(false, |value| operation.eval_str(&value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &PseudoClass,
        _context: &mut MatchingContext<PageSelectors>,
    ) -> bool {
        pc.matches(self.0.as_ref())
    }

    fn match_pseudo_element(
        &self,
        _pe: &PseudoElement,
        _context: &mut MatchingContext<PageSelectors>,
    ) -> bool {
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        is_link(self.0.as_ref())
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn has_id(&self, id: &CssName, case_sensitivity: CaseSensitivity) -> bool {
        self.0
            .id()
            .map_or(false, |own| case_sensitivity.eq(own.as_bytes(), id.0.as_bytes()))
    }

    fn has_class(&self, name: &CssName, case_sensitivity: CaseSensitivity) -> bool {
        match case_sensitivity {
            CaseSensitivity::CaseSensitive => self.0.has_class(&name.0),
            CaseSensitivity::AsciiCaseInsensitive => self
                .0
                .attribute("class")
                .map_or(false, |classes| {
                    classes
                        .split_whitespace()
                        .any(|class| class.eq_ignore_ascii_case(&name.0))
                }),
        }
    }

    fn imported_part(&self, _name: &CssName) -> Option<CssName> {
        None
    }

    fn is_part(&self, _name: &CssName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        self.0.first_child().is_none()
    }

    fn is_root(&self) -> bool {
        self.0.parent().is_none()
    }
}

// ============================================================================
// Selector lists
// ============================================================================

/// Comma-separated selector list.
#[derive(Clone)]
pub struct SelectorList {
    source: String,
    compiled: css::SelectorList<PageSelectors>,
}

impl SelectorList {
    /// Parses a selector list.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        let mut input = ParserInput::new(trimmed);
        let mut parser = cssparser::Parser::new(&mut input);
        let compiled =
            css::SelectorList::parse(&PageSelectorParser, &mut parser, ParseRelative::No)
                .map_err(SelectorError::from_parse)?;

        Ok(Self {
            source: trimmed.to_string(),
            compiled,
        })
    }

    /// The selector text as configured.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if `element` matches any selector in the list.
    pub fn matches(&self, element: &ElementRef) -> bool {
        let mut nth_index_cache = NthIndexCache::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut nth_index_cache,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            IgnoreNthChildForInvalidation::No,
        );
        matching::matches_selector_list(&self.compiled, &Node(element.clone()), &mut context)
    }

    /// True if `element` or one of its ancestors matches.
    pub fn matches_closest(&self, element: &ElementRef) -> bool {
        let mut current = Some(element.clone());
        while let Some(el) = current {
            if self.matches(&el) {
                return true;
            }
            current = el.parent();
        }
        false
    }
}

impl PartialEq for SelectorList {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SelectorList").field(&self.source).finish()
    }
}

impl fmt::Display for SelectorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compiled exclusion allowlist.
#[derive(Debug, Clone, Default)]
pub struct ExemptionSet {
    lists: Vec<SelectorList>,
}

impl ExemptionSet {
    /// Compiles every selector, failing on the first malformed one.
    pub fn compile<S: AsRef<str>>(selectors: &[S]) -> Result<Self, (String, SelectorError)> {
        let lists = selectors
            .iter()
            .map(|s| SelectorList::parse(s.as_ref()).map_err(|e| (s.as_ref().to_string(), e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { lists })
    }

    /// True iff `target` lies inside an excluded region.
    ///
    /// A missing target is never exempt.
    pub fn is_exempt(&self, target: Option<&ElementRef>) -> bool {
        match target {
            Some(el) => self.lists.iter().any(|list| list.matches_closest(el)),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }
}
