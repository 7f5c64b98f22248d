//! Element locators and their WebDriver strategies

use std::fmt;

use serde::{Deserialize, Serialize};

/// How to find an element on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// `name` attribute
    Name(String),
    /// `id` attribute
    Id(String),
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
    /// Exact visible text of an anchor
    LinkText(String),
    /// Single class name
    ClassName(String),
    /// Element tag name
    TagName(String),
}

impl Locator {
    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::Id(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::Css(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::XPath(value.into())
    }

    pub fn link_text(value: impl Into<String>) -> Self {
        Self::LinkText(value.into())
    }

    pub fn class_name(value: impl Into<String>) -> Self {
        Self::ClassName(value.into())
    }

    pub fn tag_name(value: impl Into<String>) -> Self {
        Self::TagName(value.into())
    }

    /// The W3C location strategy and value for this locator.
    ///
    /// WebDriver only knows `css selector`, `xpath`, `link text`,
    /// `partial link text` and `tag name`, so attribute based locators are
    /// rewritten to CSS attribute selectors.
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Name(name) => ("css selector", format!("[name={}]", css_string(name))),
            Locator::Id(id) => ("css selector", format!("[id={}]", css_string(id))),
            Locator::ClassName(class) => {
                ("css selector", format!("[class~={}]", css_string(class)))
            }
            Locator::Css(css) => ("css selector", css.clone()),
            Locator::XPath(xpath) => ("xpath", xpath.clone()),
            Locator::LinkText(text) => ("link text", text.clone()),
            Locator::TagName(tag) => ("tag name", tag.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Name(v) => write!(f, "name '{}'", v),
            Locator::Id(v) => write!(f, "id '{}'", v),
            Locator::Css(v) => write!(f, "css '{}'", v),
            Locator::XPath(v) => write!(f, "xpath '{}'", v),
            Locator::LinkText(v) => write!(f, "link text '{}'", v),
            Locator::ClassName(v) => write!(f, "class '{}'", v),
            Locator::TagName(v) => write!(f, "tag '{}'", v),
        }
    }
}

/// Quote a value as a CSS string literal.
fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\a "),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote a value as an XPath 1.0 string literal.
///
/// XPath has no escape syntax, so values holding both quote kinds are
/// assembled with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }

    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}
