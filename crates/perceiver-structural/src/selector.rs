//! CSS selector subset used by stored locators.
//!
//! Supported: type and universal selectors, `#id`, `.class`, `[attr]`,
//! `[attr=value]` (bare or quoted), `:nth-of-type(n)`, `:nth-child(n)`,
//! descendant and child combinators, and comma separated lists. Anything
//! else is rejected so a bad stored selector fails loudly instead of
//! matching the wrong element.

use crate::dom::{DomTree, NodeId};
use crate::errors::PerceiverError;

#[derive(Clone, Debug, PartialEq)]
pub struct SelectorList {
    selectors: Vec<Complex>,
}

#[derive(Clone, Debug, PartialEq)]
struct Complex {
    parts: Vec<Compound>,
    /// `combinators[i]` joins `parts[i]` and `parts[i + 1]`.
    combinators: Vec<Combinator>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    filters: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq)]
enum Filter {
    Id(String),
    Class(String),
    Attr { name: String, value: Option<String> },
    NthOfType(usize),
    NthChild(usize),
}

pub fn parse(input: &str) -> Result<SelectorList, PerceiverError> {
    let mut parser = Parser {
        source: input,
        chars: input.chars().collect(),
        pos: 0,
    };
    parser.parse_list()
}

impl SelectorList {
    pub fn matches<T: DomTree + ?Sized>(&self, tree: &T, node: NodeId) -> bool {
        tree.is_element(node)
            && self
                .selectors
                .iter()
                .any(|complex| complex.matches_at(tree, node, complex.parts.len() - 1))
    }
}

impl Complex {
    fn matches_at<T: DomTree + ?Sized>(&self, tree: &T, node: NodeId, index: usize) -> bool {
        if !self.parts[index].matches(tree, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => tree
                .parent(node)
                .map(|parent| self.matches_at(tree, parent, index - 1))
                .unwrap_or(false),
            Combinator::Descendant => tree
                .ancestors(node)
                .into_iter()
                .any(|ancestor| self.matches_at(tree, ancestor, index - 1)),
        }
    }
}

impl Compound {
    fn matches<T: DomTree + ?Sized>(&self, tree: &T, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if tree.tag_name(node).as_deref() != Some(tag.as_str()) {
                return false;
            }
        }
        self.filters.iter().all(|filter| match filter {
            Filter::Id(id) => tree.attribute(node, "id").as_deref() == Some(id.as_str()),
            Filter::Class(class) => tree
                .attribute(node, "class")
                .map(|value| value.split_whitespace().any(|token| token == class))
                .unwrap_or(false),
            Filter::Attr { name, value } => match (tree.attribute(node, name), value) {
                (Some(actual), Some(expected)) => &actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Filter::NthOfType(n) => tree.same_tag_index(node) + 1 == *n,
            Filter::NthChild(n) => tree.sibling_index(node) + 1 == *n,
        })
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> PerceiverError {
        PerceiverError::selector(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList, PerceiverError> {
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_complex()?);
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                None => break,
                Some(other) => return Err(self.error(format!("unexpected '{other}'"))),
            }
        }
        Ok(SelectorList { selectors })
    }

    fn parse_complex(&mut self) -> Result<Complex, PerceiverError> {
        let mut parts = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_space = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_space => combinators.push(Combinator::Descendant),
                Some(other) => return Err(self.error(format!("unexpected '{other}'"))),
            }
            parts.push(self.parse_compound()?);
        }
        Ok(Complex { parts, combinators })
    }

    fn parse_compound(&mut self) -> Result<Compound, PerceiverError> {
        let mut compound = Compound::default();
        let mut universal = false;
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                universal = true;
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            }
            _ => {}
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.filters.push(Filter::Id(self.parse_ident()?));
                }
                Some('.') => {
                    self.pos += 1;
                    compound.filters.push(Filter::Class(self.parse_ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    compound.filters.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    compound.filters.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }
        if !universal && compound.tag.is_none() && compound.filters.is_empty() {
            return Err(self.error("empty compound selector"));
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, PerceiverError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                out.push(self.parse_escape()?);
            } else if is_ident_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(self.error("expected identifier"));
        }
        Ok(out)
    }

    fn parse_escape(&mut self) -> Result<char, PerceiverError> {
        let mut hex = String::new();
        while hex.len() < 6 {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    hex.push(c);
                    self.pos += 1;
                }
                _ => break,
            }
        }
        if hex.is_empty() {
            return self.bump().ok_or_else(|| self.error("dangling escape"));
        }
        // A single whitespace terminates a hex escape.
        if matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid escape"))
    }

    fn parse_attribute(&mut self) -> Result<Filter, PerceiverError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();
        let value = match self.bump() {
            Some(']') => return Ok(Filter::Attr { name, value: None }),
            Some('=') => {
                self.skip_whitespace();
                let value = match self.peek() {
                    Some(quote @ ('"' | '\'')) => {
                        self.pos += 1;
                        self.parse_quoted(quote)?
                    }
                    _ => self.parse_ident()?,
                };
                self.skip_whitespace();
                value
            }
            _ => return Err(self.error("unsupported attribute operator")),
        };
        match self.bump() {
            Some(']') => Ok(Filter::Attr {
                name,
                value: Some(value),
            }),
            _ => Err(self.error("unterminated attribute selector")),
        }
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String, PerceiverError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => out.push(self.parse_escape()?),
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn parse_pseudo(&mut self) -> Result<Filter, PerceiverError> {
        let name = self.parse_ident()?.to_ascii_lowercase();
        if self.bump() != Some('(') {
            return Err(self.error(format!("unsupported pseudo-class ':{name}'")));
        }
        self.skip_whitespace();
        let mut digits = String::new();
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            digits.push(c);
            self.pos += 1;
        }
        self.skip_whitespace();
        if self.bump() != Some(')') {
            return Err(self.error("expected ')'"));
        }
        let n: usize = digits
            .parse()
            .map_err(|_| self.error(format!("':{name}' needs a positive integer")))?;
        if n == 0 {
            return Err(self.error("positions are one-based"));
        }
        match name.as_str() {
            "nth-of-type" => Ok(Filter::NthOfType(n)),
            "nth-child" => Ok(Filter::NthChild(n)),
            other => Err(self.error(format!("unsupported pseudo-class ':{other}'"))),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '-' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// Escapes an identifier so [`parse`] reads it back verbatim.
pub fn escape_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading_digit = i == 0 && c.is_ascii_digit();
        if leading_digit {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if is_ident_char(c) {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Double-quoted attribute value.
pub fn quote_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// True when `token` can be used as a bare class selector without escaping.
pub fn is_plain_ident(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        Some('-') => {}
        _ => return false,
    }
    token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDom, NodeSpec};

    fn board() -> MemoryDom {
        MemoryDom::from_root(
            "https://board.example",
            NodeSpec::new("html").child(
                NodeSpec::new("body").children([
                    NodeSpec::new("ul").class("list todo").children([
                        NodeSpec::new("li").class("card").attr("data-testid", "card").text("Buy milk"),
                        NodeSpec::new("li").class("card").attr("data-testid", "card").text("Walk dog"),
                    ]),
                    NodeSpec::new("div").id("123abc").child(
                        NodeSpec::new("span").child(NodeSpec::new("a").attr("href", "/x").text("link")),
                    ),
                ]),
            ),
        )
        .unwrap()
    }

    #[test]
    fn matches_attribute_and_position() {
        let dom = board();
        let cards = dom.query_selector_all("[data-testid=\"card\"]").unwrap();
        assert_eq!(cards.len(), 2);
        let second = dom.query_selector_all("ul.todo > li:nth-of-type(2)").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(dom.inner_text(second[0]), "Walk dog");
    }

    #[test]
    fn descendant_combinator_backtracks() {
        let dom = board();
        assert_eq!(dom.query_selector_all("body a").unwrap().len(), 1);
        assert_eq!(dom.query_selector_all("body > a").unwrap().len(), 0);
        assert_eq!(dom.query_selector_all("html div > span > a").unwrap().len(), 1);
    }

    #[test]
    fn escaped_ids_round_trip() {
        let dom = board();
        let selector = format!("#{}", escape_ident("123abc"));
        assert_eq!(selector, "#\\31 23abc");
        assert_eq!(dom.query_selector_all(&selector).unwrap().len(), 1);
    }

    #[test]
    fn lists_and_universal() {
        let dom = board();
        assert_eq!(dom.query_selector_all("ul, span").unwrap().len(), 2);
        assert_eq!(dom.query_selector_all("li > *").unwrap().len(), 0);
        assert_eq!(dom.query_selector_all("*").unwrap().len(), dom.all_elements().len());
    }

    #[test]
    fn unsupported_syntax_is_an_error() {
        assert!(parse("li:hover").is_err());
        assert!(parse("li ~ a").is_err());
        assert!(parse("[data-x^=\"a\"]").is_err());
        assert!(parse("").is_err());
        assert!(parse("li:nth-of-type(0)").is_err());
    }

    #[test]
    fn quoting_escapes_quotes() {
        assert_eq!(quote_value("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert!(is_plain_ident("btn-primary"));
        assert!(!is_plain_ident("w-1/2"));
        assert!(!is_plain_ident("2col"));
    }
}
