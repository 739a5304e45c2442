//! CoRE link-format parsing (RFC 6690)
//!
//! ```text
//! </vap>;rt="vap-skill-registry";ct=60,</sensors/temp>;if="sensor"
//! ```

use std::iter::Peekable;
use std::str::Chars;

use crate::{Error, Result};

/// One link of a link-format document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// URI reference between the angle brackets
    pub target: String,
    /// Link parameters in document order; flag parameters have no value
    pub attributes: Vec<(String, Option<String>)>,
}

impl Link {
    /// First value of a parameter
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Resource types, `rt` may hold several separated by spaces
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|(n, _)| n == "rt")
            .filter_map(|(_, v)| v.as_deref())
            .flat_map(str::split_whitespace)
    }

    pub fn has_resource_type(&self, rt: &str) -> bool {
        self.resource_types().any(|t| t == rt)
    }
}

/// Parse a link-format document
pub fn parse(input: &str) -> Result<Vec<Link>> {
    let mut chars = input.chars().peekable();
    let mut links = Vec::new();

    skip_whitespace(&mut chars);
    if chars.peek().is_none() {
        return Ok(links);
    }

    loop {
        skip_whitespace(&mut chars);
        links.push(parse_link(&mut chars)?);
        skip_whitespace(&mut chars);

        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => return Err(unexpected(c, "',' between links")),
        }
    }

    Ok(links)
}

fn parse_link(chars: &mut Peekable<Chars<'_>>) -> Result<Link> {
    match chars.next() {
        Some('<') => {}
        Some(c) => return Err(unexpected(c, "'<'")),
        None => return Err(Error::InvalidLinkFormat("expected '<', found end".into())),
    }

    let mut target = String::new();
    loop {
        match chars.next() {
            Some('>') => break,
            Some(c) => target.push(c),
            None => return Err(Error::InvalidLinkFormat("unterminated link target".into())),
        }
    }

    let mut attributes = Vec::new();
    loop {
        skip_whitespace(chars);
        if chars.peek() != Some(&';') {
            break;
        }
        chars.next();
        skip_whitespace(chars);
        attributes.push(parse_param(chars)?);
    }

    Ok(Link { target, attributes })
}

fn parse_param(chars: &mut Peekable<Chars<'_>>) -> Result<(String, Option<String>)> {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '*') {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if name.is_empty() {
        return Err(Error::InvalidLinkFormat("empty parameter name".into()));
    }

    skip_whitespace(chars);
    if chars.peek() != Some(&'=') {
        return Ok((name, None));
    }
    chars.next();
    skip_whitespace(chars);

    let value = if chars.peek() == Some(&'"') {
        chars.next();
        let mut value = String::new();
        loop {
            match chars.next() {
                Some('"') => break,
                Some('\\') => match chars.next() {
                    Some(c) => value.push(c),
                    None => return Err(Error::InvalidLinkFormat("unterminated escape".into())),
                },
                Some(c) => value.push(c),
                None => return Err(Error::InvalidLinkFormat("unterminated quoted value".into())),
            }
        }
        value
    } else {
        let mut value = String::new();
        while let Some(&c) = chars.peek() {
            if c == ';' || c == ',' || c.is_whitespace() {
                break;
            }
            value.push(c);
            chars.next();
        }
        value
    };

    Ok((name, Some(value)))
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn unexpected(c: char, expected: &str) -> Error {
    Error::InvalidLinkFormat(format!("expected {}, found {:?}", expected, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_link() {
        let links = parse("<vap/reg>;rt=\"vap-skill-registry\"").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "vap/reg");
        assert_eq!(links[0].attribute("rt"), Some("vap-skill-registry"));
        assert!(links[0].has_resource_type("vap-skill-registry"));
    }

    #[test]
    fn test_parse_multiple_links() {
        let links = parse("</sensors/temp>;if=\"sensor\";obs, </vap>;rt=\"a vap-skill-registry\";ct=60")
            .unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "/sensors/temp");
        assert_eq!(links[0].attributes[1], ("obs".to_string(), None));
        assert!(!links[0].has_resource_type("vap-skill-registry"));
        assert!(links[1].has_resource_type("vap-skill-registry"));
        assert_eq!(links[1].attribute("ct"), Some("60"));
    }

    #[test]
    fn test_quoted_values_may_hold_separators() {
        let links = parse("</a>;title=\"x, y; z\"").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].attribute("title"), Some("x, y; z"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse("vap/reg;rt=x").is_err());
        assert!(parse("<vap/reg;rt=x").is_err());
        assert!(parse("<a>;rt=\"open").is_err());
        assert!(parse("<a> <b>").is_err());
        assert!(parse("<a>;=x").is_err());
    }
}
