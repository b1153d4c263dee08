//! Name-value-pair option strings, for example `"mipmap=true; maxSize=512; name='a b;c'"`.
//!
//! Every loader and factory receives its options in this form so that a loader wrapping another
//! one can forward (a filtered subset of) the options unchanged.

use std::fmt;
use std::str::FromStr;

const SEPARATORS: &[u8] = b"; \t\n\r";
const QUOTES: &[u8] = b"'\"";

fn is_separator(c: u8) -> bool {
    SEPARATORS.contains(&c)
}

fn is_token_end(c: u8) -> bool {
    c == b'=' || is_separator(c)
}

/// Iterates the `(name, value)` pairs of an option string. Iteration stops at the first token that
/// isn't followed by `=`.
pub struct NvpParser<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> NvpParser<'a> {
    pub fn new(s: &'a str) -> Self {
        NvpParser { s, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.pos).copied()
    }

    fn skip_while(
        &mut self,
        f: impl Fn(u8) -> bool,
    ) {
        while let Some(c) = self.peek() {
            if !f(c) {
                break;
            }
            self.pos += 1;
        }
    }
}

impl<'a> Iterator for NvpParser<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_while(is_separator);
        if self.peek().is_none() {
            return None;
        }

        let name_begin = self.pos;
        self.skip_while(|c| !is_token_end(c));
        let name = &self.s[name_begin..self.pos];

        self.skip_while(|c| c == b' ' || c == b'\t');
        if self.peek() != Some(b'=') {
            // Malformed, don't try to recover
            self.pos = self.s.len();
            return None;
        }
        self.pos += 1;
        self.skip_while(|c| c == b' ' || c == b'\t');

        let value = match self.peek() {
            Some(quote) if QUOTES.contains(&quote) => {
                let value_begin = self.pos + 1;
                let value_end = self.s[value_begin..]
                    .find(quote as char)
                    .map(|offset| value_begin + offset)
                    .unwrap_or(self.s.len());
                self.pos = (value_end + 1).min(self.s.len());
                &self.s[value_begin..value_end]
            }
            _ => {
                let value_begin = self.pos;
                self.skip_while(|c| !is_token_end(c));
                &self.s[value_begin..self.pos]
            }
        };

        Some((name, value))
    }
}

/// An owned option string as passed to `ResourceManager::load()`
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct LoadArgs(String);

impl LoadArgs {
    pub fn new(args: &str) -> Self {
        LoadArgs(args.to_string())
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut args = String::new();
        for (name, value) in pairs {
            append_pair(&mut args, name, value);
        }
        LoadArgs(args)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn iter(&self) -> NvpParser<'_> {
        NvpParser::new(&self.0)
    }

    /// Value of the option with the given name. If an option appears more than once, the last one
    /// wins.
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.iter().filter(|(n, _)| *n == name).map(|(_, v)| v).last()
    }

    pub fn get_parsed<T: FromStr>(
        &self,
        name: &str,
    ) -> Option<T> {
        let value = self.get(name)?;
        match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                log::warn!("Option \"{}\" has unexpected value \"{}\"", name, value);
                None
            }
        }
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.iter().any(|(n, _)| n == name)
    }

    /// Keeps the options whose name passes the predicate, used to forward options to a delegate
    /// loader
    pub fn filtered(
        &self,
        mut predicate: impl FnMut(&str) -> bool,
    ) -> LoadArgs {
        LoadArgs::from_pairs(self.iter().filter(|(name, _)| predicate(name)))
    }

    /// Returns a copy with `name` set to `value`, replacing any existing option of that name
    pub fn with(
        &self,
        name: &str,
        value: &str,
    ) -> LoadArgs {
        let mut args = self.filtered(|n| n != name);
        append_pair(&mut args.0, name, value);
        args
    }
}

fn append_pair(
    args: &mut String,
    name: &str,
    value: &str,
) {
    if !args.is_empty() {
        args.push(';');
    }
    args.push_str(name);
    args.push('=');

    let needs_quote = value.bytes().any(is_token_end)
        || value.bytes().next().map(|c| QUOTES.contains(&c)).unwrap_or(false);
    if !needs_quote {
        args.push_str(value);
        return;
    }

    let quote = if value.contains('"') { '\'' } else { '"' };
    if value.contains(quote) {
        log::warn!("Option \"{}\" contains both quote characters and can't be kept intact", name);
    }
    args.push(quote);
    args.push_str(value);
    args.push(quote);
}

impl fmt::Debug for LoadArgs {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("LoadArgs").field(&self.0).finish()
    }
}

impl fmt::Display for LoadArgs {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LoadArgs {
    fn from(args: &str) -> Self {
        LoadArgs::new(args)
    }
}

impl From<String> for LoadArgs {
    fn from(args: String) -> Self {
        LoadArgs(args)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pairs(s: &str) -> Vec<(&str, &str)> {
        NvpParser::new(s).collect()
    }

    #[test]
    fn parse_simple_pairs() {
        assert_eq!(
            pairs("mipmap=true;maxSize=512"),
            vec![("mipmap", "true"), ("maxSize", "512")]
        );
        assert_eq!(
            pairs("  a = 1 ;\tb=2\n"),
            vec![("a", "1"), ("b", "2")]
        );
        assert!(pairs("").is_empty());
        assert!(pairs(" ; ;").is_empty());
    }

    #[test]
    fn parse_quoted_values() {
        assert_eq!(
            pairs("name='a b;c'; path=\"x=y\""),
            vec![("name", "a b;c"), ("path", "x=y")]
        );
        assert_eq!(pairs("q='unterminated"), vec![("q", "unterminated")]);
    }

    #[test]
    fn parse_stops_at_malformed_token() {
        assert_eq!(pairs("a=1;oops;b=2"), vec![("a", "1")]);
    }

    #[test]
    fn empty_value() {
        assert_eq!(pairs("a=;b=2"), vec![("a", ""), ("b", "2")]);
    }

    #[test]
    fn get_and_parse() {
        let args = LoadArgs::new("blockIteration=3;flip=true;blockIteration=4");
        assert_eq!(args.get("flip"), Some("true"));
        assert_eq!(args.get_parsed::<u32>("blockIteration"), Some(4));
        assert_eq!(args.get_parsed::<bool>("flip"), Some(true));
        assert_eq!(args.get_parsed::<u32>("flip"), None);
        assert_eq!(args.get("missing"), None);
        assert!(args.contains("flip"));
    }

    #[test]
    fn filtered_keeps_values_intact() {
        let args = LoadArgs::new("wrapper=1; name='a b;c'; size=3");
        let forwarded = args.filtered(|name| name != "wrapper");
        assert_eq!(
            forwarded.iter().collect::<Vec<_>>(),
            vec![("name", "a b;c"), ("size", "3")]
        );
        assert!(!forwarded.contains("wrapper"));
    }

    #[test]
    fn with_replaces_existing() {
        let args = LoadArgs::new("a=1;b=2").with("a", "x y");
        assert_eq!(args.get("a"), Some("x y"));
        assert_eq!(args.get("b"), Some("2"));
        assert_eq!(args.iter().count(), 2);
    }

    #[test]
    fn quote_choice_avoids_value_quotes() {
        let args = LoadArgs::from_pairs(vec![("title", "say \"hi\"")]);
        assert_eq!(args.as_str(), "title='say \"hi\"'");
        assert_eq!(args.get("title"), Some("say \"hi\""));
        assert!(LoadArgs::new("").is_empty());
    }
}
