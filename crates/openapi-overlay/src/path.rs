//! JSONPath-style path queries over document trees.
//!
//! Queries return *locations* rather than values: each match is a [`NodePath`] from the document
//! root, so callers can get at the matched node, its parent container, and the key/index that
//! links the two. This is what `remove` needs (delete from parent) and what `update` needs
//! (mutate in place).
//!
//! Supported syntax:
//! - root: `$`
//! - member access: `.name`, `['name']`, `["name"]`
//! - array index: `[0]`, `[-1]`
//! - wildcard: `.*`, `[*]`
//! - union: `['a','b']`, `[0,2]`
//! - recursive descent: `..name`, `..*`, `..['name']`, `..[?(...)]`
//! - filters: `[?(@.field=='value')]`, `[?(@.a.b != 1)]`, `[?(@.field)]` (the parentheses are
//!   optional)

use crate::error::{OverlayError, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// One step of a location: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// Location of a node, as steps from the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<PathStep>);

impl NodePath {
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    /// Split into (parent location, last step). `None` for the root.
    #[must_use]
    pub fn split_last(&self) -> Option<(NodePath, &PathStep)> {
        let (last, parent) = self.0.split_last()?;
        Some((NodePath(parent.to_vec()), last))
    }

    #[must_use]
    pub fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut node = doc;
        for step in &self.0 {
            node = match step {
                PathStep::Key(k) => node.as_object()?.get(k)?,
                PathStep::Index(i) => node.as_array()?.get(*i)?,
            };
        }
        Some(node)
    }

    pub fn resolve_mut<'a>(&self, doc: &'a mut Value) -> Option<&'a mut Value> {
        let mut node = doc;
        for step in &self.0 {
            node = match step {
                PathStep::Key(k) => node.as_object_mut()?.get_mut(k)?,
                PathStep::Index(i) => node.as_array_mut()?.get_mut(*i)?,
            };
        }
        Some(node)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for step in &self.0 {
            match step {
                PathStep::Key(k) => write!(f, "['{}']", k.replace('\'', "\\'"))?,
                PathStep::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Child(Selector),
    Descendant(Selector),
}

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Name(String),
    Index(i64),
    Wildcard,
    Union(Vec<Selector>),
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    operand: NodePath,
    comparison: Option<(CmpOp, Value)>,
}

enum Member {
    Name(String),
    Index(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
}

/// A compiled path query.
#[derive(Debug, Clone, PartialEq)]
pub struct PathQuery {
    segments: Vec<Segment>,
}

impl PathQuery {
    /// Compile a path-query expression.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Path`] if the expression is malformed.
    pub fn parse(expr: &str) -> Result<Self> {
        let segments = Parser::new(expr).parse_query()?;
        Ok(Self { segments })
    }

    /// All distinct locations in `doc` matched by this query, in document order.
    #[must_use]
    pub fn locate(&self, doc: &Value) -> Vec<NodePath> {
        let mut current: Vec<(NodePath, &Value)> = vec![(NodePath::root(), doc)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for (path, node) in &current {
                let node = *node;
                match segment {
                    Segment::Child(sel) => select_children(sel, path, node, &mut next),
                    Segment::Descendant(sel) => {
                        let mut visited = Vec::new();
                        collect_descendants(path.clone(), node, &mut visited);
                        for (p, n) in &visited {
                            select_children(sel, p, *n, &mut next);
                        }
                    }
                }
            }
            if next.is_empty() {
                return Vec::new();
            }
            let mut seen = HashSet::new();
            next.retain(|(p, _)| seen.insert(p.clone()));
            current = next;
        }
        current.into_iter().map(|(p, _)| p).collect()
    }
}

fn collect_descendants<'a>(path: NodePath, node: &'a Value, out: &mut Vec<(NodePath, &'a Value)>) {
    out.push((path.clone(), node));
    match node {
        Value::Object(map) => {
            for (k, v) in map {
                collect_descendants(path.child(PathStep::Key(k.clone())), v, out);
            }
        }
        Value::Array(arr) => {
            for (i, v) in arr.iter().enumerate() {
                collect_descendants(path.child(PathStep::Index(i)), v, out);
            }
        }
        _ => {}
    }
}

fn select_children<'a>(
    sel: &Selector,
    path: &NodePath,
    node: &'a Value,
    out: &mut Vec<(NodePath, &'a Value)>,
) {
    match sel {
        Selector::Name(name) => {
            if let Some(v) = node.as_object().and_then(|m| m.get(name)) {
                out.push((path.child(PathStep::Key(name.clone())), v));
            }
        }
        Selector::Index(idx) => {
            let Some(arr) = node.as_array() else {
                return;
            };
            let resolved = if *idx < 0 {
                usize::try_from(idx.unsigned_abs())
                    .ok()
                    .and_then(|back| arr.len().checked_sub(back))
            } else {
                usize::try_from(*idx).ok()
            };
            if let Some(i) = resolved
                && let Some(v) = arr.get(i)
            {
                out.push((path.child(PathStep::Index(i)), v));
            }
        }
        Selector::Wildcard => for_each_child(path, node, |p, v| out.push((p, v))),
        Selector::Union(members) => {
            for member in members {
                select_children(member, path, node, out);
            }
        }
        Selector::Filter(filter) => for_each_child(path, node, |p, v| {
            if filter.matches(v) {
                out.push((p, v));
            }
        }),
    }
}

fn for_each_child<'a>(path: &NodePath, node: &'a Value, mut f: impl FnMut(NodePath, &'a Value)) {
    match node {
        Value::Object(map) => {
            for (k, v) in map {
                f(path.child(PathStep::Key(k.clone())), v);
            }
        }
        Value::Array(arr) => {
            for (i, v) in arr.iter().enumerate() {
                f(path.child(PathStep::Index(i)), v);
            }
        }
        _ => {}
    }
}

impl Filter {
    fn matches(&self, candidate: &Value) -> bool {
        let operand = self.operand.resolve(candidate);
        match (&self.comparison, operand) {
            (None, found) => found.is_some(),
            (Some((CmpOp::Eq, lit)), Some(v)) => values_equal(v, lit),
            (Some((CmpOp::Eq, _)), None) => false,
            (Some((CmpOp::Ne, lit)), Some(v)) => !values_equal(v, lit),
            (Some((CmpOp::Ne, _)), None) => true,
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else if x.is_f64() || y.is_f64() {
                // Integer against float: 1 == 1.0.
                match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
                    _ => false,
                }
            } else {
                // A negative i64 against a u64 above i64::MAX.
                false
            }
        }
        _ => a == b,
    }
}

fn is_operator_char(c: char) -> bool {
    matches!(c, '<' | '>' | '~' | '&' | '|' | '!')
}

struct Parser<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            expr,
            chars: expr.chars().collect(),
            pos: 0,
        }
    }

    fn err(&self, message: impl Into<String>) -> OverlayError {
        OverlayError::path(self.expr, message)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{c}' at position {}", self.pos)))
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn parse_query(&mut self) -> Result<Vec<Segment>> {
        self.skip_ws();
        if !self.eat('$') {
            return Err(self.err("path query must start with '$'"));
        }
        let mut segments = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some('.') if self.peek_at(1) == Some('.') => {
                    self.pos += 2;
                    let sel = match self.peek() {
                        Some('[') => self.parse_bracket()?,
                        _ => self.parse_dot_member()?,
                    };
                    segments.push(Segment::Descendant(sel));
                }
                Some('.') => {
                    self.pos += 1;
                    segments.push(Segment::Child(self.parse_dot_member()?));
                }
                Some('[') => segments.push(Segment::Child(self.parse_bracket()?)),
                Some(c) => {
                    return Err(self.err(format!("unexpected '{c}' at position {}", self.pos)));
                }
            }
        }
        Ok(segments)
    }

    fn parse_dot_member(&mut self) -> Result<Selector> {
        if self.eat('*') {
            return Ok(Selector::Wildcard);
        }
        let name = self.parse_identifier(false);
        if name.is_empty() {
            return Err(self.err(format!("expected member name at position {}", self.pos)));
        }
        Ok(Selector::Name(name))
    }

    /// Inside a filter, operator characters also end the name.
    fn parse_identifier(&mut self, in_filter: bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| {
            !c.is_whitespace()
                && !matches!(c, '.' | '[' | ']' | '(' | ')' | '=' | '!' | '\'' | '"')
                && !(in_filter && is_operator_char(c))
        }) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_bracket(&mut self) -> Result<Selector> {
        self.expect('[')?;
        self.skip_ws();
        let sel = if self.eat('*') {
            Selector::Wildcard
        } else if self.eat('?') {
            self.skip_ws();
            let filter = if self.eat('(') {
                let f = self.parse_filter()?;
                self.skip_ws();
                self.expect(')')?;
                f
            } else {
                self.parse_filter()?
            };
            Selector::Filter(filter)
        } else {
            let mut members = vec![self.parse_union_member()?];
            loop {
                self.skip_ws();
                if !self.eat(',') {
                    break;
                }
                self.skip_ws();
                members.push(self.parse_union_member()?);
            }
            if members.len() == 1 {
                members.remove(0)
            } else {
                Selector::Union(members)
            }
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(sel)
    }

    fn parse_union_member(&mut self) -> Result<Selector> {
        Ok(match self.parse_member()? {
            Member::Name(n) => Selector::Name(n),
            Member::Index(i) => Selector::Index(i),
        })
    }

    fn parse_member(&mut self) -> Result<Member> {
        match self.peek() {
            Some('\'' | '"') => Ok(Member::Name(self.parse_string()?)),
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(Member::Index(self.parse_integer()?)),
            _ => Err(self.err(format!(
                "expected quoted name or index at position {}",
                self.pos
            ))),
        }
    }

    fn parse_string(&mut self) -> Result<String> {
        let Some(quote) = self.peek().filter(|c| matches!(c, '\'' | '"')) else {
            return Err(self.err(format!("expected string at position {}", self.pos)));
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string literal")),
                Some('\\') => {
                    self.pos += 1;
                    let Some(escaped) = self.peek() else {
                        return Err(self.err("unterminated string literal"));
                    };
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_integer(&mut self) -> Result<i64> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        raw.parse()
            .map_err(|_| self.err(format!("invalid index '{raw}'")))
    }

    fn parse_filter(&mut self) -> Result<Filter> {
        self.skip_ws();
        if !self.eat('@') {
            return Err(self.err("filter expression must start with '@'"));
        }
        let mut operand = Vec::new();
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    let name = self.parse_identifier(true);
                    if name.is_empty() {
                        return Err(self.err("expected member name in filter"));
                    }
                    operand.push(PathStep::Key(name));
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    match self.parse_member()? {
                        Member::Name(n) => operand.push(PathStep::Key(n)),
                        Member::Index(i) => {
                            let i = usize::try_from(i).map_err(|_| {
                                self.err("negative index is not supported in filters")
                            })?;
                            operand.push(PathStep::Index(i));
                        }
                    }
                    self.skip_ws();
                    self.expect(']')?;
                }
                _ => break,
            }
        }
        self.skip_ws();
        let op = if self.peek() == Some('=') && self.peek_at(1) == Some('=') {
            self.pos += 2;
            Some(CmpOp::Eq)
        } else if self.peek() == Some('!') && self.peek_at(1) == Some('=') {
            self.pos += 2;
            Some(CmpOp::Ne)
        } else if let Some(c) = self.peek().filter(|c| is_operator_char(*c) || *c == '=') {
            return Err(self.err(format!(
                "unsupported filter operator '{c}' at position {} (only == and != are supported)",
                self.pos
            )));
        } else {
            None
        };
        let comparison = match op {
            Some(op) => {
                self.skip_ws();
                Some((op, self.parse_literal()?))
            }
            None => None,
        };
        Ok(Filter {
            operand: NodePath(operand),
            comparison,
        })
    }

    fn parse_literal(&mut self) -> Result<Value> {
        match self.peek() {
            Some('\'' | '"') => Ok(Value::String(self.parse_string()?)),
            _ => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.'))
                {
                    self.pos += 1;
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                match raw.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ => serde_json::from_str::<serde_json::Number>(&raw)
                        .map(Value::Number)
                        .map_err(|_| self.err(format!("invalid filter literal '{raw}'"))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn petstore() -> Value {
        json!({
            "info": { "title": "Petstore", "version": "1.0.0" },
            "tags": [
                { "name": "pets", "description": "Pets" },
                { "name": "store" }
            ],
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "listPets",
                        "parameters": [
                            { "name": "limit", "in": "query" },
                            { "name": "X-Trace", "in": "header" }
                        ]
                    },
                    "post": { "operationId": "createPet" }
                },
                "/pets/{petId}": {
                    "get": {
                        "operationId": "showPetById",
                        "parameters": [ { "name": "petId", "in": "path" } ]
                    }
                }
            }
        })
    }

    fn locate(expr: &str, doc: &Value) -> Vec<String> {
        PathQuery::parse(expr)
            .unwrap()
            .locate(doc)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn root_matches_whole_document() {
        let doc = petstore();
        let hits = PathQuery::parse("$").unwrap().locate(&doc);
        assert_eq!(hits, vec![NodePath::root()]);
        assert_eq!(hits[0].resolve(&doc), Some(&doc));
    }

    #[test]
    fn dot_and_bracket_members() {
        let doc = petstore();
        assert_eq!(locate("$.info.title", &doc), vec!["$['info']['title']"]);
        assert_eq!(
            locate("$.paths['/pets'].get", &doc),
            vec!["$['paths']['/pets']['get']"]
        );
        assert_eq!(
            locate(r#"$["paths"]["/pets/{petId}"].get.operationId"#, &doc),
            vec!["$['paths']['/pets/{petId}']['get']['operationId']"]
        );
    }

    #[test]
    fn array_indices_including_negative() {
        let doc = petstore();
        assert_eq!(locate("$.tags[1].name", &doc), vec!["$['tags'][1]['name']"]);
        assert_eq!(locate("$.tags[-1]", &doc), vec!["$['tags'][1]"]);
        assert!(locate("$.tags[5]", &doc).is_empty());
        assert!(locate("$.tags[-3]", &doc).is_empty());
    }

    #[test]
    fn wildcard_and_union() {
        let doc = petstore();
        assert_eq!(
            locate("$.paths['/pets'].*", &doc),
            vec!["$['paths']['/pets']['get']", "$['paths']['/pets']['post']"]
        );
        assert_eq!(locate("$.tags[*].name", &doc).len(), 2);
        assert_eq!(
            locate("$.info['title','version']", &doc),
            vec!["$['info']['title']", "$['info']['version']"]
        );
        assert_eq!(locate("$.tags[0,1]", &doc).len(), 2);
    }

    #[test]
    fn equality_filter() {
        let doc = petstore();
        assert_eq!(
            locate("$.tags[?(@.name=='store')]", &doc),
            vec!["$['tags'][1]"]
        );
        assert_eq!(
            locate("$.paths['/pets'].get.parameters[?(@.in == \"header\")].name", &doc),
            vec!["$['paths']['/pets']['get']['parameters'][1]['name']"]
        );
    }

    #[test]
    fn filter_over_mapping_members() {
        let doc = petstore();
        assert_eq!(
            locate("$.paths['/pets'][?(@.operationId=='createPet')]", &doc),
            vec!["$['paths']['/pets']['post']"]
        );
    }

    #[test]
    fn inequality_and_existence_filters() {
        let doc = petstore();
        assert_eq!(locate("$.tags[?(@.description)]", &doc), vec!["$['tags'][0]"]);
        assert_eq!(
            locate("$.tags[?(@.name != 'pets')]", &doc),
            vec!["$['tags'][1]"]
        );
        assert_eq!(locate("$.tags[?@.name=='pets']", &doc), vec!["$['tags'][0]"]);
    }

    #[test]
    fn filter_literals_compare_by_type() {
        let doc = json!({"items": [
            {"n": 1, "flag": true, "x": null},
            {"n": 2.0, "flag": false},
            {"n": "1"}
        ]});
        assert_eq!(locate("$.items[?(@.n==1)]", &doc), vec!["$['items'][0]"]);
        assert_eq!(locate("$.items[?(@.n==2)]", &doc), vec!["$['items'][1]"]);
        assert_eq!(locate("$.items[?(@.flag==false)]", &doc), vec!["$['items'][1]"]);
        assert_eq!(locate("$.items[?(@.x==null)]", &doc), vec!["$['items'][0]"]);
        assert_eq!(locate("$.items[?(@.n=='1')]", &doc), vec!["$['items'][2]"]);
    }

    #[test]
    fn large_integers_compare_exactly() {
        let doc = json!({"items": [
            {"id": 9_007_199_254_740_992_u64},
            {"id": 9_007_199_254_740_993_u64},
            {"id": 18_446_744_073_709_551_615_u64},
            {"id": -1}
        ]});
        assert_eq!(
            locate("$.items[?(@.id==9007199254740993)]", &doc),
            vec!["$['items'][1]"]
        );
        assert_eq!(
            locate("$.items[?(@.id==18446744073709551615)]", &doc),
            vec!["$['items'][2]"]
        );
        assert_eq!(locate("$.items[?(@.id==-1.0)]", &doc), vec!["$['items'][3]"]);
    }

    #[test]
    fn repeated_locations_are_reported_once() {
        let doc = json!({"list": [1], "a": {"a": {"b": 1}}});
        assert_eq!(locate("$['list','list']", &doc), vec!["$['list']"]);
        assert_eq!(locate("$.list[0,0,-1]", &doc), vec!["$['list'][0]"]);
        assert_eq!(locate("$..a..b", &doc), vec!["$['a']['a']['b']"]);
    }

    #[test]
    fn nested_filter_operand() {
        let doc = json!({"servers": [
            {"url": "a", "variables": {"env": {"default": "prod"}}},
            {"url": "b", "variables": {"env": {"default": "dev"}}}
        ]});
        assert_eq!(
            locate("$.servers[?(@.variables.env['default']=='dev')].url", &doc),
            vec!["$['servers'][1]['url']"]
        );
    }

    #[test]
    fn recursive_descent() {
        let doc = petstore();
        assert_eq!(locate("$..operationId", &doc).len(), 3);
        assert_eq!(
            locate("$..parameters[?(@.in=='path')]", &doc),
            vec!["$['paths']['/pets/{petId}']['get']['parameters'][0]"]
        );
        assert_eq!(locate("$.info..*", &doc).len(), 2);
    }

    #[test]
    fn missing_paths_match_nothing() {
        let doc = petstore();
        assert!(locate("$.nonexistent.path", &doc).is_empty());
        assert!(locate("$.info.title.deeper", &doc).is_empty());
        assert!(locate("$.info[0]", &doc).is_empty());
        assert!(locate("$.tags.name", &doc).is_empty());
    }

    #[test]
    fn malformed_queries_are_rejected() {
        for expr in [
            "info.title",
            "$.",
            "$[",
            "$['unterminated]",
            "$.a[?(@.b=='x']",
            "$.a[?(b=='x')]",
            "$.a[?(@.b==nope)]",
            "$.a[?(@.n<2)]",
            "$.a[?(@.n >= 2)]",
            "$.a[?(@.n=~'x')]",
            "$.a[?(@.n && @.m)]",
            "$.a[?(@.n=2)]",
            "$.a[x]",
            "$ $",
        ] {
            let err = PathQuery::parse(expr).unwrap_err();
            assert!(matches!(err, OverlayError::Path { .. }), "{expr}: {err}");
        }
    }

    #[test]
    fn node_path_navigation() {
        let mut doc = petstore();
        let hit = PathQuery::parse("$.tags[0].name")
            .unwrap()
            .locate(&doc)
            .remove(0);
        let (parent, last) = hit.split_last().unwrap();
        assert_eq!(parent.to_string(), "$['tags'][0]");
        assert_eq!(last, &PathStep::Key("name".to_string()));

        *hit.resolve_mut(&mut doc).unwrap() = json!("animals");
        assert_eq!(doc["tags"][0]["name"], json!("animals"));
        assert!(NodePath::root().split_last().is_none());
    }
}
