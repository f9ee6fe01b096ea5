//! Radix tree node.
//!
//! A node holds either a literal run of path characters or a single `{name}` / `{*}`
//! parameter. Literal nodes are split when a new route diverges inside their segment,
//! so literal siblings never start with the same character.

use crate::router::RouteError;
use http::Method;
use memchr::memchr_iter;
use std::collections::HashSet;
use std::ptr;

/// Rank contribution of one literal character
const LITERAL_WEIGHT: i64 = 256;
/// Rank contribution of a `{name}` parameter
const PARAM_WEIGHT: i64 = -1;
/// Rank contribution of a `{*}` wildcard
const WILDCARD_WEIGHT: i64 = -16;

pub(crate) type Params = Vec<(String, String)>;

/// A captured parameter: its name and byte range in the path.
type Span<'r> = (&'r str, usize, usize);

/// State of one lookup.
struct Search<'r, 'p, H> {
    path: &'p str,
    /// `(node address, position)` pairs already explored
    seen: HashSet<(usize, usize)>,
    spans: Vec<Span<'r>>,
    best: Option<(&'r Node<H>, Vec<Span<'r>>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Literal,
    Param(String),
    Wildcard,
}

impl NodeKind {
    fn order(&self) -> u8 {
        match self {
            NodeKind::Literal => 0,
            NodeKind::Param(_) => 1,
            NodeKind::Wildcard => 2,
        }
    }

    fn weight(&self, segment: &str) -> i64 {
        match self {
            NodeKind::Literal => LITERAL_WEIGHT * segment.chars().count() as i64,
            NodeKind::Param(_) => PARAM_WEIGHT,
            NodeKind::Wildcard => WILDCARD_WEIGHT,
        }
    }
}

/// One piece of a route pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    Literal(&'a str),
    Param(&'a str),
    Wildcard,
}

impl Piece<'_> {
    fn segment(&self) -> String {
        match self {
            Piece::Literal(text) => (*text).to_string(),
            Piece::Param(name) => format!("{{{name}}}"),
            Piece::Wildcard => "{*}".to_string(),
        }
    }
}

/// Splits a normalized pattern into literal runs and parameters.
pub(crate) fn parse_pattern(pattern: &str) -> Result<Vec<Piece<'_>>, RouteError> {
    let mut pieces = Vec::new();
    let mut rest = pattern;
    while !rest.is_empty() {
        match rest.find('{') {
            Some(0) => {
                let close = rest.find('}').ok_or_else(|| RouteError::UnclosedParam { pattern: pattern.to_string() })?;
                let name = &rest[1..close];
                let piece = match name {
                    "" => return Err(RouteError::EmptyParamName { pattern: pattern.to_string() }),
                    "*" => Piece::Wildcard,
                    name if name.contains(['{', '/']) => {
                        return Err(RouteError::UnclosedParam { pattern: pattern.to_string() });
                    }
                    name => Piece::Param(name),
                };
                if matches!(pieces.last(), Some(Piece::Param(_) | Piece::Wildcard)) {
                    return Err(RouteError::AdjacentParams { pattern: pattern.to_string() });
                }
                pieces.push(piece);
                rest = &rest[close + 1..];
            }
            Some(open) => {
                pieces.push(Piece::Literal(&rest[..open]));
                rest = &rest[open..];
            }
            None => {
                if rest.contains('}') {
                    return Err(RouteError::UnclosedParam { pattern: pattern.to_string() });
                }
                pieces.push(Piece::Literal(rest));
                rest = "";
            }
        }
    }
    Ok(pieces)
}

#[derive(Debug, Clone)]
pub(crate) struct Node<H> {
    /// concatenation of all segments from the root down to this node
    pub(crate) path: String,
    pub(crate) segment: String,
    pub(crate) kind: NodeKind,
    /// cumulative specificity of the path up to this node
    pub(crate) rank: i64,
    pub(crate) children: Vec<Node<H>>,
    pub(crate) handlers: Vec<(Method, H)>,
}

impl<H> Node<H> {
    pub(crate) fn root() -> Self {
        Self {
            path: String::new(),
            segment: String::new(),
            kind: NodeKind::Literal,
            rank: 0,
            children: Vec::new(),
            handlers: Vec::new(),
        }
    }

    fn child(&self, segment: String, kind: NodeKind) -> Self {
        Self {
            path: format!("{}{}", self.path, segment),
            rank: self.rank + kind.weight(&segment),
            segment,
            kind,
            children: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Finds or creates the node for a parsed pattern, splitting literal nodes as needed.
    pub(crate) fn insert(&mut self, pieces: &[Piece<'_>]) -> &mut Node<H> {
        let mut node = self;
        for piece in pieces {
            match piece {
                Piece::Literal(text) => {
                    let mut text = *text;
                    while !text.is_empty() {
                        let first = text.chars().next();
                        let found = node
                            .children
                            .iter()
                            .position(|c| c.kind == NodeKind::Literal && c.segment.chars().next() == first);

                        let index = match found {
                            Some(index) => {
                                let common = common_prefix(&node.children[index].segment, text);
                                if common < node.children[index].segment.len() {
                                    node.children[index].split(common);
                                }
                                text = &text[common..];
                                index
                            }
                            None => {
                                let child = node.child(text.to_string(), NodeKind::Literal);
                                text = "";
                                node.push_child(child)
                            }
                        };
                        node = &mut node.children[index];
                    }
                }
                param => {
                    let segment = param.segment();
                    let index = match node.children.iter().position(|c| c.segment == segment) {
                        Some(index) => index,
                        None => {
                            let kind = match param {
                                Piece::Param(name) => NodeKind::Param((*name).to_string()),
                                _ => NodeKind::Wildcard,
                            };
                            let child = node.child(segment, kind);
                            node.push_child(child)
                        }
                    };
                    node = &mut node.children[index];
                }
            }
        }
        node
    }

    /// Adds a child keeping literal children before parameters and wildcards.
    fn push_child(&mut self, child: Node<H>) -> usize {
        let order = child.kind.order();
        let index = self.children.iter().position(|c| c.kind.order() > order).unwrap_or(self.children.len());
        self.children.insert(index, child);
        index
    }

    /// Splits this literal node at `at`, moving the tail, children and handlers into a new child.
    fn split(&mut self, at: usize) {
        let tail = self.segment.split_off(at);
        let tail_len = tail.len();
        let tail_node = Node {
            path: self.path.clone(),
            rank: self.rank,
            segment: tail,
            kind: NodeKind::Literal,
            children: std::mem::take(&mut self.children),
            handlers: std::mem::take(&mut self.handlers),
        };
        self.path.truncate(self.path.len() - tail_len);
        self.rank -= NodeKind::Literal.weight(&tail_node.segment);
        self.children.push(tail_node);
    }

    /// Finds the node registered for exactly this pattern.
    pub(crate) fn find_exact_mut(&mut self, pattern: &str) -> Option<&mut Node<H>> {
        if self.path == pattern {
            return Some(self);
        }
        self.children
            .iter_mut()
            .filter(|c| pattern.starts_with(c.path.as_str()))
            .find_map(|c| c.find_exact_mut(pattern))
    }

    /// Finds the highest ranked node with handlers that consumes the whole path, with the
    /// parameters captured on the way; on equal rank the first one found stays.
    pub(crate) fn lookup<'r>(&'r self, path: &str) -> Option<(&'r Node<H>, Params)> {
        let mut search = Search { path, seen: HashSet::new(), spans: Vec::new(), best: None };
        self.search(0, &mut search);
        search.best.map(|(node, spans)| {
            let params = spans.into_iter().map(|(name, start, end)| (name.to_string(), path[start..end].to_string()));
            (node, params.collect())
        })
    }

    /// Matches `path[pos..]` against this node and its subtree.
    ///
    /// Ranks are fixed per node, so reaching the same node at the same position again can
    /// never improve `best`; such states are skipped.
    fn search<'r>(&'r self, pos: usize, search: &mut Search<'r, '_, H>) {
        if !search.seen.insert((ptr::from_ref(self) as usize, pos)) {
            return;
        }
        let path = search.path;
        match &self.kind {
            NodeKind::Literal => {
                if path[pos..].starts_with(self.segment.as_str()) {
                    self.descend(pos + self.segment.len(), search);
                }
            }
            NodeKind::Param(name) => {
                // non-greedy, non-empty, never across '/'
                let limit = path[pos..].find('/').map_or(path.len(), |slash| pos + slash);
                if limit == pos {
                    return;
                }
                for end in self.split_points(path, pos + 1, limit) {
                    search.spans.push((name.as_str(), pos, end));
                    self.descend(end, search);
                    search.spans.pop();
                }
            }
            NodeKind::Wildcard => {
                // greedy, may be empty, may span '/'
                for end in self.split_points(path, pos, path.len()).into_iter().rev() {
                    search.spans.push(("*", pos, end));
                    self.descend(end, search);
                    search.spans.pop();
                }
            }
        }
    }

    /// Ends in `first..=last` where a parameter on this node may stop: positions where a
    /// literal child can start, plus the end of the path when this node has handlers.
    /// Ascending.
    fn split_points(&self, path: &str, first: usize, last: usize) -> Vec<usize> {
        let bytes = &path.as_bytes()[first..(last + 1).min(path.len())];
        let mut ends = Vec::new();
        // children of a parameter are always literals
        for byte in self.children.iter().filter_map(|c| c.segment.as_bytes().first()) {
            ends.extend(memchr_iter(*byte, bytes).map(|offset| first + offset));
        }
        if self.children.len() > 1 {
            ends.sort_unstable();
        }
        if last == path.len() && !self.handlers.is_empty() {
            ends.push(path.len());
        }
        ends
    }

    fn descend<'r>(&'r self, end: usize, search: &mut Search<'r, '_, H>) {
        if end == search.path.len()
            && !self.handlers.is_empty()
            && search.best.as_ref().is_none_or(|(node, _)| self.rank > node.rank)
        {
            search.best = Some((self, search.spans.clone()));
        }
        for child in &self.children {
            child.search(end, search);
        }
    }

    pub(crate) fn visit<'r>(&'r self, f: &mut impl FnMut(&'r Node<H>)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

fn common_prefix(a: &str, b: &str) -> usize {
    let mut len = a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count();
    while !a.is_char_boundary(len) {
        len -= 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_pieces() {
        assert_eq!(
            parse_pattern("/users/{id}/posts/{*}").unwrap(),
            vec![Piece::Literal("/users/"), Piece::Param("id"), Piece::Literal("/posts/"), Piece::Wildcard]
        );
        assert_eq!(parse_pattern("/").unwrap(), vec![Piece::Literal("/")]);
        assert!(matches!(parse_pattern("/a/{id"), Err(RouteError::UnclosedParam { .. })));
        assert!(matches!(parse_pattern("/a/{}"), Err(RouteError::EmptyParamName { .. })));
        assert!(matches!(parse_pattern("/a/{x}{y}"), Err(RouteError::AdjacentParams { .. })));
        assert!(matches!(parse_pattern("/a/x}"), Err(RouteError::UnclosedParam { .. })));
    }

    #[test]
    fn split_keeps_paths_and_ranks() {
        let mut root: Node<u8> = Node::root();
        root.insert(&parse_pattern("/users").unwrap()).handlers.push((Method::GET, 1));
        root.insert(&parse_pattern("/uploads").unwrap()).handlers.push((Method::GET, 2));

        let u = &root.children[0];
        assert_eq!(u.segment, "/u");
        assert_eq!(u.rank, 2 * LITERAL_WEIGHT);
        assert!(u.handlers.is_empty());
        assert_eq!(u.children.len(), 2);

        let mut nodes = Vec::new();
        root.visit(&mut |node| nodes.push(node));
        for node in nodes {
            assert_eq!(node.rank, node.path.chars().count() as i64 * LITERAL_WEIGHT, "{}", node.path);
        }
    }

    #[test]
    fn path_is_concatenation_of_segments() {
        fn check<H>(node: &Node<H>, prefix: &str) {
            let expected = format!("{prefix}{}", node.segment);
            assert_eq!(node.path, expected);
            for child in &node.children {
                check(child, &expected);
            }
        }

        let mut root: Node<u8> = Node::root();
        for pattern in ["/a/b", "/a/{x}", "/abc/{*}", "/ab/{y}/z", "/"] {
            root.insert(&parse_pattern(pattern).unwrap()).handlers.push((Method::GET, 0));
        }
        check(&root, "");
    }
}
