//! Path resolution against the compiled route tree
//!
//! At every depth, of the children whose own segments accept the path, a
//! literal segment wins over a dynamic one at the same position. Once a child
//! has been chosen the walk never backs out of it to try a sibling; only
//! passthrough children (routes adding no segments) are tried in declaration
//! order.

use super::query::{parse_query, path_segments, split_path, QueryMap};
use super::registry::{Named, RouteNode, RouteRegistry, Segment};
use super::ApiMethod;
use crate::component::Component;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Page,
    NotFound,
}

/// Result of resolving one path
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    /// Node that supplied `component`. For the built-in 404 this is the
    /// registry's synthetic root.
    pub node: Arc<RouteNode>,
    /// Declared nodes from the top level down to `node`
    pub chain: Vec<Arc<RouteNode>>,
    pub component: Named<dyn Component>,
    pub kind: MatchKind,
    /// Requested path without the query string
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub query: QueryMap,
}

impl MatchedRoute {
    pub fn is_not_found(&self) -> bool {
        self.kind == MatchKind::NotFound
    }
}

pub(crate) enum Walked {
    Found(Vec<Arc<RouteNode>>),
    Missed(Vec<Arc<RouteNode>>),
}

struct Walker<'a> {
    segments: &'a [&'a str],
    accept: &'a dyn Fn(&RouteNode) -> bool,
    missed: Vec<Arc<RouteNode>>,
    missed_rank: (usize, usize),
}

impl Walker<'_> {
    fn descend(&mut self, node: &RouteNode, depth: usize, trail: &mut Vec<Arc<RouteNode>>) -> bool {
        if depth == self.segments.len() && (self.accept)(node) {
            return true;
        }

        let rest = &self.segments[depth..];
        if !rest.is_empty() {
            let chosen = node
                .sub_routes
                .iter()
                .filter(|c| !c.is_passthrough() && local_accepts(c, rest))
                .min_by(|a, b| precedence(a, b));
            if let Some(child) = chosen {
                trail.push(Arc::clone(child));
                if self.descend(child, depth + child.local_segments().len(), trail) {
                    return true;
                }
                trail.pop();
                return false;
            }
        }

        for child in node.sub_routes.iter().filter(|c| c.is_passthrough()) {
            trail.push(Arc::clone(child));
            if self.descend(child, depth, trail) {
                return true;
            }
            trail.pop();
        }

        self.record_miss(depth, trail);
        false
    }

    /// Keep the trail that got furthest into the path.
    fn record_miss(&mut self, depth: usize, trail: &[Arc<RouteNode>]) {
        let rank = (depth, trail.len());
        if self.missed.is_empty() || rank > self.missed_rank {
            self.missed = trail.to_vec();
            self.missed_rank = rank;
        }
    }
}

/// Orders candidate children: literal before dynamic, segment by segment,
/// then the longer pattern. Ties keep declaration order.
fn precedence(a: &RouteNode, b: &RouteNode) -> Ordering {
    let (left, right) = (a.local_segments(), b.local_segments());
    for (x, y) in left.iter().zip(right) {
        match (x.is_dynamic(), y.is_dynamic()) {
            (false, true) => return Ordering::Less,
            (true, false) => return Ordering::Greater,
            _ => {}
        }
    }
    right.len().cmp(&left.len())
}

fn local_accepts(node: &RouteNode, rest: &[&str]) -> bool {
    let local = node.local_segments();
    local.len() <= rest.len() && local.iter().zip(rest).all(|(seg, value)| seg.accepts(value))
}

pub(crate) fn walk(
    registry: &RouteRegistry,
    segments: &[&str],
    accept: &dyn Fn(&RouteNode) -> bool,
) -> Walked {
    let mut walker = Walker {
        segments,
        accept,
        missed: Vec::new(),
        missed_rank: (0, 0),
    };
    let mut trail = Vec::new();
    if walker.descend(registry.root(), 0, &mut trail) {
        Walked::Found(trail)
    } else {
        Walked::Missed(walker.missed)
    }
}

fn bind_params(node: &RouteNode, segments: &[&str]) -> BTreeMap<String, String> {
    node.segments()
        .iter()
        .zip(segments)
        .filter_map(|(seg, value)| match seg {
            Segment::Dynamic(name) => Some((name.clone(), (*value).to_string())),
            Segment::Literal(_) => None,
        })
        .collect()
}

fn normalized(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Resolve a path to a page, falling back to the nearest declared 404.
pub(crate) fn resolve(registry: &RouteRegistry, path: &str) -> MatchedRoute {
    let (path_part, raw_query) = split_path(path);
    let query = raw_query.map(parse_query).unwrap_or_default();
    let segments = path_segments(path_part);

    let walked = walk(registry, &segments, &|n| n.page.is_some());
    if let Walked::Found(chain) = &walked {
        if let Some(page) = chain.last().and_then(|n| n.page.clone()) {
            let node = Arc::clone(&chain[chain.len() - 1]);
            return MatchedRoute {
                params: bind_params(&node, &segments),
                node,
                chain: chain.clone(),
                component: page,
                kind: MatchKind::Page,
                path: normalized(path_part),
                query,
            };
        }
    }

    let trail = match walked {
        Walked::Found(trail) | Walked::Missed(trail) => trail,
    };
    not_found(registry, trail, &segments, normalized(path_part), query)
}

fn not_found(
    registry: &RouteRegistry,
    trail: Vec<Arc<RouteNode>>,
    segments: &[&str],
    path: String,
    query: QueryMap,
) -> MatchedRoute {
    let nearest = trail
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, node)| node.not_found.clone().map(|page| (i, page)));

    match nearest {
        Some((i, page)) => {
            let chain = trail[..=i].to_vec();
            let node = Arc::clone(&chain[i]);
            MatchedRoute {
                params: bind_params(&node, segments),
                node,
                chain,
                component: page,
                kind: MatchKind::NotFound,
                path,
                query,
            }
        }
        None => MatchedRoute {
            node: Arc::clone(registry.root()),
            chain: trail,
            component: registry.default_not_found().clone(),
            kind: MatchKind::NotFound,
            path,
            params: BTreeMap::new(),
            query,
        },
    }
}

/// Find the node serving `method` at `path`. No 404 fallback.
pub(crate) fn resolve_api(
    registry: &RouteRegistry,
    path: &str,
    method: ApiMethod,
) -> Option<(Arc<RouteNode>, BTreeMap<String, String>, QueryMap)> {
    let (path_part, raw_query) = split_path(path);
    let segments = path_segments(path_part);
    match walk(registry, &segments, &|n| n.api.contains_key(&method)) {
        Walked::Found(chain) => {
            let node = chain.last().cloned()?;
            let params = bind_params(&node, &segments);
            Some((node, params, raw_query.map(parse_query).unwrap_or_default()))
        }
        Walked::Missed(_) => None,
    }
}
