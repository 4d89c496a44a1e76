//! In-process graph store.
//!
//! Holds nodes and edges with the same MERGE semantics as the live store and
//! evaluates the single-node-pattern subset of the query grammar: label
//! alternatives, `AND`-ed predicates, property and `labels()` projections,
//! `count()`, `DISTINCT`, `ORDER BY` on aliases, `SKIP` and `LIMIT`.
//! Anything else is reported as [`GraphError::Unsupported`].

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use cartograph_core::{Edge, FactBatch, NodeKey, NodeLabel};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::client::GraphError;
use crate::cypher::{self, render, split_top_level, ClauseKind, Token, ValidatedQuery};
use crate::store::{GraphStore, Record, WriteSummary};

#[derive(Debug, Clone)]
struct StoredNode {
    label: NodeLabel,
    properties: Record,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: Vec<StoredNode>,
    index: HashMap<NodeKey, usize>,
    edges: BTreeSet<Edge>,
}

#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.inner.read().await.edges.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn fetch_all(&self, query: &str) -> Result<Vec<Record>, GraphError> {
        let validated = cypher::validate(query)?;
        let plan = Plan::compile(&validated)?;
        let inner = self.inner.read().await;
        Ok(plan.execute(&inner.nodes))
    }

    async fn write_facts(&self, batch: &FactBatch) -> Result<WriteSummary, GraphError> {
        batch
            .validate()
            .map_err(|e| GraphError::InvalidFacts(e.to_string()))?;

        let mut inner = self.inner.write().await;
        for node in &batch.nodes {
            let properties: Record = node
                .properties()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect();
            let stored = StoredNode {
                label: node.label(),
                properties,
            };
            match inner.index.get(&node.key()).copied() {
                Some(slot) => inner.nodes[slot] = stored,
                None => {
                    let slot = inner.nodes.len();
                    inner.nodes.push(stored);
                    inner.index.insert(node.key(), slot);
                }
            }
        }
        inner.edges.extend(batch.edges.iter().cloned());

        Ok(WriteSummary {
            nodes_written: batch.node_count(),
            edges_written: batch.edge_count(),
        })
    }
}

// ── Evaluation ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Expr {
    Property(String),
    Labels,
    Lower(Box<Expr>),
    Literal(Value),
}

#[derive(Debug, Clone, Copy)]
enum Comparison {
    Eq,
    Ne,
    StartsWith,
    EndsWith,
    Contains,
    In,
}

#[derive(Debug, Clone)]
enum Predicate {
    Compare(Expr, Comparison, Expr),
    IsNull { expr: Expr, negated: bool },
}

#[derive(Debug, Clone)]
enum Projection {
    Rows(Vec<(String, Expr)>),
    /// `count(x)` per alias; `None` counts every matched node.
    Counts(Vec<(String, Option<Expr>)>),
}

#[derive(Debug, Clone)]
struct Plan {
    labels: Vec<String>,
    predicates: Vec<Predicate>,
    projection: Projection,
    distinct: bool,
    order: Vec<(String, bool)>,
    skip: usize,
    limit: Option<usize>,
}

fn unsupported(what: impl Into<String>) -> GraphError {
    GraphError::Unsupported(what.into())
}

impl Plan {
    fn compile(query: &ValidatedQuery) -> Result<Self, GraphError> {
        let pattern = query
            .clause(ClauseKind::Match)
            .map(|c| c.body.as_slice())
            .unwrap_or_default();
        let (variable, labels) = parse_pattern(pattern)?;

        let predicates = match query.clause(ClauseKind::Where) {
            Some(clause) => split_top_level(&clause.body, |t| t.is_keyword("AND"))
                .into_iter()
                .map(|conjunct| parse_predicate(conjunct, &variable))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let body = query
            .clause(ClauseKind::Return)
            .map(|c| c.body.as_slice())
            .unwrap_or_default();
        let (distinct, items) = match body.first() {
            Some(first) if first.is_keyword("DISTINCT") => (true, &body[1..]),
            _ => (false, body),
        };
        let projection = parse_projection(items, &variable)?;

        let order = match query.clause(ClauseKind::OrderBy) {
            Some(clause) => parse_order(&clause.body, &query.aliases)?,
            None => Vec::new(),
        };

        Ok(Self {
            labels,
            predicates,
            projection,
            distinct,
            order,
            skip: query.skip.unwrap_or(0) as usize,
            limit: query.limit.map(|l| l as usize),
        })
    }

    fn execute(&self, nodes: &[StoredNode]) -> Vec<Record> {
        let matched: Vec<&StoredNode> = nodes
            .iter()
            .filter(|n| self.labels.is_empty() || self.labels.iter().any(|l| l == n.label.as_str()))
            .filter(|n| self.predicates.iter().all(|p| p.holds(n)))
            .collect();

        let mut rows: Vec<Record> = match &self.projection {
            Projection::Rows(items) => matched
                .iter()
                .map(|node| {
                    items
                        .iter()
                        .map(|(alias, expr)| (alias.clone(), expr.eval(node)))
                        .collect()
                })
                .collect(),
            Projection::Counts(items) => {
                let row = items
                    .iter()
                    .map(|(alias, expr)| {
                        let count = matched
                            .iter()
                            .filter(|n| expr.as_ref().map_or(true, |e| !e.eval(n).is_null()))
                            .count();
                        (alias.clone(), Value::from(count as i64))
                    })
                    .collect();
                vec![row]
            }
        };

        if self.distinct {
            let mut unique: Vec<Record> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }

        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                self.order
                    .iter()
                    .map(|(alias, descending)| {
                        let ord = compare_values(
                            a.get(alias).unwrap_or(&Value::Null),
                            b.get(alias).unwrap_or(&Value::Null),
                        );
                        if *descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        rows.into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

impl Expr {
    fn eval(&self, node: &StoredNode) -> Value {
        match self {
            Expr::Property(name) => node.properties.get(name).cloned().unwrap_or(Value::Null),
            Expr::Labels => Value::Array(vec![Value::String(node.label.as_str().to_string())]),
            Expr::Lower(inner) => match inner.eval(node) {
                Value::String(s) => Value::String(s.to_lowercase()),
                _ => Value::Null,
            },
            Expr::Literal(value) => value.clone(),
        }
    }
}

impl Predicate {
    fn holds(&self, node: &StoredNode) -> bool {
        match self {
            Predicate::IsNull { expr, negated } => expr.eval(node).is_null() != *negated,
            Predicate::Compare(left, op, right) => {
                let (a, b) = (left.eval(node), right.eval(node));
                if a.is_null() || b.is_null() {
                    return false;
                }
                match op {
                    Comparison::Eq => a == b,
                    Comparison::Ne => a != b,
                    Comparison::In => b.as_array().is_some_and(|items| items.contains(&a)),
                    Comparison::StartsWith | Comparison::EndsWith | Comparison::Contains => {
                        match (a.as_str(), b.as_str()) {
                            (Some(a), Some(b)) => match op {
                                Comparison::StartsWith => a.starts_with(b),
                                Comparison::EndsWith => a.ends_with(b),
                                _ => a.contains(b),
                            },
                            _ => false,
                        }
                    }
                }
            }
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// `(var)` or `(var:Label|Other)`.
fn parse_pattern(tokens: &[Token]) -> Result<(String, Vec<String>), GraphError> {
    let fail = || unsupported(format!("pattern `{}`", render(tokens)));
    let (open, rest) = tokens.split_first().ok_or_else(fail)?;
    let (close, inner) = rest.split_last().ok_or_else(fail)?;
    if !open.is_symbol("(") || !close.is_symbol(")") {
        return Err(fail());
    }
    let (variable, labels) = inner.split_first().ok_or_else(fail)?;
    let variable = variable.ident().ok_or_else(fail)?.to_string();

    let mut names = Vec::new();
    if let Some((colon, alternatives)) = labels.split_first() {
        if !colon.is_symbol(":") {
            return Err(fail());
        }
        for part in split_top_level(alternatives, |t| t.is_symbol("|")) {
            match part {
                [Token::Ident(label)] => names.push(label.clone()),
                [colon, Token::Ident(label)] if colon.is_symbol(":") => names.push(label.clone()),
                _ => return Err(fail()),
            }
        }
    }
    Ok((variable, names))
}

fn parse_expr(tokens: &[Token], variable: &str) -> Result<Expr, GraphError> {
    match tokens {
        [Token::Str(s)] => Ok(Expr::Literal(Value::String(s.clone()))),
        [Token::Number(n)] => Ok(Expr::Literal(parse_number(n))),
        [Token::Ident(v), dot, Token::Ident(prop)] if dot.is_symbol(".") && v == variable => {
            Ok(Expr::Property(prop.clone()))
        }
        [open, items @ .., close] if open.is_symbol("[") && close.is_symbol("]") => {
            let mut values = Vec::new();
            if !items.is_empty() {
                for item in split_top_level(items, |t| t.is_symbol(",")) {
                    match parse_expr(item, variable)? {
                        Expr::Literal(v) => values.push(v),
                        _ => return Err(unsupported(format!("list `{}`", render(tokens)))),
                    }
                }
            }
            Ok(Expr::Literal(Value::Array(values)))
        }
        [Token::Ident(func), open, args @ .., close]
            if open.is_symbol("(") && close.is_symbol(")") =>
        {
            if func.eq_ignore_ascii_case("toLower") {
                Ok(Expr::Lower(Box::new(parse_expr(args, variable)?)))
            } else if func.eq_ignore_ascii_case("labels")
                && matches!(args, [Token::Ident(v)] if v == variable)
            {
                Ok(Expr::Labels)
            } else {
                Err(unsupported(format!("function `{func}`")))
            }
        }
        _ => Err(unsupported(format!("expression `{}`", render(tokens)))),
    }
}

fn parse_number(n: &str) -> Value {
    match n.parse::<i64>() {
        Ok(i) => Value::from(i),
        Err(_) => n.parse::<f64>().map(Value::from).unwrap_or(Value::Null),
    }
}

fn parse_predicate(tokens: &[Token], variable: &str) -> Result<Predicate, GraphError> {
    let negation = tokens.iter().any(|t| t.is_keyword("NOT")) && !is_not_null(tokens);
    if negation || tokens.iter().any(|t| t.is_keyword("OR") || t.is_keyword("XOR")) {
        return Err(unsupported(format!("predicate `{}`", render(tokens))));
    }

    if let [expr @ .., is, null] = tokens {
        if is.is_keyword("IS") && null.is_keyword("NULL") {
            return Ok(Predicate::IsNull {
                expr: parse_expr(expr, variable)?,
                negated: false,
            });
        }
    }
    if let [expr @ .., is, not, null] = tokens {
        if is.is_keyword("IS") && not.is_keyword("NOT") && null.is_keyword("NULL") {
            return Ok(Predicate::IsNull {
                expr: parse_expr(expr, variable)?,
                negated: true,
            });
        }
    }

    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate() {
        if tok.is_symbol("(") || tok.is_symbol("[") {
            depth += 1;
            continue;
        }
        if tok.is_symbol(")") || tok.is_symbol("]") {
            depth -= 1;
            continue;
        }
        if depth != 0 {
            continue;
        }
        let next_is_with = tokens.get(i + 1).is_some_and(|t| t.is_keyword("WITH"));
        let (op, len) = if tok.is_symbol("=") {
            (Comparison::Eq, 1)
        } else if tok.is_symbol("<>") {
            (Comparison::Ne, 1)
        } else if tok.is_keyword("CONTAINS") {
            (Comparison::Contains, 1)
        } else if tok.is_keyword("IN") {
            (Comparison::In, 1)
        } else if tok.is_keyword("STARTS") && next_is_with {
            (Comparison::StartsWith, 2)
        } else if tok.is_keyword("ENDS") && next_is_with {
            (Comparison::EndsWith, 2)
        } else {
            continue;
        };
        let left = parse_expr(&tokens[..i], variable)?;
        let right = parse_expr(&tokens[i + len..], variable)?;
        return Ok(Predicate::Compare(left, op, right));
    }

    Err(unsupported(format!("predicate `{}`", render(tokens))))
}

fn is_not_null(tokens: &[Token]) -> bool {
    matches!(tokens, [.., is, not, null]
        if is.is_keyword("IS") && not.is_keyword("NOT") && null.is_keyword("NULL"))
}

fn parse_projection(items: &[Token], variable: &str) -> Result<Projection, GraphError> {
    let mut rows = Vec::new();
    let mut counts = Vec::new();
    for item in split_top_level(items, |t| t.is_symbol(",")) {
        let (expr, alias) = match item {
            [expr @ .., _as, Token::Ident(alias)] => (expr, alias.clone()),
            _ => return Err(unsupported(format!("return item `{}`", render(item)))),
        };
        match expr {
            [Token::Ident(func), open, args @ .., close]
                if func.eq_ignore_ascii_case("count")
                    && open.is_symbol("(")
                    && close.is_symbol(")") =>
            {
                let counted = match args {
                    [star] if star.is_symbol("*") => None,
                    [Token::Ident(v)] if v == variable => None,
                    _ => Some(parse_expr(args, variable)?),
                };
                counts.push((alias, counted));
            }
            _ => rows.push((alias, parse_expr(expr, variable)?)),
        }
    }

    match (rows.is_empty(), counts.is_empty()) {
        (_, true) => Ok(Projection::Rows(rows)),
        (true, false) => Ok(Projection::Counts(counts)),
        (false, false) => Err(unsupported("grouped aggregation")),
    }
}

fn parse_order(tokens: &[Token], aliases: &[String]) -> Result<Vec<(String, bool)>, GraphError> {
    split_top_level(tokens, |t| t.is_symbol(","))
        .into_iter()
        .map(|key| {
            let (name, descending) = match key {
                [Token::Ident(name)] => (name, false),
                [Token::Ident(name), dir] if dir.is_keyword("ASC") || dir.is_keyword("ASCENDING") => {
                    (name, false)
                }
                [Token::Ident(name), dir]
                    if dir.is_keyword("DESC") || dir.is_keyword("DESCENDING") =>
                {
                    (name, true)
                }
                _ => return Err(unsupported(format!("ORDER BY `{}`", render(key)))),
            };
            if !aliases.contains(name) {
                return Err(unsupported(format!("ORDER BY non-alias `{name}`")));
            }
            Ok((name.clone(), descending))
        })
        .collect()
}
