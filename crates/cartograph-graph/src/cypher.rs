//! Tokenizer and grammar checks for generated read queries.
//!
//! Generated queries are accepted only when they take the shape
//! `MATCH ... [WHERE ...] RETURN ... [ORDER BY ...] [SKIP n] [LIMIT n]`
//! and additionally:
//!
//! - contain a single statement with one MATCH clause, no `UNION` and no
//!   nested MATCH or `EXISTS { ... }` subquery
//! - bind every node pattern to a variable, in any clause
//! - alias every RETURN item, and never return a whole node, relationship
//!   or path, bare or wrapped in an expression
//! - match `path` properties by prefix (`STARTS WITH`), never by `=` or `IN`
//! - apply `toLower` to both sides of a case-insensitive comparison
//! - never write, call procedures, or chain with `WITH` / `UNWIND`

use std::fmt;

/// A lexical token. Keywords are plain identifiers, compared case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Param(String),
    Symbol(&'static str),
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }

    pub fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self, Token::Symbol(s) if *s == symbol)
    }

    pub fn ident(&self) -> Option<&str> {
        match self {
            Token::Ident(s) => Some(s),
            _ => None,
        }
    }

    fn is_open(&self) -> bool {
        self.is_symbol("(") || self.is_symbol("[") || self.is_symbol("{")
    }

    fn is_close(&self) -> bool {
        self.is_symbol(")") || self.is_symbol("]") || self.is_symbol("}")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) | Token::Number(s) => f.write_str(s),
            Token::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Token::Param(s) => write!(f, "${s}"),
            Token::Symbol(s) => f.write_str(s),
        }
    }
}

/// Why a query was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarViolation {
    #[error("could not tokenize query: {0}")]
    Lex(String),

    #[error("query is empty")]
    Empty,

    #[error("only one statement is allowed")]
    MultipleStatements,

    #[error("query-combination operator {0} is not allowed")]
    Combination(String),

    #[error("{0} is not allowed in a read-only query")]
    ForbiddenClause(String),

    #[error("query must start with MATCH, found `{0}`")]
    LeadingClause(String),

    #[error("expected exactly one MATCH clause, found {0}")]
    MatchCount(usize),

    #[error("subquery `{0}` is not allowed")]
    Subquery(String),

    #[error("query must end with a RETURN clause")]
    MissingReturn,

    #[error("clause order must be MATCH, WHERE, RETURN, LIMIT; found {found} after {after}")]
    ClauseOrder { found: String, after: String },

    #[error("every node pattern must bind a named variable")]
    UnboundNode,

    #[error("RETURN * is not allowed")]
    ReturnStar,

    #[error("RETURN item `{0}` must be aliased with AS")]
    Unaliased(String),

    #[error("RETURN item `{0}` returns a whole node or relationship; return its properties instead")]
    BareEntity(String),

    #[error("path predicate `{0}` must use STARTS WITH, not equality")]
    PathEquality(String),

    #[error("case-insensitive predicate `{0}` must apply toLower to both sides")]
    CaseFolding(String),

    #[error("SKIP and LIMIT take a non-negative integer, found `{0}`")]
    InvalidCount(String),
}

/// Top-level clauses, in the only order accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClauseKind {
    Match,
    Where,
    Return,
    OrderBy,
    Skip,
    Limit,
}

impl ClauseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClauseKind::Match => "MATCH",
            ClauseKind::Where => "WHERE",
            ClauseKind::Return => "RETURN",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Skip => "SKIP",
            ClauseKind::Limit => "LIMIT",
        }
    }
}

/// A clause keyword and the tokens following it up to the next clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub body: Vec<Token>,
}

/// A query that passed every grammar check.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub text: String,
    pub clauses: Vec<Clause>,
    /// Variables bound in the MATCH pattern.
    pub variables: Vec<String>,
    /// RETURN aliases, in order.
    pub aliases: Vec<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl ValidatedQuery {
    pub fn clause(&self, kind: ClauseKind) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.kind == kind)
    }
}

const FORBIDDEN: &[&str] = &[
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "CALL", "LOAD", "FOREACH",
    "WITH", "UNWIND", "OPTIONAL", "USE", "YIELD",
];

const SUBQUERY_KEYWORDS: &[&str] = &["EXISTS", "COUNT", "COLLECT"];

/// Functions that reduce an entity to a scalar or a list of strings.
const ENTITY_INSPECTORS: &[&str] = &["labels", "type", "id", "elementId", "count", "keys", "length"];

const BOUNDARIES: &[&str] = &["AND", "OR", "XOR", "NOT", "WHERE", "WHEN", "THEN", "ELSE", "END"];

/// Split a query into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, GrammarViolation> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && next == Some('*') {
            let close = (i + 2..chars.len().saturating_sub(1))
                .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
                .ok_or_else(|| GrammarViolation::Lex("unterminated comment".to_string()))?;
            i = close + 2;
        } else if c == '\'' || c == '"' {
            let (text, end) = read_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = end;
        } else if c == '`' {
            let close = (i + 1..chars.len())
                .find(|&j| chars[j] == '`')
                .ok_or_else(|| GrammarViolation::Lex("unterminated quoted name".to_string()))?;
            tokens.push(Token::Ident(chars[i + 1..close].iter().collect()));
            i = close + 1;
        } else if c == '$' {
            let end = scan_while(&chars, i + 1, |ch| ch.is_alphanumeric() || ch == '_');
            if end == i + 1 {
                return Err(GrammarViolation::Lex("empty parameter name".to_string()));
            }
            tokens.push(Token::Param(chars[i + 1..end].iter().collect()));
            i = end;
        } else if c.is_ascii_digit() {
            let mut end = scan_while(&chars, i, |ch| ch.is_ascii_digit());
            if chars.get(end) == Some(&'.') && chars.get(end + 1).is_some_and(|d| d.is_ascii_digit())
            {
                end = scan_while(&chars, end + 1, |ch| ch.is_ascii_digit());
            }
            tokens.push(Token::Number(chars[i..end].iter().collect()));
            i = end;
        } else if c.is_alphabetic() || c == '_' {
            let end = scan_while(&chars, i, |ch| ch.is_alphanumeric() || ch == '_');
            tokens.push(Token::Ident(chars[i..end].iter().collect()));
            i = end;
        } else if let Some(symbol) = two_char_symbol(c, next) {
            tokens.push(Token::Symbol(symbol));
            i += 2;
        } else if let Some(symbol) = one_char_symbol(c) {
            tokens.push(Token::Symbol(symbol));
            i += 1;
        } else {
            return Err(GrammarViolation::Lex(format!("unexpected character '{c}'")));
        }
    }

    Ok(tokens)
}

fn scan_while(chars: &[char], start: usize, pred: impl Fn(char) -> bool) -> usize {
    let mut end = start;
    while end < chars.len() && pred(chars[end]) {
        end += 1;
    }
    end
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), GrammarViolation> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| GrammarViolation::Lex("unterminated string".to_string()))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            ch if ch == quote => return Ok((text, i + 1)),
            ch => {
                text.push(ch);
                i += 1;
            }
        }
    }
    Err(GrammarViolation::Lex("unterminated string".to_string()))
}

fn two_char_symbol(c: char, next: Option<char>) -> Option<&'static str> {
    match (c, next?) {
        ('<', '>') => Some("<>"),
        ('<', '=') => Some("<="),
        ('>', '=') => Some(">="),
        ('=', '~') => Some("=~"),
        ('-', '>') => Some("->"),
        ('.', '.') => Some(".."),
        _ => None,
    }
}

fn one_char_symbol(c: char) -> Option<&'static str> {
    Some(match c {
        '(' => "(",
        ')' => ")",
        '[' => "[",
        ']' => "]",
        '{' => "{",
        '}' => "}",
        ',' => ",",
        '.' => ".",
        ':' => ":",
        ';' => ";",
        '|' => "|",
        '=' => "=",
        '<' => "<",
        '>' => ">",
        '-' => "-",
        '+' => "+",
        '*' => "*",
        '/' => "/",
        '%' => "%",
        '^' => "^",
        _ => return None,
    })
}

/// Render tokens back to readable query text, for error messages.
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        let glued = i == 0
            || tok.is_symbol(".")
            || tok.is_symbol(")")
            || tok.is_symbol("]")
            || tok.is_symbol(",")
            || tokens[i - 1].is_symbol(".")
            || tokens[i - 1].is_symbol("(")
            || tokens[i - 1].is_symbol("[")
            || (tok.is_symbol("(") && matches!(tokens[i - 1], Token::Ident(_)));
        if !glued {
            out.push(' ');
        }
        out.push_str(&tok.to_string());
    }
    out
}

/// Split `tokens` on a separator that appears outside any brackets.
pub fn split_top_level<'a>(tokens: &'a [Token], is_separator: impl Fn(&Token) -> bool) -> Vec<&'a [Token]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        if tok.is_open() {
            depth += 1;
        } else if tok.is_close() {
            depth -= 1;
        } else if depth == 0 && is_separator(tok) {
            parts.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Validate a generated query.
pub fn validate(query: &str) -> Result<ValidatedQuery, GrammarViolation> {
    let mut tokens = tokenize(query)?;
    while tokens.last().is_some_and(|t| t.is_symbol(";")) {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Err(GrammarViolation::Empty);
    }
    if tokens.iter().any(|t| t.is_symbol(";")) {
        return Err(GrammarViolation::MultipleStatements);
    }

    let clauses = split_clauses(&tokens)?;
    check_clause_order(&clauses)?;

    let mut variables = Vec::new();
    let mut aliases = Vec::new();
    let mut skip = None;
    let mut limit = None;
    for clause in &clauses {
        match clause.kind {
            ClauseKind::Match => {
                variables = bound_variables(&clause.body)?;
                check_inline_path_maps(&clause.body)?;
            }
            ClauseKind::Where => {
                check_anonymous_nodes(&clause.body)?;
                check_predicates(&clause.body)?;
            }
            ClauseKind::Return => {
                check_anonymous_nodes(&clause.body)?;
                aliases = check_return(&clause.body, &variables)?;
            }
            ClauseKind::OrderBy => check_anonymous_nodes(&clause.body)?,
            ClauseKind::Skip => skip = Some(parse_count(&clause.body)?),
            ClauseKind::Limit => limit = Some(parse_count(&clause.body)?),
        }
    }

    Ok(ValidatedQuery {
        text: query.trim().trim_end_matches(';').trim_end().to_string(),
        clauses,
        variables,
        aliases,
        skip,
        limit,
    })
}

/// Whether the keyword at `i` is used as a keyword rather than a name.
fn keyword_position(tokens: &[Token], i: usize) -> bool {
    let prev = i.checked_sub(1).map(|p| &tokens[p]);
    let next = tokens.get(i + 1);
    if prev.is_some_and(|p| p.is_symbol(".") || p.is_symbol(":") || p.is_keyword("AS")) {
        return false;
    }
    // map keys: `{set: 1}`
    if next.is_some_and(|n| n.is_symbol(":")) {
        return false;
    }
    if tokens[i].is_keyword("WITH")
        && prev.is_some_and(|p| p.is_keyword("STARTS") || p.is_keyword("ENDS"))
    {
        return false;
    }
    true
}

fn split_clauses(tokens: &[Token]) -> Result<Vec<Clause>, GrammarViolation> {
    let mut clauses: Vec<Clause> = Vec::new();
    let mut depth = 0i32;
    let mut i = 0;

    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.is_open() {
            if tok.is_symbol("{") {
                let prev = i.checked_sub(1).map(|p| &tokens[p]);
                if let Some(word) = prev.and_then(|p| p.ident()) {
                    if SUBQUERY_KEYWORDS.iter().any(|kw| word.eq_ignore_ascii_case(kw)) {
                        return Err(GrammarViolation::Subquery(format!(
                            "{} {{ ... }}",
                            word.to_ascii_uppercase()
                        )));
                    }
                }
            }
            depth += 1;
        } else if tok.is_close() {
            depth -= 1;
            if depth < 0 {
                return Err(GrammarViolation::Lex("unbalanced brackets".to_string()));
            }
        }

        if let Some(word) = tok.ident().filter(|_| keyword_position(tokens, i)) {
            let upper = word.to_ascii_uppercase();
            if upper == "UNION" {
                return Err(GrammarViolation::Combination(upper));
            }
            if upper == "MATCH" && depth > 0 {
                return Err(GrammarViolation::Subquery(upper));
            }
            if FORBIDDEN.contains(&upper.as_str()) {
                let name = if upper == "OPTIONAL" {
                    "OPTIONAL MATCH".to_string()
                } else {
                    upper
                };
                return Err(GrammarViolation::ForbiddenClause(name));
            }

            if depth == 0 {
                let kind = match upper.as_str() {
                    "MATCH" => Some(ClauseKind::Match),
                    "WHERE" => Some(ClauseKind::Where),
                    "RETURN" => Some(ClauseKind::Return),
                    "ORDER" if tokens.get(i + 1).is_some_and(|t| t.is_keyword("BY")) => {
                        i += 1;
                        Some(ClauseKind::OrderBy)
                    }
                    "SKIP" => Some(ClauseKind::Skip),
                    "LIMIT" => Some(ClauseKind::Limit),
                    _ => None,
                };
                if let Some(kind) = kind {
                    clauses.push(Clause {
                        kind,
                        body: Vec::new(),
                    });
                    i += 1;
                    continue;
                }
            }
        }

        match clauses.last_mut() {
            Some(clause) => clause.body.push(tok.clone()),
            None => return Err(GrammarViolation::LeadingClause(tok.to_string())),
        }
        i += 1;
    }

    if depth != 0 {
        return Err(GrammarViolation::Lex("unbalanced brackets".to_string()));
    }
    Ok(clauses)
}

fn check_clause_order(clauses: &[Clause]) -> Result<(), GrammarViolation> {
    let matches = clauses
        .iter()
        .filter(|c| c.kind == ClauseKind::Match)
        .count();
    if matches != 1 {
        return Err(GrammarViolation::MatchCount(matches));
    }
    if let Some(first) = clauses.first().filter(|c| c.kind != ClauseKind::Match) {
        return Err(GrammarViolation::LeadingClause(first.kind.as_str().to_string()));
    }
    for pair in clauses.windows(2) {
        if pair[1].kind <= pair[0].kind {
            return Err(GrammarViolation::ClauseOrder {
                found: pair[1].kind.as_str().to_string(),
                after: pair[0].kind.as_str().to_string(),
            });
        }
    }
    if !clauses.iter().any(|c| c.kind == ClauseKind::Return) {
        return Err(GrammarViolation::MissingReturn);
    }
    Ok(())
}

fn bound_variables(pattern: &[Token]) -> Result<Vec<String>, GrammarViolation> {
    let mut variables = Vec::new();
    for (i, tok) in pattern.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| &pattern[p]);
        if tok.is_symbol("(") {
            // function call such as shortestPath(...)
            if matches!(prev, Some(Token::Ident(_))) {
                continue;
            }
            match (pattern.get(i + 1), pattern.get(i + 2)) {
                (Some(Token::Ident(name)), Some(after))
                    if after.is_symbol(":") || after.is_symbol(")") || after.is_symbol("{") =>
                {
                    variables.push(name.clone());
                }
                _ => return Err(GrammarViolation::UnboundNode),
            }
        } else if tok.is_symbol("[") {
            if let (Some(Token::Ident(name)), Some(after)) = (pattern.get(i + 1), pattern.get(i + 2))
            {
                if after.is_symbol(":")
                    || after.is_symbol("]")
                    || after.is_symbol("*")
                    || after.is_symbol("{")
                {
                    variables.push(name.clone());
                }
            }
        } else if let Token::Ident(name) = tok {
            // path variable: `p = (a)-->(b)`
            if pattern.get(i + 1).is_some_and(|t| t.is_symbol("=")) {
                variables.push(name.clone());
            }
        }
    }
    Ok(variables)
}

/// Node patterns outside MATCH, such as `(a)-[:CALLS]->(:Function)` in a
/// WHERE predicate. Parentheses used for grouping or calls are skipped.
fn check_anonymous_nodes(tokens: &[Token]) -> Result<(), GrammarViolation> {
    for (i, tok) in tokens.iter().enumerate() {
        if !tok.is_symbol("(") {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        if matches!(prev, Some(Token::Ident(_))) && !prev.is_some_and(is_boundary) {
            continue;
        }
        let after_arrow = prev.is_some_and(|p| p.is_symbol("-") || p.is_symbol("->"));
        match tokens.get(i + 1) {
            Some(next) if next.is_symbol(":") || next.is_symbol(")") => {
                return Err(GrammarViolation::UnboundNode)
            }
            Some(next) if next.is_symbol("{") && after_arrow => {
                return Err(GrammarViolation::UnboundNode)
            }
            _ => {}
        }
    }
    Ok(())
}

/// Whether the bound variable at `i` is only passed to an entity inspector,
/// as in `labels(f)` or `count(DISTINCT f)`.
fn is_inspected(tokens: &[Token], i: usize) -> bool {
    if !tokens.get(i + 1).is_some_and(|t| t.is_symbol(")")) {
        return false;
    }
    let mut open = match i.checked_sub(1) {
        Some(p) => p,
        None => return false,
    };
    if tokens[open].is_keyword("DISTINCT") {
        match open.checked_sub(1) {
            Some(p) => open = p,
            None => return false,
        }
    }
    if !tokens[open].is_symbol("(") {
        return false;
    }
    open.checked_sub(1)
        .and_then(|p| tokens[p].ident())
        .is_some_and(|name| ENTITY_INSPECTORS.iter().any(|f| name.eq_ignore_ascii_case(f)))
}

/// A bound variable used in `expr` other than through `.property` or an
/// entity inspector.
fn bare_entity(expr: &[Token], variables: &[String]) -> bool {
    expr.iter().enumerate().any(|(i, tok)| {
        let Token::Ident(name) = tok else {
            return false;
        };
        if !variables.contains(name) {
            return false;
        }
        let prev = i.checked_sub(1).map(|p| &expr[p]);
        if prev.is_some_and(|p| p.is_symbol(".") || p.is_symbol(":")) {
            return false;
        }
        let property = expr.get(i + 1).is_some_and(|t| t.is_symbol("."));
        !property && !is_inspected(expr, i)
    })
}

fn check_inline_path_maps(pattern: &[Token]) -> Result<(), GrammarViolation> {
    for (i, tok) in pattern.iter().enumerate() {
        let in_map = i
            .checked_sub(1)
            .is_some_and(|p| pattern[p].is_symbol("{") || pattern[p].is_symbol(","));
        if tok.ident() == Some("path")
            && in_map
            && pattern.get(i + 1).is_some_and(|t| t.is_symbol(":"))
        {
            let end = (i + 3).min(pattern.len());
            return Err(GrammarViolation::PathEquality(render(&pattern[i..end])));
        }
    }
    Ok(())
}

/// The comparison operator starting at `i`, with its token length.
fn comparison_at(tokens: &[Token], i: usize) -> Option<(&'static str, usize)> {
    let tok = &tokens[i];
    let next = tokens.get(i + 1);
    if tok.is_symbol("=") {
        Some(("=", 1))
    } else if tok.is_symbol("<>") {
        Some(("<>", 1))
    } else if tok.is_symbol("=~") {
        Some(("=~", 1))
    } else if tok.is_keyword("CONTAINS") {
        Some(("CONTAINS", 1))
    } else if tok.is_keyword("IN") {
        Some(("IN", 1))
    } else if tok.is_keyword("STARTS") && next.is_some_and(|n| n.is_keyword("WITH")) {
        Some(("STARTS WITH", 2))
    } else if tok.is_keyword("ENDS") && next.is_some_and(|n| n.is_keyword("WITH")) {
        Some(("ENDS WITH", 2))
    } else {
        None
    }
}

fn is_boundary(tok: &Token) -> bool {
    tok.is_symbol(",") || tok.is_symbol("|") || BOUNDARIES.iter().any(|kw| tok.is_keyword(kw))
}

fn left_operand(tokens: &[Token], end: usize) -> &[Token] {
    let mut depth = 0i32;
    let mut start = end;
    while start > 0 {
        let tok = &tokens[start - 1];
        if tok.is_close() {
            depth += 1;
        } else if tok.is_open() {
            if depth == 0 {
                break;
            }
            depth -= 1;
        } else if depth == 0 && is_boundary(tok) {
            break;
        }
        start -= 1;
    }
    &tokens[start..end]
}

fn right_operand(tokens: &[Token], begin: usize) -> &[Token] {
    let mut depth = 0i32;
    let mut end = begin;
    while end < tokens.len() {
        let tok = &tokens[end];
        if tok.is_open() {
            depth += 1;
        } else if tok.is_close() {
            if depth == 0 {
                break;
            }
            depth -= 1;
        } else if depth == 0
            && (is_boundary(tok) || tok.is_keyword("IS") || comparison_at(tokens, end).is_some())
        {
            break;
        }
        end += 1;
    }
    &tokens[begin..end]
}

fn references_path(operand: &[Token]) -> bool {
    operand.windows(3).any(|w| {
        matches!(w[0], Token::Ident(_)) && w[1].is_symbol(".") && w[2].ident() == Some("path")
    })
}

/// `toLower( ... )` spanning the whole operand.
fn is_lowered(operand: &[Token]) -> bool {
    if operand.len() < 3 || !operand[0].is_keyword("toLower") || !operand[1].is_symbol("(") {
        return false;
    }
    let mut depth = 0i32;
    for (i, tok) in operand.iter().enumerate().skip(1) {
        if tok.is_open() {
            depth += 1;
        } else if tok.is_close() {
            depth -= 1;
            if depth == 0 {
                return i == operand.len() - 1;
            }
        }
    }
    false
}

/// String literals of an operand that is a string or a list of strings.
fn literal_strings(operand: &[Token]) -> Option<Vec<&str>> {
    match operand {
        [Token::Str(s)] => Some(vec![s.as_str()]),
        [first, inner @ .., last] if first.is_symbol("[") && last.is_symbol("]") => inner
            .iter()
            .enumerate()
            .map(|(i, tok)| match tok {
                Token::Str(s) if i % 2 == 0 => Some(Some(s.as_str())),
                t if i % 2 == 1 && t.is_symbol(",") => Some(None),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|items| items.into_iter().flatten().collect()),
        _ => None,
    }
}

fn check_predicates(tokens: &[Token]) -> Result<(), GrammarViolation> {
    let mut i = 0;
    while i < tokens.len() {
        let Some((op, len)) = comparison_at(tokens, i) else {
            i += 1;
            continue;
        };
        let left = left_operand(tokens, i);
        let right = right_operand(tokens, i + len);
        let text = || {
            let mut span = left.to_vec();
            span.extend_from_slice(&tokens[i..i + len]);
            span.extend_from_slice(right);
            render(&span)
        };

        if (op == "=" || op == "IN") && (references_path(left) || references_path(right)) {
            return Err(GrammarViolation::PathEquality(text()));
        }
        if op == "=~"
            && literal_strings(right).is_some_and(|lits| lits.iter().any(|s| s.starts_with("(?i)")))
        {
            return Err(GrammarViolation::CaseFolding(text()));
        }

        let (lowered_left, lowered_right) = (is_lowered(left), is_lowered(right));
        if lowered_left != lowered_right {
            let other = if lowered_left { right } else { left };
            let already_lower = literal_strings(other)
                .is_some_and(|lits| lits.iter().all(|s| *s == s.to_lowercase()));
            if !already_lower {
                return Err(GrammarViolation::CaseFolding(text()));
            }
        }

        i += len;
    }
    Ok(())
}

fn check_return(body: &[Token], variables: &[String]) -> Result<Vec<String>, GrammarViolation> {
    let items = match body.first() {
        Some(first) if first.is_keyword("DISTINCT") => &body[1..],
        _ => body,
    };
    if items.is_empty() {
        return Err(GrammarViolation::MissingReturn);
    }

    let mut aliases = Vec::new();
    for item in split_top_level(items, |t| t.is_symbol(",")) {
        if let [star] = item {
            if star.is_symbol("*") {
                return Err(GrammarViolation::ReturnStar);
            }
        }
        let n = item.len();
        let alias = match item {
            [.., as_kw, Token::Ident(alias)] if n >= 3 && as_kw.is_keyword("AS") => alias,
            _ => return Err(GrammarViolation::Unaliased(render(item))),
        };
        let expr = &item[..n - 2];
        if bare_entity(expr, variables) {
            return Err(GrammarViolation::BareEntity(render(expr)));
        }
        aliases.push(alias.clone());
    }
    Ok(aliases)
}

fn parse_count(body: &[Token]) -> Result<u64, GrammarViolation> {
    match body {
        [Token::Number(n)] => n
            .parse::<u64>()
            .map_err(|_| GrammarViolation::InvalidCount(n.clone())),
        _ => Err(GrammarViolation::InvalidCount(render(body))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_simple_property_query() {
        let q = validate(
            "MATCH (f:File) WHERE f.extension = '.py' RETURN f.path AS path, f.name AS name, labels(f) AS type",
        )
        .unwrap();
        assert_eq!(q.variables, vec!["f"]);
        assert_eq!(q.aliases, vec!["path", "name", "type"]);
        assert_eq!(q.limit, None);
    }

    #[test]
    fn test_accepts_full_clause_chain() {
        let q = validate(
            "MATCH (c:Class)-[:DEFINES_METHOD]->(m:Method)
             WHERE toLower(m.name) STARTS WITH 'get' AND c.qualified_name STARTS WITH 'demo.api'
             RETURN DISTINCT c.name AS class, m.name AS method
             ORDER BY class SKIP 5 LIMIT 10;",
        )
        .unwrap();
        assert_eq!(q.variables, vec!["c", "m"]);
        assert_eq!(q.skip, Some(5));
        assert_eq!(q.limit, Some(10));
        assert!(!q.text.ends_with(';'));
        assert!(q.clause(ClauseKind::OrderBy).is_some());
    }

    #[test]
    fn test_accepts_lowered_list_predicate() {
        validate(
            "MATCH (n:Function|Method) WHERE ANY(d IN n.decorators WHERE toLower(d) IN ['flow', 'task']) \
             RETURN n.qualified_name AS qualified_name, n.decorators AS decorators",
        )
        .unwrap();
    }

    #[test]
    fn test_accepts_path_prefix_match() {
        validate("MATCH (f:File) WHERE f.path STARTS WITH 'src/' RETURN f.path AS path LIMIT 50")
            .unwrap();
    }

    #[test]
    fn test_rejects_union() {
        let err = validate(
            "MATCH (f:File) RETURN f.path AS path UNION MATCH (m:Module) RETURN m.path AS path",
        )
        .unwrap_err();
        assert_eq!(err, GrammarViolation::Combination("UNION".to_string()));
    }

    #[test]
    fn test_rejects_second_match() {
        let err = validate("MATCH (f:File) MATCH (m:Module) RETURN f.path AS a, m.path AS b")
            .unwrap_err();
        assert_eq!(err, GrammarViolation::MatchCount(2));
    }

    #[test]
    fn test_rejects_anonymous_nodes() {
        assert_eq!(
            validate("MATCH (:File) RETURN 1 AS one").unwrap_err(),
            GrammarViolation::UnboundNode
        );
        assert_eq!(
            validate("MATCH (c:Class)-[:DEFINES_METHOD]->() RETURN c.name AS name").unwrap_err(),
            GrammarViolation::UnboundNode
        );
    }

    #[test]
    fn test_rejects_unaliased_and_bare_returns() {
        assert_eq!(
            validate("MATCH (f:File) RETURN f.path").unwrap_err(),
            GrammarViolation::Unaliased("f.path".to_string())
        );
        assert_eq!(
            validate("MATCH (f:File) RETURN f AS file").unwrap_err(),
            GrammarViolation::BareEntity("f".to_string())
        );
        assert_eq!(
            validate("MATCH (a:Function)-[r:CALLS]->(b:Function) RETURN r AS call").unwrap_err(),
            GrammarViolation::BareEntity("r".to_string())
        );
        assert_eq!(
            validate("MATCH (f:File) RETURN *").unwrap_err(),
            GrammarViolation::ReturnStar
        );
    }

    #[test]
    fn test_rejects_wrapped_entity_returns() {
        for (query, expr) in [
            ("MATCH (f:File) RETURN (f) AS file", "(f)"),
            ("MATCH (f:File) RETURN collect(f) AS files", "collect(f)"),
            (
                "MATCH (a:Function)-[r:CALLS]->(b:Function) RETURN [r] AS rels",
                "[r]",
            ),
            (
                "MATCH p = (a:Function)-[:CALLS]->(b:Function) RETURN nodes(p) AS chain",
                "nodes(p)",
            ),
        ] {
            assert_eq!(
                validate(query).unwrap_err(),
                GrammarViolation::BareEntity(expr.to_string()),
                "{query}"
            );
        }
    }

    #[test]
    fn test_accepts_entity_inspectors() {
        let q = validate(
            "MATCH (p:Package)-[r:CONTAINS_MODULE]->(m:Module) \
             RETURN p.name AS package, labels(m) AS type, type(r) AS edge, count(DISTINCT m) AS modules",
        )
        .unwrap();
        assert_eq!(q.aliases, vec!["package", "type", "edge", "modules"]);
    }

    #[test]
    fn test_rejects_anonymous_nodes_in_predicates() {
        assert_eq!(
            validate("MATCH (a:Function) WHERE (a)-[:CALLS]->(:Function) RETURN a.name AS name")
                .unwrap_err(),
            GrammarViolation::UnboundNode
        );
        assert_eq!(
            validate("MATCH (a:Function) WHERE NOT (a)-[:CALLS]->() RETURN a.name AS name")
                .unwrap_err(),
            GrammarViolation::UnboundNode
        );
        validate(
            "MATCH (a:Function), (b:Function) WHERE (a)-[:CALLS]->(b) AND (a.name = 'x' OR b.name = 'y') \
             RETURN a.name AS name",
        )
        .unwrap();
    }

    #[test]
    fn test_rejects_nested_subqueries() {
        assert_eq!(
            validate("MATCH (f:File) WHERE EXISTS { MATCH (g:File) } RETURN f.path AS path")
                .unwrap_err(),
            GrammarViolation::Subquery("EXISTS { ... }".to_string())
        );
        assert_eq!(
            validate("MATCH (f:File) WHERE exists { (f)<-[:CONTAINS_FILE]-(d:Folder) } RETURN f.path AS path")
                .unwrap_err(),
            GrammarViolation::Subquery("EXISTS { ... }".to_string())
        );
        assert_eq!(
            validate("MATCH (f:File) WHERE ANY(x IN [1] WHERE (MATCH (g:File))) RETURN f.path AS path")
                .unwrap_err(),
            GrammarViolation::Subquery("MATCH".to_string())
        );
    }

    #[test]
    fn test_rejects_path_membership() {
        let err = validate("MATCH (f:File) WHERE f.path IN ['src/main.py'] RETURN f.name AS name")
            .unwrap_err();
        assert_eq!(
            err,
            GrammarViolation::PathEquality("f.path IN ['src/main.py']".to_string())
        );
        validate("MATCH (f:File) WHERE f.extension IN ['.py', '.pyi'] RETURN f.path AS path").unwrap();
    }

    #[test]
    fn test_rejects_path_equality() {
        let err = validate("MATCH (f:File) WHERE f.path = 'src/main.py' RETURN f.name AS name")
            .unwrap_err();
        assert_eq!(
            err,
            GrammarViolation::PathEquality("f.path = 'src/main.py'".to_string())
        );

        let err = validate("MATCH (f:File {path: 'src/main.py'}) RETURN f.name AS name")
            .unwrap_err();
        assert!(matches!(err, GrammarViolation::PathEquality(_)));
    }

    #[test]
    fn test_rejects_one_sided_lowering() {
        let err = validate(
            "MATCH (c:Class) WHERE toLower(c.name) CONTAINS 'Auth' RETURN c.name AS name",
        )
        .unwrap_err();
        assert_eq!(
            err,
            GrammarViolation::CaseFolding("toLower(c.name) CONTAINS 'Auth'".to_string())
        );

        let err = validate(
            "MATCH (c:Class), (f:Function) WHERE toLower(c.name) = f.name RETURN c.name AS name",
        )
        .unwrap_err();
        assert!(matches!(err, GrammarViolation::CaseFolding(_)));

        let err = validate("MATCH (c:Class) WHERE c.name =~ '(?i)auth.*' RETURN c.name AS name")
            .unwrap_err();
        assert!(matches!(err, GrammarViolation::CaseFolding(_)));
    }

    #[test]
    fn test_rejects_out_of_order_clauses() {
        let err = validate("MATCH (f:File) RETURN f.path AS path WHERE f.name = 'x'").unwrap_err();
        assert_eq!(
            err,
            GrammarViolation::ClauseOrder {
                found: "WHERE".to_string(),
                after: "RETURN".to_string()
            }
        );

        let err = validate("MATCH (f:File) LIMIT 3 RETURN f.path AS path").unwrap_err();
        assert!(matches!(err, GrammarViolation::ClauseOrder { .. }));

        let err = validate("WHERE f.name = 'x' MATCH (f:File) RETURN f.path AS path").unwrap_err();
        assert_eq!(err, GrammarViolation::LeadingClause("WHERE".to_string()));
    }

    #[test]
    fn test_rejects_writes_and_chaining() {
        for (query, clause) in [
            ("CREATE (n:File {path: 'x'})", "CREATE"),
            ("MATCH (n:File) DETACH DELETE n", "DETACH"),
            ("MATCH (n:File) SET n.name = 'x' RETURN n.name AS name", "SET"),
            ("CALL db.labels()", "CALL"),
            ("MATCH (n:File) WITH n RETURN n.path AS path", "WITH"),
            (
                "MATCH (n:File) OPTIONAL MATCH (m:Module) RETURN n.path AS path",
                "OPTIONAL MATCH",
            ),
        ] {
            assert_eq!(
                validate(query).unwrap_err(),
                GrammarViolation::ForbiddenClause(clause.to_string()),
                "{query}"
            );
        }
    }

    #[test]
    fn test_property_named_like_keyword_is_not_a_clause() {
        validate("MATCH (n:File) WHERE n.set STARTS WITH 'a' RETURN n.with AS with_value").unwrap();
    }

    #[test]
    fn test_statement_structure() {
        assert_eq!(validate("  ").unwrap_err(), GrammarViolation::Empty);
        assert_eq!(
            validate("MATCH (f:File) RETURN f.path AS p; MATCH (m:Module) RETURN m.path AS p")
                .unwrap_err(),
            GrammarViolation::MultipleStatements
        );
        assert_eq!(
            validate("MATCH (f:File) WHERE f.name = 'x'").unwrap_err(),
            GrammarViolation::MissingReturn
        );
        assert!(matches!(
            validate("MATCH (f:File) RETURN f.path AS p LIMIT -1").unwrap_err(),
            GrammarViolation::InvalidCount(_)
        ));
        assert!(matches!(
            validate("MATCH (f:File) WHERE f.name = 'oops RETURN f.path AS p").unwrap_err(),
            GrammarViolation::Lex(_)
        ));
    }

    #[test]
    fn test_tokenize_strings_and_comments() {
        let tokens = tokenize("MATCH (n) // trailing\nRETURN 'it\\'s' AS s, $param AS p").unwrap();
        assert!(tokens.contains(&Token::Str("it's".to_string())));
        assert!(tokens.contains(&Token::Param("param".to_string())));
        assert!(!tokens.iter().any(|t| t.ident() == Some("trailing")));
    }
}
