//! Python module outlines via tree-sitter.
//!
//! Only top-level classes and functions and the methods declared directly in
//! a class body are recorded. Nested definitions are skipped, together with
//! the calls made inside them.

use std::collections::BTreeSet;
use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::error::{IndexError, Result};

/// A call expression as written at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallSite {
    /// `name(...)`
    Name(String),
    /// `self.name(...)` or `cls.name(...)`
    SelfAttribute(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub decorators: BTreeSet<String>,
    pub calls: Vec<CallSite>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDef {
    pub name: String,
    pub decorators: BTreeSet<String>,
    pub methods: Vec<FunctionDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleOutline {
    pub classes: Vec<ClassDef>,
    pub functions: Vec<FunctionDef>,
}

pub struct PythonParser {
    parser: Parser,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|e| IndexError::Parser(e.to_string()))?;
        Ok(Self { parser })
    }

    /// Outline one module. `None` when tree-sitter produces no tree.
    pub fn outline(&mut self, source: &str) -> Option<ModuleOutline> {
        let tree = self.parser.parse(source, None)?;
        let root = tree.root_node();
        let mut outline = ModuleOutline::default();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let (definition, decorators) = unwrap_decorated(child, source);
            match definition.kind() {
                "class_definition" => {
                    if let Some(class) = class_def(definition, decorators, source) {
                        outline.classes.push(class);
                    }
                }
                "function_definition" | "async_function_definition" => {
                    if let Some(function) = function_def(definition, decorators, source) {
                        outline.functions.push(function);
                    }
                }
                _ => {}
            }
        }
        Some(outline)
    }
}

/// Dotted module path for a repository-relative `.py` file.
///
/// `pkg/__init__.py` names the package itself; a root `__init__.py` names
/// the project.
pub fn module_qualified_name(project: &str, rel_path: &str) -> String {
    let mut parts: Vec<&str> = rel_path.split('/').filter(|p| !p.is_empty()).collect();
    let file = parts.pop().unwrap_or_default();
    let stem = Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file);
    if stem != "__init__" {
        parts.push(stem);
    }
    std::iter::once(project)
        .chain(parts)
        .collect::<Vec<_>>()
        .join(".")
}

fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn unwrap_decorated<'t>(node: Node<'t>, source: &str) -> (Node<'t>, BTreeSet<String>) {
    if node.kind() != "decorated_definition" {
        return (node, BTreeSet::new());
    }
    let mut decorators = BTreeSet::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorator" {
            if let Some(name) = decorator_name(node_text(child, source)) {
                decorators.insert(name);
            }
        }
    }
    let definition = node.child_by_field_name("definition").unwrap_or(node);
    (definition, decorators)
}

/// `@app.route("/x")` becomes `app.route`.
fn decorator_name(text: &str) -> Option<String> {
    let name = text.trim().trim_start_matches('@');
    let name = name.split('(').next().unwrap_or(name).trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn class_def(node: Node<'_>, decorators: BTreeSet<String>, source: &str) -> Option<ClassDef> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();
    let mut methods = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            let (definition, method_decorators) = unwrap_decorated(child, source);
            if matches!(
                definition.kind(),
                "function_definition" | "async_function_definition"
            ) {
                if let Some(method) = function_def(definition, method_decorators, source) {
                    methods.push(method);
                }
            }
        }
    }
    Some(ClassDef {
        name,
        decorators,
        methods,
    })
}

fn function_def(node: Node<'_>, decorators: BTreeSet<String>, source: &str) -> Option<FunctionDef> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();
    let mut calls = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        collect_calls(body, source, &mut calls);
    }
    Some(FunctionDef {
        name,
        decorators,
        calls,
    })
}

fn collect_calls(node: Node<'_>, source: &str, calls: &mut Vec<CallSite>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition"
            | "async_function_definition"
            | "class_definition"
            | "decorated_definition" => {}
            "call" => {
                if let Some(site) = call_site(child, source) {
                    calls.push(site);
                }
                collect_calls(child, source, calls);
            }
            _ => collect_calls(child, source, calls),
        }
    }
}

fn call_site(call: Node<'_>, source: &str) -> Option<CallSite> {
    let function = call.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => Some(CallSite::Name(node_text(function, source).to_string())),
        "attribute" => {
            let object = function.child_by_field_name("object")?;
            let attribute = function.child_by_field_name("attribute")?;
            let receiver = node_text(object, source);
            (object.kind() == "identifier" && matches!(receiver, "self" | "cls"))
                .then(|| CallSite::SelfAttribute(node_text(attribute, source).to_string()))
        }
        _ => None,
    }
}
