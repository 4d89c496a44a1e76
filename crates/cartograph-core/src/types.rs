//! Core domain types for the codebase knowledge graph.
//!
//! These types are the fixed vocabulary shared by the fact producer, the
//! ingestor, the store clients, and the schema surfaced to query translation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Labels ────────────────────────────────────────────────────────

/// Every node label the graph may contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeLabel {
    Project,
    Package,
    Folder,
    File,
    Module,
    Class,
    Function,
    Method,
    ExternalPackage,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 9] = [
        NodeLabel::Project,
        NodeLabel::Package,
        NodeLabel::Folder,
        NodeLabel::File,
        NodeLabel::Module,
        NodeLabel::Class,
        NodeLabel::Function,
        NodeLabel::Method,
        NodeLabel::ExternalPackage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Project => "Project",
            NodeLabel::Package => "Package",
            NodeLabel::Folder => "Folder",
            NodeLabel::File => "File",
            NodeLabel::Module => "Module",
            NodeLabel::Class => "Class",
            NodeLabel::Function => "Function",
            NodeLabel::Method => "Method",
            NodeLabel::ExternalPackage => "ExternalPackage",
        }
    }

    /// The property that is unique within this label.
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::Project | NodeLabel::ExternalPackage => "name",
            NodeLabel::Folder | NodeLabel::File => "path",
            NodeLabel::Package
            | NodeLabel::Module
            | NodeLabel::Class
            | NodeLabel::Function
            | NodeLabel::Method => "qualified_name",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == s)
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Node Types ────────────────────────────────────────────────────

/// Root of containment; one per ingested repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
}

/// A source package (for Python, a directory with `__init__.py`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    pub qualified_name: String,
    pub name: String,
    pub path: String,
}

/// A plain directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Folder {
    pub path: String,
    pub name: String,
}

/// Any file in the repository. `extension` keeps the leading dot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct File {
    pub path: String,
    pub name: String,
    pub extension: String,
}

/// A language-level compilation unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Module {
    pub qualified_name: String,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Class {
    pub qualified_name: String,
    pub name: String,
    pub decorators: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Function {
    pub qualified_name: String,
    pub name: String,
    pub decorators: BTreeSet<String>,
}

/// A function owned by exactly one class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Method {
    pub qualified_name: String,
    pub name: String,
    pub decorators: BTreeSet<String>,
}

/// A third-party dependency declared by the project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalPackage {
    pub name: String,
    pub version_spec: String,
}

/// Enum wrapper for all node types in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "node_type")]
pub enum Node {
    Project(Project),
    Package(Package),
    Folder(Folder),
    File(File),
    Module(Module),
    Class(Class),
    Function(Function),
    Method(Method),
    ExternalPackage(ExternalPackage),
}

/// A property value as stored on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Text(s) => serde_json::Value::String(s.clone()),
            PropertyValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
        }
    }
}

fn text(s: &str) -> PropertyValue {
    PropertyValue::Text(s.to_string())
}

fn list(set: &BTreeSet<String>) -> PropertyValue {
    PropertyValue::List(set.iter().cloned().collect())
}

impl Node {
    pub fn label(&self) -> NodeLabel {
        match self {
            Node::Project(_) => NodeLabel::Project,
            Node::Package(_) => NodeLabel::Package,
            Node::Folder(_) => NodeLabel::Folder,
            Node::File(_) => NodeLabel::File,
            Node::Module(_) => NodeLabel::Module,
            Node::Class(_) => NodeLabel::Class,
            Node::Function(_) => NodeLabel::Function,
            Node::Method(_) => NodeLabel::Method,
            Node::ExternalPackage(_) => NodeLabel::ExternalPackage,
        }
    }

    /// Value of the label's key property.
    pub fn key_value(&self) -> &str {
        match self {
            Node::Project(n) => &n.name,
            Node::Package(n) => &n.qualified_name,
            Node::Folder(n) => &n.path,
            Node::File(n) => &n.path,
            Node::Module(n) => &n.qualified_name,
            Node::Class(n) => &n.qualified_name,
            Node::Function(n) => &n.qualified_name,
            Node::Method(n) => &n.qualified_name,
            Node::ExternalPackage(n) => &n.name,
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.label(), self.key_value())
    }

    /// All stored properties, key property first.
    pub fn properties(&self) -> Vec<(&'static str, PropertyValue)> {
        match self {
            Node::Project(n) => vec![("name", text(&n.name))],
            Node::Package(n) => vec![
                ("qualified_name", text(&n.qualified_name)),
                ("name", text(&n.name)),
                ("path", text(&n.path)),
            ],
            Node::Folder(n) => vec![("path", text(&n.path)), ("name", text(&n.name))],
            Node::File(n) => vec![
                ("path", text(&n.path)),
                ("name", text(&n.name)),
                ("extension", text(&n.extension)),
            ],
            Node::Module(n) => vec![
                ("qualified_name", text(&n.qualified_name)),
                ("name", text(&n.name)),
                ("path", text(&n.path)),
            ],
            Node::Class(n) => vec![
                ("qualified_name", text(&n.qualified_name)),
                ("name", text(&n.name)),
                ("decorators", list(&n.decorators)),
            ],
            Node::Function(n) => vec![
                ("qualified_name", text(&n.qualified_name)),
                ("name", text(&n.name)),
                ("decorators", list(&n.decorators)),
            ],
            Node::Method(n) => vec![
                ("qualified_name", text(&n.qualified_name)),
                ("name", text(&n.name)),
                ("decorators", list(&n.decorators)),
            ],
            Node::ExternalPackage(n) => vec![
                ("name", text(&n.name)),
                ("version_spec", text(&n.version_spec)),
            ],
        }
    }
}

/// Identifies a node by its label and the value of the label's key property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub label: NodeLabel,
    pub value: String,
}

impl NodeKey {
    pub fn new(label: NodeLabel, value: impl Into<String>) -> Self {
        Self {
            label,
            value: value.into(),
        }
    }

    pub fn property(&self) -> &'static str {
        self.label.key_property()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}={})", self.label, self.property(), self.value)
    }
}

// ── Edge Types ────────────────────────────────────────────────────

/// The type of relationship between two nodes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    ContainsPackage,
    ContainsFolder,
    ContainsFile,
    ContainsModule,
    Defines,
    DefinesMethod,
    DependsOnExternal,
    Calls,
}

impl EdgeType {
    pub const ALL: [EdgeType; 8] = [
        EdgeType::ContainsPackage,
        EdgeType::ContainsFolder,
        EdgeType::ContainsFile,
        EdgeType::ContainsModule,
        EdgeType::Defines,
        EdgeType::DefinesMethod,
        EdgeType::DependsOnExternal,
        EdgeType::Calls,
    ];

    /// The Cypher relationship type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::ContainsPackage => "CONTAINS_PACKAGE",
            EdgeType::ContainsFolder => "CONTAINS_FOLDER",
            EdgeType::ContainsFile => "CONTAINS_FILE",
            EdgeType::ContainsModule => "CONTAINS_MODULE",
            EdgeType::Defines => "DEFINES",
            EdgeType::DefinesMethod => "DEFINES_METHOD",
            EdgeType::DependsOnExternal => "DEPENDS_ON_EXTERNAL",
            EdgeType::Calls => "CALLS",
        }
    }

    /// Whether `source -[self]-> target` is allowed by the schema.
    pub fn permits(&self, source: NodeLabel, target: NodeLabel) -> bool {
        use NodeLabel::*;
        let container = matches!(source, Project | Package | Folder);
        match self {
            EdgeType::ContainsPackage => container && target == Package,
            EdgeType::ContainsFolder => container && target == Folder,
            EdgeType::ContainsFile => container && target == File,
            EdgeType::ContainsModule => container && target == Module,
            EdgeType::Defines => source == Module && matches!(target, Class | Function),
            EdgeType::DefinesMethod => source == Class && target == Method,
            EdgeType::DependsOnExternal => source == Project && target == ExternalPackage,
            EdgeType::Calls => {
                matches!(source, Function | Method) && matches!(target, Function | Method)
            }
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub source: NodeKey,
    pub edge_type: EdgeType,
    pub target: NodeKey,
}

impl Edge {
    pub fn new(source: NodeKey, edge_type: EdgeType, target: NodeKey) -> Self {
        Self {
            source,
            edge_type,
            target,
        }
    }
}
