//! Repository fact production.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use cartograph_core::types::{
    Class, ExternalPackage, File, Folder, Function, Method, Module, Package, Project,
};
use cartograph_core::{Edge, EdgeType, FactBatch, Node, NodeKey, NodeLabel};

use crate::error::{IndexError, Result};
use crate::manifest::read_dependencies;
use crate::python::{module_qualified_name, CallSite, FunctionDef, PythonParser};
use crate::walker::{RepoWalker, WalkEntry};

/// Produces the complete fact batch for one repository snapshot.
///
/// CPU-bound and synchronous; async callers run it on a blocking thread.
pub trait FactProducer: Send + Sync {
    fn produce(&self, repo_path: &Path) -> Result<FactBatch>;
}

/// Containment, Python definitions, call edges and declared dependencies.
#[derive(Debug, Clone)]
pub struct RepositoryFactProducer {
    ignore_file: String,
}

impl Default for RepositoryFactProducer {
    fn default() -> Self {
        Self::new(".cartographignore")
    }
}

impl RepositoryFactProducer {
    pub fn new(ignore_file: &str) -> Self {
        Self {
            ignore_file: ignore_file.to_string(),
        }
    }
}

impl FactProducer for RepositoryFactProducer {
    fn produce(&self, repo_path: &Path) -> Result<FactBatch> {
        let root = repo_path.canonicalize()?;
        if !root.is_dir() {
            return Err(IndexError::Walk(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let project = root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project")
            .to_string();

        let entries = RepoWalker::new(&root, &self.ignore_file).walk()?;
        let mut builder = BatchBuilder::new(&project);
        builder.containment(&entries);

        let mut parser = PythonParser::new()?;
        for entry in entries.iter().filter(|e| !e.is_dir && e.rel_path.ends_with(".py")) {
            let source = match std::fs::read_to_string(&entry.abs_path) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(path = %entry.rel_path, error = %e, "Skipping unreadable module");
                    continue;
                }
            };
            match parser.outline(&source) {
                Some(outline) => builder.definitions(&entry.rel_path, outline),
                None => tracing::warn!(path = %entry.rel_path, "Parser produced no tree"),
            }
        }
        builder.resolve_calls();

        for dep in read_dependencies(&root) {
            builder.dependency(dep.name, dep.version_spec);
        }

        let batch = builder.finish();
        tracing::info!(
            project = %project,
            nodes = batch.node_count(),
            edges = batch.edge_count(),
            "Repository facts produced"
        );
        Ok(batch)
    }
}

/// A function or method awaiting call resolution.
struct Caller {
    key: NodeKey,
    module: String,
    class: Option<String>,
    calls: Vec<CallSite>,
}

struct BatchBuilder {
    project: String,
    batch: FactBatch,
    /// Position of each definition node, for merging redefinitions.
    positions: HashMap<NodeKey, usize>,
    packages: HashSet<String>,
    callers: Vec<Caller>,
    /// module -> top-level function name -> key
    module_functions: HashMap<String, HashMap<String, NodeKey>>,
    /// class -> method name -> key
    class_methods: HashMap<String, HashMap<String, NodeKey>>,
    /// function name -> every top-level function with that name
    functions_by_name: HashMap<String, Vec<NodeKey>>,
}

impl BatchBuilder {
    fn new(project: &str) -> Self {
        let mut batch = FactBatch::new();
        batch.push_node(Node::Project(Project {
            name: project.to_string(),
        }));
        Self {
            project: project.to_string(),
            batch,
            positions: HashMap::new(),
            packages: HashSet::new(),
            callers: Vec::new(),
            module_functions: HashMap::new(),
            class_methods: HashMap::new(),
            functions_by_name: HashMap::new(),
        }
    }

    fn project_key(&self) -> NodeKey {
        NodeKey::new(NodeLabel::Project, &self.project)
    }

    fn package_name(&self, dir: &str) -> String {
        format!("{}.{}", self.project, dir.replace('/', "."))
    }

    /// The Project, Package or Folder directly containing `rel_path`.
    fn container_of(&self, rel_path: &str) -> NodeKey {
        match rel_path.rsplit_once('/') {
            None => self.project_key(),
            Some((parent, _)) if self.packages.contains(parent) => {
                NodeKey::new(NodeLabel::Package, self.package_name(parent))
            }
            Some((parent, _)) => NodeKey::new(NodeLabel::Folder, parent),
        }
    }

    fn containment(&mut self, entries: &[WalkEntry]) {
        self.packages = entries
            .iter()
            .filter(|e| !e.is_dir)
            .filter_map(|e| e.rel_path.strip_suffix("/__init__.py"))
            .map(str::to_string)
            .collect();

        for entry in entries {
            let parent = self.container_of(&entry.rel_path);
            let name = entry
                .rel_path
                .rsplit('/')
                .next()
                .unwrap_or(&entry.rel_path)
                .to_string();

            if entry.is_dir {
                let (node, edge_type) = if self.packages.contains(&entry.rel_path) {
                    let package = Package {
                        qualified_name: self.package_name(&entry.rel_path),
                        name,
                        path: entry.rel_path.clone(),
                    };
                    (Node::Package(package), EdgeType::ContainsPackage)
                } else {
                    let folder = Folder {
                        path: entry.rel_path.clone(),
                        name,
                    };
                    (Node::Folder(folder), EdgeType::ContainsFolder)
                };
                self.batch.push_edge(Edge::new(parent, edge_type, node.key()));
                self.batch.push_node(node);
                continue;
            }

            let extension = Path::new(&name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{e}"))
                .unwrap_or_default();
            let file = Node::File(File {
                path: entry.rel_path.clone(),
                name: name.clone(),
                extension: extension.clone(),
            });
            self.batch
                .push_edge(Edge::new(parent.clone(), EdgeType::ContainsFile, file.key()));
            self.batch.push_node(file);

            if extension == ".py" {
                let qualified_name = module_qualified_name(&self.project, &entry.rel_path);
                let module_name = qualified_name
                    .rsplit('.')
                    .next()
                    .unwrap_or(&qualified_name)
                    .to_string();
                let module = Node::Module(Module {
                    qualified_name,
                    name: module_name,
                    path: entry.rel_path.clone(),
                });
                let key = module.key();
                // `app.py` next to an `app/` package names the same module
                if self.define(module) {
                    self.batch
                        .push_edge(Edge::new(parent, EdgeType::ContainsModule, key));
                } else {
                    tracing::debug!(module = %key, "Module already defined, keeping the first");
                }
            }
        }
    }

    /// Add a definition node, merging decorators into an earlier definition
    /// with the same key. Returns false for such a redefinition.
    fn define(&mut self, node: Node) -> bool {
        let key = node.key();
        if let Some(&slot) = self.positions.get(&key) {
            if let (Some(existing), Some(extra)) =
                (decorator_set_mut(&mut self.batch.nodes[slot]), decorator_set(&node))
            {
                existing.extend(extra.iter().cloned());
            }
            return false;
        }
        self.positions.insert(key, self.batch.nodes.len());
        self.batch.push_node(node);
        true
    }

    fn definitions(&mut self, rel_path: &str, outline: crate::python::ModuleOutline) {
        let module = module_qualified_name(&self.project, rel_path);
        let module_key = NodeKey::new(NodeLabel::Module, &module);

        for class in outline.classes {
            let class_qn = format!("{module}.{}", class.name);
            let class_node = Node::Class(Class {
                qualified_name: class_qn.clone(),
                name: class.name,
                decorators: class.decorators,
            });
            let class_key = class_node.key();
            if self.define(class_node) {
                self.batch.push_edge(Edge::new(
                    module_key.clone(),
                    EdgeType::Defines,
                    class_key.clone(),
                ));
            }

            for method in class.methods {
                let method_qn = format!("{class_qn}.{}", method.name);
                let key = NodeKey::new(NodeLabel::Method, &method_qn);
                let FunctionDef {
                    name,
                    decorators,
                    calls,
                } = method;
                let node = Node::Method(Method {
                    qualified_name: method_qn,
                    name: name.clone(),
                    decorators,
                });
                if self.define(node) {
                    self.batch.push_edge(Edge::new(
                        class_key.clone(),
                        EdgeType::DefinesMethod,
                        key.clone(),
                    ));
                    self.class_methods
                        .entry(class_qn.clone())
                        .or_default()
                        .insert(name, key.clone());
                }
                self.callers.push(Caller {
                    key,
                    module: module.clone(),
                    class: Some(class_qn.clone()),
                    calls,
                });
            }
        }

        for function in outline.functions {
            let qn = format!("{module}.{}", function.name);
            let key = NodeKey::new(NodeLabel::Function, &qn);
            let node = Node::Function(Function {
                qualified_name: qn,
                name: function.name.clone(),
                decorators: function.decorators,
            });
            if self.define(node) {
                self.batch
                    .push_edge(Edge::new(module_key.clone(), EdgeType::Defines, key.clone()));
                self.module_functions
                    .entry(module.clone())
                    .or_default()
                    .insert(function.name.clone(), key.clone());
                self.functions_by_name
                    .entry(function.name)
                    .or_default()
                    .push(key.clone());
            }
            self.callers.push(Caller {
                key,
                module: module.clone(),
                class: None,
                calls: function.calls,
            });
        }
    }

    fn resolve(&self, caller: &Caller, site: &CallSite) -> Option<NodeKey> {
        match site {
            CallSite::SelfAttribute(name) => self
                .class_methods
                .get(caller.class.as_ref()?)?
                .get(name)
                .cloned(),
            CallSite::Name(name) => {
                if let Some(local) = self
                    .module_functions
                    .get(&caller.module)
                    .and_then(|defs| defs.get(name))
                {
                    return Some(local.clone());
                }
                match self.functions_by_name.get(name).map(Vec::as_slice) {
                    Some([only]) => Some(only.clone()),
                    _ => None,
                }
            }
        }
    }

    fn resolve_calls(&mut self) {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for caller in &self.callers {
            for site in &caller.calls {
                if let Some(target) = self.resolve(caller, site) {
                    let edge = Edge::new(caller.key.clone(), EdgeType::Calls, target);
                    if seen.insert(edge.clone()) {
                        edges.push(edge);
                    }
                }
            }
        }
        self.batch.edges.extend(edges);
    }

    fn dependency(&mut self, name: String, version_spec: String) {
        let node = Node::ExternalPackage(ExternalPackage { name, version_spec });
        self.batch
            .push_edge(Edge::new(self.project_key(), EdgeType::DependsOnExternal, node.key()));
        self.batch.push_node(node);
    }

    fn finish(self) -> FactBatch {
        self.batch
    }
}

fn decorator_set(node: &Node) -> Option<&BTreeSet<String>> {
    match node {
        Node::Class(n) => Some(&n.decorators),
        Node::Function(n) => Some(&n.decorators),
        Node::Method(n) => Some(&n.decorators),
        _ => None,
    }
}

fn decorator_set_mut(node: &mut Node) -> Option<&mut BTreeSet<String>> {
    match node {
        Node::Class(n) => Some(&mut n.decorators),
        Node::Function(n) => Some(&mut n.decorators),
        Node::Method(n) => Some(&mut n.decorators),
        _ => None,
    }
}
