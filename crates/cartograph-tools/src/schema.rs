//! The schema contract handed to the query generator.
//!
//! Any change to the graph vocabulary in `cartograph-core` must be reflected
//! here and bump [`SCHEMA_VERSION`]; previously generated queries are not
//! guaranteed to survive it.

/// Version of the vocabulary and rules below.
pub const SCHEMA_VERSION: u32 = 1;

pub const GRAPH_SCHEMA: &str = "\
Node labels and their properties:
- Project: {name: string}
- Package: {qualified_name: string, name: string, path: string}
- Folder: {path: string, name: string}
- File: {path: string, name: string, extension: string}
- Module: {qualified_name: string, name: string, path: string}
- Class: {qualified_name: string, name: string, decorators: list[string]}
- Function: {qualified_name: string, name: string, decorators: list[string]}
- Method: {qualified_name: string, name: string, decorators: list[string]}
- ExternalPackage: {name: string, version_spec: string}

Relationships (source)-[TYPE]->(target):
- (Project|Package|Folder) -[:CONTAINS_PACKAGE]-> Package
- (Project|Package|Folder) -[:CONTAINS_FOLDER]-> Folder
- (Project|Package|Folder) -[:CONTAINS_FILE]-> File
- (Project|Package|Folder) -[:CONTAINS_MODULE]-> Module
- Module -[:DEFINES]-> (Class|Function)
- Class -[:DEFINES_METHOD]-> Method
- Project -[:DEPENDS_ON_EXTERNAL]-> ExternalPackage
- (Function|Method) -[:CALLS]-> (Function|Method)

Paths are relative to the repository root and use '/' separators.
File extensions include the dot, e.g. '.py'.";

const QUERY_RULES: &str = "\
Rules for every query:
1. Write exactly one read-only query with a single MATCH clause. Never use UNION, \
OPTIONAL MATCH, WITH, UNWIND, CALL or any clause that writes.
2. Bind every node to a variable, e.g. (f:File), and reach properties through it.
3. Never return whole nodes or relationships. Return properties, each with an alias: \
RETURN f.path AS path.
4. Match paths with STARTS WITH, never with equality.
5. For case-insensitive matching apply toLower() to both sides, or compare \
toLower(x) against a lowercase literal.
6. Keep the clause order MATCH, WHERE, RETURN, LIMIT.
7. Check list properties such as decorators with IN: WHERE 'task' IN n.decorators.
8. Prefer returning name, path or qualified_name, plus labels(n) AS type.";

/// Question and query pairs shown to the generator.
pub const EXAMPLES: &[(&str, &str)] = &[
    (
        "Find the main README file",
        "MATCH (f:File) WHERE toLower(f.name) CONTAINS 'readme' \
         RETURN f.path AS path, f.name AS name, labels(f) AS type",
    ),
    (
        "Find all python files",
        "MATCH (f:File) WHERE f.extension = '.py' \
         RETURN f.path AS path, f.name AS name, labels(f) AS type",
    ),
    (
        "show me the tasks",
        "MATCH (n:Function|Method) WHERE 'task' IN n.decorators \
         RETURN n.qualified_name AS qualified_name, n.name AS name, labels(n) AS type",
    ),
    (
        "list files in the services folder",
        "MATCH (f:File) WHERE f.path STARTS WITH 'services' \
         RETURN f.path AS path, f.name AS name, labels(f) AS type",
    ),
    (
        "which functions call save",
        "MATCH (caller:Function|Method)-[:CALLS]->(callee:Function|Method) \
         WHERE callee.name = 'save' \
         RETURN caller.qualified_name AS qualified_name, caller.name AS name, labels(caller) AS type",
    ),
    (
        "what third-party packages does the project use",
        "MATCH (p:Project)-[:DEPENDS_ON_EXTERNAL]->(e:ExternalPackage) \
         RETURN e.name AS name, e.version_spec AS version_spec",
    ),
    (
        "Find just one file to test",
        "MATCH (f:File) RETURN f.path AS path, f.name AS name, labels(f) AS type LIMIT 1",
    ),
];

/// System prompt for the query generator.
pub fn system_prompt() -> String {
    let mut prompt = format!(
        "You translate questions about a codebase into Cypher queries for a graph database \
         (schema version {SCHEMA_VERSION}). Respond with the query only: no explanation, \
         no markdown.\n\n{GRAPH_SCHEMA}\n\n{QUERY_RULES}\n\nExamples:\n"
    );
    for (question, query) in EXAMPLES {
        prompt.push_str(&format!("\nQuestion: {question}\nQuery: {query}\n"));
    }
    prompt
}
