//! Natural language to query translation.
//!
//! The generator is never trusted: its output is cleaned and run through
//! [`cypher::validate`] before it reaches the store.

use std::sync::Arc;

use async_trait::async_trait;
use cartograph_graph::cypher::{self, GrammarViolation};
use thiserror::Error;

use crate::error::LlmError;
use crate::llm::TextGenerator;
use crate::schema;

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("query generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("the generator returned an empty query")]
    Empty,

    #[error("generated query `{query}` was rejected: {violation}")]
    Grammar {
        query: String,
        violation: GrammarViolation,
    },
}

/// Turns one question into one validated query.
#[async_trait]
pub trait QueryTranslator: Send + Sync {
    async fn translate(&self, question: &str) -> Result<String, TranslationError>;
}

pub struct Translator {
    generator: Arc<dyn TextGenerator>,
    system_prompt: String,
}

impl Translator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            system_prompt: schema::system_prompt(),
        }
    }
}

#[async_trait]
impl QueryTranslator for Translator {
    async fn translate(&self, question: &str) -> Result<String, TranslationError> {
        let raw = self.generator.generate(&self.system_prompt, question).await?;
        let query = clean_query(&raw);
        if query.is_empty() {
            return Err(TranslationError::Empty);
        }

        match cypher::validate(&query) {
            Ok(validated) => {
                tracing::info!(query = %validated.text, "Generated query");
                Ok(validated.text)
            }
            Err(violation) => {
                tracing::warn!(query = %query, %violation, "Rejected generated query");
                Err(TranslationError::Grammar { query, violation })
            }
        }
    }
}

/// Strip what models wrap around a query: Markdown fences, a `cypher` tag,
/// whitespace and trailing semicolons.
pub fn clean_query(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(start) = text.find("```") {
        let fenced = &text[start + 3..];
        let end = fenced.find("```").unwrap_or(fenced.len());
        text = fenced[..end].trim();
    }
    if text
        .get(..6)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("cypher"))
    {
        let rest = &text[6..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            text = rest;
        }
    }
    text.trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Attachment;
    use cartograph_graph::cypher::ClauseKind;
    use std::collections::HashMap;

    /// Answers each question with a canned completion.
    struct ScriptedGenerator {
        answers: HashMap<&'static str, &'static str>,
    }

    impl ScriptedGenerator {
        fn new(answers: &[(&'static str, &'static str)]) -> Arc<Self> {
            Arc::new(Self {
                answers: answers.iter().copied().collect(),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
            self.answers
                .get(prompt)
                .map(|a| a.to_string())
                .ok_or(LlmError::EmptyResponse)
        }

        async fn generate_with_attachment(
            &self,
            _system: &str,
            _prompt: &str,
            _attachment: &Attachment,
        ) -> Result<String, LlmError> {
            Err(LlmError::EmptyResponse)
        }
    }

    const ACCEPTED: &[(&str, &str)] = &[
        (
            "Find all python files",
            "```cypher\nMATCH (f:File) WHERE f.extension = '.py' RETURN f.path AS path, f.name AS name, labels(f) AS type;\n```",
        ),
        (
            "which classes are decorated as dataclasses",
            "cypher MATCH (c:Class) WHERE 'dataclass' IN c.decorators RETURN c.qualified_name AS qualified_name",
        ),
        (
            "what does the api module define",
            "Here is the query:\n```\nMATCH (m:Module)-[:DEFINES]->(d:Class|Function)\nWHERE m.qualified_name STARTS WITH 'demo.api'\nRETURN d.name AS name, labels(d) AS type\nLIMIT 25\n```",
        ),
        (
            "find readme",
            "  MATCH (f:File) WHERE toLower(f.name) CONTAINS 'readme' RETURN f.path AS path ;  ",
        ),
        (
            "largest packages",
            "MATCH (p:Package)-[:CONTAINS_MODULE]->(m:Module) RETURN p.name AS package, count(m) AS modules ORDER BY modules DESC LIMIT 5",
        ),
    ];

    const REJECTED: &[(&str, &str)] = &[
        (
            "files and folders",
            "MATCH (f:File) RETURN f.path AS path UNION MATCH (d:Folder) RETURN d.path AS path",
        ),
        ("every file node", "MATCH (f:File) RETURN f"),
        ("unaliased names", "MATCH (f:Function) RETURN f.name"),
        (
            "the services folder",
            "MATCH (f:Folder) WHERE f.path = 'services' RETURN f.name AS name",
        ),
        ("limit before return", "MATCH (f:File) LIMIT 3 RETURN f.path AS path"),
        ("delete everything", "MATCH (n:File) DETACH DELETE n"),
        (
            "case-insensitive name",
            "MATCH (c:Class) WHERE toLower(c.name) = 'UserService' RETURN c.name AS name",
        ),
        ("all files as a list", "MATCH (f:File) RETURN collect(f) AS files"),
        (
            "functions that call anything",
            "MATCH (a:Function) WHERE (a)-[:CALLS]->(:Function) RETURN a.name AS name",
        ),
        (
            "files next to other files",
            "MATCH (f:File) WHERE EXISTS { MATCH (g:File) } RETURN f.path AS path",
        ),
        (
            "the main module file",
            "MATCH (f:File) WHERE f.path IN ['src/main.py'] RETURN f.name AS name",
        ),
    ];

    #[tokio::test]
    async fn test_accepted_queries_are_single_and_aliased() {
        let translator = Translator::new(ScriptedGenerator::new(ACCEPTED));
        for (question, _) in ACCEPTED {
            let query = translator.translate(question).await.unwrap();
            assert!(!query.to_ascii_uppercase().contains("UNION"), "{query}");
            assert!(!query.contains("```") && !query.ends_with(';'), "{query}");

            let validated = cypher::validate(&query).unwrap();
            let items = validated
                .clause(ClauseKind::Return)
                .map(|c| cypher::split_top_level(&c.body, |t| t.is_symbol(",")).len())
                .unwrap();
            assert_eq!(validated.aliases.len(), items, "{query}");
        }
    }

    #[tokio::test]
    async fn test_grammar_violations_are_rejected() {
        let translator = Translator::new(ScriptedGenerator::new(REJECTED));
        for (question, raw) in REJECTED {
            match translator.translate(question).await {
                Err(TranslationError::Grammar { query, .. }) => assert_eq!(query, raw.trim()),
                other => panic!("{question:?} should be rejected, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_and_failed_generation() {
        let translator = Translator::new(ScriptedGenerator::new(&[
            ("blank", "   "),
            ("fence only", "```cypher\n```"),
        ]));
        assert!(matches!(
            translator.translate("blank").await,
            Err(TranslationError::Empty)
        ));
        assert!(matches!(
            translator.translate("fence only").await,
            Err(TranslationError::Empty)
        ));
        assert!(matches!(
            translator.translate("unknown question").await,
            Err(TranslationError::Generation(_))
        ));
    }

    #[test]
    fn test_clean_query() {
        assert_eq!(clean_query("```cypher\nMATCH (n) RETURN 1 AS x;\n```"), "MATCH (n) RETURN 1 AS x");
        assert_eq!(clean_query("CYPHER\nMATCH (n) RETURN 1 AS x"), "MATCH (n) RETURN 1 AS x");
        assert_eq!(clean_query("MATCH (n) RETURN 1 AS x;;"), "MATCH (n) RETURN 1 AS x");
        // a variable that merely starts with the tag is kept
        assert_eq!(clean_query("cyphers"), "cyphers");
        assert_eq!(clean_query(""), "");
    }
}
