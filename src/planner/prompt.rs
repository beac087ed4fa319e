//! Versioned prompt template for SQL generation.
//!
//! The template is an explicit, inspectable component rather than something
//! buried inside a vendor SDK: callers can read the rendered prompt, and the
//! version string travels with logs so behavior changes are attributable.

/// Template for grounding-context SQL-generation prompts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    version: &'static str,
    preamble: &'static str,
}

impl PromptTemplate {
    /// First stable template revision.
    pub fn v1() -> Self {
        Self {
            version: "nl2sql/v1",
            preamble: "You are a SQL generation assistant for a data warehouse. \
                       Answer with a single SQL statement and nothing else. \
                       Use only tables and columns present in the schema below. \
                       If the question cannot be answered from the schema, \
                       respond with the single word UNANSWERABLE.",
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Renders the full prompt from the question, the warehouse schema
    /// description, and the retrieved grounding context.
    pub fn render(&self, question: &str, schema_description: &str, context: &str) -> String {
        let mut prompt = String::with_capacity(
            self.preamble.len() + schema_description.len() + context.len() + question.len() + 96,
        );
        prompt.push_str(self.preamble);
        prompt.push_str("\n\n## Schema\n");
        prompt.push_str(schema_description);
        if !context.is_empty() {
            prompt.push_str("\n\n## Context\n");
            prompt.push_str(context);
        }
        prompt.push_str("\n\n## Question\n");
        prompt.push_str(question);
        prompt.push_str("\n\n## SQL\n");
        prompt
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::v1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_all_sections_in_order() {
        let template = PromptTemplate::v1();
        let prompt = template.render(
            "How many payments failed last month?",
            "payments(payment_id, status, amount, created_at)",
            "status is one of: pending, settled, failed",
        );

        let schema_at = prompt.find("## Schema").unwrap();
        let context_at = prompt.find("## Context").unwrap();
        let question_at = prompt.find("## Question").unwrap();
        assert!(schema_at < context_at && context_at < question_at);
        assert!(prompt.contains("failed last month"));
    }

    #[test]
    fn empty_context_omits_the_section() {
        let prompt = PromptTemplate::v1().render("q", "schema", "");
        assert!(!prompt.contains("## Context"));
    }

    #[test]
    fn version_is_stable() {
        assert_eq!(PromptTemplate::v1().version(), "nl2sql/v1");
    }
}
