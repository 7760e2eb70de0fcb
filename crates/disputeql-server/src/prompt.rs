//! System prompt for translating questions into dataset expressions

use crate::catalog::SchemaDescription;

/// Identifier the generated code must use for the dataset
pub const DATASET_NAME: &str = "df_combined";

/// Resolution action that marks a dispute as resolved automatically
pub const AUTO_RESOLVED_ACTION: &str = "Auto-refund";

const RULES: [&str; 8] = [
    "Always use df_combined as the DataFrame name",
    "For date filters, use pd.Timestamp() or datetime operations",
    "For \"today\" use: df_combined['created_at'].dt.date == pd.Timestamp.now().date()",
    "For counting: len(df_combined[condition]) or df_combined[condition].shape[0]",
    "For filtering by category: df_combined['predicted_category'] == 'CATEGORY_NAME'",
    "For unresolved disputes: df_combined['suggested_action'] != 'Auto-refund'",
    "For grouping/breakdown: df_combined.groupby('column').size() or .value_counts()",
    "Use case-sensitive exact matches for categories and actions",
];

const EXAMPLES: [(&str, &str); 2] = [
    (
        "How many duplicate charges today?",
        "len(df_combined[(df_combined['predicted_category'] == 'DUPLICATE_CHARGE') & (df_combined['created_at'].dt.date == pd.Timestamp.now().date())])",
    ),
    (
        "List unresolved fraud disputes",
        "df_combined[(df_combined['predicted_category'] == 'FRAUD') & (df_combined['suggested_action'] != 'Auto-refund')]",
    ),
];

/// Render a string the way the generated code would quote it
fn quote(s: &str) -> String {
    if s.contains('\'') && !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// Bracketed list literal, e.g. `['FRAUD', 'OTHERS']`
pub fn list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote(s)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Builds the translation instructions from a schema
#[derive(Debug, Clone)]
pub struct PromptBuilder<'a> {
    schema: &'a SchemaDescription,
    rules: Vec<String>,
    examples: Vec<(String, String)>,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(schema: &'a SchemaDescription) -> Self {
        Self {
            schema,
            rules: RULES.iter().map(|r| r.to_string()).collect(),
            examples: EXAMPLES
                .iter()
                .map(|(q, code)| (q.to_string(), code.to_string()))
                .collect(),
        }
    }

    /// Append a worked question/expression pair
    pub fn example(mut self, question: impl Into<String>, code: impl Into<String>) -> Self {
        self.examples.push((question.into(), code.into()));
        self
    }

    pub fn build(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are a pandas query generator for dispute analysis. Generate ONLY the pandas code, no explanations.\n\n",
        );
        prompt.push_str(&format!("Available DataFrame: {}\n", DATASET_NAME));
        prompt.push_str(&format!("Columns: {}\n\n", list_literal(&self.schema.columns)));
        prompt.push_str(&format!("Categories: {}\n", list_literal(&self.schema.categories)));
        prompt.push_str(&format!("Suggested Actions: {}\n", list_literal(&self.schema.actions)));
        prompt.push_str(&format!("Date columns: {}\n\n", list_literal(&self.schema.date_columns)));

        prompt.push_str("Rules:\n");
        for (i, rule) in self.rules.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, rule));
        }

        prompt.push_str("\nQuery Examples:\n");
        for (question, code) in &self.examples {
            prompt.push_str(&format!("- \"{}\" → {}\n", question, code));
        }

        prompt.push_str("\nGenerate pandas code for this query:");
        prompt
    }
}

pub fn build_system_prompt(schema: &SchemaDescription) -> String {
    PromptBuilder::new(schema).build()
}
