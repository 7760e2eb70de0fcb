//! disputeql AST - parser, syntax tree and lowering to the query plan

pub mod ast;
pub mod parser;
mod to_ir;

pub use ast::*;
pub use parser::{parse, ParseError};
pub use to_ir::LowerError;

#[cfg(test)]
mod tests {
    use super::*;
    use disputeql_registry::SandboxRegistry;

    #[test]
    fn test_parse_and_lower_examples() {
        let registry = SandboxRegistry::new();
        for source in [
            "df_combined.head()",
            "len(df_combined)",
            "df_combined[(df_combined['predicted_category'] == 'FRAUD') & (df_combined['suggested_action'] != 'Auto-refund')]",
            "df_combined['predicted_category'].value_counts()",
            "df_combined[df_combined['created_at'] >= pd.Timestamp.now() - pd.Timedelta(days=7)]",
            "df_combined[df_combined['description'].str.contains('twice', case=False)][['dispute_id', 'description']]",
            "df_combined.sort_values('amount_dispute', ascending=False).head(3)",
            "df_combined[df_combined['predicted_category'].isin(['FRAUD', 'DUPLICATE_CHARGE'])].shape[0]",
        ] {
            let expr = parse(source).unwrap_or_else(|e| panic!("{}: {}", source, e));
            expr.to_ir(&registry)
                .unwrap_or_else(|e| panic!("{}: {}", source, e));
        }
    }

    #[test]
    fn test_ast_serializes() {
        let expr = parse("len(df_combined)").unwrap();
        let json = serde_json::to_value(&expr).unwrap();
        assert!(json.get("Call").is_some());
    }
}
