use disputeql_ast::parser::{ExprParser, Rule};
use disputeql_registry::SandboxRegistry;
use pest::Parser;

fn main() {
    let input = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "df_combined['predicted_category'].value_counts()".to_string());

    match ExprParser::parse(Rule::query, &input) {
        Ok(pairs) => {
            for pair in pairs {
                print_pair(&pair, 0);
            }
        }
        Err(e) => println!("Error: {}", e),
    }

    match disputeql_ast::parse(&input).map(|expr| expr.to_ir(&SandboxRegistry::new())) {
        Ok(Ok(plan)) => match serde_json::to_string_pretty(&plan) {
            Ok(json) => println!("{}", json),
            Err(e) => println!("Error: {}", e),
        },
        Ok(Err(e)) => println!("Lowering error: {}", e),
        Err(e) => println!("Parse error: {}", e),
    }
}

fn print_pair(pair: &pest::iterators::Pair<Rule>, indent: usize) {
    let indent_str = "  ".repeat(indent);
    println!("{}Rule::{:?} = {:?}", indent_str, pair.as_rule(), pair.as_str());
    for inner in pair.clone().into_inner() {
        print_pair(&inner, indent + 1);
    }
}
