//! Calculator tool - basic arithmetic on two numbers

use super::{parse_input, Tool, ToolContext, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

pub const DIVIDE_BY_ZERO: &str = "Error: Cannot divide by zero";

pub struct CalculatorTool;

#[derive(Debug, Deserialize)]
struct CalculatorInput {
    first_num: f64,
    second_num: f64,
    operation: String,
}

/// Apply `operation` to the operands.
///
/// Unrecognized operations fall back to the remainder. Division by zero is an
/// ordinary string result rather than an error.
pub fn calculate(first: f64, second: f64, operation: &str) -> Value {
    match operation {
        "addition" | "+" => json!(first + second),
        "subtraction" | "-" => json!(first - second),
        "multiplication" | "*" => json!(first * second),
        "division" | "/" => {
            if second == 0.0 {
                Value::String(DIVIDE_BY_ZERO.to_string())
            } else {
                json!(first / second)
            }
        }
        _ => json!(first % second),
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> String {
        "Perform a math operation between two numbers. Supported operations: addition, subtraction, multiplication, division.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["first_num", "second_num", "operation"],
            "properties": {
                "first_num": {"type": "number"},
                "second_num": {"type": "number"},
                "operation": {
                    "type": "string",
                    "description": "One of addition, subtraction, multiplication, division"
                }
            }
        })
    }

    async fn run(&self, input: Value, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let input: CalculatorInput = parse_input(input)?;
        Ok(ToolOutput::json(calculate(
            input.first_num,
            input.second_num,
            &input.operation,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;
    use proptest::prelude::*;

    #[test]
    fn test_symbol_and_word_forms_agree() {
        for (word, symbol) in [
            ("addition", "+"),
            ("subtraction", "-"),
            ("multiplication", "*"),
            ("division", "/"),
        ] {
            assert_eq!(calculate(7.0, 2.0, word), calculate(7.0, 2.0, symbol));
        }
        assert_eq!(calculate(7.0, 2.0, "division"), json!(3.5));
    }

    #[test]
    fn test_division_by_zero_is_a_string() {
        assert_eq!(calculate(12.0, 0.0, "division"), json!(DIVIDE_BY_ZERO));
        assert_eq!(calculate(12.0, 0.0, "/"), json!(DIVIDE_BY_ZERO));
    }

    #[test]
    fn test_unknown_operation_is_remainder() {
        assert_eq!(calculate(10.0, 3.0, "modulo"), json!(1.0));
        assert_eq!(calculate(10.0, 3.0, "power"), json!(1.0));
        // NaN has no JSON representation
        assert_eq!(calculate(10.0, 0.0, "modulo"), Value::Null);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_input() {
        let err = CalculatorTool
            .run(json!({"first_num": "twelve"}), test_context("http://127.0.0.1:9"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_run_divides() {
        let out = CalculatorTool
            .run(
                json!({"first_num": 12, "second_num": 0, "operation": "division"}),
                test_context("http://127.0.0.1:9"),
            )
            .await
            .unwrap();
        assert_eq!(out.content, json!(DIVIDE_BY_ZERO));
    }

    proptest! {
        #[test]
        fn arithmetic_matches_f64(a in -1e9f64..1e9, b in -1e9f64..1e9) {
            prop_assert_eq!(calculate(a, b, "+"), json!(a + b));
            prop_assert_eq!(calculate(a, b, "-"), json!(a - b));
            prop_assert_eq!(calculate(a, b, "*"), json!(a * b));
            if b != 0.0 {
                prop_assert_eq!(calculate(a, b, "/"), json!(a / b));
            }
        }

        #[test]
        fn other_operations_fall_back_to_remainder(
            a in -1e6f64..1e6,
            b in 1f64..1e3,
            op in "[a-z]{3,10}",
        ) {
            prop_assume!(!["addition", "subtraction", "multiplication", "division"].contains(&op.as_str()));
            prop_assert_eq!(calculate(a, b, &op), json!(a % b));
        }
    }
}
