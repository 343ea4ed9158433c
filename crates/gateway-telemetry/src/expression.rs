//! Cost expression evaluation.
//!
//! Custom cost formulas are evaluated by an injected [`CostExpressionEvaluator`].
//! The bundled [`RhaiCostEvaluator`] runs expressions in a sandboxed Rhai
//! engine with bounded operations, nesting and string sizes.
//!
//! Bound variables:
//!
//! | name            | type    |
//! |-----------------|---------|
//! | `model`         | string  |
//! | `backend`       | string (`name.namespace`) |
//! | `input_tokens`  | integer |
//! | `output_tokens` | integer |
//! | `total_tokens`  | integer |

use parking_lot::RwLock;
use rhai::{Dynamic, Engine, Scope, AST};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cost::CostContext;

/// Raw result of an expression, before cost rules are applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// Anything else, by type name.
    Other(String),
}

/// Evaluates cost expressions against a request context.
pub trait CostExpressionEvaluator: Send + Sync {
    /// Check that an expression compiles and only uses bound variables.
    fn check(&self, expression: &str) -> Result<(), String>;

    /// Evaluate an expression.
    fn evaluate(&self, expression: &str, ctx: &CostContext) -> Result<ExpressionValue, String>;
}

/// Limits applied to the Rhai engine.
#[derive(Debug, Clone)]
pub struct RhaiEvaluatorConfig {
    /// Maximum operations per evaluation.
    pub max_operations: u64,
    /// Maximum expression nesting depth.
    pub max_expr_depth: usize,
    /// Maximum function call depth.
    pub max_call_levels: usize,
    /// Maximum string length.
    pub max_string_size: usize,
    /// Maximum number of cached compiled expressions.
    pub max_cached_expressions: usize,
}

impl Default for RhaiEvaluatorConfig {
    fn default() -> Self {
        Self {
            max_operations: 10_000,
            max_expr_depth: 32,
            max_call_levels: 8,
            max_string_size: 4096,
            max_cached_expressions: 1024,
        }
    }
}

impl RhaiEvaluatorConfig {
    /// Set the operation budget.
    #[must_use]
    pub fn with_max_operations(mut self, max: u64) -> Self {
        self.max_operations = max;
        self
    }
}

/// Sandboxed Rhai evaluator with a compiled-expression cache.
pub struct RhaiCostEvaluator {
    engine: Engine,
    cache: RwLock<HashMap<String, Arc<AST>>>,
    config: RhaiEvaluatorConfig,
}

impl std::fmt::Debug for RhaiCostEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiCostEvaluator")
            .field("config", &self.config)
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for RhaiCostEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn token_count(name: &str, value: u64) -> Result<i64, String> {
    i64::try_from(value).map_err(|_| format!("{name} {value} exceeds the integer range"))
}

/// Variables are pushed as mutable so the optimizer never folds them into a
/// cached AST.
fn bind(scope: &mut Scope<'_>, ctx: &CostContext) -> Result<(), String> {
    scope.push("model", ctx.model.clone());
    scope.push("backend", ctx.backend.clone());
    scope.push("input_tokens", token_count("input_tokens", ctx.input_tokens)?);
    scope.push("output_tokens", token_count("output_tokens", ctx.output_tokens)?);
    scope.push("total_tokens", token_count("total_tokens", ctx.total_tokens)?);
    Ok(())
}

impl RhaiCostEvaluator {
    /// Create an evaluator with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RhaiEvaluatorConfig::default())
    }

    /// Create an evaluator with custom limits.
    #[must_use]
    pub fn with_config(config: RhaiEvaluatorConfig) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(config.max_operations);
        engine.set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_string_size(config.max_string_size);
        engine.set_strict_variables(true);
        engine.disable_symbol("eval");
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});

        Self {
            engine,
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn compile(&self, expression: &str) -> Result<Arc<AST>, String> {
        if let Some(ast) = self.cache.read().get(expression) {
            return Ok(Arc::clone(ast));
        }

        let mut scope = Scope::new();
        bind(&mut scope, &CostContext::default())?;
        let ast = self
            .engine
            .compile_expression_with_scope(&scope, expression)
            .map_err(|e| e.to_string())?;
        let ast = Arc::new(ast);

        let mut cache = self.cache.write();
        if cache.len() >= self.config.max_cached_expressions {
            debug!(entries = cache.len(), "Clearing cost expression cache");
            cache.clear();
        }
        cache.insert(expression.to_string(), Arc::clone(&ast));
        Ok(ast)
    }
}

impl CostExpressionEvaluator for RhaiCostEvaluator {
    fn check(&self, expression: &str) -> Result<(), String> {
        self.compile(expression).map(|_| ())
    }

    fn evaluate(&self, expression: &str, ctx: &CostContext) -> Result<ExpressionValue, String> {
        let ast = self.compile(expression)?;
        let mut scope = Scope::new();
        bind(&mut scope, ctx)?;

        let value: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, &ast)
            .map_err(|e| e.to_string())?;

        if value.is_int() {
            return value
                .as_int()
                .map(ExpressionValue::Int)
                .map_err(ToString::to_string);
        }
        if value.is_float() {
            return value
                .as_float()
                .map(ExpressionValue::Float)
                .map_err(ToString::to_string);
        }
        Ok(ExpressionValue::Other(value.type_name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CostContext {
        CostContext::new("llama-3-70b", "llama.inference").with_usage(100, 50, 150)
    }

    #[test]
    fn test_arithmetic() {
        let eval = RhaiCostEvaluator::new();
        assert_eq!(
            eval.evaluate("input_tokens + output_tokens * 2", &ctx()),
            Ok(ExpressionValue::Int(200))
        );
    }

    #[test]
    fn test_string_variables() {
        let eval = RhaiCostEvaluator::new();
        assert_eq!(
            eval.evaluate("total_tokens + model.len() + backend.len()", &ctx()),
            Ok(ExpressionValue::Int(176))
        );
        assert_eq!(
            eval.evaluate(r#"model == "llama-3-70b""#, &ctx()),
            Ok(ExpressionValue::Other("bool".to_string()))
        );
    }

    #[test]
    fn test_float_and_other_values() {
        let eval = RhaiCostEvaluator::new();
        assert_eq!(
            eval.evaluate("input_tokens / 3.0", &ctx()),
            Ok(ExpressionValue::Float(100.0 / 3.0))
        );
        assert!(matches!(
            eval.evaluate("model", &ctx()),
            Ok(ExpressionValue::Other(_))
        ));
    }

    #[test]
    fn test_cached_expression_reads_each_context() {
        let eval = RhaiCostEvaluator::new();
        let small = CostContext::new("m", "b.ns").with_usage(10, 5, 15);
        assert!(eval.check("input_tokens + output_tokens").is_ok());
        assert_eq!(
            eval.evaluate("input_tokens + output_tokens", &small),
            Ok(ExpressionValue::Int(15))
        );
        assert_eq!(
            eval.evaluate("input_tokens + output_tokens", &ctx()),
            Ok(ExpressionValue::Int(150))
        );
        assert_eq!(eval.evaluate("input_tokens - 11", &small), Ok(ExpressionValue::Int(-1)));
    }

    #[test]
    fn test_token_count_out_of_range() {
        let eval = RhaiCostEvaluator::new();
        let huge = CostContext::new("m", "b.ns").with_usage(u64::MAX, 1, u64::MAX);
        let err = eval.evaluate("output_tokens", &huge).unwrap_err();
        assert!(err.contains("input_tokens"));
        assert!(err.contains("exceeds the integer range"));
    }

    #[test]
    fn test_unknown_variable_rejected_at_check() {
        let eval = RhaiCostEvaluator::new();
        assert!(eval.check("input_tokens + 1").is_ok());
        assert!(eval.check("cached_tokens + 1").is_err());
        assert!(eval.check("input_tokens +").is_err());
    }

    #[test]
    fn test_statements_rejected() {
        let eval = RhaiCostEvaluator::new();
        assert!(eval.check("let x = 1; x").is_err());
    }

    #[test]
    fn test_operation_budget() {
        let eval = RhaiCostEvaluator::with_config(RhaiEvaluatorConfig::default().with_max_operations(5));
        let long = (0..50).map(|_| "input_tokens").collect::<Vec<_>>().join(" + ");
        assert!(eval.evaluate(&long, &ctx()).is_err());
    }

    #[test]
    fn test_cache_reuse() {
        let eval = RhaiCostEvaluator::new();
        eval.check("total_tokens").unwrap();
        eval.check("total_tokens").unwrap();
        assert_eq!(eval.cache.read().len(), 1);
    }
}
