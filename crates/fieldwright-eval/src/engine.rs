//! The evaluation pass: order formulas, evaluate each against the record,
//! enforce dictionary rules, and collect the resulting field updates.

use fieldwright_common::{
    Diagnostic, DictionaryMap, DictionaryRule, EvalError, EvalErrorKind, EvaluationResult,
    FieldUpdate, FormulaDefinition, RecordSnapshot, Severity,
};
use fieldwright_parse::{ASTNode, ParseError, parse};
use tracing::{debug, warn};

use crate::dictionary::enforce;
use crate::interpreter::Interpreter;
use crate::overtime::{OvertimeCalculator, OvertimeConfig, OvertimeSummary};
use crate::resolver::{DependencyCycle, FormulaNode, Resolver};
use crate::scope::{FieldState, Scope};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Cycle(#[from] DependencyCycle),
    #[error("formula '{formula_id}': {source}")]
    Formula {
        formula_id: String,
        #[source]
        source: ParseError,
    },
}

/// Caller-supplied inputs to one pass besides the formulas themselves.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub record: &'a RecordSnapshot,
    pub bill_rate: Option<f64>,
    pub cost_rate: Option<f64>,
    /// Precomputed summary. When absent one is computed from the record
    /// alone.
    pub ot_summary: Option<&'a OvertimeSummary>,
}

impl<'a> EvaluationInput<'a> {
    pub fn new(record: &'a RecordSnapshot) -> Self {
        Self {
            record,
            bill_rate: None,
            cost_rate: None,
            ot_summary: None,
        }
    }

    pub fn with_overtime(mut self, summary: &'a OvertimeSummary) -> Self {
        self.ot_summary = Some(summary);
        self
    }

    pub fn with_rates(mut self, bill_rate: Option<f64>, cost_rate: Option<f64>) -> Self {
        self.bill_rate = bill_rate;
        self.cost_rate = cost_rate;
        self
    }
}

/// A formula that applies to the current pass, with its parse outcome.
#[derive(Debug)]
pub struct CompiledFormula<'f> {
    pub definition: &'f FormulaDefinition,
    pub ast: Result<ASTNode, ParseError>,
}

/// Filter by event, parse, and order. `canonical` maps a field key (name or
/// id) to the identity used for dependency edges.
pub fn plan<'f, F>(
    formulas: &'f [FormulaDefinition],
    event: Option<&str>,
    canonical: F,
) -> Result<Vec<CompiledFormula<'f>>, DependencyCycle>
where
    F: Fn(&str) -> String,
{
    let compiled: Vec<CompiledFormula> = formulas
        .iter()
        .filter(|f| f.applies_to(event))
        .map(|definition| CompiledFormula {
            definition,
            ast: parse(&definition.expression),
        })
        .collect();

    let nodes: Vec<FormulaNode> = compiled
        .iter()
        .map(|c| FormulaNode {
            target: canonical(&c.definition.field_key),
            priority: c.definition.priority,
            references: c
                .ast
                .as_ref()
                .map(|ast| ast.field_references().into_iter().map(&canonical).collect())
                .unwrap_or_default(),
        })
        .collect();

    let order = Resolver::new(&nodes).resolve()?;
    let mut slots: Vec<Option<CompiledFormula>> = compiled.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Parse every formula and check the set is acyclic, failing on the first
/// problem. Keys are compared as written.
pub fn validate(formulas: &[FormulaDefinition]) -> Result<Vec<&FormulaDefinition>, EngineError> {
    let planned = plan(formulas, None, str::to_string)?;
    planned
        .into_iter()
        .map(|c| match c.ast {
            Ok(_) => Ok(c.definition),
            Err(source) => Err(EngineError::Formula {
                formula_id: c.definition.id.clone(),
                source,
            }),
        })
        .collect()
}

fn rule_for<'d>(
    dictionary: &'d DictionaryMap,
    formula: &FormulaDefinition,
    name: &str,
    field_id: &str,
) -> Option<&'d DictionaryRule> {
    dictionary
        .get(&formula.field_key)
        .or_else(|| dictionary.get(name))
        .or_else(|| dictionary.get(field_id))
}

/// Pure evaluation pipeline. Holds only policy; every call is independent.
#[derive(Debug, Clone, Default)]
pub struct FormulaEngine {
    overtime: OvertimeCalculator,
}

impl FormulaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overtime_config(config: OvertimeConfig) -> Self {
        Self {
            overtime: OvertimeCalculator::new(config),
        }
    }

    pub fn overtime(&self) -> &OvertimeCalculator {
        &self.overtime
    }

    /// Run one pass. Never fails as a whole: every problem is reported as a
    /// diagnostic. A dependency cycle yields a single diagnostic and no
    /// updates.
    pub fn evaluate(
        &self,
        formulas: &[FormulaDefinition],
        input: EvaluationInput<'_>,
        dictionary: &DictionaryMap,
        event: Option<&str>,
    ) -> EvaluationResult {
        let record = input.record;
        let mut result = EvaluationResult::default();

        let canonical = |key: &str| {
            record
                .field(key)
                .map(|f| f.field_id.clone())
                .unwrap_or_else(|| key.to_string())
        };
        let planned = match plan(formulas, event, canonical) {
            Ok(p) => p,
            Err(cycle) => {
                warn!(record_id = %record.id, %cycle, "aborting pass");
                result.push_diagnostic(Diagnostic::error(
                    EvalErrorKind::Cycle.code(),
                    cycle.to_string(),
                ));
                return result;
            }
        };

        let computed;
        let summary = match input.ot_summary {
            Some(s) => Some(s),
            None => {
                computed = self.overtime.single(record);
                computed.as_ref()
            }
        };

        let mut state = FieldState::from_record(record);
        let mut touched: Vec<String> = Vec::new();

        for CompiledFormula { definition, ast } in &planned {
            let Some(target) = record.field(&definition.field_key) else {
                result.push_diagnostic(
                    Diagnostic::error(
                        EvalErrorKind::MissingField.code(),
                        format!("target field '{}' does not exist", definition.field_key),
                    )
                    .for_formula(&definition.id, &definition.field_key),
                );
                continue;
            };

            let value = match ast {
                Ok(ast) => {
                    let scope = Scope::new(record, &state)
                        .with_overtime(summary)
                        .with_rates(input.bill_rate, input.cost_rate);
                    Interpreter::new(&scope)
                        .evaluate_ast(ast)
                        .and_then(|v| v.ensure_finite().map(|_| v))
                }
                Err(e) => Err(EvalError::from(e.clone())),
            };
            let value = match value {
                Ok(v) => v,
                Err(e) => {
                    debug!(formula_id = %definition.id, error = %e, "formula skipped");
                    result.push_diagnostic(
                        Diagnostic::from_eval_error(&e, Severity::Error)
                            .for_formula(&definition.id, &definition.field_key),
                    );
                    continue;
                }
            };

            let rule = rule_for(dictionary, definition, &target.name, &target.field_id);
            let enforced = enforce(rule, value);
            if let Some(d) = enforced.diagnostic {
                result.push_diagnostic(d.for_formula(&definition.id, &definition.field_key));
            }
            let Some(value) = enforced.value else {
                continue;
            };

            let value = value.into_field_value();
            debug!(formula_id = %definition.id, field = %target.field_id, %value, "formula applied");
            state.set(&target.field_id, value);
            if !touched.contains(&target.field_id) {
                touched.push(target.field_id.clone());
            }
        }

        for field_id in touched {
            let Some(live) = record.field(&field_id) else {
                continue;
            };
            let Some(after) = state.get(&field_id) else {
                continue;
            };
            if *after != live.value {
                result.push_update(
                    FieldUpdate {
                        field_id: field_id.clone(),
                        field_key: live.name.clone(),
                        value: after.clone(),
                    },
                    live.value.clone(),
                );
            }
        }

        result
    }
}

/// Diagnostic for a pass whose updates were dropped because the record
/// changed under it.
pub fn concurrent_modification(record_id: &str) -> Diagnostic {
    Diagnostic::error(
        EvalErrorKind::ConcurrentModification.code(),
        format!("record '{record_id}' changed during evaluation; updates discarded"),
    )
}
