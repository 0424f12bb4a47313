use super::sample_record;
use crate::engine::{EvaluationInput, FormulaEngine};
use crate::overtime::OvertimeCalculator;
use fieldwright_common::{
    CustomFieldValue, DictionaryMap, DictionaryRule, EnforcementMode, EvaluationResult,
    FormulaDefinition, RecordSnapshot, Severity, TimeInterval, Value,
};
use proptest::prelude::*;

fn run(formulas: &[FormulaDefinition], record: &RecordSnapshot) -> EvaluationResult {
    run_with(formulas, record, &DictionaryMap::new(), None)
}

fn run_with(
    formulas: &[FormulaDefinition],
    record: &RecordSnapshot,
    dictionary: &DictionaryMap,
    event: Option<&str>,
) -> EvaluationResult {
    FormulaEngine::new().evaluate(formulas, EvaluationInput::new(record), dictionary, event)
}

fn codes(result: &EvaluationResult) -> Vec<&str> {
    result.diagnostics.iter().map(|d| d.code.as_str()).collect()
}

fn apply(record: &mut RecordSnapshot, result: &EvaluationResult) {
    for u in &result.updates {
        if let Some(f) = record.custom_fields.iter_mut().find(|f| f.field_id == u.field_id) {
            f.value = u.value.clone();
        }
    }
}

#[test]
fn computes_and_reports_changes() {
    let record = sample_record();
    let formulas = vec![FormulaDefinition::new("f-rate", "Rate", "ROUND(billRate * 0.6, 2)")];
    let result = run(&formulas, &record);

    assert!(result.diagnostics.is_empty());
    assert_eq!(result.updates.len(), 1);
    let u = &result.updates[0];
    assert_eq!((u.field_id.as_str(), u.field_key.as_str()), ("cf-rate", "Rate"));
    assert_eq!(u.value, Value::Number(45.0));
    let change = &result.changes["Rate"];
    assert_eq!((&change.before, &change.after), (&Value::Number(40.0), &Value::Number(45.0)));
}

#[test]
fn dependencies_run_before_dependents_regardless_of_priority() {
    let record = sample_record();
    let formulas = vec![
        FormulaDefinition::new("notes", "Notes", "CF('Shift') & ' @ ' & CF('cf-rate')")
            .with_priority(0),
        FormulaDefinition::new("shift", "cf-shift", "IF(hours > 6, 'long', 'short')")
            .with_priority(10),
        FormulaDefinition::new("rate", "Rate", "50").with_priority(5),
    ];
    let result = run(&formulas, &record);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    let notes = result.updates.iter().find(|u| u.field_key == "Notes").unwrap();
    assert_eq!(notes.value, Value::from("long @ 50"));
    // updates keep execution order
    let order: Vec<&str> = result.updates.iter().map(|u| u.field_key.as_str()).collect();
    assert_eq!(order, vec!["Rate", "Shift", "Notes"]);
}

#[test]
fn cycle_aborts_the_whole_batch() {
    let record = sample_record();
    let formulas = vec![
        FormulaDefinition::new("a", "Shift", "CF('Rate')"),
        FormulaDefinition::new("b", "Rate", "CF('Shift')"),
        FormulaDefinition::new("c", "Notes", "'independent'"),
    ];
    let result = run(&formulas, &record);
    assert!(result.updates.is_empty());
    assert_eq!(codes(&result), vec!["dependency.cycle"]);
    assert_eq!(result.diagnostics[0].severity, Severity::Error);
    assert!(result.diagnostics[0].message.contains("cf-shift"));
}

#[test]
fn self_reference_is_a_cycle() {
    let record = sample_record();
    let formulas = vec![FormulaDefinition::new("a", "Rate", "CF('Rate') + 1")];
    let result = run(&formulas, &record);
    assert!(result.updates.is_empty());
    assert_eq!(codes(&result), vec!["dependency.cycle"]);
}

#[test]
fn failures_are_isolated_per_formula() {
    let record = sample_record();
    let formulas = vec![
        FormulaDefinition::new("evil", "Notes", "PROCESS('rm')"),
        FormulaDefinition::new("syntax", "Notes", "1 +"),
        FormulaDefinition::new("div", "Rate", "1 / 0"),
        FormulaDefinition::new("coerce", "Rate", "'abc' * 2"),
        FormulaDefinition::new("ghost", "NoSuchField", "1"),
        FormulaDefinition::new("ok", "Shift", "'night'"),
    ];
    let result = run(&formulas, &record);
    assert_eq!(
        codes(&result),
        vec![
            "security.violation",
            "parse.error",
            "value.invalid",
            "value.coercion",
            "field.missing",
        ]
    );
    assert!(result.diagnostics.iter().all(|d| d.severity == Severity::Error));
    assert_eq!(result.diagnostics[0].formula_id.as_deref(), Some("evil"));
    assert_eq!(result.updates.len(), 1);
    assert_eq!(result.updates[0].value, Value::from("night"));
}

#[test]
fn every_disallowed_call_is_a_security_violation() {
    let record = sample_record();
    for name in ["EVAL", "PROCESS", "require", "Function", "SUM", "fetch"] {
        let formulas = vec![FormulaDefinition::new("f", "Notes", format!("{name}('x')"))];
        let result = run(&formulas, &record);
        assert_eq!(codes(&result), vec!["security.violation"], "{name}");
        assert!(result.updates.is_empty(), "{name}");
    }
}

#[test]
fn unchanged_values_are_not_updates() {
    let record = sample_record();
    let formulas = vec![
        FormulaDefinition::new("same", "Shift", "'day'"),
        FormulaDefinition::new("rate", "Rate", "20 * 2"),
    ];
    let result = run(&formulas, &record);
    assert!(!result.has_updates());
    assert!(result.diagnostics.is_empty());
}

#[test]
fn second_pass_over_applied_updates_is_a_no_op() {
    let mut record = sample_record();
    let formulas = vec![
        FormulaDefinition::new("rate", "Rate", "billRate * 2"),
        FormulaDefinition::new("notes", "Notes", "'rate=' & CF('Rate')"),
        FormulaDefinition::new("when", "Shift", "DATE(start)"),
    ];
    let first = run(&formulas, &record);
    assert_eq!(first.updates.len(), 3);
    apply(&mut record, &first);

    let second = run(&formulas, &record);
    assert!(second.updates.is_empty(), "{:?}", second.updates);
}

#[test]
fn a_field_written_twice_reports_its_final_value() {
    let record = sample_record();
    let formulas = vec![
        FormulaDefinition::new("one", "Rate", "1").with_priority(1),
        FormulaDefinition::new("two", "Rate", "2").with_priority(2),
    ];
    let result = run(&formulas, &record);
    assert_eq!(result.updates.len(), 1);
    assert_eq!(result.updates[0].value, Value::Number(2.0));
}

#[test]
fn formulas_are_filtered_by_event() {
    let record = sample_record();
    let formulas = vec![
        FormulaDefinition::new("created", "Shift", "'c'").with_events(["created"]),
        FormulaDefinition::new("any", "Notes", "'always'"),
    ];

    let on_update = run_with(&formulas, &record, &DictionaryMap::new(), Some("updated"));
    let keys: Vec<&str> = on_update.updates.iter().map(|u| u.field_key.as_str()).collect();
    assert_eq!(keys, vec!["Notes"]);

    let on_create = run_with(&formulas, &record, &DictionaryMap::new(), Some("created"));
    assert_eq!(on_create.updates.len(), 2);
}

#[test]
fn dictionary_rules_apply_to_outputs() {
    let record = sample_record();
    let mut dictionary = DictionaryMap::new();
    dictionary.insert(
        "Rate".into(),
        DictionaryRule::numeric("Rate", Some(0.0), Some(100.0), EnforcementMode::Autofix),
    );
    dictionary.insert(
        "cf-shift".into(),
        DictionaryRule::dropdown("Shift", ["day", "night"], EnforcementMode::Block),
    );

    let formulas = vec![
        FormulaDefinition::new("rate", "Rate", "billRate * 3"),
        FormulaDefinition::new("shift", "Shift", "'swing'"),
    ];
    let result = run_with(&formulas, &record, &dictionary, None);

    assert_eq!(codes(&result), vec!["dictionary.numeric", "dictionary.dropdown"]);
    assert!(result.diagnostics[0].attempted_auto_fix);
    assert_eq!(result.diagnostics[0].severity, Severity::Warn);
    assert_eq!(result.diagnostics[1].severity, Severity::Error);
    assert_eq!(result.warnings.len(), 1);

    assert_eq!(result.updates.len(), 1);
    assert_eq!(result.updates[0].value, Value::Number(100.0));
}

#[test]
fn warn_mode_writes_the_original_value() {
    let record = sample_record();
    let mut dictionary = DictionaryMap::new();
    dictionary.insert(
        "Rate".into(),
        DictionaryRule::numeric("Rate", None, Some(100.0), EnforcementMode::Warn),
    );
    let formulas = vec![FormulaDefinition::new("rate", "Rate", "150")];
    let result = run_with(&formulas, &record, &dictionary, None);
    assert_eq!(result.updates[0].value, Value::Number(150.0));
    assert_eq!(codes(&result), vec!["dictionary.numeric"]);
}

#[test]
fn supplied_summary_and_rates_are_visible() {
    let record = sample_record();
    let mut long = record.clone();
    long.time_interval.end = Some("2024-03-04T21:00:00-05:00".into());
    let summary = OvertimeCalculator::default().single(&long).unwrap();

    let formulas = vec![
        FormulaDefinition::new("label", "Shift", "OTLABEL('reg', 'ot', 'dt')"),
        FormulaDefinition::new("pay", "Rate", "costRate * OT()"),
    ];
    let input = EvaluationInput::new(&record)
        .with_overtime(&summary)
        .with_rates(None, Some(20.0));
    let result = FormulaEngine::new().evaluate(&formulas, input, &DictionaryMap::new(), None);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.updates[0].value, Value::from("ot"));
    assert_eq!(result.updates[1].value, Value::Number(30.0));
}

#[test]
fn summary_defaults_to_the_record_alone() {
    let record = sample_record();
    let formulas = vec![FormulaDefinition::new("flag", "Shift", "OT('flag') & '/' & OT('dayKey')")];
    let result = run(&formulas, &record);
    assert_eq!(result.updates[0].value, Value::from("REG/2024-03-04-05:00"));
}

#[test]
fn timestamps_are_written_as_text() {
    let record = sample_record();
    let formulas = vec![FormulaDefinition::new("end", "Notes", "end")];
    let result = run(&formulas, &record);
    assert_eq!(result.updates[0].value, Value::from("2024-03-04T17:00:00-05:00"));
}

/// `F0` holds a seed; formula `i` writes `F{i}` from `F{i-1}`.
fn chain_record(len: usize) -> RecordSnapshot {
    RecordSnapshot {
        id: "chain".into(),
        user_id: "u".into(),
        time_interval: TimeInterval {
            start: "2024-01-01T00:00:00Z".into(),
            ..Default::default()
        },
        custom_fields: (0..=len)
            .map(|i| CustomFieldValue {
                field_id: format!("id-{i}"),
                name: format!("F{i}"),
                value: Value::Number(0.0),
            })
            .collect(),
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn chains_evaluate_in_dependency_order(
        priorities in prop::collection::vec(-50i64..50, 1..12),
        reverse in any::<bool>(),
    ) {
        let len = priorities.len();
        let record = chain_record(len);
        let mut formulas: Vec<FormulaDefinition> = (1..=len)
            .map(|i| {
                FormulaDefinition::new(
                    format!("f{i}"),
                    format!("F{i}"),
                    format!("CF('F{}') + 1", i - 1),
                )
                .with_priority(priorities[i - 1])
            })
            .collect();
        if reverse {
            formulas.reverse();
        }

        let result = run(&formulas, &record);
        prop_assert!(result.diagnostics.is_empty());
        prop_assert_eq!(result.updates.len(), len);
        for u in &result.updates {
            let i: f64 = u.field_key[1..].parse().unwrap();
            prop_assert_eq!(&u.value, &Value::Number(i));
        }
    }

    #[test]
    fn closing_the_chain_is_always_a_cycle(len in 1usize..8) {
        let record = chain_record(len);
        let mut formulas: Vec<FormulaDefinition> = (1..=len)
            .map(|i| FormulaDefinition::new(format!("f{i}"), format!("F{i}"), format!("CF('F{}')", i - 1)))
            .collect();
        formulas.push(FormulaDefinition::new("f0", "F0", format!("CF('F{len}')")));

        let result = run(&formulas, &record);
        prop_assert!(result.updates.is_empty());
        prop_assert_eq!(codes(&result), vec!["dependency.cycle"]);
    }
}
