//! Subjective score reports: the fixed JSON shape, validation of backend
//! output against it, and the derived fields computed in code.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::bands::{normalize_band, round_to_half};
use crate::error::ScoringError;
use crate::model::{Criterion, Module};
use crate::traits::TokenUsage;

pub type Criteria = BTreeMap<Criterion, f64>;

/// Number of weaknesses every report carries.
pub const WEAKNESS_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weakness {
    pub area: String,
    pub pattern: String,
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub focus: String,
    pub exercise: String,
    pub success_metric: String,
}

/// Signed change against the previous report for the same user and module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub overall: f64,
    pub criteria: Criteria,
}

impl Delta {
    /// Difference between two reports. With no previous report every entry
    /// is zero.
    pub fn between(
        overall: f64,
        criteria: &Criteria,
        previous: Option<&ScoreReport>,
    ) -> Self {
        match previous {
            Some(prev) => Delta {
                overall: overall - prev.overall_band,
                criteria: criteria
                    .iter()
                    .map(|(c, v)| (*c, v - prev.criteria.get(c).copied().unwrap_or(*v)))
                    .collect(),
            },
            None => Delta {
                overall: 0.0,
                criteria: criteria.keys().map(|c| (*c, 0.0)).collect(),
            },
        }
    }
}

/// A validated, normalized score report. Field names are the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub overall_band: f64,
    pub criteria: Criteria,
    pub confidence: f64,
    pub band_rationale: BTreeMap<Criterion, Vec<String>>,
    pub top_3_weaknesses: Vec<Weakness>,
    pub next_steps_7_days: Vec<NextStep>,
    pub delta_vs_last_attempt: Delta,
}

/// A report as persisted, keyed by `(module, input_hash)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: Uuid,
    pub user_id: String,
    pub module: Module,
    /// Writing task or speaking part the response belongs to.
    #[serde(default)]
    pub task: Option<u8>,
    pub input_hash: String,
    pub pipeline_version: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    pub report: ScoreReport,
}

/// Mean of the criteria, rounded to the nearest half band.
pub fn derive_overall(criteria: &Criteria) -> f64 {
    if criteria.is_empty() {
        return 0.0;
    }
    let mean = criteria.values().sum::<f64>() / criteria.len() as f64;
    round_to_half(mean)
}

/// `1 − min(1, σ/2)` over the criteria, σ the population standard
/// deviation. Even criteria read as a confident grade.
pub fn confidence(criteria: &Criteria) -> f64 {
    if criteria.is_empty() {
        return 0.0;
    }
    let n = criteria.len() as f64;
    let mean = criteria.values().sum::<f64>() / n;
    let variance = criteria.values().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    1.0 - (variance.sqrt() / 2.0).min(1.0)
}

impl ScoreReport {
    /// Validate raw backend JSON for `module` and build the report.
    ///
    /// Bands are clamped and rounded here, `overall_band` and `confidence`
    /// are derived from the criteria, and any model-supplied overall,
    /// confidence or delta is ignored.
    pub fn from_model_output(
        module: Module,
        value: &Value,
        previous: Option<&ScoreReport>,
    ) -> Result<Self, ScoringError> {
        let obj = value
            .as_object()
            .ok_or_else(|| violation("top level is not an object"))?;
        let expected = module.criteria();
        if expected.is_empty() {
            return Err(ScoringError::NotSubjective(module));
        }

        let raw_criteria = object_field(obj, "criteria")?;
        check_keys(raw_criteria, expected, "criteria")?;
        let mut criteria = Criteria::new();
        for c in expected {
            let band = band_value(&raw_criteria[c.as_str()])
                .ok_or_else(|| violation(format!("criteria.{c} is not a number")))?;
            criteria.insert(*c, normalize_band(band));
        }

        let raw_rationale = object_field(obj, "band_rationale")?;
        check_keys(raw_rationale, expected, "band_rationale")?;
        let mut band_rationale = BTreeMap::new();
        for c in expected {
            let lines = string_list(&raw_rationale[c.as_str()])
                .ok_or_else(|| violation(format!("band_rationale.{c} is not a list of strings")))?;
            band_rationale.insert(*c, lines);
        }

        let top_3_weaknesses: Vec<Weakness> = typed_list(obj, "top_3_weaknesses")?;
        if top_3_weaknesses.len() != WEAKNESS_COUNT {
            return Err(violation(format!(
                "top_3_weaknesses has {} entries, expected {WEAKNESS_COUNT}",
                top_3_weaknesses.len()
            )));
        }
        if top_3_weaknesses
            .iter()
            .any(|w| w.area.trim().is_empty() || w.pattern.trim().is_empty())
        {
            return Err(violation("weakness with empty area or pattern"));
        }

        let next_steps_7_days: Vec<NextStep> = typed_list(obj, "next_steps_7_days")?;
        if next_steps_7_days.is_empty() {
            return Err(violation("next_steps_7_days is empty"));
        }

        let overall_band = derive_overall(&criteria);
        if let Some(stated) = obj.get("overall_band").and_then(band_value) {
            if (stated - overall_band).abs() >= 0.5 {
                tracing::debug!(stated, derived = overall_band, "model overall band discarded");
            }
        }
        let confidence = confidence(&criteria);
        let delta_vs_last_attempt = Delta::between(overall_band, &criteria, previous);

        Ok(ScoreReport {
            overall_band,
            criteria,
            confidence,
            band_rationale,
            top_3_weaknesses,
            next_steps_7_days,
            delta_vs_last_attempt,
        })
    }

    /// Short human-readable summary.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!(
            "**Overall band:** {:.1} ({:+.1}) | confidence {:.0}%\n\n",
            self.overall_band,
            self.delta_vs_last_attempt.overall,
            self.confidence * 100.0
        ));

        md.push_str("| Criterion | Band | Change | Rationale |\n");
        md.push_str("|-----------|------|--------|-----------|\n");
        for (c, band) in &self.criteria {
            let delta = self
                .delta_vs_last_attempt
                .criteria
                .get(c)
                .copied()
                .unwrap_or(0.0);
            let rationale = self
                .band_rationale
                .get(c)
                .map(|r| r.join("; "))
                .unwrap_or_default();
            md.push_str(&format!("| {c} | {band:.1} | {delta:+.1} | {rationale} |\n"));
        }

        md.push_str("\n### Weaknesses\n\n");
        for w in &self.top_3_weaknesses {
            md.push_str(&format!("- **{}**: {} ({})\n", w.area, w.pattern, w.impact));
        }

        md.push_str("\n### Next 7 days\n\n");
        for (i, s) in self.next_steps_7_days.iter().enumerate() {
            md.push_str(&format!(
                "{}. {}: {} (done when: {})\n",
                i + 1,
                s.focus,
                s.exercise,
                s.success_metric
            ));
        }
        md
    }
}

/// JSON schema for structured-output backends.
pub fn response_schema(module: Module) -> Value {
    let keys: Vec<&str> = module.criteria().iter().map(|c| c.as_str()).collect();
    let band_props: Map<String, Value> = keys
        .iter()
        .map(|k| (k.to_string(), json!({"type": "number", "minimum": 0, "maximum": 9})))
        .collect();
    let rationale_props: Map<String, Value> = keys
        .iter()
        .map(|k| {
            (
                k.to_string(),
                json!({"type": "array", "items": {"type": "string"}}),
            )
        })
        .collect();
    let delta_props: Map<String, Value> = keys
        .iter()
        .map(|k| (k.to_string(), json!({"type": "number"})))
        .collect();

    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "overall_band", "criteria", "band_rationale",
            "top_3_weaknesses", "next_steps_7_days", "delta_vs_last_attempt"
        ],
        "properties": {
            "overall_band": {"type": "number"},
            "criteria": {
                "type": "object",
                "additionalProperties": false,
                "required": keys,
                "properties": band_props
            },
            "band_rationale": {
                "type": "object",
                "additionalProperties": false,
                "required": keys,
                "properties": rationale_props
            },
            "top_3_weaknesses": {
                "type": "array",
                "minItems": WEAKNESS_COUNT,
                "maxItems": WEAKNESS_COUNT,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["area", "pattern", "impact"],
                    "properties": {
                        "area": {"type": "string"},
                        "pattern": {"type": "string"},
                        "impact": {"type": "string"}
                    }
                }
            },
            "next_steps_7_days": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["focus", "exercise", "success_metric"],
                    "properties": {
                        "focus": {"type": "string"},
                        "exercise": {"type": "string"},
                        "success_metric": {"type": "string"}
                    }
                }
            },
            "delta_vs_last_attempt": {
                "type": "object",
                "additionalProperties": false,
                "required": ["overall", "criteria"],
                "properties": {
                    "overall": {"type": "number"},
                    "criteria": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": keys,
                        "properties": delta_props
                    }
                }
            }
        }
    })
}

fn violation(msg: impl Into<String>) -> ScoringError {
    ScoringError::SchemaViolation(msg.into())
}

fn object_field<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a Map<String, Value>, ScoringError> {
    obj.get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| violation(format!("{key} is missing or not an object")))
}

/// The object must hold exactly the expected criterion keys.
fn check_keys(
    obj: &Map<String, Value>,
    expected: &[Criterion],
    field: &str,
) -> Result<(), ScoringError> {
    for c in expected {
        if !obj.contains_key(c.as_str()) {
            return Err(violation(format!("{field} is missing '{c}'")));
        }
    }
    if let Some(extra) = obj
        .keys()
        .find(|k| !expected.iter().any(|c| c.as_str() == k.as_str()))
    {
        return Err(violation(format!("{field} has unexpected key '{extra}'")));
    }
    Ok(())
}

/// A band as a number, tolerating numeric strings like `"6.5"`.
fn band_value(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(|s| s.trim().to_string()))
        .collect()
}

fn typed_list<T: serde::de::DeserializeOwned>(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Vec<T>, ScoringError> {
    let value = obj
        .get(key)
        .ok_or_else(|| violation(format!("{key} is missing")))?;
    serde_json::from_value(value.clone()).map_err(|e| violation(format!("{key}: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn writing_output(bands: [f64; 4], overall: f64) -> Value {
        json!({
            "overall_band": overall,
            "criteria": {
                "task": bands[0], "coherence": bands[1],
                "lexical": bands[2], "grammar": bands[3]
            },
            "band_rationale": {
                "task": ["addresses both views"],
                "coherence": ["clear paragraphing"],
                "lexical": ["some repetition"],
                "grammar": ["frequent article errors"]
            },
            "top_3_weaknesses": [
                {"area": "grammar", "pattern": "missing articles", "impact": "distracts reader"},
                {"area": "lexical", "pattern": "repetition of 'important'", "impact": "limits range"},
                {"area": "task", "pattern": "underdeveloped conclusion", "impact": "weak position"}
            ],
            "next_steps_7_days": [
                {"focus": "articles", "exercise": "rewrite 3 paragraphs", "success_metric": "< 2 errors per paragraph"}
            ],
            "delta_vs_last_attempt": {"overall": 0, "criteria": {"task": 0, "coherence": 0, "lexical": 0, "grammar": 0}}
        })
    }

    #[test]
    fn overall_is_derived_not_trusted() {
        let out = writing_output([6.0, 6.5, 6.0, 5.5], 8.0);
        let report = ScoreReport::from_model_output(Module::Writing, &out, None).unwrap();
        assert_eq!(report.overall_band, 6.0);
        assert_eq!(report.overall_band, derive_overall(&report.criteria));
    }

    #[test]
    fn bands_are_clamped_and_rounded() {
        let out = writing_output([9.7, 6.3, -1.0, 6.76], 5.0);
        let report = ScoreReport::from_model_output(Module::Writing, &out, None).unwrap();
        assert_eq!(report.criteria[&Criterion::Task], 9.0);
        assert_eq!(report.criteria[&Criterion::Coherence], 6.5);
        assert_eq!(report.criteria[&Criterion::Lexical], 0.0);
        assert_eq!(report.criteria[&Criterion::Grammar], 7.0);
        // mean 5.625 rounds to 5.5
        assert_eq!(report.overall_band, 5.5);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let mut out = writing_output([6.0, 6.0, 6.0, 6.0], 6.0);
        out["criteria"]["task"] = json!("7.0");
        let report = ScoreReport::from_model_output(Module::Writing, &out, None).unwrap();
        assert_eq!(report.criteria[&Criterion::Task], 7.0);
    }

    #[test]
    fn schema_violations() {
        let mut missing = writing_output([6.0; 4], 6.0);
        missing["criteria"].as_object_mut().unwrap().remove("grammar");
        assert!(matches!(
            ScoreReport::from_model_output(Module::Writing, &missing, None),
            Err(ScoringError::SchemaViolation(m)) if m.contains("grammar")
        ));

        let mut two = writing_output([6.0; 4], 6.0);
        two["top_3_weaknesses"].as_array_mut().unwrap().pop();
        assert!(ScoreReport::from_model_output(Module::Writing, &two, None).is_err());

        let mut no_steps = writing_output([6.0; 4], 6.0);
        no_steps["next_steps_7_days"] = json!([]);
        assert!(ScoreReport::from_model_output(Module::Writing, &no_steps, None).is_err());

        // writing keys are not speaking keys
        let out = writing_output([6.0; 4], 6.0);
        assert!(matches!(
            ScoreReport::from_model_output(Module::Speaking, &out, None),
            Err(ScoringError::SchemaViolation(_))
        ));

        let mut nan = writing_output([6.0; 4], 6.0);
        nan["criteria"]["task"] = json!("high");
        assert!(ScoreReport::from_model_output(Module::Writing, &nan, None).is_err());

        assert!(matches!(
            ScoreReport::from_model_output(Module::Reading, &json!({}), None),
            Err(ScoringError::SchemaViolation(_)) | Err(ScoringError::NotSubjective(_))
        ));
    }

    #[test]
    fn confidence_falls_as_spread_grows() {
        let even: Criteria = [(Criterion::Task, 6.0), (Criterion::Grammar, 6.0)].into();
        let mild: Criteria = [(Criterion::Task, 5.5), (Criterion::Grammar, 6.5)].into();
        let wide: Criteria = [(Criterion::Task, 3.0), (Criterion::Grammar, 9.0)].into();
        assert_eq!(confidence(&even), 1.0);
        assert!(confidence(&even) > confidence(&mild));
        assert!(confidence(&mild) > confidence(&wide));
        assert_eq!(confidence(&wide), 0.0);
        assert!((0.0..=1.0).contains(&confidence(&mild)));
    }

    #[test]
    fn first_report_has_zero_delta() {
        let out = writing_output([6.0, 6.5, 6.0, 5.5], 6.0);
        let report = ScoreReport::from_model_output(Module::Writing, &out, None).unwrap();
        assert_eq!(report.delta_vs_last_attempt.overall, 0.0);
        assert_eq!(report.delta_vs_last_attempt.criteria.len(), 4);
        assert!(report
            .delta_vs_last_attempt
            .criteria
            .values()
            .all(|d| *d == 0.0));
    }

    #[test]
    fn delta_against_previous_report() {
        let first = ScoreReport::from_model_output(
            Module::Writing,
            &writing_output([5.0, 5.0, 5.0, 5.0], 5.0),
            None,
        )
        .unwrap();
        let second = ScoreReport::from_model_output(
            Module::Writing,
            &writing_output([6.0, 5.5, 5.0, 4.5], 5.0),
            Some(&first),
        )
        .unwrap();
        assert_eq!(second.delta_vs_last_attempt.overall, 0.5);
        assert_eq!(second.delta_vs_last_attempt.criteria[&Criterion::Task], 1.0);
        assert_eq!(second.delta_vs_last_attempt.criteria[&Criterion::Grammar], -0.5);
    }

    #[test]
    fn wire_shape_uses_fixed_keys() {
        let report = ScoreReport::from_model_output(
            Module::Writing,
            &writing_output([6.0; 4], 6.0),
            None,
        )
        .unwrap();
        let value = serde_json::to_value(&report).unwrap();
        for key in [
            "overall_band",
            "criteria",
            "confidence",
            "band_rationale",
            "top_3_weaknesses",
            "next_steps_7_days",
            "delta_vs_last_attempt",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["criteria"].get("coherence").is_some());
        assert!(value["delta_vs_last_attempt"]["criteria"].get("task").is_some());
    }

    #[test]
    fn schema_lists_module_keys() {
        let schema = response_schema(Module::Speaking);
        let required = &schema["properties"]["criteria"]["required"];
        assert_eq!(
            required,
            &json!(["fluency", "lexical", "grammar", "pronunciation"])
        );
    }

    #[test]
    fn markdown_summary() {
        let report = ScoreReport::from_model_output(
            Module::Writing,
            &writing_output([6.0, 6.5, 6.0, 5.5], 6.0),
            None,
        )
        .unwrap();
        let md = report.to_markdown();
        assert!(md.contains("**Overall band:** 6.0"));
        assert!(md.contains("missing articles"));
        assert!(md.contains("| coherence | 6.5 |"));
    }
}
