//! Long-lived learner profiles, folded from each new score report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Module;
use crate::report::{Criteria, NextStep, ScoreReport, StoredReport, Weakness};

/// Default number of recurring weaknesses a profile keeps.
pub const DEFAULT_WEAKNESS_CAP: usize = 10;

/// A weakness seen in one or more reports, deduplicated by area and pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringWeakness {
    pub area: String,
    pub pattern: String,
    /// Impact text from the most recent sighting.
    pub impact: String,
    pub count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl RecurringWeakness {
    fn matches(&self, w: &Weakness) -> bool {
        same_key(&self.area, &w.area) && same_key(&self.pattern, &w.pattern)
    }
}

fn same_key(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// One entry of the ability history. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityPoint {
    pub at: DateTime<Utc>,
    pub module: Module,
    pub overall_band: f64,
    pub criteria: Criteria,
    /// The stored report this point came from, when folded from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub user_id: String,
    #[serde(default)]
    pub recurring_weaknesses: Vec<RecurringWeakness>,
    #[serde(default)]
    pub ability_history: Vec<AbilityPoint>,
    /// Next steps from the most recent report.
    #[serde(default)]
    pub plan: Vec<NextStep>,
    pub updated_at: DateTime<Utc>,
}

impl LearnerProfile {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            recurring_weaknesses: Vec::new(),
            ability_history: Vec::new(),
            plan: Vec::new(),
            updated_at: now,
        }
    }

    /// Latest overall band recorded for a module.
    pub fn latest_band(&self, module: Module) -> Option<f64> {
        self.ability_history
            .iter()
            .rev()
            .find(|p| p.module == module)
            .map(|p| p.overall_band)
    }

    pub fn has_report(&self, id: Uuid) -> bool {
        self.ability_history.iter().any(|p| p.report_id == Some(id))
    }
}

/// Folds reports into profiles.
#[derive(Debug, Clone)]
pub struct ProfileAggregator {
    weakness_cap: usize,
}

impl Default for ProfileAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WEAKNESS_CAP)
    }
}

impl ProfileAggregator {
    pub fn new(weakness_cap: usize) -> Self {
        Self {
            weakness_cap: weakness_cap.max(1),
        }
    }

    /// Merge one report into `profile`.
    ///
    /// Weaknesses are merged by case-insensitive (area, pattern) and the list
    /// is trimmed to the cap by count, then recency. The plan is replaced
    /// and one history point is appended.
    pub fn fold(
        &self,
        profile: &mut LearnerProfile,
        module: Module,
        report: &ScoreReport,
        at: DateTime<Utc>,
    ) {
        self.merge(profile, module, report, at, None);
    }

    /// Fold a stored report unless `profile` already holds it.
    /// Returns whether the profile changed.
    pub fn fold_report(
        &self,
        profile: &mut LearnerProfile,
        stored: &StoredReport,
        at: DateTime<Utc>,
    ) -> bool {
        if profile.has_report(stored.id) {
            return false;
        }
        self.merge(profile, stored.module, &stored.report, at, Some(stored.id));
        true
    }

    fn merge(
        &self,
        profile: &mut LearnerProfile,
        module: Module,
        report: &ScoreReport,
        at: DateTime<Utc>,
        report_id: Option<Uuid>,
    ) {
        for w in &report.top_3_weaknesses {
            match profile
                .recurring_weaknesses
                .iter_mut()
                .find(|r| r.matches(w))
            {
                Some(existing) => {
                    existing.count += 1;
                    existing.impact = w.impact.clone();
                    existing.last_seen = existing.last_seen.max(at);
                }
                None => profile.recurring_weaknesses.push(RecurringWeakness {
                    area: w.area.trim().to_string(),
                    pattern: w.pattern.trim().to_string(),
                    impact: w.impact.clone(),
                    count: 1,
                    first_seen: at,
                    last_seen: at,
                }),
            }
        }

        profile
            .recurring_weaknesses
            .sort_by(|a, b| b.count.cmp(&a.count).then(b.last_seen.cmp(&a.last_seen)));
        profile.recurring_weaknesses.truncate(self.weakness_cap);

        profile.plan = report.next_steps_7_days.clone();
        profile.ability_history.push(AbilityPoint {
            at,
            module,
            overall_band: report.overall_band,
            criteria: report.criteria.clone(),
            report_id,
        });
        profile.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::writing_output;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 18, 0, 0).unwrap()
    }

    fn report(bands: [f64; 4]) -> ScoreReport {
        ScoreReport::from_model_output(Module::Writing, &writing_output(bands, 0.0), None).unwrap()
    }

    #[test]
    fn repeated_weaknesses_are_counted_not_duplicated() {
        let agg = ProfileAggregator::default();
        let mut profile = LearnerProfile::new("u1", t0());
        let mut second = report([6.0; 4]);
        second.top_3_weaknesses[0].pattern = "Missing Articles ".into();

        agg.fold(&mut profile, Module::Writing, &report([5.5; 4]), t0());
        agg.fold(
            &mut profile,
            Module::Writing,
            &second,
            t0() + Duration::days(3),
        );

        assert_eq!(profile.recurring_weaknesses.len(), 3);
        let top = &profile.recurring_weaknesses[0];
        assert_eq!(top.pattern, "missing articles");
        assert_eq!(top.count, 2);
        assert_eq!(top.first_seen, t0());
        assert_eq!(top.last_seen, t0() + Duration::days(3));
    }

    #[test]
    fn history_appends_and_plan_is_replaced() {
        let agg = ProfileAggregator::default();
        let mut profile = LearnerProfile::new("u1", t0());
        agg.fold(&mut profile, Module::Writing, &report([5.0; 4]), t0());

        let mut next = report([6.0; 4]);
        next.next_steps_7_days[0].focus = "cohesion".into();
        agg.fold(&mut profile, Module::Writing, &next, t0() + Duration::days(1));

        assert_eq!(profile.ability_history.len(), 2);
        assert_eq!(profile.ability_history[0].overall_band, 5.0);
        assert_eq!(profile.latest_band(Module::Writing), Some(6.0));
        assert_eq!(profile.latest_band(Module::Speaking), None);
        assert_eq!(profile.plan.len(), 1);
        assert_eq!(profile.plan[0].focus, "cohesion");
    }

    #[test]
    fn cap_keeps_most_frequent() {
        let agg = ProfileAggregator::new(2);
        let mut profile = LearnerProfile::new("u1", t0());
        agg.fold(&mut profile, Module::Writing, &report([6.0; 4]), t0());

        let mut other = report([6.0; 4]);
        other.top_3_weaknesses[1].pattern = "spelling".into();
        other.top_3_weaknesses[2].pattern = "short paragraphs".into();
        agg.fold(&mut profile, Module::Writing, &other, t0() + Duration::hours(1));

        assert_eq!(profile.recurring_weaknesses.len(), 2);
        assert_eq!(profile.recurring_weaknesses[0].count, 2);
        assert_eq!(profile.recurring_weaknesses[0].pattern, "missing articles");
        assert_eq!(profile.recurring_weaknesses[1].count, 1);
        assert_eq!(profile.recurring_weaknesses[1].last_seen, t0() + Duration::hours(1));
    }

    #[test]
    fn stored_report_folds_once() {
        let agg = ProfileAggregator::default();
        let mut profile = LearnerProfile::new("u2", t0());
        let stored = StoredReport {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            module: Module::Writing,
            task: Some(1),
            input_hash: "abc".into(),
            pipeline_version: "v1".into(),
            model: "m".into(),
            created_at: t0(),
            token_usage: Default::default(),
            report: report([6.0; 4]),
        };

        assert!(agg.fold_report(&mut profile, &stored, t0() + Duration::days(1)));
        assert!(!agg.fold_report(&mut profile, &stored, t0() + Duration::days(2)));

        assert_eq!(profile.ability_history.len(), 1);
        assert_eq!(profile.ability_history[0].report_id, Some(stored.id));
        assert_eq!(profile.ability_history[0].at, t0() + Duration::days(1));
        assert!(profile.has_report(stored.id));
        assert_eq!(profile.recurring_weaknesses[0].count, 1);
    }
}
