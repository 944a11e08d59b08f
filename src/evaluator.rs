use crate::models::{AlertRule, AlertSeverity, Observation, TriggeredAlert};

/// Evaluates one observation against the rule catalog. Pure function:
/// inactive rules are skipped, a rule fires only when all of its present
/// base bounds pass, and the result is ordered by rule priority ascending
/// (lower = more urgent) so dispatch order is deterministic.
pub fn evaluate(observation: &Observation, rules: &[AlertRule]) -> Vec<TriggeredAlert> {
    let mut triggered: Vec<TriggeredAlert> = rules
        .iter()
        .filter(|rule| rule.is_active)
        .filter(|rule| rule.conditions.0.matches(observation))
        .map(|rule| {
            let severity = determine_severity(observation, rule);
            TriggeredAlert::from_rule(rule, severity, observation)
        })
        .collect();

    triggered.sort_by_key(|alert| alert.priority);
    triggered
}

/// Walks the severity ladder in the fixed order moderate, high, severe,
/// extreme and keeps the last tier whose bounds pass. Ladders are seeded
/// in ascending strictness, so the last match is the highest satisfied
/// tier. No tier passing means `low`.
fn determine_severity(observation: &Observation, rule: &AlertRule) -> AlertSeverity {
    let ladder = &rule.severity_thresholds.0;
    let mut severity = AlertSeverity::Low;

    for tier in AlertSeverity::LADDER {
        let conditions = match tier {
            AlertSeverity::Moderate => &ladder.moderate,
            AlertSeverity::High => &ladder.high,
            AlertSeverity::Severe => &ladder.severe,
            AlertSeverity::Extreme => &ladder.extreme,
            _ => &None,
        };
        if let Some(conditions) = conditions {
            if conditions.matches(observation) {
                severity = tier;
            }
        }
    }

    severity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, ConditionSet, SeverityLadder};
    use sqlx::types::Json;
    use uuid::Uuid;

    fn temp_min(t: f64) -> ConditionSet {
        ConditionSet {
            temp_min: Some(t),
            ..Default::default()
        }
    }

    fn heat_wave_rule() -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            alert_type: AlertType::HeatWave,
            name: "Heat Wave Alert".to_string(),
            name_hi: Some("लू की चेतावनी".to_string()),
            description: "Extreme heat conditions".to_string(),
            description_hi: None,
            conditions: Json(temp_min(40.0)),
            severity_thresholds: Json(SeverityLadder {
                moderate: Some(temp_min(40.0)),
                high: Some(temp_min(42.0)),
                severe: Some(temp_min(45.0)),
                extreme: Some(temp_min(47.0)),
            }),
            recommendations: Json(vec!["Irrigate early morning".to_string()]),
            recommendations_hi: Json(vec![]),
            is_active: true,
            priority: 1,
            sms_enabled: true,
        }
    }

    fn storm_rule() -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            alert_type: AlertType::Storm,
            name: "Storm Warning".to_string(),
            name_hi: None,
            description: "High wind speeds".to_string(),
            description_hi: None,
            conditions: Json(ConditionSet {
                wind_speed_min: Some(50.0),
                ..Default::default()
            }),
            severity_thresholds: Json(SeverityLadder {
                moderate: Some(ConditionSet {
                    wind_speed_min: Some(50.0),
                    ..Default::default()
                }),
                high: Some(ConditionSet {
                    wind_speed_min: Some(65.0),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            recommendations: Json(vec![]),
            recommendations_hi: Json(vec![]),
            is_active: true,
            priority: 4,
            sms_enabled: true,
        }
    }

    fn obs(temp: f64, wind: f64) -> Observation {
        Observation {
            temp,
            wind_speed: wind,
            ..Observation::fallback()
        }
    }

    #[test]
    fn rule_below_base_condition_does_not_fire() {
        let alerts = evaluate(&obs(38.0, 10.0), &[heat_wave_rule()]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn highest_satisfied_tier_wins_exactly() {
        // 43 °C satisfies moderate and high but not severe: must be high.
        let alerts = evaluate(&obs(43.0, 10.0), &[heat_wave_rule()]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
    }

    #[test]
    fn severity_defaults_to_low_when_no_tier_passes() {
        let mut rule = heat_wave_rule();
        rule.conditions = Json(temp_min(35.0));
        rule.severity_thresholds = Json(SeverityLadder {
            moderate: Some(temp_min(40.0)),
            ..Default::default()
        });
        let alerts = evaluate(&obs(36.0, 10.0), &[rule]);
        assert_eq!(alerts[0].severity, AlertSeverity::Low);
    }

    #[test]
    fn extreme_tier_reachable() {
        let alerts = evaluate(&obs(48.0, 10.0), &[heat_wave_rule()]);
        assert_eq!(alerts[0].severity, AlertSeverity::Extreme);
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let mut rule = heat_wave_rule();
        rule.is_active = false;
        assert!(evaluate(&obs(46.0, 10.0), &[rule]).is_empty());
    }

    #[test]
    fn results_sorted_by_priority_ascending() {
        // Present the rules out of order; the evaluator must sort.
        let rules = vec![storm_rule(), heat_wave_rule()];
        let alerts = evaluate(&obs(43.0, 70.0), &rules);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, AlertType::HeatWave);
        assert_eq!(alerts[0].priority, 1);
        assert_eq!(alerts[1].alert_type, AlertType::Storm);
        assert_eq!(alerts[1].severity, AlertSeverity::High);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let rules = vec![heat_wave_rule(), storm_rule()];
        let observation = obs(45.5, 52.0);
        let first = evaluate(&observation, &rules);
        let second = evaluate(&observation, &rules);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.alert_type, b.alert_type);
            assert_eq!(a.severity, b.severity);
            assert_eq!(a.observation, b.observation);
        }
    }

    #[test]
    fn output_carries_rule_content_and_snapshot() {
        let observation = obs(43.0, 10.0);
        let alerts = evaluate(&observation, &[heat_wave_rule()]);
        let alert = &alerts[0];
        assert_eq!(alert.title, "Heat Wave Alert");
        assert!(alert.sms_enabled);
        assert_eq!(alert.observation, observation);
        assert_eq!(alert.recommendations.len(), 1);
    }
}
