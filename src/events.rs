// src/events.rs
//! Declarative event DSL: a recursive tagged tree evaluated against each
//! scenario's trajectories. Encoded with serde's internal tagging
//! (`#[serde(tag = "type")]`) so it round-trips as plain JSON for an
//! external NL-parsing collaborator or a JSON store — this crate only
//! consumes the tree, it never parses natural language.

use crate::error::{SdeError, SdeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl ComparisonOp {
    fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOp::Lt => value < threshold,
            ComparisonOp::Le => value <= threshold,
            ComparisonOp::Gt => value > threshold,
            ComparisonOp::Ge => value >= threshold,
            ComparisonOp::Eq => value == threshold,
            ComparisonOp::Ne => value != threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundOp {
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ThresholdBreach {
        variable: String,
        op: ComparisonOp,
        threshold: f64,
        horizon_months: f64,
    },
    Compound {
        op: CompoundOp,
        conditions: Vec<Event>,
    },
    Conditional {
        event: Box<Event>,
        given: Box<Event>,
    },
    Sequence {
        first: Box<Event>,
        then: Box<Event>,
        max_gap_months: f64,
    },
    AtLeastK {
        k: usize,
        events: Vec<Event>,
    },
}

impl Event {
    /// Every leaf variable referenced, for validating against the variable list.
    pub fn referenced_variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Event::ThresholdBreach { variable, .. } => out.push(variable),
            Event::Compound { conditions, .. } => {
                for c in conditions {
                    c.collect_variables(out);
                }
            }
            Event::Conditional { event, given } => {
                event.collect_variables(out);
                given.collect_variables(out);
            }
            Event::Sequence { first, then, .. } => {
                first.collect_variables(out);
                then.collect_variables(out);
            }
            Event::AtLeastK { events, .. } => {
                for e in events {
                    e.collect_variables(out);
                }
            }
        }
    }

    pub fn validate(&self, known_variables: &[String]) -> SdeResult<()> {
        for v in self.referenced_variables() {
            if !known_variables.iter().any(|k| k == v) {
                return Err(SdeError::UnknownVariable { name: v.to_string() });
            }
        }
        Ok(())
    }
}

/// One variable's trajectory: `v[0..=T]` at the scenario's time grid, plus
/// the `dt_months` used to build it (needed to convert `horizon_months` /
/// `max_gap_months` to step indices).
pub struct Trajectory<'a> {
    pub values: &'a [f64],
    pub dt_months: f64,
}

fn horizon_index(horizon_months: f64, dt_months: f64, len: usize) -> usize {
    let idx = (horizon_months / dt_months).ceil() as usize;
    idx.min(len.saturating_sub(1))
}

/// Returns, for a `threshold_breach`, the smallest index where the
/// comparison holds, searching only the window up to `horizon_months`
/// (first-passage within that window, not the full trajectory — a
/// `threshold_breach` asking about the first 6 months of a 24-month
/// scenario shouldn't fire on a breach that only occurs in month 20).
fn first_breach_index(
    variable: &str,
    op: ComparisonOp,
    threshold: f64,
    horizon_months: f64,
    trajectories: &HashMap<String, Trajectory>,
) -> SdeResult<Option<usize>> {
    let traj = trajectories
        .get(variable)
        .ok_or_else(|| SdeError::UnknownVariable { name: variable.to_string() })?;
    let window_end = horizon_index(horizon_months, traj.dt_months, traj.values.len());
    Ok(traj.values[..=window_end].iter().position(|&v| op.apply(v, threshold)))
}

/// Evaluates the event tree against one scenario's trajectories, returning
/// whether the event fired.
pub fn evaluate(event: &Event, trajectories: &HashMap<String, Trajectory>) -> SdeResult<bool> {
    match event {
        Event::ThresholdBreach {
            variable,
            op,
            threshold,
            horizon_months,
        } => Ok(first_breach_index(variable, *op, *threshold, *horizon_months, trajectories)?.is_some()),
        Event::Compound { op, conditions } => {
            let mut results = Vec::with_capacity(conditions.len());
            for c in conditions {
                results.push(evaluate(c, trajectories)?);
            }
            Ok(match op {
                CompoundOp::And => results.iter().all(|&r| r),
                CompoundOp::Or => results.iter().any(|&r| r),
            })
        }
        Event::Conditional { event, .. } => {
            // The `given` leg is handled at the result level by the
            // aggregator (§4.6); per-scenario, only `event`'s truth matters.
            evaluate(event, trajectories)
        }
        Event::Sequence {
            first,
            then,
            max_gap_months,
        } => {
            let (variable, op, threshold) = match first.as_ref() {
                Event::ThresholdBreach { variable, op, threshold, .. } => (variable, *op, *threshold),
                _ => {
                    return Err(SdeError::InvalidParameter {
                        parameter: "sequence.first".to_string(),
                        value: 0.0,
                        constraint: "must be a threshold_breach leaf".to_string(),
                    })
                }
            };
            let Some(traj) = trajectories.get(variable) else {
                return Err(SdeError::UnknownVariable { name: variable.clone() });
            };
            let t1 = match traj.values.iter().position(|&v| op.apply(v, threshold)) {
                Some(idx) => idx,
                None => return Ok(false),
            };
            let gap_steps = (max_gap_months / traj.dt_months).ceil() as usize;
            let window_end = (t1 + gap_steps).min(traj.values.len() - 1);
            for t in t1..=window_end {
                if window_holds(then, trajectories, t)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Event::AtLeastK { k, events } => {
            let mut count = 0usize;
            for e in events {
                if evaluate(e, trajectories)? {
                    count += 1;
                }
            }
            Ok(count >= *k)
        }
    }
}

/// For `sequence`'s `then` leg, checks whether the leaf condition holds at
/// step `t` specifically (rather than "at any step"), since `then` is
/// scoped to the gap window.
fn window_holds(event: &Event, trajectories: &HashMap<String, Trajectory>, t: usize) -> SdeResult<bool> {
    match event {
        Event::ThresholdBreach { variable, op, threshold, .. } => {
            let traj = trajectories
                .get(variable)
                .ok_or_else(|| SdeError::UnknownVariable { name: variable.clone() })?;
            Ok(traj.values.get(t).is_some_and(|&v| op.apply(v, *threshold)))
        }
        _ => evaluate(event, trajectories),
    }
}

/// Leaf `threshold_breach` parameters for a given variable, used to compute
/// the per-variable marginal decomposition (§4.6: "for compound/at-least-k
/// events, 'per-variable threshold' is the leaf threshold for that
/// variable").
pub fn leaf_thresholds(event: &Event) -> Vec<(String, ComparisonOp, f64, f64)> {
    let mut out = Vec::new();
    collect_leaves(event, &mut out);
    out
}

fn collect_leaves(event: &Event, out: &mut Vec<(String, ComparisonOp, f64, f64)>) {
    match event {
        Event::ThresholdBreach { variable, op, threshold, horizon_months } => {
            out.push((variable.clone(), *op, *threshold, *horizon_months));
        }
        Event::Compound { conditions, .. } => {
            for c in conditions {
                collect_leaves(c, out);
            }
        }
        Event::Conditional { event, given } => {
            collect_leaves(event, out);
            collect_leaves(given, out);
        }
        Event::Sequence { first, then, .. } => {
            collect_leaves(first, out);
            collect_leaves(then, out);
        }
        Event::AtLeastK { events, .. } => {
            for e in events {
                collect_leaves(e, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(values: Vec<f64>) -> Trajectory<'static> {
        Trajectory {
            values: Box::leak(values.into_boxed_slice()),
            dt_months: 1.0,
        }
    }

    #[test]
    fn threshold_breach_fires_on_any_step() {
        let event = Event::ThresholdBreach {
            variable: "x".to_string(),
            op: ComparisonOp::Gt,
            threshold: 10.0,
            horizon_months: 12.0,
        };
        let mut trajectories = HashMap::new();
        trajectories.insert("x".to_string(), traj(vec![1.0, 2.0, 11.0, 3.0]));
        assert!(evaluate(&event, &trajectories).unwrap());
    }

    #[test]
    fn threshold_breach_ignores_breaches_past_its_own_horizon() {
        let event = Event::ThresholdBreach {
            variable: "x".to_string(),
            op: ComparisonOp::Gt,
            threshold: 10.0,
            horizon_months: 2.0,
        };
        let mut trajectories = HashMap::new();
        // Breach only happens at step 3 (month 3), past the 2-month window.
        trajectories.insert("x".to_string(), traj(vec![1.0, 2.0, 3.0, 11.0]));
        assert!(!evaluate(&event, &trajectories).unwrap());
    }

    #[test]
    fn compound_and_requires_all_children() {
        let mut trajectories = HashMap::new();
        trajectories.insert("x".to_string(), traj(vec![1.0, 11.0]));
        trajectories.insert("y".to_string(), traj(vec![1.0, 2.0]));
        let event = Event::Compound {
            op: CompoundOp::And,
            conditions: vec![
                Event::ThresholdBreach {
                    variable: "x".to_string(),
                    op: ComparisonOp::Gt,
                    threshold: 10.0,
                    horizon_months: 12.0,
                },
                Event::ThresholdBreach {
                    variable: "y".to_string(),
                    op: ComparisonOp::Gt,
                    threshold: 10.0,
                    horizon_months: 12.0,
                },
            ],
        };
        assert!(!evaluate(&event, &trajectories).unwrap());
    }

    #[test]
    fn at_least_k_counts_true_children() {
        let mut trajectories = HashMap::new();
        trajectories.insert("x".to_string(), traj(vec![11.0]));
        trajectories.insert("y".to_string(), traj(vec![11.0]));
        trajectories.insert("z".to_string(), traj(vec![1.0]));
        let leaf = |v: &str| Event::ThresholdBreach {
            variable: v.to_string(),
            op: ComparisonOp::Gt,
            threshold: 10.0,
            horizon_months: 12.0,
        };
        let event = Event::AtLeastK {
            k: 2,
            events: vec![leaf("x"), leaf("y"), leaf("z")],
        };
        assert!(evaluate(&event, &trajectories).unwrap());
    }

    #[test]
    fn unknown_variable_is_rejected_at_validation() {
        let event = Event::ThresholdBreach {
            variable: "ghost".to_string(),
            op: ComparisonOp::Gt,
            threshold: 0.0,
            horizon_months: 1.0,
        };
        let known = vec!["x".to_string()];
        assert!(event.validate(&known).is_err());
    }

    #[test]
    fn serde_round_trips_through_json() {
        let event = Event::Compound {
            op: CompoundOp::Or,
            conditions: vec![Event::ThresholdBreach {
                variable: "x".to_string(),
                op: ComparisonOp::Ge,
                threshold: 5.0,
                horizon_months: 6.0,
            }],
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(leaf_thresholds(&event).len(), leaf_thresholds(&back).len());
    }

    #[test]
    fn sequence_requires_then_within_gap_window() {
        let mut trajectories = HashMap::new();
        trajectories.insert("x".to_string(), traj(vec![0.0, 11.0, 0.0, 0.0]));
        trajectories.insert("y".to_string(), traj(vec![0.0, 0.0, 0.0, 9.0]));
        let event = Event::Sequence {
            first: Box::new(Event::ThresholdBreach {
                variable: "x".to_string(),
                op: ComparisonOp::Gt,
                threshold: 10.0,
                horizon_months: 12.0,
            }),
            then: Box::new(Event::ThresholdBreach {
                variable: "y".to_string(),
                op: ComparisonOp::Gt,
                threshold: 8.0,
                horizon_months: 12.0,
            }),
            max_gap_months: 2.0,
        };
        assert!(evaluate(&event, &trajectories).unwrap());
    }
}
