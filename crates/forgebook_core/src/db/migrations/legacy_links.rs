//! One-shot rewrite of embedded project references into link records.
//!
//! Before the `links` table existed, projects carried their relations inline:
//! `blocked_by: [id]`, `goal_id: id` (or `goal_ids: [id]`) and
//! `related_project_ids: [id]`. This upgrade turns them into directed edges.
//! Legacy fields are left on the project rows.
//!
//! Planning is a pure function so it can be tested without a database; the
//! upgrade hook only reads projects and bulk-inserts the plan.

use super::ledger::UpgradeError;
use super::UpgradeContext;
use crate::model::link::{EntityRef, Link, LinkKind, LINKS_TABLE};
use crate::model::value::{Record, Timestamp, Value};
use chrono::Utc;
use log::{debug, info};

pub const PROJECT_ENTITY: &str = "project";
pub const GOAL_ENTITY: &str = "goal";

/// Project relations as stored before the link table existed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyProject {
    pub id: i64,
    pub blocked_by: Vec<i64>,
    pub goal_ids: Vec<i64>,
    pub related_ids: Vec<i64>,
}

impl LegacyProject {
    /// Reads legacy relation fields; `None` when the row has no integer id.
    ///
    /// Ids may be integers or numeric strings; anything else is skipped.
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = record.get_i64("id")?;
        let mut goal_ids = id_list(record.get("goal_ids"));
        if let Some(goal) = record.get("goal_id").and_then(id_of) {
            if !goal_ids.contains(&goal) {
                goal_ids.insert(0, goal);
            }
        }
        Some(Self {
            id,
            blocked_by: id_list(record.get("blocked_by")),
            goal_ids,
            related_ids: id_list(record.get("related_project_ids")),
        })
    }
}

/// Computes every edge implied by legacy project fields.
///
/// - `B` in `P.blocked_by` yields `B -blocks-> P`.
/// - `G` referenced by `P` yields `P -supports-> G`.
/// - `R` in `P.related_project_ids` yields `P -relates_to-> R` only when
///   `P.id < R.id`, collapsing the two-sided legacy field to one edge.
pub fn plan_legacy_links(projects: &[LegacyProject], created_at: Timestamp) -> Vec<Link> {
    let mut links = Vec::new();
    for project in projects {
        let this = EntityRef::new(PROJECT_ENTITY, project.id);
        for blocker in &project.blocked_by {
            links.push(Link::at(
                EntityRef::new(PROJECT_ENTITY, *blocker),
                this.clone(),
                LinkKind::Blocks,
                created_at,
            ));
        }
        for goal in &project.goal_ids {
            links.push(Link::at(
                this.clone(),
                EntityRef::new(GOAL_ENTITY, *goal),
                LinkKind::Supports,
                created_at,
            ));
        }
        for related in &project.related_ids {
            if project.id < *related {
                links.push(Link::at(
                    this.clone(),
                    EntityRef::new(PROJECT_ENTITY, *related),
                    LinkKind::RelatesTo,
                    created_at,
                ));
            }
        }
    }
    links
}

/// Upgrade routine registered on the version that introduces `links`.
pub fn migrate_legacy_links(ctx: &UpgradeContext<'_>) -> Result<(), UpgradeError> {
    let root = ctx.catalog().root_table().to_string();
    let rows = ctx.table(&root)?.all()?;
    let projects: Vec<LegacyProject> = rows
        .iter()
        .filter_map(|row| {
            let parsed = LegacyProject::from_record(row);
            if parsed.is_none() {
                debug!("event=legacy_links module=migrations status=skip reason=missing_id");
            }
            parsed
        })
        .collect();

    let links = plan_legacy_links(&projects, Utc::now());
    let count = links.len();
    ctx.table(LINKS_TABLE)?
        .bulk_add(links.iter().map(Link::to_record).collect())?;

    info!(
        "event=legacy_links module=migrations status=ok version={} projects={} links={}",
        ctx.version(),
        projects.len(),
        count
    );
    Ok(())
}

fn id_of(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(id) => Some(*id),
        // `i64::MAX as f64` is 2^63, one past the largest i64.
        Value::Real(number)
            if number.fract() == 0.0
                && *number >= i64::MIN as f64
                && *number < i64::MAX as f64 =>
        {
            Some(*number as i64)
        }
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn id_list(value: Option<&Value>) -> Vec<i64> {
    match value {
        Some(Value::List(items)) => items.iter().filter_map(id_of).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_legacy_links, LegacyProject};
    use crate::model::link::LinkKind;
    use crate::model::value::{Record, Value};
    use chrono::{TimeZone, Utc};

    fn edges(projects: &[LegacyProject]) -> Vec<(i64, i64, LinkKind)> {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        plan_legacy_links(projects, at)
            .into_iter()
            .map(|link| (link.source.id, link.target.id, link.relationship))
            .collect()
    }

    #[test]
    fn symmetric_related_pair_yields_one_edge_from_lower_id() {
        let projects = [
            LegacyProject {
                id: 1,
                related_ids: vec![2],
                ..LegacyProject::default()
            },
            LegacyProject {
                id: 2,
                related_ids: vec![1],
                ..LegacyProject::default()
            },
        ];
        assert_eq!(edges(&projects), vec![(1, 2, LinkKind::RelatesTo)]);
    }

    #[test]
    fn blocking_ids_point_at_the_blocked_project() {
        let projects = [LegacyProject {
            id: 5,
            blocked_by: vec![3, 9],
            ..LegacyProject::default()
        }];
        assert_eq!(
            edges(&projects),
            vec![(3, 5, LinkKind::Blocks), (9, 5, LinkKind::Blocks)]
        );
    }

    #[test]
    fn goals_are_supported_by_the_project() {
        let projects = [LegacyProject {
            id: 4,
            goal_ids: vec![7],
            ..LegacyProject::default()
        }];
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let links = plan_legacy_links(&projects, at);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source.entity_type, "project");
        assert_eq!(links[0].target.entity_type, "goal");
        assert_eq!(links[0].relationship, LinkKind::Supports);
        assert_eq!(links[0].created_at, at);
    }

    #[test]
    fn one_sided_relation_from_higher_id_is_dropped() {
        let projects = [LegacyProject {
            id: 8,
            related_ids: vec![2],
            ..LegacyProject::default()
        }];
        assert!(edges(&projects).is_empty());
    }

    #[test]
    fn from_record_reads_mixed_id_shapes() {
        let record = Record::new()
            .with("id", 5_i64)
            .with(
                "blocked_by",
                Value::List(vec![Value::Integer(3), Value::from("9"), Value::from("x")]),
            )
            .with("goal_id", 7_i64)
            .with("goal_ids", Value::List(vec![Value::Integer(8)]))
            .with("related_project_ids", Value::Null);

        let project = LegacyProject::from_record(&record).unwrap();
        assert_eq!(project.blocked_by, vec![3, 9]);
        assert_eq!(project.goal_ids, vec![7, 8]);
        assert!(project.related_ids.is_empty());

        assert!(LegacyProject::from_record(&Record::new().with("title", "no id")).is_none());
    }

    #[test]
    fn out_of_range_real_ids_are_skipped() {
        let record = Record::new().with("id", 5_i64).with(
            "blocked_by",
            Value::List(vec![
                Value::Real(3.0),
                Value::Real(1e19),
                Value::Real(-1e19),
                Value::Real(9_223_372_036_854_775_807.0),
                Value::Real(f64::INFINITY),
                Value::Real(f64::NAN),
                Value::Real(4.5),
            ]),
        );

        let project = LegacyProject::from_record(&record).unwrap();
        assert_eq!(project.blocked_by, vec![3]);
    }
}
