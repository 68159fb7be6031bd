//! Solution card operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::context::CallerContext;
use super::current_timestamp;
use crate::error::SupplyError;

/// Card lifecycle states; non-pending states are terminal
pub mod card_statuses {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";

    pub const ALL: [&str; 3] = [PENDING, APPROVED, REJECTED];

    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }

    pub fn is_terminal(status: &str) -> bool {
        status != PENDING
    }
}

/// Solution card row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionCard {
    pub id: String,
    pub status: String,
    pub priority_score: i64,
    pub confidence_score: Option<f64>,
    pub ai_rationale_summary: Option<String>,
    pub source: Option<String>,
    pub payload: Value,
    pub from_facility_id: Option<String>,
    pub to_facility_id: Option<String>,
    pub created_at: String,
    pub decided_at: Option<String>,
}

impl SolutionCard {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let id: String = row.get("id")?;
        let raw_payload: Option<String> = row.get("payload")?;
        let payload = match raw_payload {
            Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(card_id = %id, error = %e, "Card payload is not valid JSON");
                Value::Null
            }),
            None => Value::Null,
        };

        Ok(Self {
            id,
            status: row.get("status")?,
            priority_score: row.get("priority_score")?,
            confidence_score: row.get("confidence_score")?,
            ai_rationale_summary: row.get("ai_rationale_summary")?,
            source: row.get("source")?,
            payload,
            from_facility_id: row.get("from_facilityid")?,
            to_facility_id: row.get("to_facilityid")?,
            created_at: row.get("created_at")?,
            decided_at: row.get("decided_at")?,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == card_statuses::PENDING
    }
}

/// Input for creating a card (ingestion side and fixtures)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSolutionCard {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub priority_score: i64,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub ai_rationale_summary: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub from_facility_id: Option<String>,
    #[serde(default)]
    pub to_facility_id: Option<String>,
}

/// Priority bands used by the approval queue filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityBand {
    /// Score 8 and above
    Critical,
    /// Score 5 to 7
    High,
    /// Score below 5
    Medium,
}

impl PriorityBand {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Critical" | "critical" => Some(PriorityBand::Critical),
            "High" | "high" => Some(PriorityBand::High),
            "Medium" | "medium" => Some(PriorityBand::Medium),
            _ => None,
        }
    }

    fn condition(&self) -> &'static str {
        match self {
            PriorityBand::Critical => "priority_score >= 8",
            PriorityBand::High => "priority_score BETWEEN 5 AND 7",
            PriorityBand::Medium => "priority_score < 5",
        }
    }
}

/// Approval queue filter
#[derive(Debug, Clone)]
pub struct CardQuery {
    pub priority: Option<PriorityBand>,
    /// Case-insensitive substring of the source or destination facility name
    pub search: Option<String>,
    pub limit: u32,
}

impl Default for CardQuery {
    fn default() -> Self {
        Self { priority: None, search: None, limit: 100 }
    }
}

/// Create a pending card
pub fn insert_card(conn: &Connection, input: NewSolutionCard) -> Result<SolutionCard, SupplyError> {
    let id = input.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let payload = match &input.payload {
        Value::Null => None,
        doc => Some(serde_json::to_string(doc)?),
    };

    conn.execute(
        r#"
        INSERT INTO solution_cards (
            id, status, priority_score, confidence_score, ai_rationale_summary,
            source, payload, from_facilityid, to_facilityid, created_at
        ) VALUES (?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.priority_score,
            input.confidence_score,
            input.ai_rationale_summary,
            input.source,
            payload,
            input.from_facility_id,
            input.to_facility_id,
            current_timestamp(),
        ],
    )?;

    debug!(card_id = %id, "Inserted solution card");

    get_card(conn, &id)?
        .ok_or_else(|| SupplyError::Internal("Card not found after insert".to_string()))
}

/// Get card by ID
pub fn get_card(conn: &Connection, id: &str) -> Result<Option<SolutionCard>, SupplyError> {
    let card = conn
        .query_row(
            "SELECT * FROM solution_cards WHERE id = ?",
            params![id],
            |row| SolutionCard::from_row(row),
        )
        .optional()?;
    Ok(card)
}

/// Move a pending card to a terminal status
///
/// Returns false when the card was no longer pending, leaving it untouched.
pub fn mark_decided(conn: &Connection, id: &str, status: &str) -> Result<bool, SupplyError> {
    if !card_statuses::is_valid(status) || !card_statuses::is_terminal(status) {
        return Err(SupplyError::InvalidInput(format!("Not a terminal status: {}", status)));
    }

    let changed = conn.execute(
        "UPDATE solution_cards SET status = ?, decided_at = ? WHERE id = ? AND status = 'pending'",
        params![status, current_timestamp(), id],
    )?;

    Ok(changed == 1)
}

/// Pending cards visible to the caller, highest priority first
pub fn list_pending(
    conn: &Connection,
    ctx: &CallerContext,
    query: &CardQuery,
) -> Result<Vec<SolutionCard>, SupplyError> {
    let mut sql = String::from("SELECT * FROM solution_cards WHERE status = 'pending'");
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

    if let Some(facility) = ctx.facility_scope() {
        sql.push_str(" AND (from_facilityid = ? OR to_facilityid = ?)");
        params.push(Box::new(facility.to_string()));
        params.push(Box::new(facility.to_string()));
    }

    if let Some(band) = query.priority {
        sql.push_str(" AND ");
        sql.push_str(band.condition());
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sql.push_str(
            " AND (json_extract(payload, '$.source_facility_name') LIKE ?
              OR json_extract(payload, '$.destination_facility_name') LIKE ?)",
        );
        let pattern = format!("%{}%", search);
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }

    sql.push_str(" ORDER BY priority_score DESC, created_at ASC LIMIT ?");
    params.push(Box::new(query.limit as i64));

    debug!("Executing query: {}", sql);

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let cards = stmt
        .query_map(param_refs.as_slice(), |row| SolutionCard::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(cards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::context::roles;
    use crate::db::schema::init_schema;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn card(id: &str, score: i64, from: &str, to: &str) -> NewSolutionCard {
        NewSolutionCard {
            id: Some(id.to_string()),
            priority_score: score,
            payload: json!({ "item_id": "ITM1", "quantity": 1 }),
            from_facility_id: Some(from.to_string()),
            to_facility_id: Some(to.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get_preserves_payload() {
        let conn = conn();
        let created = insert_card(&conn, card("c1", 7, "F1", "F2")).unwrap();
        assert!(created.is_pending());
        assert_eq!(created.payload["item_id"], "ITM1");
        assert!(get_card(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_mark_decided_only_once() {
        let conn = conn();
        insert_card(&conn, card("c1", 7, "F1", "F2")).unwrap();

        assert!(mark_decided(&conn, "c1", card_statuses::REJECTED).unwrap());
        assert!(!mark_decided(&conn, "c1", card_statuses::APPROVED).unwrap());

        let card = get_card(&conn, "c1").unwrap().unwrap();
        assert_eq!(card.status, card_statuses::REJECTED);
        assert!(card.decided_at.is_some());

        assert!(mark_decided(&conn, "c1", card_statuses::PENDING).is_err());
    }

    #[test]
    fn test_queue_order_scope_and_band() {
        let conn = conn();
        insert_card(&conn, card("low", 2, "F1", "F2")).unwrap();
        insert_card(&conn, card("crit", 9, "F3", "F1")).unwrap();
        insert_card(&conn, card("other", 6, "F4", "F5")).unwrap();

        let dho = CallerContext::new(roles::DHO);
        let all = list_pending(&conn, &dho, &CardQuery::default()).unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["crit", "other", "low"]);

        let phc = CallerContext::new(roles::PHC_STAFF).with_facility("F1");
        let mine = list_pending(&conn, &phc, &CardQuery::default()).unwrap();
        let ids: Vec<_> = mine.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["crit", "low"]);

        let query = CardQuery { priority: Some(PriorityBand::High), ..Default::default() };
        let high = list_pending(&conn, &dho, &query).unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].id, "other");
    }

    #[test]
    fn test_decided_cards_leave_the_queue() {
        let conn = conn();
        insert_card(&conn, card("c1", 5, "F1", "F2")).unwrap();
        mark_decided(&conn, "c1", card_statuses::APPROVED).unwrap();
        let dho = CallerContext::new(roles::DHO);
        assert!(list_pending(&conn, &dho, &CardQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn test_queue_search_matches_facility_names() {
        let conn = conn();
        let named = |id: &str, source: &str, dest: &str| NewSolutionCard {
            id: Some(id.to_string()),
            priority_score: 5,
            payload: json!({
                "item_id": "ITM1",
                "quantity": 1,
                "source_facility_name": source,
                "destination_facility_name": dest
            }),
            ..Default::default()
        };
        insert_card(&conn, named("a", "Kothrud PHC", "Hadapsar PHC")).unwrap();
        insert_card(&conn, named("b", "Aundh PHC", "Kothrud Rural Hospital")).unwrap();
        insert_card(&conn, named("c", "Wakad PHC", "Baner PHC")).unwrap();
        insert_card(&conn, card("unnamed", 9, "F1", "F2")).unwrap();

        let dho = CallerContext::new(roles::DHO);
        let query = CardQuery { search: Some("kothrud".into()), ..Default::default() };
        let mut ids: Vec<_> = list_pending(&conn, &dho, &query)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);

        let query = CardQuery { search: Some("  ".into()), ..Default::default() };
        assert_eq!(list_pending(&conn, &dho, &query).unwrap().len(), 4);

        let query = CardQuery { search: Some("Nowhere".into()), ..Default::default() };
        assert!(list_pending(&conn, &dho, &query).unwrap().is_empty());
    }
}
