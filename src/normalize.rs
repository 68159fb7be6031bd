//! Recommendation payload normalization
//!
//! Solution cards arrive with a payload in one of several historically
//! accumulated shapes:
//!
//! ```text
//! flat:   { source_facility_id, destination_facility_id, item_id, quantity, transport_mode }
//! nested: { source_facility_id, quantity,
//!           request_details: { requestor_phc, item_requested, quantity_needed },
//!           recommendation:  { quantity } }
//! ```
//!
//! Either shape, or a mix, may be present. Every field is resolved through an
//! explicit chain of lookups where the first present value wins. Nothing here
//! touches storage.

use serde_json::{Map, Value};

use crate::error::{NormalizationError, PayloadField};

/// Canonical single-item transfer derived from a recommendation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_facility_id: String,
    pub dest_facility_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub vehicle_hint: String,
}

impl TransferRequest {
    pub fn is_self_transfer(&self) -> bool {
        self.source_facility_id == self.dest_facility_id
    }
}

/// Normalizer policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Vehicle used when the payload carries no `transport_mode`
    pub default_vehicle: String,
    /// Required prefix for ids found under `request_details.item_requested`
    pub item_id_prefix: Option<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            default_vehicle: "BIKE".to_string(),
            item_id_prefix: None,
        }
    }
}

/// One place a field value may live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// Top-level payload key
    Top(&'static str),
    /// Key inside a sub-document of the payload
    Nested(&'static str, &'static str),
    /// Denormalized `from_facilityid` card column
    FromColumn,
    /// Denormalized `to_facilityid` card column
    ToColumn,
}

const ITEM_CHAIN: &[Lookup] = &[
    Lookup::Top("item_id"),
    Lookup::Nested("request_details", "item_requested"),
];

const SOURCE_CHAIN: &[Lookup] = &[Lookup::Top("source_facility_id"), Lookup::FromColumn];

const DEST_CHAIN: &[Lookup] = &[
    Lookup::Top("destination_facility_id"),
    Lookup::Nested("request_details", "requestor_phc"),
    Lookup::ToColumn,
];

const QUANTITY_CHAIN: &[Lookup] = &[
    Lookup::Top("quantity"),
    Lookup::Nested("recommendation", "quantity"),
    Lookup::Nested("request_details", "quantity_needed"),
];

const VEHICLE_CHAIN: &[Lookup] = &[Lookup::Top("transport_mode")];

/// The payload plus the card columns that may back it up
struct Document<'a> {
    payload: &'a Map<String, Value>,
    from_column: Option<&'a str>,
    to_column: Option<&'a str>,
}

impl<'a> Document<'a> {
    fn lookup(&self, at: Lookup) -> Option<Value> {
        let value = match at {
            Lookup::Top(key) => self.payload.get(key).cloned(),
            Lookup::Nested(parent, key) => self
                .payload
                .get(parent)
                .and_then(Value::as_object)
                .and_then(|doc| doc.get(key))
                .cloned(),
            Lookup::FromColumn => self.from_column.map(|s| Value::String(s.to_string())),
            Lookup::ToColumn => self.to_column.map(|s| Value::String(s.to_string())),
        };
        value.filter(|v| !is_blank(v))
    }

    /// First present value along a chain, with the link that produced it
    fn resolve(&self, chain: &[Lookup]) -> Option<(Lookup, Value)> {
        chain
            .iter()
            .find_map(|at| self.lookup(*at).map(|v| (*at, v)))
    }

    /// First present string value along a chain
    fn resolve_str(&self, chain: &[Lookup]) -> Option<(Lookup, String)> {
        chain.iter().find_map(|at| match self.lookup(*at) {
            Some(Value::String(s)) => Some((*at, s.trim().to_string())),
            _ => None,
        })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Normalize a bare payload
pub fn normalize(
    payload: &Value,
    config: &NormalizerConfig,
) -> Result<TransferRequest, NormalizationError> {
    normalize_with_columns(payload, None, None, config)
}

/// Normalize a payload, falling back to the card's denormalized facility
/// columns when the payload names no source or destination
pub fn normalize_with_columns(
    payload: &Value,
    from_column: Option<&str>,
    to_column: Option<&str>,
    config: &NormalizerConfig,
) -> Result<TransferRequest, NormalizationError> {
    let payload = payload.as_object().ok_or(NormalizationError::EmptyPayload)?;
    if payload.is_empty() && from_column.is_none() && to_column.is_none() {
        return Err(NormalizationError::EmptyPayload);
    }

    let doc = Document { payload, from_column, to_column };

    let item_id = resolve_item(&doc, config)?;

    let (_, source_facility_id) = doc
        .resolve_str(SOURCE_CHAIN)
        .ok_or(NormalizationError::MissingField { field: PayloadField::SourceFacilityId })?;

    let (_, dest_facility_id) = doc
        .resolve_str(DEST_CHAIN)
        .ok_or(NormalizationError::MissingField { field: PayloadField::DestFacilityId })?;

    let (_, raw_quantity) = doc
        .resolve(QUANTITY_CHAIN)
        .ok_or(NormalizationError::MissingField { field: PayloadField::Quantity })?;
    let quantity = parse_quantity(&raw_quantity)?;

    let vehicle_hint = doc
        .resolve_str(VEHICLE_CHAIN)
        .map(|(_, v)| v)
        .unwrap_or_else(|| config.default_vehicle.clone());

    Ok(TransferRequest {
        source_facility_id,
        dest_facility_id,
        item_id,
        quantity,
        vehicle_hint,
    })
}

fn resolve_item(doc: &Document<'_>, config: &NormalizerConfig) -> Result<String, NormalizationError> {
    match doc.resolve_str(ITEM_CHAIN) {
        Some((Lookup::Top(_), id)) => Ok(id),
        // The nested shape sometimes stores a human item name; mapping a name
        // to an id belongs to the caller.
        Some((_, value)) => {
            if looks_like_item_id(&value, config.item_id_prefix.as_deref()) {
                Ok(value)
            } else {
                Err(NormalizationError::AmbiguousItem { value })
            }
        }
        None => Err(NormalizationError::MissingField { field: PayloadField::ItemId }),
    }
}

/// Single token of ASCII alphanumerics, `_` or `-`, optionally prefixed
fn looks_like_item_id(value: &str, prefix: Option<&str>) -> bool {
    let token = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let prefixed = prefix.map_or(true, |p| value.starts_with(p));
    !value.is_empty() && token && prefixed
}

/// Positive integer from a JSON number or numeric string
fn parse_quantity(value: &Value) -> Result<i64, NormalizationError> {
    let malformed = || NormalizationError::MalformedQuantity { value: value.to_string() };

    let parsed = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().and_then(integral)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };

    match parsed {
        Some(q) if q > 0 => Ok(q),
        _ => Err(malformed()),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> NormalizerConfig {
        NormalizerConfig::default()
    }

    #[test]
    fn test_flat_and_nested_are_equivalent() {
        let flat = json!({
            "source_facility_id": "F1",
            "destination_facility_id": "F2",
            "item_id": "ITM1",
            "quantity": 5
        });
        let nested = json!({
            "request_details": { "requestor_phc": "F2", "item_requested": "ITM1" },
            "source_facility_id": "F1",
            "quantity": 5
        });

        let a = normalize(&flat, &cfg()).unwrap();
        let b = normalize(&nested, &cfg()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.source_facility_id, "F1");
        assert_eq!(a.dest_facility_id, "F2");
        assert_eq!(a.item_id, "ITM1");
        assert_eq!(a.quantity, 5);
        assert_eq!(a.vehicle_hint, "BIKE");
    }

    #[test]
    fn test_flat_fields_win_over_nested() {
        let payload = json!({
            "source_facility_id": "F1",
            "destination_facility_id": "F2",
            "item_id": "ITM1",
            "quantity": 3,
            "request_details": { "requestor_phc": "F9", "item_requested": "ITM9", "quantity_needed": 40 }
        });
        let req = normalize(&payload, &cfg()).unwrap();
        assert_eq!(req.dest_facility_id, "F2");
        assert_eq!(req.item_id, "ITM1");
        assert_eq!(req.quantity, 3);
    }

    #[test]
    fn test_transport_mode_overrides_default() {
        let payload = json!({
            "source_facility_id": "F1",
            "destination_facility_id": "F2",
            "item_id": "ITM1",
            "quantity": 1,
            "transport_mode": "VAN"
        });
        assert_eq!(normalize(&payload, &cfg()).unwrap().vehicle_hint, "VAN");

        let config = NormalizerConfig { default_vehicle: "TRUCK".into(), ..cfg() };
        let payload = json!({
            "source_facility_id": "F1",
            "destination_facility_id": "F2",
            "item_id": "ITM1",
            "quantity": 1
        });
        assert_eq!(normalize(&payload, &config).unwrap().vehicle_hint, "TRUCK");
    }

    #[test]
    fn test_missing_fields_are_distinct() {
        let no_item = json!({ "source_facility_id": "F1", "destination_facility_id": "F2", "quantity": 1 });
        assert_eq!(
            normalize(&no_item, &cfg()),
            Err(NormalizationError::MissingField { field: PayloadField::ItemId })
        );

        let no_source = json!({ "item_id": "ITM1", "destination_facility_id": "F2", "quantity": 1 });
        assert_eq!(
            normalize(&no_source, &cfg()),
            Err(NormalizationError::MissingField { field: PayloadField::SourceFacilityId })
        );

        let no_dest = json!({ "item_id": "ITM1", "source_facility_id": "F1", "quantity": 1 });
        assert_eq!(
            normalize(&no_dest, &cfg()),
            Err(NormalizationError::MissingField { field: PayloadField::DestFacilityId })
        );

        let no_qty = json!({ "item_id": "ITM1", "source_facility_id": "F1", "destination_facility_id": "F2" });
        assert_eq!(
            normalize(&no_qty, &cfg()),
            Err(NormalizationError::MissingField { field: PayloadField::Quantity })
        );
    }

    #[test]
    fn test_blank_strings_count_as_absent() {
        let payload = json!({
            "item_id": "ITM1",
            "source_facility_id": "  ",
            "destination_facility_id": "F2",
            "quantity": 1
        });
        assert_eq!(
            normalize(&payload, &cfg()),
            Err(NormalizationError::MissingField { field: PayloadField::SourceFacilityId })
        );
    }

    #[test]
    fn test_quantity_coercion() {
        let with_qty = |q: Value| {
            json!({
                "item_id": "ITM1",
                "source_facility_id": "F1",
                "destination_facility_id": "F2",
                "quantity": q
            })
        };

        assert_eq!(normalize(&with_qty(json!("12")), &cfg()).unwrap().quantity, 12);
        assert_eq!(normalize(&with_qty(json!(" 7 ")), &cfg()).unwrap().quantity, 7);
        assert_eq!(normalize(&with_qty(json!(8.0)), &cfg()).unwrap().quantity, 8);

        for bad in [json!(0), json!(-3), json!("abc"), json!(2.5), json!("-1"), json!(true)] {
            assert!(
                matches!(
                    normalize(&with_qty(bad.clone()), &cfg()),
                    Err(NormalizationError::MalformedQuantity { .. })
                ),
                "expected malformed for {}",
                bad
            );
        }
    }

    #[test]
    fn test_malformed_quantity_does_not_fall_through() {
        let payload = json!({
            "item_id": "ITM1",
            "source_facility_id": "F1",
            "destination_facility_id": "F2",
            "quantity": "lots",
            "recommendation": { "quantity": 10 }
        });
        assert!(matches!(
            normalize(&payload, &cfg()),
            Err(NormalizationError::MalformedQuantity { .. })
        ));
    }

    #[test]
    fn test_item_name_in_nested_shape_is_ambiguous() {
        let payload = json!({
            "source_facility_id": "F1",
            "quantity": 5,
            "request_details": { "requestor_phc": "F2", "item_requested": "Paracetamol 500mg" }
        });
        assert_eq!(
            normalize(&payload, &cfg()),
            Err(NormalizationError::AmbiguousItem { value: "Paracetamol 500mg".into() })
        );
    }

    #[test]
    fn test_item_prefix_policy() {
        let config = NormalizerConfig { item_id_prefix: Some("ITM".into()), ..cfg() };
        let payload = |item: &str| {
            json!({
                "source_facility_id": "F1",
                "quantity": 5,
                "request_details": { "requestor_phc": "F2", "item_requested": item }
            })
        };
        assert_eq!(normalize(&payload("ITM42"), &config).unwrap().item_id, "ITM42");
        assert!(matches!(
            normalize(&payload("Amoxicillin"), &config),
            Err(NormalizationError::AmbiguousItem { .. })
        ));
    }

    #[test]
    fn test_ai_card_shape_uses_columns_and_recommendation_quantity() {
        let payload = json!({
            "item_id": "ITM3",
            "request_details": { "requestor_phc": "fac_thane_09", "quantity_needed": 50 },
            "recommendation": { "quantity": 40, "logistics": {} }
        });

        assert_eq!(
            normalize(&payload, &cfg()),
            Err(NormalizationError::MissingField { field: PayloadField::SourceFacilityId })
        );

        let req = normalize_with_columns(&payload, Some("fac_pune_01"), Some("fac_other"), &cfg()).unwrap();
        assert_eq!(req.source_facility_id, "fac_pune_01");
        // payload destination outranks the column
        assert_eq!(req.dest_facility_id, "fac_thane_09");
        assert_eq!(req.quantity, 40);
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(normalize(&Value::Null, &cfg()), Err(NormalizationError::EmptyPayload));
        assert_eq!(normalize(&json!([1, 2]), &cfg()), Err(NormalizationError::EmptyPayload));
        assert_eq!(normalize(&json!({}), &cfg()), Err(NormalizationError::EmptyPayload));
    }

    #[test]
    fn test_self_transfer_is_detectable() {
        let payload = json!({
            "item_id": "ITM1",
            "source_facility_id": "F1",
            "destination_facility_id": "F1",
            "quantity": 2
        });
        assert!(normalize(&payload, &cfg()).unwrap().is_self_transfer());
    }
}
