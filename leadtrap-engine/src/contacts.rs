//! Contact normalization and unlock decisions
//!
//! The data provider returns contact fields as loosely typed maps with
//! inconsistent key casing (`Value` vs `value` vs `Linktext`) and a lock
//! marker (`href`/`Href`) on fields that have not been purchased yet.
//! Everything downstream works on the canonical [`ContactRecord`] produced
//! here; no other module branches on raw key casing.

use serde_json::Value;

/// Which contact field a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Phone,
    Email,
}

impl ContactKind {
    /// Field name used by the provider API
    pub fn provider_field(&self) -> &'static str {
        match self {
            ContactKind::Phone => "Phone",
            ContactKind::Email => "Email",
        }
    }
}

/// Canonical contact record
///
/// Invariant: `locked == true` implies `value == None`. An item with
/// neither a value nor a lock marker is absent and never becomes a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub kind: ContactKind,
    pub value: Option<String>,
    pub locked: bool,
}

impl ContactRecord {
    pub fn unlocked(kind: ContactKind, value: impl Into<String>) -> Self {
        ContactRecord {
            kind,
            value: Some(value.into()),
            locked: false,
        }
    }

    pub fn locked(kind: ContactKind) -> Self {
        ContactRecord {
            kind,
            value: None,
            locked: true,
        }
    }
}

/// Keys that can carry the actual contact value, checked case-insensitively
const VALUE_KEYS: &[&str] = &["value", "linktext"];

/// Keys that mark a field as locked (purchasable)
const LOCK_KEYS: &[&str] = &["href"];

/// Case-insensitive lookup of the first non-empty string under any of `keys`
fn get_str_ci<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    let map = item.as_object()?;
    for (k, v) in map {
        if keys.iter().any(|want| k.eq_ignore_ascii_case(want)) {
            if let Some(s) = v.as_str() {
                if !s.trim().is_empty() {
                    return Some(s);
                }
            }
        }
    }
    None
}

/// Case-insensitive presence check for any of `keys`
fn has_key_ci(item: &Value, keys: &[&str]) -> bool {
    item.as_object()
        .map(|map| {
            map.keys()
                .any(|k| keys.iter().any(|want| k.eq_ignore_ascii_case(want)))
        })
        .unwrap_or(false)
}

/// Normalize one raw provider contact item into a canonical record.
///
/// A resolvable value wins over a lock marker even when both are present
/// (the provider sometimes leaves a stale `href` on unlocked fields).
/// Returns `None` for absent items.
pub fn normalize_contact_item(kind: ContactKind, item: &Value) -> Option<ContactRecord> {
    if let Some(value) = get_str_ci(item, VALUE_KEYS) {
        return Some(ContactRecord::unlocked(kind, value.trim()));
    }
    if has_key_ci(item, LOCK_KEYS) {
        return Some(ContactRecord::locked(kind));
    }
    None
}

/// Normalize a raw provider contact list, dropping absent items.
pub fn normalize_contact_items(kind: ContactKind, items: &[Value]) -> Vec<ContactRecord> {
    items
        .iter()
        .filter_map(|item| normalize_contact_item(kind, item))
        .collect()
}

/// Decide whether a metered unlock purchase is required for one contact
/// field of one person.
///
/// Never returns true when any record already carries a value: the system
/// must not re-purchase a field it holds, even if other records in the
/// same list are still locked. An empty list means there is nothing to
/// purchase at all.
pub fn needs_unlock(records: &[ContactRecord]) -> bool {
    if records.iter().any(|r| !r.locked && r.value.is_some()) {
        return false;
    }
    records.iter().any(|r| r.locked)
}

/// Normalize a raw phone number for dialing and exact-match attribution.
///
/// Strips common formatting characters and assumes US country code when
/// none is present. Both stored values and inbound webhook numbers go
/// through this, so comparisons are exact rather than substring-based.
pub fn normalize_phone(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '(' | ')' | ' ' | '.'))
        .collect();
    if cleaned.starts_with('+') {
        cleaned
    } else {
        format!("+1{}", cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_key_any_casing_resolves() {
        for key in ["Value", "value", "VALUE", "Linktext", "linktext"] {
            let item = json!({ key: "+15551234567" });
            let rec = normalize_contact_item(ContactKind::Phone, &item).unwrap();
            assert_eq!(rec.value.as_deref(), Some("+15551234567"));
            assert!(!rec.locked);
        }
    }

    #[test]
    fn value_wins_over_lock_marker() {
        let item = json!({ "Href": "/purchase/123", "value": "owner@example.com" });
        let rec = normalize_contact_item(ContactKind::Email, &item).unwrap();
        assert_eq!(rec.value.as_deref(), Some("owner@example.com"));
        assert!(!rec.locked);
    }

    #[test]
    fn lock_marker_alone_yields_locked_record() {
        let item = json!({ "href": "/purchase/123" });
        let rec = normalize_contact_item(ContactKind::Phone, &item).unwrap();
        assert!(rec.locked);
        assert!(rec.value.is_none());
    }

    #[test]
    fn empty_value_with_lock_marker_is_locked() {
        let item = json!({ "Value": "", "href": "/purchase/123" });
        let rec = normalize_contact_item(ContactKind::Phone, &item).unwrap();
        assert!(rec.locked);
    }

    #[test]
    fn absent_items_are_dropped() {
        assert!(normalize_contact_item(ContactKind::Phone, &json!({})).is_none());
        assert!(normalize_contact_item(ContactKind::Phone, &json!({ "Other": "x" })).is_none());
        assert!(normalize_contact_item(ContactKind::Phone, &json!("not a map")).is_none());

        let items = vec![json!({}), json!({ "value": "+15550001111" })];
        let records = normalize_contact_items(ContactKind::Phone, &items);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn needs_unlock_empty_is_false() {
        assert!(!needs_unlock(&[]));
    }

    #[test]
    fn needs_unlock_unlocked_value_is_false() {
        let records = vec![ContactRecord::unlocked(ContactKind::Phone, "v")];
        assert!(!needs_unlock(&records));
    }

    #[test]
    fn needs_unlock_locked_only_is_true() {
        let records = vec![ContactRecord::locked(ContactKind::Phone)];
        assert!(needs_unlock(&records));
    }

    #[test]
    fn needs_unlock_mixed_is_false() {
        let records = vec![
            ContactRecord::locked(ContactKind::Phone),
            ContactRecord::unlocked(ContactKind::Phone, "v"),
        ];
        assert!(!needs_unlock(&records));
    }

    #[test]
    fn normalize_phone_strips_formatting() {
        assert_eq!(normalize_phone("(555) 123-4567"), "+15551234567");
        assert_eq!(normalize_phone("555.123.4567"), "+15551234567");
        assert_eq!(normalize_phone("+15551234567"), "+15551234567");
        assert_eq!(normalize_phone(" +44 20 7946 0958 "), "+442079460958");
    }
}
