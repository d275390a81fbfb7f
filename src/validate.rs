use serde_json::Value;

/// Shape rules for one resource's page body: the items array the page must
/// carry and the keys every element of it must have. Kept as data so each
/// export wires in its own rules without bespoke validator code.
#[derive(Debug, Clone, Copy)]
pub struct PageRules {
    pub array_field: &'static str,
    pub required_keys: &'static [&'static str],
}

pub const TICKET_PAGE: PageRules = PageRules::new("tickets", &["id", "created_at", "updated_at"]);
pub const COMMENT_PAGE: PageRules = PageRules::new("comments", &["id", "body"]);
pub const USER_PAGE: PageRules = PageRules::new("users", &["id", "name"]);
pub const ORGANIZATION_PAGE: PageRules = PageRules::new("organizations", &["id", "name"]);
pub const GROUP_PAGE: PageRules = PageRules::new("groups", &["id", "name"]);
pub const GROUP_MEMBERSHIP_PAGE: PageRules =
    PageRules::new("group_memberships", &["id", "user_id", "group_id"]);
pub const IDENTITY_PAGE: PageRules = PageRules::new("identities", &["id", "user_id", "type"]);
pub const SUSPENDED_TICKET_PAGE: PageRules = PageRules::new("suspended_tickets", &["id", "cause"]);

impl PageRules {
    pub const fn new(array_field: &'static str, required_keys: &'static [&'static str]) -> Self {
        Self {
            array_field,
            required_keys,
        }
    }

    pub fn is_valid_page(&self, body: &Value) -> bool {
        let Some(items) = body.get(self.array_field).and_then(Value::as_array) else {
            return false;
        };
        items.iter().all(|item| self.item_ok(item))
    }

    fn item_ok(&self, item: &Value) -> bool {
        let Some(obj) = item.as_object() else {
            return false;
        };
        self.required_keys.iter().all(|k| obj.contains_key(*k))
    }

    /// Diagnostic for a page that failed `is_valid_page`, enumerating the
    /// offending sub-elements rather than a generic mismatch message.
    pub fn explain_invalid_page(&self, body: &Value) -> String {
        let Some(field) = body.get(self.array_field) else {
            return format!("missing required array field \"{}\"", self.array_field);
        };
        let Some(items) = field.as_array() else {
            return format!("field \"{}\" is not an array", self.array_field);
        };
        let bad: Vec<String> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !self.item_ok(item))
            .map(|(i, item)| self.describe_item(i, item))
            .collect();
        if bad.is_empty() {
            return "page matched the expected shape".to_string();
        }
        format!(
            "{} of {} items in \"{}\" did not match: {}",
            bad.len(),
            items.len(),
            self.array_field,
            bad.join("; ")
        )
    }

    fn describe_item(&self, index: usize, item: &Value) -> String {
        let Some(obj) = item.as_object() else {
            return format!("item {} is not an object", index);
        };
        let missing: Vec<&str> = self
            .required_keys
            .iter()
            .copied()
            .filter(|k| !obj.contains_key(*k))
            .collect();
        format!("item {} is missing {}", index, missing.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_page_passes() {
        let body = json!({
            "users": [
                {"id": 1, "name": "a"},
                {"id": 2, "name": "b", "email": "b@example.com"}
            ],
            "meta": {"has_more": false}
        });
        assert!(USER_PAGE.is_valid_page(&body));
    }

    #[test]
    fn missing_array_field_is_named() {
        let body = json!({"meta": {"has_more": false}});
        assert!(!USER_PAGE.is_valid_page(&body));
        let msg = USER_PAGE.explain_invalid_page(&body);
        assert!(msg.contains("\"users\""), "got: {}", msg);
    }

    #[test]
    fn non_array_field_is_reported() {
        let body = json!({"users": "oops"});
        assert!(!USER_PAGE.is_valid_page(&body));
        assert!(USER_PAGE
            .explain_invalid_page(&body)
            .contains("not an array"));
    }

    #[test]
    fn offending_items_are_enumerated() {
        let body = json!({
            "users": [
                {"id": 1, "name": "ok"},
                {"id": 2},
                "nope"
            ]
        });
        assert!(!USER_PAGE.is_valid_page(&body));
        let msg = USER_PAGE.explain_invalid_page(&body);
        assert!(msg.contains("item 1 is missing name"), "got: {}", msg);
        assert!(msg.contains("item 2 is not an object"), "got: {}", msg);
    }

    #[test]
    fn empty_items_array_is_valid() {
        let body = json!({"tickets": [], "end_of_stream": true});
        assert!(TICKET_PAGE.is_valid_page(&body));
    }
}
