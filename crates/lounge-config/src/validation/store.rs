use std::collections::HashSet;

use crate::schema::LoungeConfig;

use super::helpers::{validate_identifier, validate_range};

const KNOWN_KINDS: &[&str] = &["post_like", "comment_like", "follow", "pin"];

pub(crate) fn validate_store(errors: &mut Vec<String>, config: &LoungeConfig) {
    let store = &config.store;
    validate_range(
        errors,
        "store.request_timeout_secs",
        store.request_timeout_secs,
        1,
        120,
    );

    if !store.rest_url.is_empty()
        && !(store.rest_url.starts_with("http://") || store.rest_url.starts_with("https://"))
    {
        errors.push(format!(
            "store.rest_url = {:?} must be an http(s) URL",
            store.rest_url
        ));
    }

    let mut seen = HashSet::new();
    for (i, table) in store.tables.iter().enumerate() {
        if !KNOWN_KINDS.contains(&table.kind.as_str()) {
            errors.push(format!(
                "store.tables[{i}].kind = {:?} is not one of {KNOWN_KINDS:?}",
                table.kind
            ));
        }
        if !seen.insert(table.kind.as_str()) {
            errors.push(format!("store.tables[{i}].kind = {:?} is duplicated", table.kind));
        }
        validate_identifier(errors, &format!("store.tables[{i}].table"), &table.table);
        validate_identifier(
            errors,
            &format!("store.tables[{i}].subject_column"),
            &table.subject_column,
        );
        validate_identifier(
            errors,
            &format!("store.tables[{i}].resource_column"),
            &table.resource_column,
        );
        validate_identifier(
            errors,
            &format!("store.tables[{i}].state_column"),
            &table.state_column,
        );
    }
}
