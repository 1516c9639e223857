//! Property-based tests for parameter binding, identifier quoting and bulk
//! inserts
//!
//! These tests verify that:
//! - Bound values are stored and matched as data, whatever characters they hold
//! - Quoted identifiers always name exactly one column
//! - `ConflictPolicy::Ignore` writes exactly the rows whose keys are new

#[cfg(test)]
mod tests {
    use dbfacade::core::db::quote_identifier;
    use dbfacade::{ConflictPolicy, ConnectionConfig, Facade, Params, Record, Value};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn open_memory() -> Facade {
        let facade = Facade::new();
        facade.open_connection(&ConnectionConfig::in_memory()).unwrap();
        facade
    }

    /// Strings rich in SQL metacharacters
    fn arb_hostile_text() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z';\"\\-\\(\\) =*/]{0,40}".prop_map(|s: String| s),
            Just("'; DROP TABLE guard; --".to_string()),
            Just("' OR '1'='1".to_string()),
            Just("\"); DELETE FROM items; --".to_string()),
            any::<String>().prop_filter("no NUL", |s| !s.contains('\0')),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn bound_text_is_stored_verbatim(text in arb_hostile_text()) {
            let facade = open_memory();
            facade.execute("CREATE TABLE items (body TEXT)", &Params::None).unwrap();
            facade.execute("CREATE TABLE guard (x INTEGER)", &Params::None).unwrap();

            let affected = facade
                .execute("INSERT INTO items (body) VALUES (:body)", &Params::named([("body", text.clone())]))
                .unwrap();
            prop_assert_eq!(affected, 1);

            let matched = facade
                .select("SELECT body FROM items WHERE body = ?", &Params::positional([text.clone()]))
                .unwrap();
            prop_assert_eq!(matched.rows, vec![vec![Value::Text(text)]]);

            // Neither table was touched by anything in the value.
            let total = facade.select("SELECT COUNT(*) FROM items", &Params::None).unwrap();
            prop_assert_eq!(&total.rows[0][0], &Value::Integer(1));
            prop_assert!(facade.select("SELECT * FROM guard", &Params::None).is_ok());
        }

        #[test]
        fn quoted_column_names_round_trip(name in "[a-zA-Z _;'\"\\-]{0,10}[a-zA-Z]") {
            let facade = open_memory();
            let create = format!("CREATE TABLE weird ({} TEXT)", quote_identifier(&name));
            facade.execute(&create, &Params::None).unwrap();

            facade
                .insert_record("weird", &Record::new().with(name.clone(), "v".to_string()))
                .unwrap();

            let result = facade.select("SELECT * FROM weird", &Params::None).unwrap();
            prop_assert_eq!(result.columns, vec![name]);
            prop_assert_eq!(result.rows, vec![vec![Value::Text("v".to_string())]]);
        }

        #[test]
        fn ignore_policy_writes_only_new_keys(
            existing in prop::collection::btree_set(0i64..40, 0..15),
            batch in prop::collection::vec(0i64..40, 1..30),
        ) {
            let facade = open_memory();
            facade.execute("CREATE TABLE keys (k INTEGER PRIMARY KEY, tag TEXT)", &Params::None).unwrap();
            for k in &existing {
                facade.insert_record("keys", &Record::new().with("k", *k).with("tag", "old".to_string())).unwrap();
            }

            let records: Vec<Record> = batch
                .iter()
                .map(|k| Record::new().with("k", *k).with("tag", "new".to_string()))
                .collect();
            let report = facade
                .insert_multiple_records("keys", &records, &ConflictPolicy::Ignore)
                .unwrap();

            let fresh: BTreeSet<i64> = batch.iter().copied().filter(|k| !existing.contains(k)).collect();
            prop_assert_eq!(report.attempted, batch.len());
            prop_assert_eq!(report.written, fresh.len());
            prop_assert_eq!(report.skipped, batch.len() - fresh.len());

            let old = facade
                .select("SELECT COUNT(*) FROM keys WHERE tag = 'old'", &Params::None)
                .unwrap();
            prop_assert_eq!(&old.rows[0][0], &Value::Integer(existing.len() as i64));
        }
    }
}
