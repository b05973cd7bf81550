use crate::client::{ColumnMeta, ColumnType};
use crate::testing::{Call, MockConnector, profile};
use crate::{
    Clauses, ConnectionProfile, Data, Db, DbConfig, DbError, DbResult, Fetched, Func,
    InsertResult, Limit, LoadDataOptions, Mapped, QueryValue, Value,
};

fn db(mock: &MockConnector) -> Db<MockConnector> {
    let config = DbConfig::new()
        .with_connection("default", profile())
        .with_prefix("p_");
    Db::new(mock.clone(), config).unwrap()
}

fn control_calls(mock: &MockConnector) -> Vec<Call> {
    mock.calls()
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                Call::Autocommit(_) | Call::Commit | Call::Rollback
            )
        })
        .collect()
}

// ==================== Select ====================

#[tokio::test]
async fn insert_then_get_one_round_trip() {
    let mock = MockConnector::new();
    mock.push_ok(1, 5).push_rows(
        &["id", "login"],
        vec![vec![Value::Int(5), Value::from("ann")]],
    );
    let mut db = db(&mock);

    let id = db
        .insert("users", Data::new().set("login", "ann"))
        .await
        .unwrap();
    assert_eq!(id, InsertResult::Id(5));
    assert_eq!(db.insert_id(), 5);

    db.and_where("id", 5);
    let row = db.get_one("users", "*").await.unwrap();
    assert_eq!(row.get("login"), Some(&Value::from("ann")));

    assert_eq!(
        mock.executed(),
        vec![
            "INSERT INTO p_users (`login`) VALUES (?)",
            "SELECT * FROM p_users WHERE id = ? LIMIT 1",
        ]
    );
    assert_eq!(mock.last_params(), vec![Value::Int(5)]);
    assert_eq!(
        &mock.calls()[..2],
        &[Call::Connect("app".to_string()), Call::Charset("utf8".to_string())]
    );
}

#[tokio::test]
async fn get_one_without_rows_is_empty() {
    let mock = MockConnector::new();
    mock.push_rows(&["id"], vec![]);
    let mut db = db(&mock);

    let row = db.get_one("users", "id").await.unwrap();
    assert!(row.is_empty());
    assert_eq!(db.count(), 0);
}

#[tokio::test]
async fn state_resets_after_failed_statement() {
    let mock = MockConnector::new();
    mock.push_error(1064, "You have an error in your SQL syntax");
    let mut db = db(&mock);

    db.and_where("active", 1).group_by("role");
    let err = db.get("users", Limit::All, "*").await.unwrap_err();
    assert!(err.is_query_execution());
    assert_eq!(err.code(), Some(1064));
    assert!(db.state().is_pristine());
    assert_eq!(db.last_errno(), Some(1064));
    assert!(db.last_error().unwrap().contains("SQL syntax"));

    db.get("users", Limit::All, "*").await.unwrap();
    assert_eq!(mock.executed()[1], "SELECT * FROM p_users");
    assert_eq!(db.last_error(), None);
}

#[tokio::test]
async fn last_query_interpolates_parameters() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    db.and_where("login", "ann").and_where("age", 30);
    db.get_one("users", "*").await.unwrap();
    assert_eq!(
        db.last_query(),
        "SELECT * FROM p_users WHERE login = 'ann' AND age = '30' LIMIT 1"
    );
}

#[tokio::test]
async fn get_value_and_values_use_retval() {
    let mock = MockConnector::new();
    mock.push_rows(&["retval"], vec![vec![Value::Int(42)]])
        .push_rows(
            &["retval"],
            vec![vec![Value::from("a")], vec![Value::from("b")]],
        );
    let mut db = db(&mock);

    let value = db.get_value("users", "COUNT(*)").await.unwrap();
    assert_eq!(value, Some(Value::Int(42)));

    let values = db.get_values("users", "login", 10).await.unwrap();
    assert_eq!(values, vec![Value::from("a"), Value::from("b")]);

    assert_eq!(
        mock.executed(),
        vec![
            "SELECT COUNT(*) AS retval FROM p_users LIMIT 1",
            "SELECT login AS retval FROM p_users LIMIT 10",
        ]
    );
}

#[tokio::test]
async fn has_reports_matching_rows() {
    let mock = MockConnector::new();
    mock.push_rows(&["1"], vec![vec![Value::Int(1)]])
        .push_rows(&["1"], vec![]);
    let mut db = db(&mock);

    db.and_where("login", "ann");
    assert!(db.has("users").await.unwrap());
    assert!(!db.has("users").await.unwrap());
    assert_eq!(mock.executed()[0], "SELECT 1 FROM p_users WHERE login = ? LIMIT 1");
}

#[tokio::test]
async fn map_keys_rows_by_column() {
    let mock = MockConnector::new();
    mock.push_rows(
        &["id", "login"],
        vec![
            vec![Value::Int(1), Value::from("ann")],
            vec![Value::Int(2), Value::from("bob")],
        ],
    )
    .push_rows(
        &["id", "login", "age"],
        vec![vec![Value::Int(1), Value::from("ann"), Value::Int(30)]],
    );
    let mut db = db(&mock);

    db.map("id");
    let fetched = db.get("users", Limit::All, "id, login").await.unwrap();
    let keyed = fetched.keyed().unwrap();
    assert_eq!(keyed.keys().collect::<Vec<_>>(), vec!["1", "2"]);
    assert_eq!(keyed.get("2"), Some(&Mapped::Value(Value::from("bob"))));

    db.map("login");
    let fetched = db.get("users", Limit::All, "*").await.unwrap();
    match fetched.keyed().unwrap().get("ann") {
        Some(Mapped::Row(row)) => assert_eq!(row.get("age"), Some(&Value::Int(30))),
        other => panic!("expected a row, got {other:?}"),
    }
}

#[tokio::test]
async fn json_and_object_shapes_reset_after_use() {
    let mock = MockConnector::new();
    let rows = vec![vec![Value::Int(1), Value::from("ann")]];
    mock.push_rows(&["id", "login"], rows.clone())
        .push_rows(&["id", "login"], rows.clone())
        .push_rows(&["id", "login"], rows);
    let mut db = db(&mock);

    db.json_builder();
    let fetched = db.get("users", Limit::All, "*").await.unwrap();
    assert_eq!(fetched.as_json(), Some(r#"[{"id":1,"login":"ann"}]"#));

    db.object_builder();
    let fetched = db.get("users", Limit::All, "*").await.unwrap();
    assert_eq!(
        fetched.as_objects(),
        Some(&serde_json::json!([{ "id": 1, "login": "ann" }]))
    );

    let fetched = db.get("users", Limit::All, "*").await.unwrap();
    assert!(matches!(fetched, Fetched::Rows(ref rows) if rows.len() == 1));
}

#[tokio::test]
async fn nest_join_groups_joined_columns() {
    let mock = MockConnector::new();
    mock.push_rows_meta(
        vec![
            ColumnMeta::new("id", "p_users", ColumnType::Integer),
            ColumnMeta::new("title", "p_posts", ColumnType::String),
            ColumnMeta::new("total", "", ColumnType::Integer),
        ],
        vec![vec![Value::Int(1), Value::from("hello"), Value::Int(3)]],
    );
    let mut db = db(&mock);

    db.set_query_option(&["NESTJOIN"])
        .unwrap()
        .join("posts", "p_posts.user_id = p_users.id", "LEFT")
        .unwrap();
    let rows = db
        .get("users", Limit::All, "*")
        .await
        .unwrap()
        .into_rows();

    assert_eq!(
        mock.executed()[0],
        "SELECT * FROM p_users LEFT JOIN p_posts ON p_posts.user_id = p_users.id"
    );
    assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(rows[0].get("total"), Some(&Value::Int(3)));
    assert_eq!(
        rows[0].nested("posts").and_then(|r| r.get("title")),
        Some(&Value::from("hello"))
    );
}

#[tokio::test]
async fn long_columns_are_buffered_before_fetch() {
    let mock = MockConnector::new();
    mock.push_rows_meta(
        vec![ColumnMeta::new("body", "p_posts", ColumnType::Blob)],
        vec![vec![Value::from("text")]],
    );
    let mut db = db(&mock);

    db.get("posts", Limit::All, "body").await.unwrap();
    assert!(mock.calls().contains(&Call::StoreResult));
}

#[tokio::test]
async fn paginate_sets_offset_and_totals() {
    let mock = MockConnector::new();
    mock.push_rows(&["id"], vec![vec![Value::Int(21)]])
        .push_rows(&["FOUND_ROWS()"], vec![vec![Value::Int(45)]]);
    let mut db = db(&mock);

    let page = db.paginate("users", 2, "*").await.unwrap();
    assert_eq!(page.rows().map(<[_]>::len), Some(1));
    assert_eq!(
        mock.executed(),
        vec![
            "SELECT SQL_CALC_FOUND_ROWS * FROM p_users LIMIT 20, 20",
            "SELECT FOUND_ROWS()",
        ]
    );
    assert_eq!(db.total_count(), 45);
    assert_eq!(db.total_pages(), 3);
}

#[tokio::test]
async fn paginate_treats_page_zero_as_first() {
    let mock = MockConnector::new();
    let mut db = db(&mock);
    db.set_page_limit(5);

    db.paginate("users", 0, "id").await.unwrap();
    assert_eq!(
        mock.executed()[0],
        "SELECT SQL_CALC_FOUND_ROWS id FROM p_users LIMIT 0, 5"
    );
}

#[tokio::test]
async fn paginate_offset_saturates() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    db.paginate("users", u64::MAX, "id").await.unwrap();
    assert_eq!(
        mock.executed()[0],
        "SELECT SQL_CALC_FOUND_ROWS id FROM p_users LIMIT 18446744073709551615, 20"
    );
}

#[tokio::test]
async fn table_exists_checks_every_table() {
    let mock = MockConnector::new();
    mock.push_rows(&["1"], vec![vec![Value::Int(1)], vec![Value::Int(1)]])
        .push_rows(&["1"], vec![vec![Value::Int(1)]]);
    let mut db = db(&mock);

    assert!(db.table_exists(&["users", "orders"]).await.unwrap());
    assert_eq!(
        mock.executed()[0],
        "SELECT 1 FROM information_schema.tables WHERE table_schema = ? AND table_name IN (?, ?) LIMIT 2"
    );
    assert_eq!(
        mock.last_params(),
        vec![Value::from("app"), Value::from("p_users"), Value::from("p_orders")]
    );

    assert!(!db.table_exists(&["users", "missing"]).await.unwrap());
    assert!(!db.table_exists(&[]).await.unwrap());
    assert_eq!(mock.executed().len(), 2);
}

#[tokio::test]
async fn table_exists_ignores_pending_clauses() {
    let mock = MockConnector::new();
    mock.push_rows(&["1"], vec![vec![Value::Int(1)]]);
    let mut db = db(&mock);

    db.and_where("stray", 1).order_by("id", "ASC").unwrap();
    assert!(db.table_exists(&["users"]).await.unwrap());
    assert_eq!(
        mock.executed()[0],
        "SELECT 1 FROM information_schema.tables WHERE table_schema = ? AND table_name IN (?) LIMIT 1"
    );
    assert_eq!(mock.last_params(), vec![Value::from("app"), Value::from("p_users")]);
    assert!(db.state().is_pristine());
}

#[tokio::test]
async fn raw_queries() {
    let mock = MockConnector::new();
    mock.push_rows(&["n"], vec![vec![Value::Int(3)]])
        .push_rows(&["login"], vec![vec![Value::from("a")], vec![Value::from("b")]])
        .push_rows(&["login"], vec![]);
    let mut db = db(&mock);

    let value = db
        .raw_query_value("SELECT COUNT(*) AS n FROM users WHERE age > ? LIMIT 1", [18])
        .await
        .unwrap();
    assert_eq!(value, QueryValue::One(Value::Int(3)));
    assert_eq!(mock.last_params(), vec![Value::Int(18)]);

    let value = db.raw_query_value("SELECT login FROM users", ()).await.unwrap();
    assert_eq!(
        value,
        QueryValue::Many(vec![Value::from("a"), Value::from("b")])
    );

    let row = db.raw_query_one("SELECT login FROM users", ()).await.unwrap();
    assert_eq!(row, None);
}

// ==================== Writes ====================

#[tokio::test]
async fn insert_reports_outcome() {
    let mock = MockConnector::new();
    mock.push_ok(0, 0).push_ok(1, 0).push_ok(0, 0);
    let mut db = db(&mock);

    let data = || Data::new().set("login", "ann");
    assert_eq!(db.insert("users", data()).await.unwrap(), InsertResult::NotInserted);
    assert_eq!(db.insert("users", data()).await.unwrap(), InsertResult::Inserted);

    db.on_duplicate(["login"], None);
    assert_eq!(db.insert("users", data()).await.unwrap(), InsertResult::Inserted);
}

#[tokio::test]
async fn insert_with_on_duplicate() {
    let mock = MockConnector::new();
    mock.push_ok(2, 7);
    let mut db = db(&mock);

    db.on_duplicate(["login"], Some("id"));
    let result = db
        .insert("users", Data::new().set("login", "ann").set("age", 30))
        .await
        .unwrap();
    assert_eq!(result, InsertResult::Id(7));
    assert_eq!(
        mock.executed()[0],
        "INSERT INTO p_users (`login`, `age`) VALUES (?, ?) ON DUPLICATE KEY UPDATE id=LAST_INSERT_ID (id), `login` = ?"
    );
    assert_eq!(
        mock.last_params(),
        vec![Value::from("ann"), Value::Int(30), Value::from("ann")]
    );
}

#[tokio::test]
async fn replace_uses_replace_verb() {
    let mock = MockConnector::new();
    mock.push_ok(1, 3);
    let mut db = db(&mock);

    db.replace("users", Data::new().set("id", 3)).await.unwrap();
    assert_eq!(mock.executed()[0], "REPLACE INTO p_users (`id`) VALUES (?)");
}

#[tokio::test]
async fn insert_multi_commits_all_rows() {
    let mock = MockConnector::new();
    mock.push_ok(1, 1).push_ok(1, 2);
    let mut db = db(&mock);

    let rows = [Data::new().set("login", "a"), Data::new().set("login", "b")];
    let ids = db.insert_multi("users", &rows).await.unwrap();
    assert_eq!(ids, Some(vec![InsertResult::Id(1), InsertResult::Id(2)]));
    assert_eq!(
        control_calls(&mock),
        vec![Call::Autocommit(false), Call::Commit, Call::Autocommit(true)]
    );
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn insert_multi_rolls_back_on_failure() {
    let mock = MockConnector::new();
    mock.push_ok(1, 1).push_error(1062, "Duplicate entry 'b'");
    let mut db = db(&mock);

    let rows = [Data::new().set("login", "a"), Data::new().set("login", "b")];
    let ids = db.insert_multi("users", &rows).await.unwrap();
    assert_eq!(ids, None);
    assert_eq!(
        control_calls(&mock),
        vec![Call::Autocommit(false), Call::Rollback, Call::Autocommit(true)]
    );
    assert_eq!(db.last_errno(), Some(1062));
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn insert_multi_is_all_or_nothing() {
    let mock = MockConnector::new();
    mock.push_ok(1, 1)
        .push_ok(1, 2)
        .push_error(1062, "Duplicate entry 'c'");
    let mut db = db(&mock);

    let rows: Vec<Data> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|login| Data::new().set("login", *login))
        .collect();
    let ids = db.insert_multi("users", &rows).await.unwrap();
    assert_eq!(ids, None);
    assert_eq!(mock.executed().len(), 3);
    assert_eq!(
        control_calls(&mock),
        vec![Call::Autocommit(false), Call::Rollback, Call::Autocommit(true)]
    );
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn insert_multi_inside_open_transaction_leaves_it_open() {
    let mock = MockConnector::new();
    mock.push_ok(0, 0);
    let mut db = db(&mock);

    db.start_transaction().await.unwrap();
    let ids = db
        .insert_multi("users", &[Data::new().set("login", "a")])
        .await
        .unwrap();
    assert_eq!(ids, None);
    assert!(db.in_transaction());
    assert_eq!(control_calls(&mock), vec![Call::Autocommit(false)]);
}

#[tokio::test]
async fn insert_multi_keys_validates_row_width() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    let rows = vec![vec![Value::from("a"), Value::Int(1)], vec![Value::from("b")]];
    let err = db
        .insert_multi_keys("users", &["login", "age"], &rows)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn insert_multi_keys_pairs_columns() {
    let mock = MockConnector::new();
    mock.push_ok(1, 1).push_ok(1, 2);
    let mut db = db(&mock);

    let rows = vec![
        vec![Value::from("a"), Value::Int(20)],
        vec![Value::from("b"), Value::Int(30)],
    ];
    let ids = db
        .insert_multi_keys("users", &["login", "age"], &rows)
        .await
        .unwrap();
    assert_eq!(ids.map(|ids| ids.len()), Some(2));
    assert_eq!(mock.last_params(), vec![Value::from("b"), Value::Int(30)]);
}

#[tokio::test]
async fn update_renders_functions_and_limit() {
    let mock = MockConnector::new();
    mock.push_ok(1, 0);
    let mut db = db(&mock);

    db.and_where("id", 9);
    let updated = db
        .update(
            "users",
            Data::new().set("visits", Func::inc(1)).set("login", "ann"),
            1,
        )
        .await
        .unwrap();
    assert!(updated);
    assert_eq!(db.count(), 1);
    assert_eq!(
        mock.executed()[0],
        "UPDATE p_users SET `visits` = visits+1, `login` = ? WHERE id = ? LIMIT 1"
    );
    assert_eq!(mock.last_params(), vec![Value::from("ann"), Value::Int(9)]);
}

#[tokio::test]
async fn update_without_data_is_rejected() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    db.and_where("id", 1);
    let err = db.update("users", Data::new(), Limit::All).await.unwrap_err();
    assert!(matches!(err, DbError::Operation(_)));
    assert!(mock.executed().is_empty());
    assert!(db.state().is_pristine());
}

#[tokio::test]
async fn delete_with_join_targets_alias() {
    let mock = MockConnector::new();
    mock.push_ok(3, 0);
    let mut db = db(&mock);

    db.join("posts p", "p.user_id = u.id", "LEFT")
        .unwrap()
        .and_where("p.spam", 1);
    assert!(db.delete("users u", Limit::All).await.unwrap());
    assert_eq!(db.count(), 3);
    assert_eq!(
        mock.executed()[0],
        "DELETE u FROM p_users u LEFT JOIN p_posts p ON p.user_id = u.id WHERE p.spam = ?"
    );
}

// ==================== Locking and bulk load ====================

#[tokio::test]
async fn lock_and_unlock_tables() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    db.set_lock_method("read").unwrap();
    db.lock(&["users", "orders"]).await.unwrap();
    db.unlock().await.unwrap();

    assert_eq!(
        mock.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Unprepared(_)))
            .collect::<Vec<_>>(),
        vec![
            Call::Unprepared("LOCK TABLES p_users READ, p_orders READ".to_string()),
            Call::Unprepared("UNLOCK TABLES".to_string()),
        ]
    );

    assert!(db.set_lock_method("exclusive").unwrap_err().is_validation());
    assert!(db.lock(&[]).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn unlock_ends_open_transaction() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    db.start_transaction().await.unwrap();
    db.unlock().await.unwrap();
    assert!(!db.in_transaction());
    assert_eq!(
        control_calls(&mock),
        vec![Call::Autocommit(false), Call::Autocommit(true)]
    );
}

#[tokio::test]
async fn load_data_requires_existing_file() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    let err = db
        .load_data("users", "/nonexistent/users.csv", &LoadDataOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::FileNotFound(_)));
    assert!(mock.executed().is_empty());
}

#[tokio::test]
async fn load_data_runs_unprepared() {
    let mock = MockConnector::new();
    mock.push_ok(12, 0);
    let mut db = db(&mock);
    let file = tempfile::NamedTempFile::new().unwrap();

    db.load_data("users", file.path(), &LoadDataOptions::new().local())
        .await
        .unwrap();
    assert_eq!(db.count(), 12);
    let sql = &mock.executed()[0];
    assert!(sql.starts_with("LOAD DATA LOCAL INFILE '"));
    assert!(sql.ends_with("' INTO TABLE p_users FIELDS TERMINATED BY ';' LINES TERMINATED BY '\\n' IGNORE 1 LINES"));
    assert!(matches!(mock.calls().last(), Some(Call::Unprepared(_))));
}

// ==================== Connections ====================

#[tokio::test]
async fn reconnects_once_when_server_has_gone_away() {
    let mock = MockConnector::new();
    mock.push_error(2006, "MySQL server has gone away")
        .push_rows(&["id"], vec![vec![Value::Int(1)]]);
    let mut db = db(&mock);

    let rows = db.get("users", Limit::All, "id").await.unwrap().into_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(db.reconnect_count(), 1);
    assert_eq!(mock.connects(), 2);

    db.get("users", Limit::All, "id").await.unwrap();
    assert_eq!(db.reconnect_count(), 0);
}

#[tokio::test]
async fn connection_lost_inside_transaction_is_not_retried() {
    let mock = MockConnector::new();
    mock.push_ok(1, 1)
        .push_error(2006, "MySQL server has gone away");
    let mut db = db(&mock);

    let rows = [
        Data::new().set("login", "a"),
        Data::new().set("login", "b"),
        Data::new().set("login", "c"),
    ];
    let err = db.insert_multi("users", &rows).await.unwrap_err();
    assert!(err.is_connection());
    assert!(err.to_string().contains("transaction lost"));
    assert!(!db.in_transaction());
    assert_eq!(mock.connects(), 1);
    assert_eq!(mock.executed().len(), 2);
    assert_eq!(control_calls(&mock), vec![Call::Autocommit(false)]);
    assert!(!db.registry().is_connected("default"));

    // The next statement reconnects outside any transaction.
    db.get("users", Limit::All, "*").await.unwrap();
    assert_eq!(mock.connects(), 2);
    assert_eq!(db.reconnect_count(), 0);
}

#[tokio::test]
async fn connection_lost_in_explicit_transaction_ends_it() {
    let mock = MockConnector::new();
    mock.push_error(2013, "Lost connection to MySQL server during query");
    let mut db = db(&mock);

    db.start_transaction().await.unwrap();
    let err = db.get("users", Limit::All, "*").await.unwrap_err();
    assert!(err.is_connection());
    assert!(!db.in_transaction());
    assert_eq!(db.reconnect_count(), 0);
    assert_eq!(mock.executed().len(), 1);
}

#[tokio::test]
async fn second_connection_loss_is_a_connection_error() {
    let mock = MockConnector::new();
    mock.push_error(2006, "MySQL server has gone away")
        .push_error(2013, "Lost connection to MySQL server during query");
    let mut db = db(&mock);

    let err = db.get("users", Limit::All, "id").await.unwrap_err();
    assert!(err.is_connection());
    assert_eq!(db.reconnect_count(), 1);
    assert_eq!(mock.executed().len(), 2);
}

#[tokio::test]
async fn no_reconnect_when_disabled() {
    let mock = MockConnector::new();
    mock.push_error(2006, "MySQL server has gone away");
    let config = DbConfig::new()
        .with_connection("default", profile())
        .with_auto_reconnect(false);
    let mut db = Db::new(mock.clone(), config).unwrap();

    let err = db.get("users", Limit::All, "id").await.unwrap_err();
    assert_eq!(err.code(), Some(2006));
    assert_eq!(mock.connects(), 1);
}

#[tokio::test]
async fn connect_failure_is_a_connection_error() {
    let mock = MockConnector::new();
    mock.fail_next_connect(2002, "Can't connect");
    let mut db = db(&mock);

    let err = db.get("users", Limit::All, "*").await.unwrap_err();
    assert!(err.is_connection());
    assert!(db.last_error().is_some());
}

#[tokio::test]
async fn unaddressable_profile_is_rejected() {
    let mock = MockConnector::new();
    let config = DbConfig::new().with_connection("default", ConnectionProfile::default());
    let mut db = Db::new(mock.clone(), config).unwrap();

    let err = db.get("users", Limit::All, "*").await.unwrap_err();
    assert!(err.is_connection());
    assert_eq!(mock.connects(), 0);
}

#[tokio::test]
async fn connection_selection_lasts_one_statement() {
    let mock = MockConnector::new();
    let mut db = db(&mock);
    db.add_connection("reports", ConnectionProfile::new("replica", "ro", "", "reports"));

    assert!(db.connection("missing").unwrap_err().is_configuration());

    db.connection("reports").unwrap();
    db.get("totals", Limit::All, "*").await.unwrap();
    assert_eq!(db.active_connection(), "default");
    assert!(db.registry().is_connected("reports"));
    assert!(!db.registry().is_connected("default"));

    db.get("users", Limit::All, "*").await.unwrap();
    assert_eq!(
        mock.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Connect(_)))
            .collect::<Vec<_>>(),
        vec![
            Call::Connect("reports".to_string()),
            Call::Connect("app".to_string()),
        ]
    );
}

#[tokio::test]
async fn ping_reports_liveness() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    assert!(db.ping().await.unwrap());
    mock.fail_ping(2006, "gone");
    assert!(!db.ping().await.unwrap());
}

#[tokio::test]
async fn copy_shares_clauses_but_not_connections() {
    let mock = MockConnector::new();
    let mut db = db(&mock);
    db.connect("default").await.unwrap();
    db.and_where("id", 1);

    let mut copy = db.copy();
    assert!(!copy.registry().is_connected("default"));
    assert_eq!(copy.state(), db.state());

    copy.get_one("users", "*").await.unwrap();
    assert_eq!(mock.connects(), 2);
    assert!(!db.state().is_pristine());
}

#[tokio::test]
async fn escape_without_connection() {
    let mock = MockConnector::new();
    let db = db(&mock);
    assert_eq!(db.escape("it's"), "it\\'s");
}

// ==================== Transactions ====================

async fn transfer(db: &mut Db<MockConnector>, fail: bool) -> DbResult<u64> {
    crate::transaction!(db, tx, {
        tx.and_where("id", 1);
        tx.update("accounts", Data::new().set("balance", Func::dec(10)), 1)
            .await?;
        if fail {
            Err(DbError::operation("insufficient funds"))
        } else {
            Ok(tx.count())
        }
    })
}

#[tokio::test]
async fn transaction_macro_commits_on_ok() {
    let mock = MockConnector::new();
    mock.push_ok(1, 0);
    let mut db = db(&mock);

    assert_eq!(transfer(&mut db, false).await.unwrap(), 1);
    assert_eq!(
        control_calls(&mock),
        vec![Call::Autocommit(false), Call::Commit, Call::Autocommit(true)]
    );
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn transaction_macro_rolls_back_on_err() {
    let mock = MockConnector::new();
    mock.push_ok(1, 0);
    let mut db = db(&mock);

    let err = transfer(&mut db, true).await.unwrap_err();
    assert!(matches!(err, DbError::Operation(_)));
    assert_eq!(
        control_calls(&mock),
        vec![Call::Autocommit(false), Call::Rollback, Call::Autocommit(true)]
    );
}

#[tokio::test]
async fn dropped_guard_rolls_back_before_next_statement() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    {
        let mut tx = db.transaction().await.unwrap();
        tx.insert("orders", Data::new().set("total", 10)).await.unwrap();
    }
    assert!(!db.in_transaction());

    db.get("orders", Limit::All, "*").await.unwrap();
    let calls = mock.calls();
    let rollback = calls.iter().position(|c| *c == Call::Rollback).unwrap();
    let last_select = calls
        .iter()
        .rposition(|c| matches!(c, Call::Execute { sql, .. } if sql.starts_with("SELECT")))
        .unwrap();
    assert!(rollback < last_select);
    assert_eq!(calls[rollback + 1], Call::Autocommit(true));
}

#[tokio::test]
async fn guard_commit_ends_transaction() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    let tx = db.transaction().await.unwrap();
    tx.commit().await.unwrap();
    assert!(!db.in_transaction());
    assert_eq!(
        control_calls(&mock),
        vec![Call::Autocommit(false), Call::Commit, Call::Autocommit(true)]
    );
}

#[tokio::test]
async fn commit_after_dropped_guard_rolls_back_first() {
    let mock = MockConnector::new();
    let mut db = db(&mock);

    {
        let mut tx = db.transaction().await.unwrap();
        tx.insert("orders", Data::new().set("total", 10)).await.unwrap();
    }
    db.commit().await.unwrap();
    assert_eq!(
        control_calls(&mock),
        vec![
            Call::Autocommit(false),
            Call::Rollback,
            Call::Autocommit(true),
            Call::Commit,
            Call::Autocommit(true),
        ]
    );
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn transaction_pins_connection() {
    let mock = MockConnector::new();
    let mut db = db(&mock);
    db.add_connection("reports", ConnectionProfile::new("replica", "ro", "", "reports"));

    db.connection("reports").unwrap();
    db.start_transaction().await.unwrap();
    db.get("totals", Limit::All, "*").await.unwrap();
    assert_eq!(db.active_connection(), "reports");

    db.commit().await.unwrap();
    db.get("totals", Limit::All, "*").await.unwrap();
    assert_eq!(db.active_connection(), "default");
}

// ==================== Trace ====================

#[tokio::test]
async fn trace_records_statements_with_caller() {
    let mock = MockConnector::new();
    let mut db = db(&mock);
    db.set_trace(true, None);

    db.and_where("id", 2);
    let line = line!() + 1;
    db.get_one("users", "*").await.unwrap();

    let trace = db.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].sql, "SELECT * FROM p_users WHERE id = '2' LIMIT 1");
    assert!(trace[0].caller.contains("tests.rs:"));
    assert!(trace[0].caller.ends_with(&format!(":{line}")));

    db.clear_trace();
    assert!(db.trace().is_empty());
}

#[tokio::test]
async fn trace_is_off_by_default() {
    let mock = MockConnector::new();
    let mut db = db(&mock);
    db.get("users", Limit::All, "*").await.unwrap();
    assert!(db.trace().is_empty());
}
