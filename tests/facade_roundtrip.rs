use rentral_data::{DocumentStore, FilterOperator, OrderDirection, QuerySpec, StoreMode};
use serde_json::{json, Map, Value};

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn add_then_get_round_trips_in_both_modes() {
    let store = DocumentStore::in_memory();

    for mode in [StoreMode::Primary, StoreMode::Push] {
        let added = store
            .add(
                "properties",
                fields(json!({"title": "Flat 1", "price": {"amount": 100}})),
                mode,
            )
            .await
            .unwrap();

        let read = store
            .get("properties", added.id(), mode)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.fields().get("title"), Some(&json!("Flat 1")));
        assert_eq!(read.field("price.amount"), Some(&json!(100)));
        assert!(read.created_at().is_some());
        assert_eq!(read.created_at(), read.updated_at());
        assert_eq!(read.fields(), added.fields());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_is_idempotent_in_both_modes() {
    let store = DocumentStore::in_memory();

    for mode in [StoreMode::Primary, StoreMode::Push] {
        store
            .add_with_id("properties", "p1", fields(json!({"title": "Flat 1"})), mode)
            .await
            .unwrap();
        store.delete("properties", "p1", mode).await.unwrap();
        store.delete("properties", "p1", mode).await.unwrap();
        store.delete("properties", "never-existed", mode).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn primary_range_filter_returns_exactly_the_matching_set() {
    let store = DocumentStore::in_memory();
    let prices = [("a", 30), ("b", 50), ("c", 70), ("d", 90), ("e", 10)];
    for (id, price) in prices {
        store
            .add_with_id("properties", id, fields(json!({"price": price})), StoreMode::Primary)
            .await
            .unwrap();
    }

    let spec = QuerySpec::new().filter("price", FilterOperator::GreaterThanOrEqual, 50);
    let results = store
        .query("properties", &spec, StoreMode::Primary)
        .await
        .unwrap();
    let mut ids: Vec<&str> = results.iter().map(|d| d.id()).collect();
    ids.sort();
    assert_eq!(ids, ["b", "c", "d"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn push_two_filter_query_equals_the_intersection() {
    let store = DocumentStore::in_memory();
    let rows = [
        ("a", 30, "available"),
        ("b", 60, "let"),
        ("c", 70, "available"),
        ("d", 90, "available"),
        ("e", 95, "withdrawn"),
    ];
    for (id, price, status) in rows {
        store
            .add_with_id(
                "properties",
                id,
                fields(json!({"price": price, "status": status})),
                StoreMode::Push,
            )
            .await
            .unwrap();
    }

    // Only the equality filter reaches the backend; the price range runs
    // through the emulator. The result must still be the exact intersection.
    let spec = QuerySpec::new()
        .filter("status", FilterOperator::Equal, "available")
        .filter("price", FilterOperator::GreaterThanOrEqual, 50);
    let results = store
        .query("properties", &spec, StoreMode::Push)
        .await
        .unwrap();
    let mut ids: Vec<&str> = results.iter().map(|d| d.id()).collect();
    ids.sort();
    assert_eq!(ids, ["c", "d"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn descending_limit_returns_the_top_slice_in_both_modes() {
    let store = DocumentStore::in_memory();
    let prices = [("a", 40), ("b", 90), ("c", 75), ("d", 120), ("e", 55)];

    for mode in [StoreMode::Primary, StoreMode::Push] {
        for (id, price) in prices {
            store
                .add_with_id("listings", id, fields(json!({"price": price})), mode)
                .await
                .unwrap();
        }

        let spec = QuerySpec::new()
            .order_by("price", OrderDirection::Descending)
            .limit(3);
        let results = store.query("listings", &spec, mode).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|d| d.id()).collect();
        assert_eq!(ids, ["d", "b", "c"], "mode {mode:?}");

        let listed: Vec<i64> = results
            .iter()
            .map(|d| d.field("price").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(listed, [120, 90, 75]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn listing_lifecycle_scenario() {
    let store = DocumentStore::in_memory();

    let added = store
        .add_with_id(
            "properties",
            "p1",
            fields(json!({"title": "Flat 1", "price": {"amount": 100}})),
            StoreMode::Primary,
        )
        .await
        .unwrap();
    assert_eq!(added.id(), "p1");

    let spec = QuerySpec::new().filter("price.amount", FilterOperator::GreaterThanOrEqual, 50);
    let results = store
        .query("properties", &spec, StoreMode::Primary)
        .await
        .unwrap();
    assert!(results.iter().any(|d| d.id() == "p1"));

    store.delete("properties", "p1", StoreMode::Primary).await.unwrap();

    let err = store
        .get("properties", "p1", StoreMode::Primary)
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "store/not-found");
}

#[tokio::test(flavor = "multi_thread")]
async fn update_asymmetry_holds_across_modes() {
    let store = DocumentStore::in_memory();
    let patch = fields(json!({"status": "let"}));

    let err = store
        .update("properties", "ghost", patch.clone(), StoreMode::Primary)
        .await
        .unwrap_err();
    assert_eq!(err.code_str(), "store/not-found");

    // The push store materializes missing paths on update.
    store
        .update("properties", "ghost", patch, StoreMode::Push)
        .await
        .unwrap();
    let created = store
        .get("properties", "ghost", StoreMode::Push)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.fields().get("status"), Some(&json!("let")));
}
