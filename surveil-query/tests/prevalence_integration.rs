//! End-to-end tests of the prebuilt query plans against an HTTP endpoint
//! double.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use surveil_query::mutation::{MutationCell, SequenceType};
use surveil_query::prelude::*;
use surveil_query::queries::{
    counts_by_category_over_time, mutations_over_time_grid, prevalence_over_time,
    prevalence_over_time_for_variants, MutationsOverTimeOptions, PrevalenceOptions,
};

fn temporal(value: &str) -> Temporal {
    value.parse().unwrap()
}

async fn mock_aggregated(server: &mut ServerGuard, body: Value, rows: Value) -> Mock {
    server
        .mock("POST", "/aggregated")
        .match_body(Matcher::Json(body))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "data": rows }).to_string())
        .create_async()
        .await
}

fn swiss() -> QueryFilter {
    QueryFilter::new().with("country", "Switzerland")
}

fn ba2() -> QueryFilter {
    swiss().with("lineage", "BA.2")
}

#[tokio::test]
async fn test_monthly_prevalence_fills_gaps_and_keeps_unknown_dates() {
    let mut server = Server::new_async().await;
    let numerator = mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "lineage": "BA.2", "fields": ["date"]}),
        json!([
            {"date": "2023-01-05", "count": 2},
            {"date": "2023-03-10", "count": 3},
            {"date": null, "count": 1},
        ]),
    )
    .await;
    let denominator = mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "fields": ["date"]}),
        json!([
            {"date": "2023-01-02", "count": 6},
            {"date": "2023-01-30", "count": 4},
            {"date": "2023-02-01", "count": 5},
            {"date": "2023-03-31", "count": 10},
            {"date": null, "count": 4},
        ]),
    )
    .await;

    let plan = prevalence_over_time(
        ba2(),
        swiss(),
        PrevalenceOptions::new(Granularity::Month),
        Arc::new(TemporalCache::new()),
    )
    .unwrap();
    let rows = plan
        .evaluate(&EvaluationContext::new(&server.url()).unwrap())
        .await
        .unwrap();

    numerator.assert_async().await;
    denominator.assert_async().await;

    let keys: Vec<Option<Temporal>> = rows.iter().map(|row| row.key).collect();
    assert_eq!(
        keys,
        vec![
            None,
            Some(temporal("2023-01")),
            Some(temporal("2023-02")),
            Some(temporal("2023-03")),
        ]
    );
    let ratios: Vec<Option<f64>> = rows.iter().map(|row| row.ratio).collect();
    assert_eq!(ratios, vec![Some(0.25), Some(0.2), Some(0.0), Some(0.3)]);

    // Default interval method is Wilson.
    for row in rows.iter() {
        let ci = row.confidence_interval.unwrap();
        assert!(ci.contains(row.ratio.unwrap()));
    }
}

#[tokio::test]
async fn test_date_range_is_widened_to_whole_buckets() {
    let mut server = Server::new_async().await;
    let numerator = mock_aggregated(
        &mut server,
        json!({
            "country": "Switzerland",
            "lineage": "BA.2",
            "dateFrom": "2023-01-01",
            "dateTo": "2023-03-31",
            "fields": ["date"],
        }),
        json!([{"date": "2023-02-14", "count": 1}]),
    )
    .await;
    let denominator = mock_aggregated(
        &mut server,
        json!({
            "country": "Switzerland",
            "dateFrom": "2023-01-01",
            "dateTo": "2023-03-31",
            "fields": ["date"],
        }),
        json!([{"date": "2023-02-14", "count": 4}]),
    )
    .await;

    let options = PrevalenceOptions::new(Granularity::Month).with_date_range(
        Some(temporal("2023-01-15")),
        Some(temporal("2023-03-02")),
    );
    let plan = prevalence_over_time(ba2(), swiss(), options, Arc::new(TemporalCache::new())).unwrap();
    let rows = plan
        .evaluate(&EvaluationContext::new(&server.url()).unwrap())
        .await
        .unwrap();

    numerator.assert_async().await;
    denominator.assert_async().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.rows()[0].ratio, Some(0.25));
}

#[tokio::test]
async fn test_smoothed_prevalence_divides_averages() {
    let mut server = Server::new_async().await;
    let days = ["2023-05-01", "2023-05-02", "2023-05-03", "2023-05-04", "2023-05-05"];
    let rows_with = |count: u64| -> Value {
        days.iter()
            .map(|day| json!({"date": day, "count": count}))
            .collect()
    };
    mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "lineage": "BA.2", "fields": ["date"]}),
        rows_with(1),
    )
    .await;
    mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "fields": ["date"]}),
        rows_with(4),
    )
    .await;

    let options = PrevalenceOptions::new(Granularity::Day)
        .with_smoothing(3)
        .with_missing_key_policy(MissingKeyPolicy::Omit);
    let plan = prevalence_over_time(ba2(), swiss(), options, Arc::new(TemporalCache::new())).unwrap();
    let rows = plan
        .evaluate(&EvaluationContext::new(&server.url()).unwrap())
        .await
        .unwrap();

    let keys: Vec<String> = rows
        .iter()
        .map(|row| row.key.unwrap().to_string())
        .collect();
    assert_eq!(keys, ["2023-05-02", "2023-05-03", "2023-05-04"]);
    assert!(rows.iter().all(|row| row.ratio == Some(0.25)));
}

#[tokio::test]
async fn test_smoothing_sparse_numerator_uses_denominator_range() {
    let mut server = Server::new_async().await;
    mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "lineage": "BA.2", "fields": ["date"]}),
        json!([{"date": "2023-01-03", "count": 3}]),
    )
    .await;
    mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "fields": ["date"]}),
        json!([
            {"date": "2023-01-01", "count": 10},
            {"date": "2023-01-02", "count": 10},
            {"date": "2023-01-03", "count": 10},
            {"date": "2023-01-04", "count": 10},
            {"date": "2023-01-05", "count": 10},
        ]),
    )
    .await;

    let options = PrevalenceOptions::new(Granularity::Day).with_smoothing(3);
    let plan = prevalence_over_time(ba2(), swiss(), options, Arc::new(TemporalCache::new())).unwrap();
    let rows = plan
        .evaluate(&EvaluationContext::new(&server.url()).unwrap())
        .await
        .unwrap();

    let keys: Vec<String> = rows
        .iter()
        .map(|row| row.key.unwrap().to_string())
        .collect();
    assert_eq!(keys, ["2023-01-02", "2023-01-03", "2023-01-04"]);
    for row in rows.iter() {
        assert!((row.ratio.unwrap() - 0.1).abs() < 1e-12, "{row:?}");
        assert!(row.confidence_interval.unwrap().contains(row.ratio.unwrap()));
    }
}

#[tokio::test]
async fn test_variants_share_denominator_filter() {
    let mut server = Server::new_async().await;
    mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "lineage": "BA.2", "fields": ["date"]}),
        json!([{"date": "2023-01-01", "count": 1}]),
    )
    .await;
    mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "lineage": "BA.5", "fields": ["date"]}),
        json!([{"date": "2023-01-01", "count": 3}]),
    )
    .await;
    let denominator = server
        .mock("POST", "/aggregated")
        .match_body(Matcher::Json(json!({"country": "Switzerland", "fields": ["date"]})))
        .with_status(200)
        .with_body(json!({"data": [{"date": "2023-01-01", "count": 4}]}).to_string())
        .expect(2)
        .create_async()
        .await;

    let ctx = EvaluationContext::new(&server.url()).unwrap();
    let results = prevalence_over_time_for_variants(
        &ctx,
        vec![
            ("BA.2".to_string(), ba2()),
            ("BA.5".to_string(), swiss().with("lineage", "BA.5")),
        ],
        swiss(),
        PrevalenceOptions::new(Granularity::Day),
        Arc::new(TemporalCache::new()),
    )
    .await
    .unwrap();

    denominator.assert_async().await;
    assert_eq!(results[0].name, "BA.2");
    assert_eq!(results[0].rows.rows()[0].ratio, Some(0.25));
    assert_eq!(results[1].name, "BA.5");
    assert_eq!(results[1].rows.rows()[0].ratio, Some(0.75));
}

#[tokio::test]
async fn test_malformed_date_fails_the_plan() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/aggregated")
        .with_status(200)
        .with_body(json!({"data": [{"date": "2023-13-01", "count": 1}]}).to_string())
        .create_async()
        .await;

    let plan = prevalence_over_time(
        ba2(),
        swiss(),
        PrevalenceOptions::new(Granularity::Week),
        Arc::new(TemporalCache::new()),
    )
    .unwrap();
    let err = plan
        .evaluate(&EvaluationContext::new(&server.url()).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidTemporalFormat { .. }));
}

#[tokio::test]
async fn test_category_grid_fills_zeros() {
    let mut server = Server::new_async().await;
    mock_aggregated(
        &mut server,
        json!({"country": "Switzerland", "fields": ["lineage", "date"]}),
        json!([
            {"lineage": "JN.1", "date": "2024-01-10", "count": 3},
            {"lineage": "KP.2", "date": "2024-03-02", "count": 2},
            {"lineage": "JN.1", "date": null, "count": 5},
            {"lineage": null, "date": "2024-02-20", "count": 1},
        ]),
    )
    .await;

    let ctx = EvaluationContext::new(&server.url()).unwrap();
    let grid = counts_by_category_over_time(
        &ctx,
        swiss(),
        "lineage",
        "date",
        Granularity::Month,
        &TemporalCache::new(),
    )
    .await
    .unwrap();

    assert_eq!(grid.first_axis_keys(), ["JN.1", "KP.2", "null"]);
    assert_eq!(
        grid.second_axis_keys(),
        [temporal("2024-01"), temporal("2024-02"), temporal("2024-03")]
    );
    assert_eq!(grid.get_row_or(&"JN.1".to_string(), 0), vec![3, 0, 0]);
    assert_eq!(grid.get_row_or(&"KP.2".to_string(), 0), vec![0, 0, 2]);
    assert_eq!(grid.get(&"null".to_string(), &temporal("2024-02")), Some(&1));
}

#[tokio::test]
async fn test_mutation_grid_classifies_cells() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/component/aminoAcidMutationsOverTime")
        .match_body(Matcher::PartialJson(json!({
            "filters": {"country": "Switzerland"},
            "includeMutations": ["S:N501Y"],
            "dateField": "date",
            "dateRanges": [
                {"dateFrom": "2024-01-01", "dateTo": "2024-01-31"},
                {"dateFrom": "2024-02-01", "dateTo": "2024-02-29"},
                {"dateFrom": "2024-03-01", "dateTo": "2024-03-31"},
            ],
        })))
        .with_status(200)
        .with_body(
            json!({"data": {
                "data": [[
                    {"count": 4, "coverage": 8},
                    {"count": 1, "coverage": 2},
                    {"count": 0, "coverage": 0},
                ]],
                "mutations": ["S:N501Y"],
                "dateRanges": [
                    {"dateFrom": "2024-01-01", "dateTo": "2024-01-31"},
                    {"dateFrom": "2024-02-01", "dateTo": "2024-02-29"},
                    {"dateFrom": "2024-03-01", "dateTo": "2024-03-31"},
                ],
                "totalCountsByDateRange": [10, 7, 0],
            }})
            .to_string(),
        )
        .create_async()
        .await;

    let options = MutationsOverTimeOptions::new(
        Granularity::Month,
        temporal("2024-01-20"),
        temporal("2024-03-05"),
    )
    .with_min_coverage(5);
    let ctx = EvaluationContext::new(&server.url()).unwrap();
    let grid = mutations_over_time_grid(
        &ctx,
        SequenceType::AminoAcid,
        swiss(),
        vec!["S:N501Y".to_string()],
        &options,
    )
    .await
    .unwrap();

    mock.assert_async().await;
    let code = "S:N501Y".to_string();
    assert_eq!(
        grid.get(&code, &temporal("2024-01")),
        Some(&Some(MutationCell::ValueWithCoverage {
            count: 4,
            coverage: 8,
            total_count: 10,
        }))
    );
    assert_eq!(
        grid.get(&code, &temporal("2024-02")),
        Some(&Some(MutationCell::BelowThreshold { total_count: 7 }))
    );
    // An empty bucket has no value at all.
    assert_eq!(grid.get(&code, &temporal("2024-03")), Some(&None));
}
