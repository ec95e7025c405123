//! End-to-end grid queries against an in-memory cube

use qube::{
    CacheScope, ContainerId, CubeCache, CubeConnection, CubeDefinition, CubeFixture,
    ExprRequest, HierarchyDefinition, MemberSet, MemoryCube, Operator, QubeExpr, QubeQuery,
    QueryRequest, SchemaId,
};
use std::sync::Arc;

/// S1 saw V1 and V2, S2 saw V1, S3 saw nothing
fn study() -> MemoryCube {
    let def = CubeDefinition::new("Study")
        .hierarchy(HierarchyDefinition::flat("Subject", ["S1", "S2", "S3"]))
        .hierarchy(HierarchyDefinition::flat("Visit", ["V1", "V2"]))
        .count_distinct("SubjectCount", "[Subject].[Subject]");
    let fixture = CubeFixture::new(def)
        .fact([("Subject", "S1"), ("Visit", "V1")])
        .fact([("Subject", "S1"), ("Visit", "V2")])
        .fact([("Subject", "S2"), ("Visit", "V1")]);
    MemoryCube::from_fixture(fixture).unwrap()
}

fn scope(cache: &CubeCache, container: &str) -> CacheScope {
    cache.scope(ContainerId::new(container).unwrap(), SchemaId::new("study").unwrap())
}

fn subject_by_visit(cube: &MemoryCube) -> QubeQuery {
    let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
    let visits = Arc::clone(cube.cube().level("[Visit].[Visit]").unwrap());
    QubeQuery::new(Arc::clone(&subjects))
        .on_rows(QubeExpr::level(subjects))
        .on_columns(QubeExpr::level(visits))
}

#[test]
fn test_subject_by_visit_grid() {
    let cube = study();
    let cache = CubeCache::default();

    let result = qube::evaluate(&cube, scope(&cache, "c1"), &subject_by_visit(&cube)).unwrap();
    assert_eq!(result.grid.to_rows(), vec![vec![1, 1], vec![1, 0], vec![0, 0]]);
    assert_eq!(result.grid.get_by_name("[Subject].[S1]", "[Visit].[V2]"), Some(1));
    assert_eq!(result.grid.get_by_name("[Subject].[S3]", "[Visit].[V1]"), Some(0));
}

#[test]
fn test_subject_rows_only() {
    let cube = study();
    let cache = CubeCache::default();
    let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());

    let query = QubeQuery::new(Arc::clone(&subjects)).on_rows(QubeExpr::level(subjects));
    let result = qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    assert_eq!(result.grid.to_rows(), vec![vec![1], vec![1], vec![0]]);
}

#[test]
fn test_population_without_axes() {
    let cube = study();
    let cache = CubeCache::default();
    let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());

    let result = qube::evaluate(&cube, scope(&cache, "c1"), &QubeQuery::new(subjects)).unwrap();
    assert_eq!(result.grid.to_rows(), vec![vec![2]]);
}

#[test]
fn test_filter_narrows_rows_on_measure_level() {
    let cube = study();
    let cache = CubeCache::default();
    let subjects = Arc::clone(cube.cube().level("[Subject].[Subject]").unwrap());
    let filter = MemberSet::from_ordinals(subjects, [0, 1]).unwrap();

    let query = subject_by_visit(&cube).filter(QubeExpr::set(filter));
    let result = qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    assert_eq!(result.grid.to_rows(), vec![vec![1, 1], vec![1, 0]]);
}

#[test]
fn test_repeated_query_is_served_from_cache() {
    let cube = study();
    let cache = CubeCache::default();
    let query = subject_by_visit(&cube);

    let first = qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    let executed = cube.execute_count();
    assert!(executed > 0);

    let second = qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    assert_eq!(cube.execute_count(), executed);
    assert_eq!(second.grid, first.grid);
    assert_eq!(second.stats.cube_queries, 0);
}

#[test]
fn test_invalidating_one_container_keeps_the_other() {
    let cube = study();
    let cache = CubeCache::default();
    let query = subject_by_visit(&cube);

    qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    qube::evaluate(&cube, scope(&cache, "c2"), &query).unwrap();
    assert!(cache.invalidate_container(&ContainerId::new("c1").unwrap()) > 0);

    cube.reset_counters();
    qube::evaluate(&cube, scope(&cache, "c2"), &query).unwrap();
    assert_eq!(cube.execute_count(), 0);

    qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    assert!(cube.execute_count() > 0);
}

#[test]
fn test_cache_survives_reconnect() {
    let cube = study();
    let cache = CubeCache::default();
    qube::evaluate(&cube, scope(&cache, "c1"), &subject_by_visit(&cube)).unwrap();

    let again = cube.reconnect().unwrap();
    let result = qube::evaluate(&again, scope(&cache, "c1"), &subject_by_visit(&again)).unwrap();
    assert_eq!(result.grid.to_rows(), vec![vec![1, 1], vec![1, 0], vec![0, 0]]);
    assert_eq!(again.execute_count(), 0);
}

#[test]
fn test_json_request() {
    let cube = study();
    let cache = CubeCache::default();
    let request = QueryRequest::from_json(
        r#"{
            "countDistinctMeasure": "SubjectCount",
            "onRows": {
                "operator": "MEMBERS",
                "level": "[Subject].[Subject]",
                "membersQuery": {"operator": "MEMBERS", "members": ["[Visit].[V1]"]}
            },
            "onColumns": {"operator": "MEMBERS", "level": "[Visit].[Visit]"}
        }"#,
    )
    .unwrap();
    let query = request.resolve(cube.cube()).unwrap();

    let result = qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    let rows: Vec<&str> = result.grid.rows.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(rows, vec!["S1", "S2"]);
    assert_eq!(result.grid.to_rows(), vec![vec![1, 1], vec![1, 0]]);
}

#[test]
fn test_crossjoin_request_filter() {
    let cube = study();
    let cache = CubeCache::default();
    let request = QueryRequest {
        count_distinct_level: Some("[Subject].[Subject]".to_string()),
        on_columns: Some(ExprRequest::level("[Visit].[Visit]")),
        filter: Some(ExprRequest::op(
            Operator::CrossJoin,
            vec![
                ExprRequest::members(["[Visit].[V2]"]),
                ExprRequest::level("[Subject].[Subject]"),
            ],
        )),
        ..Default::default()
    };
    let query = request.resolve(cube.cube()).unwrap();

    let result = qube::evaluate(&cube, scope(&cache, "c1"), &query).unwrap();
    assert_eq!(result.grid.to_rows(), vec![vec![1, 1]]);
}
