//! Purpose: End-to-end tests for resource access, pagination, and filtering.
//! Exports: None (integration test module).
//! Role: Validate listing semantics, error mapping, and team-scoped reads
//! Role: against a loopback fixture server.
//! Invariants: Fixture routes are registered per test; no shared state.

mod common;

use common::{FixtureServer, Route};
use elabclient::api::{CategoryRef, ErrorKind, ListQuery, Session, TeamRef, TlsPolicy};
use serde_json::json;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

fn experiment(id: i64, title: &str, status: &str) -> serde_json::Value {
    json!({"id": id, "title": title, "status_title": status})
}

#[test]
fn lists_all_records_across_pages_in_server_order() -> TestResult<()> {
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "0")],
            json!([experiment(1, "a", "Running"), experiment(2, "b", "Running")]),
        ),
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "2")],
            json!([experiment(3, "c", "Running"), experiment(4, "d", "Running")]),
        ),
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "4")],
            json!([experiment(5, "e", "Running")]),
        ),
    ]);
    let client = server.client();

    let experiments = client
        .list_experiments(ListQuery::new().with_page_size(2))
        .collect_all()?;

    let ids: Vec<i64> = experiments
        .iter()
        .map(|exp| exp.id())
        .collect::<Result<_, _>>()?;
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    // ceil(5 / 2) pages: the short third page terminates the sequence.
    assert_eq!(server.hit_count(), 3);
    Ok(())
}

#[test]
fn full_last_page_costs_one_extra_empty_fetch() -> TestResult<()> {
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "0")],
            json!([experiment(1, "a", "Running"), experiment(2, "b", "Running")]),
        ),
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "2")],
            json!([]),
        ),
    ]);
    let client = server.client();

    let experiments = client
        .list_experiments(ListQuery::new().with_page_size(2))
        .collect_all()?;

    assert_eq!(experiments.len(), 2);
    assert_eq!(server.hit_count(), 2);
    Ok(())
}

#[test]
fn explicit_has_more_signal_stops_despite_full_page() -> TestResult<()> {
    let server = FixtureServer::start(vec![Route::json(
        "GET",
        "/api/v2/experiments",
        &[("limit", "2"), ("offset", "0")],
        json!({
            "items": [experiment(1, "a", "Running"), experiment(2, "b", "Running")],
            "has_more": false
        }),
    )]);
    let client = server.client();

    let experiments = client
        .list_experiments(ListQuery::new().with_page_size(2))
        .collect_all()?;

    assert_eq!(experiments.len(), 2);
    assert_eq!(server.hit_count(), 1);
    Ok(())
}

#[test]
fn overlapping_pages_are_deduplicated_by_id() -> TestResult<()> {
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "0")],
            json!([experiment(1, "a", "Running"), experiment(2, "b", "Running")]),
        ),
        // The window shifted between fetches; record 2 appears again.
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "2")],
            json!([experiment(2, "b", "Running"), experiment(3, "c", "Running")]),
        ),
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[("limit", "2"), ("offset", "4")],
            json!([]),
        ),
    ]);
    let client = server.client();

    let ids: Vec<i64> = client
        .list_experiments(ListQuery::new().with_page_size(2))
        .collect_all()?
        .iter()
        .map(|exp| exp.id())
        .collect::<Result<_, _>>()?;

    assert_eq!(ids, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn status_filter_yields_only_matching_records() -> TestResult<()> {
    // Three matching and two non-matching experiments across pages of two;
    // the fixture leaks non-matching records past its server-side filter to
    // force the client-side re-check.
    let q = &[
        ("limit", "2"),
        ("offset", "0"),
        ("q", "status:\"Ready for Export\""),
    ];
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/experiments",
            q,
            json!([
                experiment(1, "a", "Ready for Export"),
                experiment(2, "b", "Running")
            ]),
        ),
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[
                ("limit", "2"),
                ("offset", "2"),
                ("q", "status:\"Ready for Export\""),
            ],
            json!([
                experiment(3, "c", "Ready for Export"),
                experiment(4, "d", "Ready for Export")
            ]),
        ),
        Route::json(
            "GET",
            "/api/v2/experiments",
            &[
                ("limit", "2"),
                ("offset", "4"),
                ("q", "status:\"Ready for Export\""),
            ],
            json!([experiment(5, "e", "Running")]),
        ),
    ]);
    let client = server.client();

    let query = ListQuery::new()
        .with_page_size(2)
        .with_filter(elabclient::api::Filter::Status("Ready for Export".to_string()));
    let ids: Vec<i64> = client
        .list_experiments(query)
        .collect_all()?
        .iter()
        .map(|exp| exp.id())
        .collect::<Result<_, _>>()?;

    assert_eq!(ids, vec![1, 3, 4]);
    Ok(())
}

#[test]
fn get_experiments_by_status_collects_matches() -> TestResult<()> {
    let server = FixtureServer::start(vec![Route::json(
        "GET",
        "/api/v2/experiments",
        &[
            ("limit", "50"),
            ("offset", "0"),
            ("q", "status:\"Ready for Export\""),
        ],
        json!([experiment(9, "done", "Ready for Export")]),
    )]);
    let client = server.client();

    let experiments = client.get_experiments_by_status("Ready for Export")?;
    assert_eq!(experiments.len(), 1);
    assert_eq!(
        experiments[0].status_label(),
        Some("Ready for Export".to_string())
    );
    Ok(())
}

#[test]
fn empty_result_set_is_an_empty_sequence() -> TestResult<()> {
    let server = FixtureServer::start(vec![Route::json(
        "GET",
        "/api/v2/experiments",
        &[("limit", "50"), ("offset", "0"), ("q", "status:\"Nope\"")],
        json!([]),
    )]);
    let client = server.client();

    let experiments = client.get_experiments_by_status("Nope")?;
    assert!(experiments.is_empty());
    Ok(())
}

#[test]
fn get_missing_experiment_is_not_found() -> TestResult<()> {
    let server = FixtureServer::start(Vec::new());
    let client = server.client();

    let err = client.get_experiment(99).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.resource(), Some(99));
    Ok(())
}

#[test]
fn server_error_carries_status_and_body() -> TestResult<()> {
    let server = FixtureServer::start(vec![Route::with_status(
        "GET",
        "/api/v2/experiments/3",
        &[],
        500,
        json!({"code": 500, "message": "database gone"}),
    )]);
    let client = server.client();

    let err = client.get_experiment(3).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(err.status(), Some(500));
    assert!(err.body().unwrap_or_default().contains("database gone"));
    Ok(())
}

#[test]
fn wrong_api_key_surfaces_as_api_error() -> TestResult<()> {
    let server = FixtureServer::start(vec![Route::json(
        "GET",
        "/api/v2/experiments/1",
        &[],
        json!(experiment(1, "a", "Running")),
    )]);
    let client = server.client_with_key("not-the-key");

    let err = client.get_experiment(1).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(err.status(), Some(401));
    Ok(())
}

#[test]
fn refused_connection_is_a_transport_error() -> TestResult<()> {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };
    let session = Session::new(
        format!("http://{addr}/api/v2/"),
        "key",
        TlsPolicy::DangerouslyDisableVerification,
    )?;
    let client = elabclient::api::ElabClient::new(session)?;

    let err = client.get_experiment(1).expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.status(), None);
    Ok(())
}

#[test]
fn team_scope_resolves_current_team_and_categories() -> TestResult<()> {
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/teams/current",
            &[],
            json!({"id": 4, "name": "Alpha Lab"}),
        ),
        Route::json(
            "GET",
            "/api/v2/teams/4/experiments_categories",
            &[],
            json!([
                {"id": 1, "title": "Protein"},
                {"id": 2, "title": "Calibration"}
            ]),
        ),
        Route::with_status(
            "GET",
            "/api/v2/team_tags/9",
            &[],
            404,
            json!({"code": 404, "message": "Resource not found"}),
        ),
    ]);
    let client = server.client();

    let team = client.team(TeamRef::Current)?;
    assert_eq!(team.id(), 4);

    let category = team
        .experiment_category_by_title("Calibration")?
        .expect("category");
    assert_eq!(category.id()?, 2);
    assert!(team.experiment_category_by_title("calibration")?.is_none());
    assert!(team.tag(9)?.is_none());
    Ok(())
}

#[test]
fn set_experiment_category_resolves_title_and_patches() -> TestResult<()> {
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/teams/current",
            &[],
            json!({"id": 4, "name": "Alpha Lab"}),
        ),
        Route::json(
            "GET",
            "/api/v2/teams/4/experiments_categories",
            &[],
            json!([{"id": 1, "title": "Protein"}]),
        ),
        Route::json(
            "PATCH",
            "/api/v2/experiments/12",
            &[],
            json!({"id": 12, "title": "x", "category_title": "Protein"}),
        ),
    ]);
    let client = server.client();

    let updated =
        client.set_experiment_category(12, CategoryRef::Title("Protein".to_string()))?;
    assert_eq!(updated.category_label(), Some("Protein".to_string()));
    assert!(
        server
            .hits()
            .iter()
            .any(|hit| hit == "PATCH /api/v2/experiments/12 {\"category\":1}")
    );
    Ok(())
}

#[test]
fn unknown_category_title_is_a_usage_error() -> TestResult<()> {
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/teams/current",
            &[],
            json!({"id": 4, "name": "Alpha Lab"}),
        ),
        Route::json(
            "GET",
            "/api/v2/teams/4/experiments_categories",
            &[],
            json!([{"id": 1, "title": "Protein"}]),
        ),
    ]);
    let client = server.client();

    let err = client
        .set_experiment_category(12, CategoryRef::Title("Unknown".to_string()))
        .expect_err("err");
    assert_eq!(err.kind(), ErrorKind::Usage);
    Ok(())
}

#[test]
fn items_users_and_unknown_fields() -> TestResult<()> {
    let server = FixtureServer::start(vec![
        Route::json(
            "GET",
            "/api/v2/items/3",
            &[],
            json!({"id": 3, "title": "Plasmid stock", "status_title": "In stock"}),
        ),
        Route::json(
            "GET",
            "/api/v2/users/2",
            &[],
            json!({"id": 2, "fullname": "Rosalind Franklin", "email": "rf@example.org"}),
        ),
    ]);
    let client = server.client();

    let item = client.get_item(3)?;
    assert_eq!(item.title(), Some("Plasmid stock".to_string()));
    assert_eq!(item.status_label(), Some("In stock".to_string()));
    assert!(item.field("deployment_specific").is_absent());

    let user = client.get_user(2)?;
    assert_eq!(user.fullname(), Some("Rosalind Franklin".to_string()));
    assert_eq!(user.email(), Some("rf@example.org".to_string()));
    Ok(())
}
