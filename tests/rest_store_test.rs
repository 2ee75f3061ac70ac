//! REST store tests against an in-process canned-response server

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{run_json, MockServer};
use mlflow_tracking::entities::{Metric, Param, RunStatus, Tag};
use mlflow_tracking::store::{RestStore, TrackingStore};
use mlflow_tracking::Error;

const ARTIFACTS: &str = "mlflow-artifacts:/1/r1/artifacts";

fn store(server: &MockServer) -> RestStore {
    RestStore::open(server.url(), Some("secret")).unwrap()
}

#[test]
fn test_experiments_by_name_follows_page_tokens() {
    let server = MockServer::start(|req, _| {
        let page = req.json();
        if page["page_token"].is_null() {
            (
                200,
                r#"{"experiments":[{"experiment_id":"0","name":"Default"},
                                   {"experiment_id":"1","name":"dup"}],
                    "next_page_token":"tok-2"}"#
                    .to_string(),
            )
        } else {
            (
                200,
                r#"{"experiments":[{"experiment_id":"2","name":"dup"}]}"#.to_string(),
            )
        }
    });

    let experiments = store(&server).experiments_by_name().unwrap();
    assert_eq!(experiments.len(), 2);
    assert_eq!(experiments["Default"].id(), "0");
    // Later pages overwrite duplicates.
    assert_eq!(experiments["dup"].id(), "2");

    let calls = server.requests_to("POST", "experiments/search");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].json()["max_results"], 1000);
    assert_eq!(calls[1].json()["page_token"], "tok-2");
}

#[test]
fn test_get_experiment_is_bodyless_get_with_bearer_token() {
    let server = MockServer::start(|_, _| {
        (
            200,
            r#"{"experiment":{"experiment_id":"0","name":"Default",
                "creation_time":"1700000000000","lifecycle_stage":"active"}}"#
                .to_string(),
        )
    });

    let experiment = store(&server).get_experiment("").unwrap();
    assert_eq!(experiment.id(), "0");
    assert_eq!(experiment.name(), "Default");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(
        requests[0].path,
        "/api/2.0/mlflow/experiments/get?experiment_id=0"
    );
    assert!(requests[0].body.is_empty());
    assert_eq!(requests[0].header("authorization"), Some("Bearer secret"));
}

#[test]
fn test_non_2xx_is_transport_error_with_body() {
    let server = MockServer::start(|_, _| {
        (
            404,
            r#"{"error_code":"RESOURCE_DOES_NOT_EXIST"}"#.to_string(),
        )
    });

    let err = store(&server).get_experiment("42").err().unwrap();
    match &err {
        Error::Transport { status, body, .. } => {
            assert_eq!(*status, Some(404));
            assert!(body.contains("RESOURCE_DOES_NOT_EXIST"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    // No retry.
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_undecodable_body_is_transport_error() {
    let server = MockServer::start(|_, _| (200, "not json".to_string()));

    let err = store(&server).get_experiment("1").err().unwrap();
    assert_eq!(err.status(), Some(200));
    assert!(err.to_string().contains("not json"));
}

#[test]
fn test_get_or_create_creates_missing_experiment() {
    let server = MockServer::start(|req, _| {
        if req.is("POST", "experiments/search") {
            (200, r#"{"experiments":[{"experiment_id":"0","name":"Default"}]}"#.to_string())
        } else {
            (200, r#"{"experiment_id":"7"}"#.to_string())
        }
    });

    let experiment = store(&server)
        .get_or_create_experiment_by_name("mnist")
        .unwrap();
    assert_eq!(experiment.id(), "7");
    assert_eq!(experiment.name(), "mnist");

    let created = server.requests_to("POST", "experiments/create");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].json()["name"], "mnist");
}

fn run_server() -> MockServer {
    MockServer::start(|req, _| {
        if req.is("POST", "runs/create") || req.is("GET", "runs/get") {
            (200, run_json("r1", "1", ARTIFACTS))
        } else if req.is("GET", "experiments/get") {
            (200, r#"{"experiment":{"experiment_id":"1","name":"exp"}}"#.to_string())
        } else {
            (200, "{}".to_string())
        }
    })
}

#[test]
fn test_create_run_sends_name_start_time_and_user_tag() {
    let server = run_server();
    let experiment = store(&server).get_experiment("1").unwrap();
    let run = experiment.create_run(None).unwrap();

    assert_eq!(run.id(), "r1");
    assert_eq!(run.experiment_id(), "1");
    assert_eq!(run.status(), RunStatus::Running);
    assert_eq!(run.get_tag("mlflow.user").unwrap(), "tester");
    assert_eq!(run.get_param("seed").unwrap(), "7");

    let body = server.requests_to("POST", "runs/create")[0].json();
    assert_eq!(body["experiment_id"], "1");
    assert_eq!(body["run_name"].as_str().unwrap().len(), 8);
    assert!(body["start_time"].as_i64().unwrap() > 0);
    assert_eq!(body["tags"][0]["key"], "mlflow.user");
}

#[test]
fn test_single_calls_and_local_cache() {
    let server = run_server();
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    run.set_tag("env", "prod").unwrap();
    run.log_param("lr", "0.1").unwrap();
    run.log_metric("loss", 0.5, 3).unwrap();

    assert_eq!(run.get_tag("env").unwrap(), "prod");
    assert_eq!(run.get_param("lr").unwrap(), "0.1");
    assert!(run.get_tag("missing").unwrap_err().is_not_found());

    let tag = server.requests_to("POST", "runs/set-tag")[0].json();
    assert_eq!(tag["run_id"], "r1");
    assert_eq!(tag["key"], "env");
    let metric = server.requests_to("POST", "runs/log-metric")[0].json();
    assert_eq!(metric["value"], 0.5);
    assert_eq!(metric["step"], 3);
    assert!(metric["timestamp"].as_i64().unwrap() > 0);
    assert_eq!(server.requests_to("POST", "runs/log-parameter").len(), 1);
}

#[test]
fn test_batches_are_chunked_in_order() {
    let server = run_server();
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    let metrics: Vec<Metric> = (0..2500)
        .map(|i| Metric::new(format!("m{i}"), f64::from(i)))
        .collect();
    run.log_metrics(&metrics, 9).unwrap();
    let tags: Vec<Tag> = (0..150).map(|i| Tag::new(format!("t{i}"), "v")).collect();
    run.set_tags(&tags).unwrap();

    let batches = server.requests_to("POST", "runs/log-batch");
    assert_eq!(batches.len(), 5);
    let sizes: Vec<usize> = batches[..3]
        .iter()
        .map(|b| b.json()["metrics"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![1000, 1000, 500]);
    assert_eq!(batches[1].json()["metrics"][0]["key"], "m1000");
    // One timestamp and one step for the whole call.
    let stamp = batches[0].json()["metrics"][0]["timestamp"].clone();
    assert_eq!(batches[2].json()["metrics"][499]["timestamp"], stamp);
    assert_eq!(batches[2].json()["metrics"][499]["step"], 9);

    assert_eq!(batches[3].json()["tags"].as_array().unwrap().len(), 100);
    assert_eq!(batches[4].json()["tags"].as_array().unwrap().len(), 50);
    assert_eq!(run.get_tag("t149").unwrap(), "v");
}

#[test]
fn test_failed_chunk_stops_without_rollback() {
    let batches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&batches);
    let server = MockServer::start(move |req, _| {
        if req.is("GET", "experiments/get") {
            return (200, r#"{"experiment":{"experiment_id":"1","name":"exp"}}"#.to_string());
        }
        if req.is("GET", "runs/get") {
            return (200, run_json("r1", "1", ARTIFACTS));
        }
        if req.is("POST", "runs/log-batch") && counter.fetch_add(1, Ordering::SeqCst) == 1 {
            return (500, "batch rejected".to_string());
        }
        (200, "{}".to_string())
    });
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    let params: Vec<Param> = (0..250).map(|i| Param::new(format!("p{i}"), "x")).collect();
    let err = run.log_params(&params).unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("batch rejected"));

    // Third chunk never sent; first chunk stays committed.
    assert_eq!(server.requests_to("POST", "runs/log-batch").len(), 2);
    assert_eq!(batches.load(Ordering::SeqCst), 2);
    assert_eq!(run.get_param("p99").unwrap(), "x");
    assert!(run.get_param("p100").unwrap_err().is_not_found());
}

#[test]
fn test_end_and_rename_post_run_updates() {
    let server = run_server();
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    run.set_name("renamed").unwrap();
    assert_eq!(run.name(), "renamed");
    run.fail().unwrap();
    assert_eq!(run.status(), RunStatus::Failed);
    assert!(run.info().end_time().is_some());

    let updates = server.requests_to("POST", "runs/update");
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].json()["run_name"], "renamed");
    assert!(updates[0].json().get("status").is_none());
    assert_eq!(updates[1].json()["status"], "FAILED");
    assert!(updates[1].json()["end_time"].as_i64().unwrap() > 0);

    // Finished runs still accept logging; the server decides.
    run.log_metric("late", 1.0, 0).unwrap();
}

#[test]
fn test_metric_history_pages() {
    let server = MockServer::start(|req, _| {
        if req.is("GET", "experiments/get") {
            return (200, r#"{"experiment":{"experiment_id":"1","name":"exp"}}"#.to_string());
        }
        if req.is("GET", "runs/get") {
            return (200, run_json("r1", "1", ARTIFACTS));
        }
        if req.path.contains("page_token=p2") {
            (
                200,
                r#"{"metrics":[{"key":"loss","value":0.1,"timestamp":"3","step":"2"}]}"#
                    .to_string(),
            )
        } else {
            (
                200,
                r#"{"metrics":[{"key":"loss","value":0.5,"timestamp":1,"step":0},
                               {"key":"loss","value":0.3,"timestamp":2,"step":1}],
                    "next_page_token":"p2"}"#
                    .to_string(),
            )
        }
    });
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    let history = run.metric_history("loss").unwrap();
    let steps: Vec<i64> = history.iter().map(|s| s.step).collect();
    assert_eq!(steps, vec![0, 1, 2]);
    assert!((history[2].value - 0.1).abs() < f64::EPSILON);

    let calls = server.requests_to("GET", "metrics/get-history");
    assert_eq!(calls.len(), 2);
    assert!(calls[0].path.contains("run_id=r1"));
    assert!(calls[0].path.contains("metric_key=loss"));
}

#[test]
fn test_search_runs_passes_through_filter_and_token() {
    let server = MockServer::start(|_, _| {
        let run = serde_json::from_str::<serde_json::Value>(&run_json("r9", "3", ARTIFACTS))
            .unwrap()["run"]
            .clone();
        (
            200,
            serde_json::json!({"runs": [run], "next_page_token": "next"}).to_string(),
        )
    });

    let page = store(&server)
        .search_runs(
            &["3".to_string()],
            "tags.env = 'prod'",
            &["start_time DESC".to_string()],
            "",
        )
        .unwrap();
    assert_eq!(page.runs.len(), 1);
    assert_eq!(page.runs[0].id(), "r9");
    assert_eq!(page.next_page_token, "next");

    let body = server.requests_to("POST", "runs/search")[0].json();
    assert_eq!(body["experiment_ids"][0], "3");
    assert_eq!(body["filter"], "tags.env = 'prod'");
    assert_eq!(body["order_by"][0], "start_time DESC");
    assert!(body.get("page_token").is_none());
}

fn dbfs_server(put_status: u16) -> MockServer {
    MockServer::start(move |req, base| {
        if req.is("GET", "experiments/get") {
            (200, r#"{"experiment":{"experiment_id":"1","name":"exp"}}"#.to_string())
        } else if req.is("GET", "runs/get") {
            (
                200,
                run_json("r1", "1", "dbfs:/databricks/mlflow-tracking/1/r1/artifacts"),
            )
        } else if req.is("POST", "artifacts/credentials-for-write") {
            let path = req.json()["path"][0].as_str().unwrap().to_string();
            (
                200,
                serde_json::json!({"credential_infos": [{
                    "run_id": "r1",
                    "path": path,
                    "signed_uri": format!("{base}/upload/{path}"),
                    "headers": [{"name": "x-ms-blob-type", "value": "BlockBlob"}]
                }]})
                .to_string(),
            )
        } else {
            (put_status, "upload says no".to_string())
        }
    })
}

#[test]
fn test_credentialed_upload_puts_file_to_signed_url() {
    let server = dbfs_server(200);
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.txt");
    std::fs::write(&model, "weights").unwrap();
    run.log_artifact(&model, "").unwrap();

    let creds = server.requests_to("POST", "artifacts/credentials-for-write");
    assert_eq!(creds[0].json()["run_id"], "r1");
    assert_eq!(creds[0].json()["path"][0], "model.txt");

    let puts: Vec<_> = server
        .requests()
        .into_iter()
        .filter(|r| r.method == "PUT")
        .collect();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].path, "/upload/model.txt");
    assert_eq!(puts[0].body, b"weights");
    assert_eq!(puts[0].header("x-ms-blob-type"), Some("BlockBlob"));
    // The signed URL carries its own authorization.
    assert!(puts[0].header("authorization").is_none());
}

#[test]
fn test_credentialed_upload_of_directory_keeps_leaf_name() {
    let server = dbfs_server(200);
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(data.join("nested")).unwrap();
    std::fs::write(data.join("a.csv"), "a").unwrap();
    std::fs::write(data.join("nested/b.csv"), "b").unwrap();
    run.log_artifact(&data, "inputs").unwrap();

    let paths: Vec<String> = server
        .requests_to("POST", "artifacts/credentials-for-write")
        .iter()
        .map(|r| r.json()["path"][0].as_str().unwrap().to_string())
        .collect();
    assert_eq!(paths, vec!["inputs/data/a.csv", "inputs/data/nested/b.csv"]);
}

#[test]
fn test_credentialed_upload_non_200_fails_with_body() {
    let server = dbfs_server(201);
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.txt");
    std::fs::write(&model, "weights").unwrap();
    let err = run.log_artifact(&model, "models/model.txt").unwrap_err();
    assert_eq!(err.status(), Some(201));
    assert!(err.to_string().contains("upload says no"));
}

#[test]
fn test_unknown_artifact_scheme_is_unsupported() {
    let server = MockServer::start(|req, _| {
        if req.is("GET", "experiments/get") {
            (200, r#"{"experiment":{"experiment_id":"1","name":"exp"}}"#.to_string())
        } else {
            (200, run_json("r1", "1", "s3://bucket/1/r1/artifacts"))
        }
    });
    let run = store(&server)
        .get_experiment("1")
        .unwrap()
        .get_run("r1")
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("x.txt");
    std::fs::write(&file, "x").unwrap();
    assert!(matches!(
        run.log_artifact(&file, ""),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_search_runs_sends_backtick_filter_verbatim() {
    let server = MockServer::start(|_, _| (200, "{}".to_string()));

    let page = store(&server)
        .search_runs(&["3".to_string()], "tags.`env` = 'prod'", &[], "")
        .unwrap();
    assert!(page.runs.is_empty());
    assert!(page.next_page_token.is_empty());

    let body = server.requests_to("POST", "runs/search")[0].json();
    assert_eq!(body["filter"], "tags.`env` = 'prod'");
}

#[test]
fn test_server_records_chunked_request_body() {
    let server = MockServer::start(|_, _| (200, "{}".to_string()));

    // A reader body has no known length, so it goes out chunked.
    let body = reqwest::blocking::Body::new(std::io::Cursor::new(b"streamed payload".to_vec()));
    let response = reqwest::blocking::Client::new()
        .put(format!("{}/upload/streamed.bin", server.url()))
        .body(body)
        .send()
        .unwrap();
    assert_eq!(response.status(), 200);

    let puts = server.requests();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].header("transfer-encoding"), Some("chunked"));
    assert_eq!(puts[0].body, b"streamed payload");
}
