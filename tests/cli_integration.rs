use assert_cmd::prelude::*;
use httpmock::{Method::GET, MockServer};
use predicates::prelude::*;
use serde_json::json;
use std::process::Command;

fn run_with_env(args: &[&str], envs: &[(&str, &str)]) -> anyhow::Result<std::process::Output> {
    let mut cmd = Command::cargo_bin("helpdesk-export")?;
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let output = cmd.args(args).arg("--log-level").arg("warn").output()?;
    Ok(output)
}

#[test]
fn version_flag_prints_version() -> anyhow::Result<()> {
    Command::cargo_bin("helpdesk-export")?
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("helpdesk-export"));
    Ok(())
}

#[test]
fn missing_resource_is_an_error() -> anyhow::Result<()> {
    let out = run_with_env(&[], &[("HELPDESK_TOKEN", "t")])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr)?;
    assert!(stderr.contains("--resource"), "stderr: {}", stderr);
    Ok(())
}

#[test]
fn users_export_writes_ndjson() -> anyhow::Result<()> {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v2/users.json")
            .query_param("page[size]", "2");
        then.status(200)
            .header("x-rate-limit", "700")
            .header("x-rate-limit-remaining", "699")
            .header("x-rate-limit-reset", "60")
            .json_body(json!({
                "users": [
                    {"id": 1, "name": "ada"},
                    {"id": 2, "name": "grace", "email": "grace@example.com"}
                ],
                "meta": {"has_more": false, "after_cursor": null}
            }));
    });

    let out = run_with_env(
        &["--resource", "users", "--page-size", "2"],
        &[
            ("HELPDESK_TOKEN", "t"),
            ("HELPDESK_API_URL", server.base_url().as_str()),
        ],
    )?;
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout)?;
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2, "stdout: {}", stdout);
    for line in lines {
        let v: serde_json::Value = serde_json::from_str(line)?;
        assert!(v.get("name").is_some());
    }
    Ok(())
}

#[test]
fn limit_stops_before_the_next_page() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m2 = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v2/users.json")
            .query_param("page[after]", "u1");
        then.status(200).json_body(json!({
            "users": [{"id": 3, "name": "never"}],
            "meta": {"has_more": false, "after_cursor": null}
        }));
    });
    let _m1 = server.mock(|when, then| {
        when.method(GET)
            .path("/api/v2/users.json")
            .query_param("page[size]", "3");
        then.status(200).json_body(json!({
            "users": [
                {"id": 1, "name": "a"},
                {"id": 2, "name": "b"}
            ],
            "meta": {"has_more": true, "after_cursor": "u1"}
        }));
    });

    let out = run_with_env(
        &["--resource", "users", "--page-size", "3", "--limit", "1"],
        &[
            ("HELPDESK_TOKEN", "t"),
            ("HELPDESK_API_URL", server.base_url().as_str()),
        ],
    )?;
    assert!(out.status.success());
    assert_eq!(m2.hits(), 0, "stopped export must not fetch another page");
    Ok(())
}

#[test]
fn comments_require_a_ticket_id() -> anyhow::Result<()> {
    let out = run_with_env(
        &["--resource", "comments"],
        &[("HELPDESK_TOKEN", "t")],
    )?;
    assert!(!out.status.success());
    let stderr = String::from_utf8(out.stderr)?;
    assert!(stderr.contains("--ticket-id"), "stderr: {}", stderr);
    Ok(())
}
