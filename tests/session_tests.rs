use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use kqlite::kql::errors::{CompileError, ExecutionError};
use kqlite::kql::executor::QueryResult;
use kqlite::{QuerySession, SessionError};

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

// each call gets its own directory so parallel tests never share a file
fn write_csv(name: &str, contents: &str) -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("kqlite-session-{}-{}", std::process::id(), n));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write csv");
    path
}

const PEOPLE: &str = "name,city,team\nann,Oslo,red\nbob,Rome,blue\ncid,Oslo,blue\ndee,Lima,red\n";
const CITIES: &str = "city,country\nOslo,Norway\nRome,Italy\n";

async fn loaded() -> QuerySession {
    let mut session = QuerySession::new().with_validation(true);
    let people = write_csv("team people.csv", PEOPLE);
    let cities = write_csv("cities.csv", CITIES);
    let schemas = session.load_files(&[people, cities]).await.expect("load");
    assert_eq!(schemas[0].table_name, "team_people");
    assert_eq!(schemas[0].columns, vec!["name", "city", "team"]);
    session
}

#[tokio::test]
async fn filter_and_sort() {
    let session = loaded().await;
    let result = session
        .run("team_people | where city == 'Oslo' | project name | order by name desc")
        .await
        .expect("run");
    assert_eq!(result.headers, vec!["name"]);
    assert_eq!(result.rows, vec![vec!["cid".to_string()], vec!["ann".to_string()]]);
}

#[tokio::test]
async fn summarize_counts_per_group() {
    let session = loaded().await;
    let result = session
        .run("team_people | summarize members = count() by team | order by team")
        .await
        .expect("run");
    assert_eq!(result.headers, vec!["members", "team"]);
    let records: Vec<_> = result.records().collect();
    assert_eq!(records[0], vec![("members", "2"), ("team", "blue")]);
    assert_eq!(records[1], vec![("members", "2"), ("team", "red")]);
}

#[tokio::test]
async fn left_join_keeps_unmatched_rows() {
    let session = loaded().await;
    let result = session
        .run(
            "team_people | join kind=leftouter cities on city | where isempty(country) | project name",
        )
        .await
        .expect("run");
    assert_eq!(result.rows, vec![vec!["dee".to_string()]]);
}

#[tokio::test]
async fn contains_and_computed_columns() {
    let session = loaded().await;
    let result = session
        .run(
            "team_people | extend label = strcat(name, '@', city) | where label contains 'rome' \
             | project label",
        )
        .await
        .expect("run");
    assert_eq!(result.rows, vec![vec!["bob@Rome".to_string()]]);
}

fn column(result: &QueryResult, idx: usize) -> Vec<&str> {
    result.rows.iter().map(|row| row[idx].as_str()).collect()
}

#[tokio::test]
async fn aggregates_feed_later_stages() {
    let session = loaded().await;
    let result = session
        .run("team_people | summarize n = count() by team | extend twice = n * 2 | order by team")
        .await
        .expect("run");
    assert_eq!(result.headers, vec!["n", "team", "twice"]);
    assert_eq!(column(&result, 2), vec!["4", "4"]);

    let result = session
        .run("team_people | summarize n = count() by team | project team, pct = n * 100 / 4 | order by team")
        .await
        .expect("run");
    assert_eq!(result.headers, vec!["team", "pct"]);
    assert_eq!(column(&result, 1), vec!["50", "50"]);
}

#[tokio::test]
async fn join_keys_and_qualified_sorts() {
    let session = loaded().await;
    let result = session
        .run("team_people | join cities on city | where city == 'Oslo' | project name, country | order by name")
        .await
        .expect("run");
    assert_eq!(column(&result, 0), vec!["ann", "cid"]);
    assert_eq!(column(&result, 1), vec!["Norway", "Norway"]);

    let result = session
        .run("team_people | join cities on city | order by cities.country desc, name | project name")
        .await
        .expect("run");
    assert_eq!(column(&result, 0), vec!["ann", "cid", "bob"]);
}

#[tokio::test]
async fn shared_column_names_need_a_table() {
    let mut session = loaded().await;
    session.load_csv(&write_csv("teams.csv", "team,name\nred,Reds\nblue,Blues\n")).await.expect("load");

    let err = session.run("team_people | join teams on team | where name == 'Reds'").await.unwrap_err();
    assert!(matches!(err, SessionError::Compile(CompileError::AmbiguousColumn { .. })));

    let result = session
        .run("team_people | join teams on team | where teams.name == 'Reds' | project team_people.name | order by name")
        .await
        .expect("run");
    assert_eq!(column(&result, 0), vec!["ann", "dee"]);
}

#[tokio::test]
async fn contains_matches_wildcards_literally() {
    let session = loaded().await;
    assert!(session.run("team_people | where name contains 'a_n'").await.expect("run").is_empty());
    assert!(session.run("team_people | where name contains '%'").await.expect("run").is_empty());
    let result = session.run("team_people | where name contains 'nn'").await.expect("run");
    assert_eq!(column(&result, 0), vec!["ann"]);
}

#[tokio::test]
async fn compile_errors_stay_compile_errors() {
    let session = loaded().await;
    let err = session.run("team_people | frobnicate x").await.unwrap_err();
    assert!(matches!(err, SessionError::Compile(CompileError::UnknownStage { .. })));
    assert!(err.to_string().starts_with("query error:"));

    let err = session.run("team_people | where salary > 3").await.unwrap_err();
    assert!(matches!(err, SessionError::Compile(CompileError::UnknownColumn { .. })));
}

#[tokio::test]
async fn store_errors_are_execution_errors() {
    let session = QuerySession::new();
    let err = session.run("anything | take 1").await.unwrap_err();
    assert!(matches!(err, SessionError::Execution(ExecutionError::NoData)));

    let session = loaded().await;
    // passthrough SQL is not validated, so the store reports the problem
    let err = session.run("select nope from team_people").await.unwrap_err();
    assert!(matches!(err, SessionError::Execution(ExecutionError::Database { .. })));
    assert!(err.to_string().starts_with("execution error:"));
}

#[tokio::test]
async fn reloading_replaces_tables() {
    let mut session = loaded().await;
    let only = write_csv("solo.csv", "x\n1\n");
    session.load_files(&[only]).await.expect("reload");
    assert_eq!(session.registry().table_names(), vec!["solo"]);
    assert!(session.run("cities").await.is_err());
    assert_eq!(session.run("solo").await.expect("run").rows, vec![vec!["1".to_string()]]);
}

#[tokio::test]
async fn default_row_limit_applies() {
    let mut session = QuerySession::new().with_row_limit(Some(2));
    session.load_files(&[write_csv("limited.csv", PEOPLE)]).await.expect("load");
    assert_eq!(session.run("limited").await.expect("run").row_count(), 2);
    assert_eq!(session.run("limited | take 3").await.expect("run").row_count(), 3);
}
