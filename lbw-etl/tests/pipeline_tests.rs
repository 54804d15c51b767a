//! End-to-end pipeline tests
//!
//! Runs real input files through every stage against a temporary SQLite
//! warehouse and checks the resulting star schema.

mod helpers;

use helpers::{count, fact_triples, listen_line, surrogate_keys, write_listens, TestWorkspace};
use lbw_etl::Stage;

#[tokio::test]
async fn test_overlapping_files_produce_union_of_facts() {
    let ws = TestWorkspace::new().unwrap();
    let file_a = ws.input("a.json");
    let file_b = ws.input("b.json");

    write_listens(
        &file_a,
        &[
            listen_line("user1", "msid1", 1609459200, "Song A", "Artist X"),
            listen_line("user2", "msid2", 1609459260, "Song B", "Artist Y"),
        ],
    )
    .unwrap();
    // Repeats one record of A, adds one new record
    write_listens(
        &file_b,
        &[
            listen_line("user2", "msid2", 1609459260, "Song B", "Artist Y"),
            listen_line("user1", "msid3", 1609459320, "Song C", "Artist Z"),
        ],
    )
    .unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    let report_a = orchestrator.run_file(&file_a).await.unwrap();
    let report_b = orchestrator.run_file(&file_b).await.unwrap();

    assert_eq!(report_a.new_facts, Some(2));
    assert_eq!(report_b.new_facts, Some(1));

    let pool = orchestrator.warehouse().pool();
    assert_eq!(count(pool, "fact_listen").await.unwrap(), 3);
    assert_eq!(
        fact_triples(pool).await.unwrap(),
        vec![
            ("user1".to_string(), "msid1".to_string(), "2021-01-01 00:00:00".to_string()),
            ("user1".to_string(), "msid3".to_string(), "2021-01-01 00:02:00".to_string()),
            ("user2".to_string(), "msid2".to_string(), "2021-01-01 00:01:00".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_lines_in_one_file_collapse() {
    let ws = TestWorkspace::new().unwrap();
    let input = ws.input("dupes.json");
    let line = listen_line("user1", "msid1", 1609459200, "Song A", "Artist X");

    write_listens(
        &input,
        &[
            line.clone(),
            line.clone(),
            listen_line("user1", "msid2", 1609459300, "Song B", "Artist X"),
            line,
        ],
    )
    .unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    let report = orchestrator.run_file(&input).await.unwrap();

    assert_eq!(report.parse.map(|p| p.written), Some(4));
    assert_eq!(report.staged_rows, Some(4));
    assert_eq!(report.deduplicated_rows, Some(2));
    assert_eq!(report.new_facts, Some(2));
    assert_eq!(count(orchestrator.warehouse().pool(), "fact_listen").await.unwrap(), 2);
}

#[tokio::test]
async fn test_surrogate_keys_stay_contiguous_across_runs() {
    let ws = TestWorkspace::new().unwrap();
    let orchestrator = ws.orchestrator().await.unwrap();

    // Natural keys deliberately arrive out of order and overlap between runs
    let batches = [
        vec![
            listen_line("carol", "m3", 1609459200, "t3", "a"),
            listen_line("alice", "m1", 1609459201, "t1", "a"),
        ],
        vec![
            listen_line("bob", "m2", 1609459202, "t2", "a"),
            listen_line("alice", "m1", 1609459203, "t1", "a"),
        ],
        vec![
            listen_line("dave", "m4", 1609459204, "t4", "a"),
            listen_line("carol", "m5", 1609459205, "t5", "a"),
        ],
    ];

    for (i, lines) in batches.iter().enumerate() {
        let input = ws.input(&format!("run{}.json", i));
        write_listens(&input, lines).unwrap();
        orchestrator.run_file(&input).await.unwrap();
    }

    let pool = orchestrator.warehouse().pool();
    assert_eq!(surrogate_keys(pool, "dim_user", "user_sk").await.unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(surrogate_keys(pool, "dim_track", "track_sk").await.unwrap(), vec![1, 2, 3, 4, 5]);

    // First run ranks its new keys ascending: alice=1, carol=2
    let alice: i64 = sqlx::query_scalar("SELECT user_sk FROM dim_user WHERE user_id = 'alice'")
        .fetch_one(pool)
        .await
        .unwrap();
    let carol: i64 = sqlx::query_scalar("SELECT user_sk FROM dim_user WHERE user_id = 'carol'")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!((alice, carol), (1, 2));

    // Natural keys are unique, so no ranking tie is possible
    let distinct_users: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM dim_user")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(distinct_users, count(pool, "dim_user").await.unwrap());
}

#[tokio::test]
async fn test_invalid_records_never_reach_warehouse() {
    let ws = TestWorkspace::new().unwrap();
    let input = ws.input("mixed.json");

    write_listens(
        &input,
        &[
            listen_line("good", "msid-good", 1609459200, "Song", "Artist"),
            r#"{"recording_msid":"msid-no-user","listened_at":1609459200,"track_metadata":{"track_name":"x","artist_name":"y"}}"#.to_string(),
            r#"{"user_name":"no-msid","listened_at":1609459200,"track_metadata":{"track_name":"x","artist_name":"y"}}"#.to_string(),
            r#"{"user_name":"no-time","recording_msid":"msid-no-time","track_metadata":{"track_name":"x","artist_name":"y"}}"#.to_string(),
            listen_line("zero-time", "msid-zero", 0, "x", "y"),
            "this is not json".to_string(),
        ],
    )
    .unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    let report = orchestrator.run_file(&input).await.unwrap();

    let parse = report.parse.unwrap();
    assert_eq!(parse.written, 1);
    assert_eq!(parse.skipped, 5);

    let pool = orchestrator.warehouse().pool();
    let users: Vec<String> = sqlx::query_scalar("SELECT user_id FROM dim_user")
        .fetch_all(pool)
        .await
        .unwrap();
    let tracks: Vec<String> = sqlx::query_scalar("SELECT track_id FROM dim_track")
        .fetch_all(pool)
        .await
        .unwrap();
    assert_eq!(users, vec!["good".to_string()]);
    assert_eq!(tracks, vec!["msid-good".to_string()]);
    assert_eq!(count(pool, "fact_listen").await.unwrap(), 1);
}

#[tokio::test]
async fn test_titles_are_trimmed_and_lowercased() {
    let ws = TestWorkspace::new().unwrap();
    let input = ws.input("case.json");
    write_listens(&input, &[listen_line("user1", "msid1", 1609459200, " Song A ", "  Artist X")]).unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    orchestrator.run_file(&input).await.unwrap();

    let (name, artist): (String, String) =
        sqlx::query_as("SELECT track_name, artist_name FROM dim_track WHERE track_id = 'msid1'")
            .fetch_one(orchestrator.warehouse().pool())
            .await
            .unwrap();
    assert_eq!(name, "song a");
    assert_eq!(artist, "artist x");
}

#[tokio::test]
async fn test_title_variants_of_one_track_yield_one_fact() {
    let ws = TestWorkspace::new().unwrap();
    let input = ws.input("variants.json");
    write_listens(
        &input,
        &[
            listen_line("user1", "msid1", 1609459200, "Song A", "Artist X"),
            listen_line("user1", "msid1", 1609459200, "Song A (Remastered)", "Artist X"),
        ],
    )
    .unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    let report = orchestrator.run_file(&input).await.unwrap();

    assert_eq!(report.deduplicated_rows, Some(2));
    assert_eq!(report.new_facts, Some(1));

    let pool = orchestrator.warehouse().pool();
    assert_eq!(count(pool, "dim_track").await.unwrap(), 1);
    let name: String = sqlx::query_scalar("SELECT track_name FROM dim_track")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(name, "song a");
}

#[tokio::test]
async fn test_rerun_skips_completed_stages() {
    let ws = TestWorkspace::new().unwrap();
    let input = ws.input("once.json");
    write_listens(&input, &[listen_line("user1", "msid1", 1609459200, "Song A", "Artist X")]).unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    orchestrator.run_file(&input).await.unwrap();
    let second = orchestrator.run_file(&input).await.unwrap();

    assert_eq!(second.skipped_stages, Stage::ALL.to_vec());
    assert_eq!(second.new_facts, None);
    assert_eq!(count(orchestrator.warehouse().pool(), "fact_listen").await.unwrap(), 1);
}

#[tokio::test]
async fn test_reset_checkpoint_rerun_is_idempotent() {
    let ws = TestWorkspace::new().unwrap();
    let input = ws.input("again.json");
    write_listens(
        &input,
        &[
            listen_line("user1", "msid1", 1609459200, "Song A", "Artist X"),
            listen_line("user2", "msid2", 1609459201, "Song B", "Artist Y"),
        ],
    )
    .unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    orchestrator.run_file(&input).await.unwrap();

    orchestrator.reset_checkpoint(&input).unwrap();
    let rerun = orchestrator.run_file(&input).await.unwrap();

    assert!(rerun.skipped_stages.is_empty());
    assert_eq!(rerun.dimensions.map(|d| (d.new_users, d.new_tracks)), Some((0, 0)));
    assert_eq!(rerun.new_facts, Some(0));

    let pool = orchestrator.warehouse().pool();
    assert_eq!(count(pool, "fact_listen").await.unwrap(), 2);
    assert_eq!(surrogate_keys(pool, "dim_user", "user_sk").await.unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_run_dir_processes_json_files_in_order() {
    let ws = TestWorkspace::new().unwrap();
    let dir = ws.dir.path().join("raw");

    write_listens(
        &dir.join("01.json"),
        &[
            listen_line("user1", "msid1", 1609459200, "Song A", "Artist X"),
            listen_line("user2", "msid2", 1609459260, "Song B", "Artist Y"),
        ],
    )
    .unwrap();
    write_listens(
        &dir.join("nested").join("02.JSON"),
        &[
            listen_line("user2", "msid2", 1609459260, "Song B", "Artist Y"),
            listen_line("user1", "msid3", 1609459320, "Song C", "Artist Z"),
        ],
    )
    .unwrap();
    std::fs::write(dir.join("notes.txt"), "not an input").unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    let reports = orchestrator.run_dir(&dir).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports[0].run_context.ends_with("01.json"));
    assert!(reports[1].run_context.ends_with("02.JSON"));
    assert_eq!(count(orchestrator.warehouse().pool(), "fact_listen").await.unwrap(), 3);

    // Second pass: every file already ingested
    let again = orchestrator.run_dir(&dir).await.unwrap();
    assert!(again.iter().all(|r| r.skipped_stages.len() == Stage::ALL.len()));
    assert_eq!(count(orchestrator.warehouse().pool(), "fact_listen").await.unwrap(), 3);
}

#[tokio::test]
async fn test_empty_input_clears_previous_staging() {
    let ws = TestWorkspace::new().unwrap();
    let full = ws.input("full.json");
    let empty = ws.input("empty.json");
    write_listens(&full, &[listen_line("user1", "msid1", 1609459200, "Song A", "Artist X")]).unwrap();
    std::fs::write(&empty, "").unwrap();

    let orchestrator = ws.orchestrator().await.unwrap();
    orchestrator.run_file(&full).await.unwrap();
    let report = orchestrator.run_file(&empty).await.unwrap();

    assert_eq!(report.staged_rows, Some(0));
    assert_eq!(report.new_facts, Some(0));

    let pool = orchestrator.warehouse().pool();
    assert_eq!(count(pool, "stg_listens").await.unwrap(), 0);
    assert_eq!(count(pool, "stg_listens_dedup").await.unwrap(), 0);
    assert_eq!(count(pool, "fact_listen").await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_schema_file_fails_setup() {
    let mut ws = TestWorkspace::new().unwrap();
    ws.settings.schema_path = Some(ws.dir.path().join("missing.sql"));

    let result = ws.orchestrator().await;
    assert!(result.is_err());
}
