use milvus_cli::{
    csv_io::{self, SilentProgress, MAX_CSV_FILE_SIZE},
    error::CsvError,
    ErrorKind,
};
use serde_json::json;
use std::{fs, time::Duration};

#[test]
fn size_limit_is_inclusive() {
    let dir = scratch_dir();
    let path = dir.path().join("huge.csv");
    let file = fs::File::create(&path).unwrap();
    // Sparse: no data is written, only the length changes.
    file.set_len(MAX_CSV_FILE_SIZE).unwrap();

    let err = csv_io::read_local_csv(&path, true, &SilentProgress).unwrap_err();
    assert!(matches!(
        err,
        CsvError::FileTooLarge { size: 512_000_000, limit: 512_000_000 }
    ));
    assert_eq!(err.kind(), ErrorKind::Parameter);

    assert!(csv_io::check_file_size(MAX_CSV_FILE_SIZE - 1).is_ok());
    assert!(csv_io::check_file_size(MAX_CSV_FILE_SIZE).is_err());
}

#[tokio::test]
async fn header_row_becomes_columns() {
    let dir = scratch_dir();
    let path = dir.path().join("cars.csv");
    fs::write(&path, "vector,color,brand\n\"[0.1,0.2]\",5,7\n").unwrap();

    let table = csv_io::read_csv_file(
        path.to_str().unwrap(),
        true,
        Duration::from_secs(1),
        &SilentProgress,
    )
    .await
    .unwrap();
    assert_eq!(table.columns, vec!["vector", "color", "brand"]);
    assert_eq!(table.data, vec![vec![json!([0.1, 0.2])], vec![json!(5)], vec![json!(7)]]);
    assert_eq!(table.num_rows(), 1);
}

#[tokio::test]
async fn wrong_suffix_and_missing_files() {
    let err = csv_io::read_csv_file("data.txt", true, Duration::from_secs(1), &SilentProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, CsvError::InvalidPath(_)));

    let dir = scratch_dir();
    let missing = dir.path().join("nope.csv");
    let err = csv_io::read_local_csv(&missing, true, &SilentProgress).unwrap_err();
    assert!(matches!(err, CsvError::Io { .. }));
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        // Accept, then hold the socket open without ever answering.
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let url = format!("http://{}/vectors.csv", addr);
    assert!(csv_io::is_remote_path(&url));
    let err = csv_io::read_csv_file(&url, false, Duration::from_millis(200), &SilentProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, CsvError::NetworkTimeout(ref u) if *u == url), "{:?}", err);
    server.abort();
}

#[tokio::test]
async fn header_only_file_has_empty_columns() {
    let dir = scratch_dir();
    let path = dir.path().join("empty.csv");
    fs::write(&path, "vector,color,brand\n").unwrap();

    let table = csv_io::read_csv_file(path.to_str().unwrap(), true, Duration::from_secs(1), &SilentProgress)
        .await
        .unwrap();
    assert_eq!(table.columns.len(), table.data.len());
    assert_eq!(table.num_rows(), 0);
}

#[test]
fn malformed_cell_reports_position() {
    let dir = scratch_dir();
    let path = dir.path().join("bad.csv");
    fs::write(&path, "id,name\n1,\"\"\"ok\"\"\"\n2,plain\n").unwrap();

    match csv_io::read_local_csv(&path, true, &SilentProgress) {
        Err(CsvError::MalformedCell { row, column, .. }) => {
            assert_eq!((row, column), (3, 2));
        }
        other => panic!("expected a malformed cell, got {:?}", other),
    }
}

#[test]
fn export_then_import() {
    let dir = scratch_dir();
    let path = dir.path().join("hits.csv");
    let rows = vec![
        vec![json!(0), json!(42), json!(0.5)],
        vec![json!(0), json!("abc"), json!(1.0)],
    ];
    let headers = vec!["query".to_string(), "id".to_string(), "distance".to_string()];
    assert_eq!(csv_io::write_csv_file(&path, &rows, &headers, &SilentProgress).unwrap(), 2);

    let table = csv_io::read_local_csv(&path, true, &SilentProgress).unwrap();
    assert_eq!(table.columns, headers);
    assert_eq!(table.rows(), rows);
}

/// Temporary directory whose path has no dot before a slash, so CSV paths in it read as local.
fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new().prefix("milvus-cli").tempdir().unwrap()
}
