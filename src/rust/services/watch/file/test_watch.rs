use std::fs;

use super::*;

fn options() -> WatchOptions {
    WatchOptions {
        debounce: Duration::from_millis(100),
        poll_interval: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_burst_of_writes_is_one_change() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("user.h");
    fs::write(&file, "// v1\n").unwrap();

    let watcher = FileWatcher::new(Arc::new(Logger::new()));
    let mut stream = watcher.watch(&file, options()).unwrap();
    assert_eq!(stream.path(), file.as_path());

    for n in 2..5 {
        fs::write(&file, format!("// v{n}\n")).unwrap();
    }
    let changed = timeout(Duration::from_secs(10), stream.next_change())
        .await
        .expect("change reported")
        .unwrap();
    assert_eq!(changed, file);

    // nothing else pending once the burst has been collapsed
    assert!(
        timeout(Duration::from_millis(400), stream.next_change())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_sibling_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("user.h");
    fs::write(&file, "// v1\n").unwrap();

    let watcher = FileWatcher::new(Arc::new(Logger::new()));
    let mut stream = watcher.watch(&file, options()).unwrap();

    fs::write(dir.path().join("notes.txt"), "unrelated").unwrap();
    assert!(
        timeout(Duration::from_millis(400), stream.next_change())
            .await
            .is_err()
    );
}

#[test]
fn test_missing_directory_is_an_error() {
    let watcher = FileWatcher::new(Arc::new(Logger::new()));
    assert!(
        watcher
            .watch("/definitely/not/here/user.h", options())
            .is_err()
    );
}
