use deps_fs::{Error, io};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_write_atomic_creates_file_and_parents() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested/dir/test.txt");

    io::write_atomic(&path, b"hello world").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
}

#[test]
fn test_write_atomic_overwrites_existing() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("test.txt");
    fs::write(&path, "original").unwrap();

    io::write_atomic(&path, b"updated").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "updated");
}

#[test]
fn test_write_atomic_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("test.txt");

    io::write_atomic(&path, b"content").unwrap();

    let names: Vec<String> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["test.txt".to_string()]);
}

#[test]
fn test_read_locked_returns_bytes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.bin");
    fs::write(&path, [0u8, 1, 2, 255]).unwrap();

    assert_eq!(io::read_locked(&path).unwrap(), vec![0u8, 1, 2, 255]);
}

#[test]
fn test_read_locked_missing_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let result = io::read_locked(&temp.path().join("missing"));
    assert!(matches!(result, Err(Error::Io { .. })));
}
