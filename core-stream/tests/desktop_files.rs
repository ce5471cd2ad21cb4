//! Streams over real files through the desktop platform.

use std::io::Write as _;
use std::sync::Arc;

use bridge_desktop::DesktopPlatform;
use core_runtime::IoConfig;
use core_stream::{IoContext, OpenMode};
use tempfile::TempDir;

fn context() -> IoContext {
    let platform = DesktopPlatform::with_io_threads(2).unwrap();
    let config = IoConfig::builder()
        .platform(Arc::new(platform))
        .buffer_capacity(64)
        .async_buffer_capacity(64)
        .reader_capacity(16)
        .build()
        .unwrap();
    IoContext::new(config).unwrap()
}

#[test]
fn test_sync_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sync.txt");
    let context = context();

    let mut writer = context.open_writer(&path, OpenMode::WRITE).unwrap();
    for i in 0..50 {
        writeln!(writer, "line {}", i).unwrap();
    }
    writer.close().unwrap();

    let expected: String = (0..50).map(|i| format!("line {}\n", i)).collect();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), expected);

    let mut reader = context.open_reader(&path).unwrap();
    let mut text = String::new();
    std::io::Read::read_to_string(&mut reader, &mut text).unwrap();
    assert_eq!(text, expected);
}

#[test]
fn test_async_writer_overlaps_and_lands_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("async.bin");
    let context = context();

    let mut writer = context.open_async_writer(&path, OpenMode::WRITE).unwrap();
    let mut expected = Vec::new();
    for round in 0..200u32 {
        let chunk: Vec<u8> = (0..(round % 97) as u8).map(|b| b ^ round as u8).collect();
        writer.write(&chunk).unwrap();
        expected.extend_from_slice(&chunk);
    }
    writer.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), expected);
}

#[test]
fn test_async_append_continues_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("append.log");
    std::fs::write(&path, b"head|").unwrap();
    let context = context();

    let mut writer = context
        .open_async_writer(&path, OpenMode::WRITE | OpenMode::APPEND)
        .unwrap();
    assert_eq!(writer.offset(), 5);
    writer.write(b"tail").unwrap();
    writer.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"head|tail");
}

#[test]
fn test_reader_seek_on_real_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("seek.txt");
    std::fs::write(&path, b"0123456789abcdefghijklmnopqrstuvwxyz").unwrap();
    let context = context();

    let mut reader = context.open_reader(&path).unwrap();
    let mut buf = [0u8; 4];
    reader.read(&mut buf).unwrap();
    assert_eq!(&buf, b"0123");

    let position = reader.seek(2, core_stream::SeekOrigin::Current).unwrap();
    assert_eq!(position, 6);
    reader.read(&mut buf).unwrap();
    assert_eq!(&buf, b"6789");
}

#[test]
fn test_missing_file_is_device_error() {
    let dir = TempDir::new().unwrap();
    let err = context()
        .open_reader(&dir.path().join("absent"))
        .unwrap_err();
    assert!(err.is_device_error());
    assert!(err.os_code().is_some());
}
