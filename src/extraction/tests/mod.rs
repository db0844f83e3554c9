use crate::error::{Error, ExtractionError};
use crate::extraction::shared::{safe_member_path, validate_extracted_paths};
use crate::extraction::*;
use crate::types::ArchiveType;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_expander() -> ArchiveExpander {
    ArchiveExpander::new(vec!["zip".into(), "rar".into(), "7z".into()])
}

/// Create a ZIP archive holding the given files (names may contain directories)
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

fn sorted_names(files: &[PathBuf], root: &Path) -> Vec<String> {
    let mut names: Vec<String> = files
        .iter()
        .map(|p| {
            p.strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[test]
fn detect_archive_type_by_extension() {
    assert_eq!(
        detect_archive_type(Path::new("course.rar")),
        Some(ArchiveType::Rar)
    );
    assert_eq!(
        detect_archive_type(Path::new("course.r00")),
        Some(ArchiveType::Rar)
    );
    assert_eq!(
        detect_archive_type(Path::new("/tmp/run-1/course.7z")),
        Some(ArchiveType::SevenZip)
    );
    assert_eq!(
        detect_archive_type(Path::new("COURSE.ZIP")),
        Some(ArchiveType::Zip)
    );
    assert_eq!(detect_archive_type(Path::new("course.tar")), None);
    assert_eq!(detect_archive_type(Path::new("course")), None);
}

#[test]
fn is_archive_follows_configured_extensions() {
    let expander = ArchiveExpander::new(vec!["zip".into()]);
    assert!(expander.is_archive(Path::new("a.zip")));
    assert!(expander.is_archive(Path::new("a.Zip")));
    assert!(!expander.is_archive(Path::new("a.rar")));
    assert!(!expander.is_archive(Path::new("a")));
}

#[test]
fn safe_member_path_rejects_escapes() {
    assert_eq!(
        safe_member_path(Path::new("dir/file.mp4")),
        Some(PathBuf::from("dir/file.mp4"))
    );
    assert_eq!(
        safe_member_path(Path::new("./file.mp4")),
        Some(PathBuf::from("file.mp4"))
    );
    assert_eq!(safe_member_path(Path::new("../evil.mp4")), None);
    assert_eq!(safe_member_path(Path::new("dir/../../evil.mp4")), None);
    assert_eq!(safe_member_path(Path::new("/etc/passwd")), None);
    assert_eq!(safe_member_path(Path::new("")), None);
}

// ---------------------------------------------------------------------------
// Expansion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_archive_passes_through_untouched() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("report.pdf");
    std::fs::write(&source, b"%PDF").unwrap();

    let files = default_expander().expand(&source, dir.path()).await.unwrap();

    assert_eq!(files, vec![source.clone()]);
    assert!(source.exists(), "non-archive must not be removed");
}

#[tokio::test]
async fn zip_with_nested_directories_is_expanded_and_removed() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("course.zip");
    create_zip_archive(
        &archive,
        &[
            ("2. Intro.mp4", b"intro"),
            ("Week 1/1. Welcome.mp4", b"welcome"),
            ("Week 1/notes.srt", b"subs"),
        ],
    );

    let files = default_expander()
        .expand(&archive, dir.path())
        .await
        .unwrap();

    assert_eq!(
        sorted_names(&files, dir.path()),
        vec!["2. Intro.mp4", "Week 1/1. Welcome.mp4", "Week 1/notes.srt"]
    );
    assert_eq!(
        std::fs::read(dir.path().join("Week 1/1. Welcome.mp4")).unwrap(),
        b"welcome"
    );
    assert!(!archive.exists(), "archive should be deleted after expansion");
}

#[tokio::test]
async fn zip_entry_escaping_destination_is_skipped() {
    let outer = TempDir::new().unwrap();
    let dest = outer.path().join("run");
    std::fs::create_dir(&dest).unwrap();
    let archive = dest.join("bad.zip");
    create_zip_archive(&archive, &[("../evil.txt", b"x"), ("good.txt", b"ok")]);

    let files = default_expander().expand(&archive, &dest).await.unwrap();

    assert_eq!(sorted_names(&files, &dest), vec!["good.txt"]);
    assert!(!outer.path().join("evil.txt").exists());
}

#[tokio::test]
async fn corrupt_zip_reports_corrupt_and_keeps_file() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("broken.zip");
    std::fs::write(&archive, b"this is not a zip archive").unwrap();

    let result = default_expander().expand(&archive, dir.path()).await;

    match result {
        Err(Error::Extraction(ExtractionError::Corrupt { archive: path, .. })) => {
            assert_eq!(path, archive);
        }
        other => panic!("expected Corrupt, got: {other:?}"),
    }
    assert!(archive.exists());
}

#[tokio::test]
async fn configured_extension_without_extractor_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bundle.tar");
    std::fs::write(&archive, b"tar").unwrap();
    let expander = ArchiveExpander::new(vec!["zip".into(), "tar".into()]);

    let result = expander.expand(&archive, dir.path()).await;

    match result {
        Err(Error::Extraction(ExtractionError::UnsupportedFormat { extension, .. })) => {
            assert_eq!(extension, "tar");
        }
        other => panic!("expected UnsupportedFormat, got: {other:?}"),
    }
}

#[tokio::test]
async fn sevenz_archive_is_expanded_without_counting_itself() {
    let src = TempDir::new().unwrap();
    std::fs::create_dir(src.path().join("Part 2")).unwrap();
    std::fs::write(src.path().join("1. Start.mp4"), b"one").unwrap();
    std::fs::write(src.path().join("Part 2/2. Next.mp4"), b"two").unwrap();

    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("course.7z");
    sevenz_rust::compress_to_path(src.path(), &archive).unwrap();

    let files = default_expander()
        .expand(&archive, dir.path())
        .await
        .unwrap();

    let names = sorted_names(&files, dir.path());
    assert_eq!(names.len(), 2, "got {names:?}");
    assert!(names.iter().any(|n| n.ends_with("1. Start.mp4")));
    assert!(names.iter().any(|n| n.ends_with("2. Next.mp4")));
    assert!(!archive.exists());
}

#[tokio::test]
async fn corrupt_rar_reports_corrupt() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("broken.rar");
    std::fs::write(&archive, b"Rar! but not really").unwrap();

    let result = default_expander().expand(&archive, dir.path()).await;

    assert!(
        matches!(
            result,
            Err(Error::Extraction(ExtractionError::Corrupt { .. }))
        ),
        "got: {result:?}"
    );
}

#[test]
fn validate_extracted_paths_rejects_symlink_traversal() {
    let temp_dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let outside_file = outside.path().join("secret.txt");
    std::fs::write(&outside_file, b"secret").unwrap();

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&outside_file, temp_dir.path().join("escape_link")).unwrap();

        let result = validate_extracted_paths(Path::new("x.7z"), temp_dir.path());
        match result {
            Err(Error::Extraction(ExtractionError::UnsafePath { .. })) => {}
            Ok(()) => panic!("symlink traversal should have been rejected"),
            other => panic!("expected UnsafePath, got: {other:?}"),
        }
    }
}

#[test]
fn validate_extracted_paths_accepts_nested_files() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
    std::fs::write(temp_dir.path().join("a/b/c.mp4"), b"c").unwrap();

    assert!(validate_extracted_paths(Path::new("x.7z"), temp_dir.path()).is_ok());
}
