use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use predicates::prelude::*;
use tempfile::TempDir;

/// Write a PDF whose page `i` (0-indexed) is `100 + i` points wide.
fn write_pdf(dir: &Path, name: &str, pages: u32) -> PathBuf {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for i in 0..pages {
        let content = Content {
            operations: vec![Operation::new("BT", vec![]), Operation::new("ET", vec![])],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![0.into(), 0.into(), (100 + i as i64).into(), 200.into()]),
            ),
            ("Contents", Object::Reference(content_id)),
        ]);
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let tree = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(pages as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(tree));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

/// `(width, rotate)` of every page.
fn page_layout(path: &Path) -> Vec<(i64, i64)> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let page = doc.get_dictionary(id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            let width = media_box[2].as_i64().unwrap();
            let rotate = page.get(b"Rotate").and_then(|r| r.as_i64()).unwrap_or(0);
            (width, rotate)
        })
        .collect()
}

fn pagecraft(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pagecraft").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"));
    cmd
}

#[test]
fn test_info_reports_page_count() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "doc.pdf", 3);

    pagecraft(&dir)
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 pages"));
}

#[test]
fn test_info_json() {
    let dir = TempDir::new().unwrap();
    write_pdf(dir.path(), "a.pdf", 2);
    write_pdf(dir.path(), "b.pdf", 1);

    let output = pagecraft(&dir)
        .args(["info", "--json", "*.pdf"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let infos: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(infos[0]["name"], "a.pdf");
    assert_eq!(infos[0]["pages"], 2);
    assert_eq!(infos[1]["pages"], 1);
}

#[test]
fn test_split_by_ranges() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "report.pdf", 5);
    let out = dir.path().join("out");

    pagecraft(&dir)
        .arg("split")
        .arg(&pdf)
        .args(["--ranges", "4-end, 1"])
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(page_layout(&out.join("report_p1-p1.pdf")), vec![(100, 0)]);
    assert_eq!(
        page_layout(&out.join("report_p4-p5.pdf")),
        vec![(103, 0), (104, 0)]
    );
}

#[test]
fn test_split_dry_run_fixed() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "doc.pdf", 5);

    pagecraft(&dir)
        .arg("split")
        .arg(&pdf)
        .args(["--mode", "fixed", "--chunk", "2", "--prefix", "part", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("part_p1-p2.pdf"))
        .stdout(predicate::str::contains("part_p5-p5.pdf"));

    assert!(!dir.path().join("part_p1-p2.pdf").exists());
}

#[test]
fn test_split_burst() {
    let dir = TempDir::new().unwrap();
    write_pdf(dir.path(), "deck.pdf", 3);

    pagecraft(&dir)
        .args(["split", "deck.pdf", "--mode", "burst"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Split into 3 files"));

    assert_eq!(page_layout(&dir.path().join("deck_p2.pdf")), vec![(101, 0)]);
}

#[test]
fn test_split_with_no_valid_ranges_fails() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "doc.pdf", 2);

    pagecraft(&dir)
        .arg("split")
        .arg(&pdf)
        .args(["--ranges", "9-12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No valid page ranges specified"));
}

#[test]
fn test_merge_in_argument_order() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);
    let b = write_pdf(dir.path(), "b.pdf", 2);
    let out = dir.path().join("all.pdf");

    pagecraft(&dir)
        .arg("merge")
        .arg(&b)
        .arg(&a)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(page_layout(&out), vec![(100, 0), (101, 0), (100, 0)]);
}

#[test]
fn test_merge_default_name() {
    let dir = TempDir::new().unwrap();
    write_pdf(dir.path(), "a.pdf", 1);
    write_pdf(dir.path(), "b.pdf", 1);

    pagecraft(&dir).args(["merge", "a.pdf", "b.pdf"]).assert().success();

    assert_eq!(page_layout(&dir.path().join("merged.pdf")).len(), 2);
}

#[test]
fn test_merge_needs_two_files() {
    let dir = TempDir::new().unwrap();
    let a = write_pdf(dir.path(), "a.pdf", 1);

    pagecraft(&dir)
        .arg("merge")
        .arg(&a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 2 PDF files"));
}

#[test]
fn test_organize_reorder_rotate_delete() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "scan.pdf", 3);
    let out = dir.path().join("fixed.pdf");

    pagecraft(&dir)
        .arg("organize")
        .arg(&pdf)
        .args(["--order", "3,1", "--rotate", "1:90", "--delete", "2", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved 2 of 3 pages"));

    assert_eq!(page_layout(&out), vec![(102, 0), (100, 90)]);
}

#[test]
fn test_organize_default_name() {
    let dir = TempDir::new().unwrap();
    write_pdf(dir.path(), "scan.pdf", 2);

    pagecraft(&dir)
        .args(["organize", "scan.pdf", "--rotate", "2:-90"])
        .assert()
        .success();

    assert_eq!(
        page_layout(&dir.path().join("scan_organized.pdf")),
        vec![(100, 0), (101, 270)]
    );
}

#[test]
fn test_to_images_writes_archive() {
    let dir = TempDir::new().unwrap();
    let pdf = write_pdf(dir.path(), "doc.pdf", 2);

    pagecraft(&dir)
        .arg("to-images")
        .arg(&pdf)
        .args(["--width", "40", "--format", "jpg"])
        .assert()
        .success();

    let archive = fs::read(dir.path().join("doc_images.zip")).unwrap();
    assert_eq!(&archive[..2], b"PK");
}

#[test]
fn test_from_images_builds_pdf() {
    let dir = TempDir::new().unwrap();
    for (name, width) in [("1.png", 30), ("2.png", 50)] {
        image::RgbImage::from_pixel(width, 20, image::Rgb([0, 128, 255]))
            .save(dir.path().join(name))
            .unwrap();
    }
    let out = dir.path().join("album.pdf");

    pagecraft(&dir)
        .args(["from-images", "1.png", "2.png", "-o"])
        .arg(&out)
        .assert()
        .success();

    assert_eq!(page_layout(&out), vec![(30, 0), (50, 0)]);
}

#[test]
fn test_config_init_set_get() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("conf.json");

    pagecraft(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .success();

    pagecraft(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "set", "split.default_prefix", "chunk"])
        .assert()
        .success();

    pagecraft(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "get", "split.default_prefix"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chunk\""));

    pagecraft(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();

    pagecraft(&dir)
        .args(["info", "nope.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
