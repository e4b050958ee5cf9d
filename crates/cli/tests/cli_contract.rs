use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;

fn scrawl(assets: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("scrawl");
    cmd.env("SCRAWL_ASSETS_DIR", assets)
        .env_remove("SCRAWL_MAX_SURFACES")
        .env_remove("SCRAWL_TEXTURE_BUDGET_MB")
        .env_remove("SCRAWL_HEAP_LIMIT_MB");
    cmd
}

fn json(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("stdout should contain valid json")
}

#[test]
fn layout_emits_metrics_json() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output = scrawl(temp.path())
        .args(["layout", "--width", "800", "--height", "1000", "--font-size", "24", "--level", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = json(&output);
    assert_eq!(value["top_margin"], 40.0);
    assert_eq!(value["bottom_margin"], 40.0);
    assert_eq!(value["side_margin"], 36.0);
    assert_eq!(value["available_width"], 728.0);
    assert_eq!(value["lines_per_page"], 24);
    assert_eq!(value["words_per_page"], 212);
}

#[test]
fn render_writes_png_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("out").join("page.png");

    let output = scrawl(temp.path())
        .args(["render", "Dear diary, today I wrote a letter."])
        .args(["--width", "300", "--height", "320", "--render-scale", "1"])
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = json(&output);
    assert_eq!(value["mode"], "full");
    assert_eq!(value["width"], 300);
    assert_eq!(value["height"], 320);
    assert_eq!(value["fallback"], false);
    assert!(value["glyphs_drawn"].as_u64().unwrap() > 0);

    let image = image::open(&output_path).expect("output should be readable image");
    assert_eq!((image.width(), image.height()), (300, 320));
}

#[test]
fn render_reads_text_from_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let input = temp.path().join("letter.txt");
    std::fs::write(&input, "first line\nsecond line\n\nfourth line").unwrap();
    let output_path = temp.path().join("page.png");

    let output = scrawl(temp.path())
        .arg("render")
        .arg("--input")
        .arg(&input)
        .args(["--render-scale", "1", "--no-blending"])
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = json(&output);
    assert_eq!(value["lines_drawn"], 4);
    assert_eq!(value["blended"], false);
}

#[test]
fn render_uses_paper_texture_from_assets_dir() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    RgbaImage::from_pixel(120, 150, Rgba([230, 214, 180, 255]))
        .save(temp.path().join("kraft.png"))
        .unwrap();
    let output_path = temp.path().join("page.png");

    let output = scrawl(temp.path())
        .args(["render", "on kraft paper", "--paper", "kraft.png", "--render-scale", "1"])
        .args(["--width", "240", "--height", "300"])
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert_eq!(json(&output)["used_texture"], true);
}

#[test]
fn render_falls_back_to_flat_paper_for_missing_texture() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("page.png");

    let output = scrawl(temp.path())
        .args(["render", "still renders", "--paper", "missing.png", "--render-scale", "1"])
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = json(&output);
    assert_eq!(value["used_texture"], false);
    assert_eq!(value["mode"], "full");
    assert!(output_path.exists());
}

#[test]
fn render_without_paper_draws_placeholder() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("page.png");

    scrawl(temp.path())
        .args(["render", "ignored", "--no-paper"])
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"placeholder\""));
}

#[test]
fn render_rejects_invalid_ink() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    scrawl(temp.path())
        .args(["render", "hi", "--ink", "#12345", "-o", "page.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid ink color"));
}

#[test]
fn render_fails_for_invalid_config() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config = temp.path().join("scrawl.toml");
    std::fs::write(&config, "[pool]\nmax_surfaces = 0\n").unwrap();

    scrawl(temp.path())
        .arg("--config")
        .arg(&config)
        .args(["render", "hi", "-o"])
        .arg(temp.path().join("page.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn render_fails_for_invalid_env_override() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    scrawl(temp.path())
        .env("SCRAWL_MAX_SURFACES", "plenty")
        .args(["render", "hi", "-o"])
        .arg(temp.path().join("page.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("SCRAWL_MAX_SURFACES"));
}

#[test]
fn bench_reports_memory_and_performance() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output = scrawl(temp.path())
        .args(["bench", "--iterations", "3", "--width", "240", "--height", "240"])
        .args(["--render-scale", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = json(&output);
    assert_eq!(value["iterations"], 3);
    assert_eq!(value["performance"]["render_count"], 3);
    assert!(value["performance"]["score"].as_u64().unwrap() <= 100);
    let pressure = value["memory"]["pressure"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&pressure));
    assert!(value["memory"]["level"].is_string());
}

#[test]
fn version_prints_package_version() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    scrawl(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
