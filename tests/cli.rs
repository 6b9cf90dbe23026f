use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 生成若干张颜色分布不同的图片
fn dataset(dir: &Path, count: u32) -> Result<Vec<PathBuf>> {
    let mut paths = vec![];
    for i in 0..count {
        let image = RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * (i + 2) % 256) as u8, (y * (3 * i + 1) % 256) as u8, (i * 50 % 256) as u8])
        });
        let path = dir.join(format!("{}.png", i));
        image.save(&path)?;
        paths.push(path);
    }
    Ok(paths)
}

#[test]
fn gen_hash_refuses_to_overwrite() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;

    cargo_run!("imsim", "-c", conf_dir.path(), "gen-hash").success();
    conf_dir.child("hash.bit_sampling").assert(predicate::path::is_file());
    conf_dir.child("hash.lsh").assert(predicate::path::is_file());

    cargo_run!("imsim", "-c", conf_dir.path(), "gen-hash").failure();
    cargo_run!("imsim", "-c", conf_dir.path(), "gen-hash", "--overwrite", "--seed", "7").success();

    Ok(())
}

#[rstest]
#[case(&["-f", "color_layout"], &[])]
#[case(&["-f", "color_histogram:bit_sampling"], &["--hash", "bit_sampling"])]
#[case(&["-f", "edge_histogram:lsh"], &["--hash", "lsh", "--limit", "3"])]
fn add_and_search(#[case] add_args: &[&str], #[case] search_args: &[&str]) -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let paths = dataset(images.path(), 5)?;
    images.child("notes.txt").write_str("不是图片")?;

    cargo_run!("imsim", "-c", conf_dir.path(), "gen-hash").success();
    cargo_run!("imsim", "-c", conf_dir.path(), "add", images.path(), add_args[0], add_args[1])
        .success();

    let feature = add_args[1].split(':').next().unwrap();
    let mut cmd = Command::cargo_bin("imsim")?;
    cmd.arg("-c")
        .arg(conf_dir.path())
        .arg("search")
        .arg(&paths[3])
        .args(["-f", feature, "--count", "5"])
        .args(search_args);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("2.00\t"))
        .stdout(predicate::str::contains(paths[3].to_str().unwrap()));

    Ok(())
}

#[test]
fn add_skips_duplicates() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let paths = dataset(images.path(), 2)?;
    std::fs::copy(&paths[0], images.path().join("copy.png"))?;

    cargo_run!("imsim", "-c", conf_dir.path(), "add", images.path(), "-f", "color_layout")
        .success();
    cargo_run!("imsim", "-c", conf_dir.path(), "add", images.path(), "-f", "color_layout")
        .success();

    cargo_run!(
        "imsim",
        "-c",
        conf_dir.path(),
        "search",
        "--doc",
        "0",
        "-f",
        "color_layout",
        "--output-format",
        "json"
    )
    .success()
    .stdout(predicate::str::contains("\"doc\": 1"))
    .stdout(predicate::str::contains("\"doc\": 2").not());

    Ok(())
}

#[test]
fn add_loads_only_requested_hash_tables() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    dataset(images.path(), 1)?;

    Command::cargo_bin("imsim")?
        .env("RUST_LOG", "warn")
        .arg("-c")
        .arg(conf_dir.path())
        .arg("add")
        .arg(images.path())
        .args(["-f", "color_layout"])
        .assert()
        .success()
        .stderr(predicate::str::contains("哈希参数表").not());

    Command::cargo_bin("imsim")?
        .env("RUST_LOG", "warn")
        .arg("-c")
        .arg(conf_dir.path())
        .arg("add")
        .arg(images.path())
        .args(["-f", "edge_histogram:lsh"])
        .assert()
        .success()
        .stderr(predicate::str::contains("哈希参数表 LSH 不存在"))
        .stderr(predicate::str::contains("哈希参数表 BIT_SAMPLING").not());

    Ok(())
}

#[test]
fn search_requires_image_or_doc() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;

    cargo_run!("imsim", "-c", conf_dir.path(), "search", "-f", "color_layout").failure();
    cargo_run!("imsim", "-c", conf_dir.path(), "search", "--doc", "0", "-f", "color_layout", "--limit", "3")
        .failure();

    Ok(())
}

#[test]
fn search_with_explanation() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let images = assert_fs::TempDir::new()?;
    let paths = dataset(images.path(), 3)?;

    cargo_run!("imsim", "-c", conf_dir.path(), "add", images.path(), "-f", "color_layout")
        .success();
    cargo_run!(
        "imsim",
        "-c",
        conf_dir.path(),
        "search",
        &paths[1],
        "-f",
        "color_layout",
        "--boost",
        "3",
        "--explain"
    )
    .success()
    .stdout(predicate::str::starts_with("6.00\t"))
    .stdout(predicate::str::contains("boost"));

    Ok(())
}
