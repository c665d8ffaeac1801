// End-to-end checks for the harness binary. Fake shortest-path executables
// (sh scripts) stand in for the real binaries: they echo the graph file as
// their "matrix" followed by the same trailing timing lines the suites expect.

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SERIAL_PROGRAM: &str = r#"#!/bin/sh
input=""
while [ "$#" -gt 0 ]; do
    case "$1" in
        --inputFile) input="$2"; shift 2 ;;
        *) shift ;;
    esac
done
echo "Final matrix"
cat "$input"
echo "Time taken: 1.0e-03"
"#;

const PARALLEL_PROGRAM: &str = r#"#!/bin/sh
input=""
threads=1
while [ "$#" -gt 0 ]; do
    case "$1" in
        --inputFile) input="$2"; shift 2 ;;
        --nThreads) threads="$2"; shift 2 ;;
        *) shift ;;
    esac
done
echo "Final matrix"
cat "$input"
echo "thread_id, time_taken"
i=0
while [ "$i" -lt "$threads" ]; do
    echo "$i, 1.0e-03"
    i=$((i+1))
done
echo "Time taken: 2.0e-03"
"#;

const UNIT_PROGRAM: &str = "#!/bin/sh\necho \"serial_utils: all assertions passed\"\n";

const GRAPH_FILES: [&str; 4] = [
    "small_graph.txt",
    "medium_graph.txt",
    "100_graph.txt",
    "1TH_vertices_50_edges_graph.txt",
];

fn write_script(dir: &Path, name: &str, body: &str) {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let root = TempDir::new().unwrap();
    let bin_dir = root.path().join("bin");
    let asset_dir = root.path().join("assets");
    write_script(&bin_dir, "all_pairs_serial", SERIAL_PROGRAM);
    write_script(&bin_dir, "all_pairs_parallel", PARALLEL_PROGRAM);
    write_script(&bin_dir, "test_serial_utils", UNIT_PROGRAM);

    fs::create_dir_all(asset_dir.join("test_inputs")).unwrap();
    fs::create_dir_all(asset_dir.join("test_outputs")).unwrap();
    let matrix = "0 1 2\n1 0 1\n2 1 0\n";
    for name in GRAPH_FILES {
        fs::write(asset_dir.join("test_inputs").join(name), matrix).unwrap();
        fs::write(
            asset_dir.join("test_outputs").join(name),
            format!("Final matrix\n{matrix}"),
        )
        .unwrap();
    }
    fs::write(asset_dir.join("test_inputs").join("empty_graph.txt"), "").unwrap();

    (root, bin_dir, asset_dir)
}

fn harness(bin_dir: &Path, asset_dir: &Path, subcommand: &str) -> Command {
    let mut cmd = Command::cargo_bin("apsp-tests").unwrap();
    cmd.arg(subcommand)
        .arg("--bin-dir")
        .arg(bin_dir)
        .arg("--asset-dir")
        .arg(asset_dir);
    cmd
}

#[test]
fn full_suites_pass_against_fake_executables() {
    let (_root, bin_dir, asset_dir) = setup();
    harness(&bin_dir, &asset_dir, "run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Serial results: 6 / 6"))
        .stdout(predicate::str::contains("Parallel results: 13 / 13"))
        .stdout(predicate::str::contains("FAIL").not());
}

#[test]
fn corrupted_fixture_fails_matching_cases_only() {
    let (_root, bin_dir, asset_dir) = setup();
    fs::write(
        asset_dir.join("test_outputs").join("medium_graph.txt"),
        "Final matrix\n9 9 9\n",
    )
    .unwrap();
    harness(&bin_dir, &asset_dir, "run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Serial results: 5 / 6"))
        .stdout(predicate::str::contains("Parallel results: 10 / 13"))
        .stdout(predicate::str::contains("Serial 3: FAIL"))
        .stdout(predicate::str::contains("Parallel 4: FAIL"));
}

#[test]
fn filter_runs_matching_subset() {
    let (_root, bin_dir, asset_dir) = setup();
    harness(&bin_dir, &asset_dir, "run")
        .arg("--filter")
        .arg("small graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("Serial results: 1 / 1"))
        .stdout(predicate::str::contains("Parallel results: 4 / 4"));
}

#[test]
fn check_fixtures_accepts_complete_tree() {
    let (_root, bin_dir, asset_dir) = setup();
    harness(&bin_dir, &asset_dir, "check-fixtures")
        .assert()
        .success()
        .stdout(predicate::str::contains("all referenced files present"));
}

#[test]
fn check_fixtures_flags_deleted_fixture() {
    let (_root, bin_dir, asset_dir) = setup();
    fs::remove_file(asset_dir.join("test_outputs").join("100_graph.txt")).unwrap();
    harness(&bin_dir, &asset_dir, "check-fixtures")
        .assert()
        .failure()
        .stdout(predicate::str::contains("MISSING"))
        .stdout(predicate::str::contains("100_graph.txt"));
}
