// Tests for the chunkloop command line

mod common;

use assert_cmd::Command;
use common::TestFiles;
use predicates::prelude::*;

const SUM_LOOP: &str = r#"
scope:
  - name: rate
    value: "3"
  - name: scale
    value: "fn(x) { x * rate }"
loop:
  iterators:
    - name: i
      range: { from: 0, to: 10 }
  expression: "scale(i) + offset"
  combine: sum
"#;

fn chunkloop() -> Command {
    let mut cmd = Command::cargo_bin("chunkloop").unwrap();
    for var in [
        "RUST_LOG",
        "CHUNKLOOP_CHUNK_SIZE",
        "CHUNKLOOP_MAX_PARALLEL",
        "CHUNKLOOP_MAX_RETRIES",
        "CHUNKLOOP_WORKER",
        "CHUNKLOOP_LOG_LEVEL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn sum_loop(files: &TestFiles) -> std::path::PathBuf {
    files.write("sum.yml", &SUM_LOOP.replace("scale(i) + offset", "scale(i) + 3"))
}

#[test]
fn test_help_lists_commands() {
    chunkloop()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("Evaluate one task payload").not());
}

#[test]
fn test_run_prints_result() {
    let files = TestFiles::new();
    let loop_file = sum_loop(&files);

    chunkloop()
        .arg("run")
        .arg(&loop_file)
        .arg("--config")
        .arg(files.config())
        .args(["--chunk-size", "4", "--no-progress"])
        .assert()
        .success()
        .stdout("165\n");
}

#[test]
fn test_run_in_process_with_parallel_window() {
    let files = TestFiles::new();
    let loop_file = files.write(
        "collect.yml",
        "loop:\n  iterators:\n    - name: s\n      values: [\"a\", \"b\", \"c\"]\n  expression: \"upper(s)\"\n",
    );

    chunkloop()
        .arg("run")
        .arg(&loop_file)
        .arg("--config")
        .arg(files.config())
        .args(["--in-process", "-j", "3", "--no-progress"])
        .assert()
        .success()
        .stdout("[\"A\",\"B\",\"C\"]\n");
}

#[test]
fn test_check_reports_capture() {
    let files = TestFiles::new();
    let loop_file = sum_loop(&files);

    chunkloop()
        .arg("check")
        .arg(&loop_file)
        .arg("--config")
        .arg(files.config())
        .args(["--chunk-size", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("iterations: 10"))
        .stdout(predicate::str::contains("chunks: 4 (chunk size 3)"))
        .stdout(predicate::str::contains("loop variables: i"))
        .stdout(predicate::str::contains("captured: scale, rate"))
        .stdout(predicate::str::contains("packages: \n"));
}

#[test]
fn test_unresolved_free_variable_exits_with_capture_code() {
    let files = TestFiles::new();
    let loop_file = files.write("free.yml", SUM_LOOP);

    chunkloop()
        .arg("run")
        .arg(&loop_file)
        .arg("--config")
        .arg(files.config())
        .arg("--no-progress")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("offset"));
}

#[test]
fn test_invalid_loop_file_exits_with_input_code() {
    let files = TestFiles::new();
    let loop_file = files.write("broken.yml", "loop: [unclosed");

    chunkloop()
        .arg("run")
        .arg(&loop_file)
        .arg("--config")
        .arg(files.config())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("E2006"));
}

#[test]
fn test_zero_chunk_size_exits_with_config_code() {
    let files = TestFiles::new();
    let loop_file = sum_loop(&files);

    chunkloop()
        .arg("run")
        .arg(&loop_file)
        .arg("--config")
        .arg(files.config())
        .args(["--chunk-size", "0"])
        .assert()
        .code(2);
}

#[test]
fn test_worker_rejects_garbage_payload() {
    chunkloop()
        .arg("worker")
        .write_stdin("definitely not a task payload")
        .assert()
        .code(8);
}

#[test]
fn test_missing_loop_file_fails() {
    let files = TestFiles::new();

    chunkloop()
        .arg("run")
        .arg(files.path("missing.yml"))
        .arg("--config")
        .arg(files.config())
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.yml"));
}
