use std::fs;
use std::process::Command;

use enet_gram::problem::{SampleStatus, SolvedBy, Solution};
use tempfile::tempdir;

const MULTI_PROBLEM: &str = r#"
layout = "multi"
alpha = 0.2
l1_ratio = 0.5
positive = true
grams = [
    [[2.0, 0.1], [0.1, 1.0]],
    [[1.0, 0.0], [0.0, 1.0]],
]
dx = [[1.0, -1.0], [-0.5, -0.5]]
y = [[2.0, 0.0], [1.0, 0.0]]

[solver]
max_iter = 500
tol = 1e-8
"#;

#[test]
fn solve_writes_solution_file() {
    let tmp = tempdir().expect("temporary directory");
    let problem_path = tmp.path().join("problem.toml");
    let solution_path = tmp.path().join("solution.toml");
    fs::write(&problem_path, MULTI_PROBLEM).expect("write problem");

    let exe = env!("CARGO_BIN_EXE_enet-gram");
    let status = Command::new(exe)
        .args([
            "solve",
            problem_path.to_str().expect("path str"),
            "--output",
            solution_path.to_str().expect("path str"),
        ])
        .status()
        .expect("run enet-gram cli");
    assert!(status.success(), "CLI exited with status {status:?}");

    let solution = Solution::load(&solution_path).expect("solution.toml");
    assert_eq!(solution.solved_by, SolvedBy::CoordinateDescent);
    assert_eq!(solution.samples.len(), 2);
    assert!(
        solution
            .samples
            .iter()
            .all(|s| s.status == SampleStatus::Converged)
    );
    assert!(solution.code.iter().flatten().all(|&v| v >= 0.0));
    assert_eq!(solution.code[1], vec![0.0, 0.0]);
}

#[test]
fn solve_prints_to_stdout_without_output_flag() {
    let tmp = tempdir().expect("temporary directory");
    let problem_path = tmp.path().join("problem.toml");
    fs::write(
        &problem_path,
        "layout = \"single\"\nalpha = 0.0\nl1_ratio = 0.0\n\
         gram = [[1.0, 0.0], [0.0, 4.0]]\ndx = [[2.0, 2.0]]\ny = [[1.0, 1.0]]\n",
    )
    .expect("write problem");

    let output = Command::new(env!("CARGO_BIN_EXE_enet-gram"))
        .args(["solve", problem_path.to_str().expect("path str")])
        .output()
        .expect("run enet-gram cli");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let solution: Solution = toml::from_str(&stdout).expect("solution TOML on stdout");
    assert_eq!(solution.solved_by, SolvedBy::ClosedFormRidge);
    assert_eq!(solution.code, vec![vec![2.0, 0.5]]);
}

#[test]
fn invalid_problem_exits_with_error() {
    let tmp = tempdir().expect("temporary directory");
    let problem_path = tmp.path().join("problem.toml");
    fs::write(
        &problem_path,
        "layout = \"single\"\nalpha = 1.0\nl1_ratio = 2.0\n\
         gram = [[1.0]]\ndx = [[1.0]]\ny = [[1.0]]\n",
    )
    .expect("write problem");

    let output = Command::new(env!("CARGO_BIN_EXE_enet-gram"))
        .args(["solve", problem_path.to_str().expect("path str")])
        .output()
        .expect("run enet-gram cli");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "stderr: {stderr}");
    assert!(stderr.contains("l1_ratio"), "stderr: {stderr}");
}

#[test]
fn batch_weight_prints_the_weight() {
    let output = Command::new(env!("CARGO_BIN_EXE_enet-gram"))
        .args(["batch-weight", "--count", "100", "--batch-size", "10"])
        .output()
        .expect("run enet-gram cli");
    assert!(output.status.success());
    let weight: f64 = String::from_utf8(output.stdout)
        .expect("utf8 stdout")
        .trim()
        .parse()
        .expect("a number");
    assert!((weight - 0.1).abs() < 1e-12, "weight {weight}");
}
