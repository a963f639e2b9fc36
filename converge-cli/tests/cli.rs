//! End-to-end tests for the `converge` binary against a re-homed root.
//!
//! Service resources stay out of these plans: exercising them would shell
//! out to the host init system. The in-memory service manager covers that
//! path in the engine tests.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Env {
    _temp: TempDir,
    root: PathBuf,
    plan: PathBuf,
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, contents).expect("write");
}

/// A jar-plus-config plan: an artifact file and a rendered template that
/// depends on it.
fn scenario_env() -> Env {
    let temp = TempDir::new().expect("temp dir");
    let root = temp.path().join("root");
    std::fs::create_dir_all(&root).expect("mkdir root");

    let jar = temp.path().join("cache/app.jar");
    write(&jar, "jar bytes v1");
    write(
        &root.join("templates/app.conf.tmpl"),
        "listen {{ port }}\n",
    );

    let plan = temp.path().join("plan.yml");
    write(
        &plan,
        &format!(
            r#"
resources:
  - kind: file
    path: /usr/share/java/app.jar
    source: file://{jar}
    mode: "0644"
  - kind: template
    path: /etc/app/app.conf
    template: /templates/app.conf.tmpl
    variables:
      port: "8080"
    requires: ["file:/usr/share/java/app.jar"]
"#,
            jar = jar.display()
        ),
    );

    Env {
        _temp: temp,
        root,
        plan,
    }
}

fn converge() -> Command {
    Command::cargo_bin("converge").expect("binary")
}

fn report_statuses(path: &Path) -> Vec<String> {
    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(path).expect("read report")).expect("json");
    report["results"]
        .as_array()
        .expect("results")
        .iter()
        .map(|r| r["status"].as_str().expect("status").to_string())
        .collect()
}

#[test]
fn apply_creates_resources_then_reports_unchanged() {
    let env = scenario_env();
    let report_1 = env.root.join("report1.json");
    let report_2 = env.root.join("report2.json");

    converge()
        .args(["apply", "--plan"])
        .arg(&env.plan)
        .arg("--root")
        .arg(&env.root)
        .arg("--report")
        .arg(&report_1)
        .assert()
        .success()
        .stdout(predicate::str::contains("# converge run"));

    assert_eq!(
        std::fs::read(env.root.join("usr/share/java/app.jar")).expect("jar"),
        b"jar bytes v1"
    );
    assert_eq!(
        std::fs::read_to_string(env.root.join("etc/app/app.conf")).expect("conf"),
        "listen 8080\n"
    );
    assert_eq!(report_statuses(&report_1), vec!["created", "created"]);

    converge()
        .args(["apply", "--plan"])
        .arg(&env.plan)
        .arg("--root")
        .arg(&env.root)
        .arg("--report")
        .arg(&report_2)
        .assert()
        .success();
    assert_eq!(report_statuses(&report_2), vec!["unchanged", "unchanged"]);
}

#[test]
fn dry_run_prints_diffs_and_writes_nothing() {
    let env = scenario_env();

    converge()
        .args(["apply", "--dry-run", "--plan"])
        .arg(&env.plan)
        .arg("--root")
        .arg(&env.root)
        .assert()
        .success()
        .stdout(predicate::str::contains("# converge run (dry-run)"))
        .stdout(predicate::str::contains("+listen 8080"));

    assert!(!env.root.join("usr/share/java/app.jar").exists());
    assert!(!env.root.join("etc/app/app.conf").exists());
}

#[test]
fn external_vars_override_plan_variables() {
    let env = scenario_env();
    let vars = env.root.join("vars.yml");
    write(&vars, "port: \"9999\"\n");

    converge()
        .args(["apply", "--plan"])
        .arg(&env.plan)
        .arg("--root")
        .arg(&env.root)
        .arg("--vars")
        .arg(&vars)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(env.root.join("etc/app/app.conf")).expect("conf"),
        "listen 9999\n"
    );
}

#[test]
fn exit_code_is_the_position_of_the_first_failed_resource() {
    let temp = TempDir::new().expect("temp dir");
    let root = temp.path().join("root");
    std::fs::create_dir_all(&root).expect("mkdir root");
    let good = temp.path().join("cache/good.txt");
    write(&good, "ok");

    let plan = temp.path().join("plan.yml");
    write(
        &plan,
        &format!(
            r#"
resources:
  - kind: file
    path: /srv/good.txt
    source: file://{good}
  - kind: file
    path: /srv/bad.txt
    source: file:///no/such/artifact
"#,
            good = good.display()
        ),
    );

    converge()
        .args(["apply", "--plan"])
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("file:/srv/bad.txt"));

    // Fail-fast keeps the earlier resource applied.
    assert!(root.join("srv/good.txt").exists());
}

#[test]
fn cyclic_plan_is_rejected_before_any_resource_is_touched() {
    let temp = TempDir::new().expect("temp dir");
    let root = temp.path().join("root");
    std::fs::create_dir_all(&root).expect("mkdir root");
    let artifact = temp.path().join("cache/a.txt");
    write(&artifact, "a");

    let plan = temp.path().join("plan.yml");
    write(
        &plan,
        &format!(
            r#"
resources:
  - kind: file
    path: /srv/a.txt
    source: file://{artifact}
    requires: ["file:/srv/b.txt"]
  - kind: file
    path: /srv/b.txt
    source: file://{artifact}
    requires: ["file:/srv/a.txt"]
"#,
            artifact = artifact.display()
        ),
    );

    converge()
        .args(["apply", "--plan"])
        .arg(&plan)
        .arg("--root")
        .arg(&root)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("plan rejected"))
        .stderr(predicate::str::contains("cycle"));

    assert!(!root.join("srv/a.txt").exists());
    assert!(!root.join("srv/b.txt").exists());
}

#[test]
fn validate_prints_the_resolved_apply_order() {
    let env = scenario_env();
    converge()
        .args(["validate", "--plan"])
        .arg(&env.plan)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "1. file:/usr/share/java/app.jar",
        ))
        .stdout(predicate::str::contains("2. template:/etc/app/app.conf"));
}

#[test]
fn validate_rejects_duplicate_identities() {
    let temp = TempDir::new().expect("temp dir");
    let plan = temp.path().join("plan.yml");
    write(
        &plan,
        r#"
resources:
  - kind: file
    path: /srv/a.txt
    source: file:///cache/a
  - kind: file
    path: /srv/a.txt
    source: file:///cache/other
"#,
    );

    converge()
        .args(["validate", "--plan"])
        .arg(&plan)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("duplicate resource identity"));
}

#[test]
fn missing_plan_file_is_a_runtime_error() {
    converge()
        .args(["apply", "--plan", "/no/such/plan.yml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("plan"));
}
