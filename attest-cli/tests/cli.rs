use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_the_subcommands() {
    Command::cargo_bin("attest")
        .expect("binary builds")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("del"));
}

#[test]
fn check_help_documents_the_budget_flags() {
    Command::cargo_bin("attest")
        .expect("binary builds")
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--server"))
        .stdout(predicate::str::contains("--send-time"))
        .stdout(predicate::str::contains("--program-timeout"));
}

#[test]
fn check_requires_a_server() {
    Command::cargo_bin("attest")
        .expect("binary builds")
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--server"));
}

#[test]
fn get_against_a_bad_address_fails_with_the_error_code() {
    Command::cargo_bin("attest")
        .expect("binary builds")
        .args(["get", "--server", "definitely not an address", "somekey"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid server address"));
}
