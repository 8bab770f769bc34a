use assert_fs::TempDir;
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;

use common::command::{
    RandomAuthor, commit_file, generate_random_author, init_repository_dir,
    repository_dir, run_twig_command, stdout_of, twig_commit, twig_commit_as,
};
use common::file::{FileSpec, write_file, write_generated_files};

#[rstest]
fn first_commit_is_reported_as_root_commit(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_twig_command(dir, &["init"]).assert().success();
    write_generated_files(dir, 3);

    run_twig_command(dir, &["add", "."]).assert().success();

    twig_commit(dir, "First commit\n\nWith a body")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\[master \(root-commit\) [0-9a-f]{7}\] First commit\n$").unwrap());

    let master = common::read_ref(dir, "refs/heads/master").expect("master should exist");
    assert_eq!(master.len(), 40);
}

#[rstest]
fn second_commit_points_at_the_first(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    let first = common::read_ref(dir, "refs/heads/master").unwrap();

    commit_file(dir, "1.txt", "uno\n", "Second commit");

    let second = common::read_ref(dir, "refs/heads/master").unwrap();
    assert_ne!(first, second);

    run_twig_command(dir, &["cat-file", "-p", &second])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("parent {first}")))
        .stdout(predicate::str::contains("Second commit"));
}

#[rstest]
fn committing_an_unchanged_tree_is_refused(init_repository_dir: TempDir) {
    twig_commit(init_repository_dir.path(), "Nothing new")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to commit, working tree clean"));
}

#[rstest]
fn committing_an_empty_index_is_refused(repository_dir: TempDir) {
    run_twig_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    twig_commit(repository_dir.path(), "Empty")
        .assert()
        .failure()
        .stderr(predicate::str::contains("the index is empty"));
}

#[rstest]
fn author_flag_overrides_the_environment_identity(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    write_file(FileSpec::new(dir.join("1.txt"), "changed\n".to_string()));
    run_twig_command(dir, &["add", "1.txt"]).assert().success();

    let committer = generate_random_author();
    let mut cmd = twig_commit_as(dir, "Authored elsewhere", &committer);
    cmd.args(["--author", "Ada Lovelace <ada@example.com>"]);
    cmd.assert().success();

    let head = common::read_ref(dir, "refs/heads/master").unwrap();
    let content = stdout_of(&mut run_twig_command(dir, &["cat-file", "-p", &head]));

    assert!(content.contains("author Ada Lovelace <ada@example.com>"));
    assert!(content.contains(&format!(
        "committer {} <{}>",
        committer.name, committer.email
    )));
}

#[rstest]
fn adding_a_missing_path_fails(init_repository_dir: TempDir) {
    run_twig_command(init_repository_dir.path(), &["add", "missing.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pathspec 'missing.txt' not found"));
}

#[rstest]
fn adding_a_deleted_file_stages_its_removal(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    std::fs::remove_file(dir.join("a").join("2.txt")).unwrap();

    run_twig_command(dir, &["add", "a"]).assert().success();

    run_twig_command(dir, &["status", "--porcelain"])
        .assert()
        .success()
        .stdout("D  a/2.txt\n");
}

#[rstest]
fn log_lists_history_newest_first(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    let author = RandomAuthor::new("Grace_Hopper".to_string(), "grace@example.com".to_string());
    write_file(FileSpec::new(dir.join("1.txt"), "uno\n".to_string()));
    run_twig_command(dir, &["add", "."]).assert().success();
    twig_commit_as(dir, "Second commit\n\nExplains why", &author)
        .assert()
        .success();
    let head = common::read_ref(dir, "refs/heads/master").unwrap();

    let output = stdout_of(&mut run_twig_command(dir, &["log"]));

    let expected_prefix = format!(
        "commit {head} (HEAD -> master)\nAuthor: Grace_Hopper <grace@example.com>\nDate:   Sun Jan 1 12:00:00 2023 +0000\n\n    Second commit\n    \n    Explains why\n\ncommit "
    );
    assert!(
        output.starts_with(&expected_prefix),
        "unexpected log output:\n{output}"
    );
    assert!(output.ends_with("    Initial commit\n"));
}

#[rstest]
fn log_oneline_honours_the_commit_limit(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    commit_file(dir, "1.txt", "uno\n", "Second commit");
    commit_file(dir, "1.txt", "eins\n", "Third commit");
    run_twig_command(dir, &["tag", "v1"]).assert().success();

    let output = stdout_of(&mut run_twig_command(dir, &["log", "--oneline", "-n", "2"]));
    let lines = output.lines().collect::<Vec<_>>();

    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(" (HEAD -> master, tag: v1) Third commit"));
    assert!(lines[1].ends_with(" Second commit"));
}

#[rstest]
fn log_of_an_unborn_branch_fails(repository_dir: TempDir) {
    run_twig_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    run_twig_command(repository_dir.path(), &["log"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("commits on 'master' not found"));
}
