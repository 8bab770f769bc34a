use assert_fs::TempDir;
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;

use common::command::{commit_file, init_repository_dir, run_twig_command, stdout_of};
use common::file::{FileSpec, read_file, write_file};

#[rstest]
fn branches_are_listed_with_the_current_one_marked(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();

    run_twig_command(dir, &["branch", "topic"]).assert().success();
    run_twig_command(dir, &["branch", "feature/login", "HEAD"])
        .assert()
        .success();

    run_twig_command(dir, &["branch"])
        .assert()
        .success()
        .stdout("  feature/login\n* master\n  topic\n");

    assert_eq!(
        common::read_ref(dir, "refs/heads/topic"),
        common::read_ref(dir, "refs/heads/master")
    );
}

#[rstest]
#[case("bad..name")]
#[case(".hidden")]
#[case("trailing.lock")]
#[case("with space")]
fn invalid_branch_names_are_rejected(init_repository_dir: TempDir, #[case] name: &str) {
    run_twig_command(init_repository_dir.path(), &["branch", name])
        .assert()
        .failure();

    assert_eq!(common::read_ref(init_repository_dir.path(), &format!("refs/heads/{name}")), None);
}

#[rstest]
fn creating_an_existing_branch_fails(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    run_twig_command(dir, &["branch", "topic"]).assert().success();

    run_twig_command(dir, &["branch", "topic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[rstest]
fn unmerged_branches_need_force_to_be_deleted(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    run_twig_command(dir, &["checkout", "-b", "topic"])
        .assert()
        .success();
    commit_file(dir, "topic.txt", "topic\n", "Topic work");
    run_twig_command(dir, &["checkout", "master"])
        .assert()
        .success();

    run_twig_command(dir, &["branch", "-d", "topic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("the branch 'topic' is not fully merged"));

    run_twig_command(dir, &["branch", "-D", "topic"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Deleted branch topic (was "));
    assert_eq!(common::read_ref(dir, "refs/heads/topic"), None);
}

#[rstest]
fn the_current_branch_cannot_be_deleted(init_repository_dir: TempDir) {
    run_twig_command(init_repository_dir.path(), &["branch", "-D", "master"])
        .assert()
        .failure();

    assert!(common::read_ref(init_repository_dir.path(), "refs/heads/master").is_some());
}

#[rstest]
fn checkout_switches_the_working_tree_between_branches(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    run_twig_command(dir, &["checkout", "-b", "topic"])
        .assert()
        .success()
        .stdout("Switched to a new branch 'topic'\n");

    commit_file(dir, "1.txt", "topic version\n", "Change 1.txt");
    commit_file(dir, "only-on-topic.txt", "extra\n", "Add a file");
    std::fs::remove_file(dir.join("a").join("2.txt")).unwrap();
    run_twig_command(dir, &["add", "a"]).assert().success();
    common::command::twig_commit(dir, "Remove 2.txt")
        .assert()
        .success();

    run_twig_command(dir, &["checkout", "master"])
        .assert()
        .success()
        .stdout("Switched to branch 'master'\n");

    assert_eq!(read_file(&dir.join("1.txt")), "one\n");
    assert_eq!(read_file(&dir.join("a").join("2.txt")), "two\n");
    assert!(!dir.join("only-on-topic.txt").exists());
    assert_eq!(common::read_head(dir), "ref: refs/heads/master");

    run_twig_command(dir, &["checkout", "topic"])
        .assert()
        .success();

    assert_eq!(read_file(&dir.join("1.txt")), "topic version\n");
    assert!(!dir.join("a").join("2.txt").exists());
    run_twig_command(dir, &["status", "--porcelain"])
        .assert()
        .success()
        .stdout("");
}

#[rstest]
fn checking_out_the_current_branch_is_a_no_op(init_repository_dir: TempDir) {
    run_twig_command(init_repository_dir.path(), &["checkout", "master"])
        .assert()
        .success()
        .stdout("Already on 'master'\n");
}

#[rstest]
fn checkout_of_a_commit_detaches_head(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    let first = common::read_ref(dir, "refs/heads/master").unwrap();
    commit_file(dir, "1.txt", "uno\n", "Second commit");

    run_twig_command(dir, &["checkout", "HEAD~1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("You are in 'detached HEAD' state"))
        .stdout(predicate::str::contains(format!(
            "HEAD is now at {} Initial commit",
            &first[..7]
        )));

    assert_eq!(common::read_head(dir), first);
    assert_eq!(read_file(&dir.join("1.txt")), "one\n");

    run_twig_command(dir, &["branch"])
        .assert()
        .success()
        .stdout(format!("* (HEAD detached at {})\n  master\n", &first[..7]));
    run_twig_command(dir, &["status"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!(
            "HEAD detached at {}",
            &first[..7]
        )));
}

#[rstest]
fn checkout_refuses_to_overwrite_local_changes(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    run_twig_command(dir, &["branch", "topic"]).assert().success();
    commit_file(dir, "1.txt", "master version\n", "Change on master");

    write_file(FileSpec::new(dir.join("1.txt"), "uncommitted work\n".to_string()));

    run_twig_command(dir, &["checkout", "topic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1.txt"));

    assert_eq!(read_file(&dir.join("1.txt")), "uncommitted work\n");
    assert_eq!(common::read_head(dir), "ref: refs/heads/master");
}

#[rstest]
fn lightweight_and_annotated_tags(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    let head = common::read_ref(dir, "refs/heads/master").unwrap();

    run_twig_command(dir, &["tag", "v1.0"]).assert().success();
    run_twig_command(dir, &["tag", "v1.1", "HEAD", "-m", "First release"])
        .assert()
        .success();

    assert_eq!(common::read_ref(dir, "refs/tags/v1.0"), Some(head.clone()));
    let annotated = common::read_ref(dir, "refs/tags/v1.1").unwrap();
    assert_ne!(annotated, head);

    let tag_object = stdout_of(&mut run_twig_command(dir, &["cat-file", "-p", &annotated]));
    assert!(tag_object.starts_with(&format!("object {head}\ntype commit\ntag v1.1\ntagger ")));
    assert!(tag_object.contains("\n\nFirst release"));

    run_twig_command(dir, &["tag"])
        .assert()
        .success()
        .stdout("v1.0\nv1.1\n");

    // annotated tags peel to their commit wherever one is expected
    run_twig_command(dir, &["branch", "from-tag", "v1.1"])
        .assert()
        .success();
    assert_eq!(common::read_ref(dir, "refs/heads/from-tag"), Some(head));

    run_twig_command(dir, &["tag", "-d", "v1.0"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Deleted tag 'v1.0' (was "));
    assert_eq!(common::read_ref(dir, "refs/tags/v1.0"), None);
}
