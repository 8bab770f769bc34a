use crate::common::file::{FileSpec, write_file};
use assert_cmd::Command;
use assert_fs::TempDir;
use derive_new::new;
use rstest::fixture;
use std::path::Path;

pub const COMMIT_DATE: &str = "2023-01-01 12:00:00 +0000";

#[fixture]
pub fn repository_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Repository with one commit holding `1.txt`, `a/2.txt` and `a/b/3.txt`
#[fixture]
pub fn init_repository_dir(repository_dir: TempDir) -> TempDir {
    run_twig_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    write_file(FileSpec::new(
        repository_dir.path().join("1.txt"),
        "one\n".to_string(),
    ));
    write_file(FileSpec::new(
        repository_dir.path().join("a").join("2.txt"),
        "two\n".to_string(),
    ));
    write_file(FileSpec::new(
        repository_dir.path().join("a").join("b").join("3.txt"),
        "three\n".to_string(),
    ));

    run_twig_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();

    twig_commit(repository_dir.path(), "Initial commit")
        .assert()
        .success();

    repository_dir
}

pub fn run_twig_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("twig").expect("Failed to find twig binary");
    cmd.envs(vec![("NO_PAGER", "1"), ("NO_COLOR", "1")]);
    cmd.env_remove("TWIG_LOG");
    cmd.current_dir(dir);
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

#[derive(Debug, Clone, new)]
pub struct RandomAuthor {
    pub name: String,
    pub email: String,
}

pub fn generate_random_author() -> RandomAuthor {
    use fake::Fake;
    use fake::faker::internet::en::FreeEmail;
    use fake::faker::name::en::Name;

    let name = Name().fake::<String>().replace(" ", "_");
    let email = FreeEmail().fake::<String>();
    RandomAuthor::new(name, email)
}

pub fn twig_commit(dir: &Path, message: &str) -> Command {
    twig_commit_as(dir, message, &generate_random_author())
}

pub fn twig_commit_as(dir: &Path, message: &str, author: &RandomAuthor) -> Command {
    let mut cmd = run_twig_command(dir, &["commit", "-m", message]);
    cmd.envs(vec![
        ("TWIG_AUTHOR_NAME", author.name.as_str()),
        ("TWIG_AUTHOR_EMAIL", author.email.as_str()),
        ("TWIG_AUTHOR_DATE", COMMIT_DATE), // %Y-%m-%d %H:%M:%S %z
    ]);
    cmd
}

/// Write, stage and commit a single file
pub fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    write_file(FileSpec::new(dir.join(name), content.to_string()));
    run_twig_command(dir, &["add", name]).assert().success();
    twig_commit(dir, message).assert().success();
}

pub fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("Failed to run twig");
    String::from_utf8(output.stdout).expect("stdout is not UTF-8")
}
