//! The library driven directly, without the binary

use assert_fs::TempDir;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use std::path::{Path, PathBuf};
use twig::areas::repository::Repository;
use twig::artifacts::branch::branch_name::{BranchName, SymRefName};
use twig::artifacts::index::index_entry::Stage;
use twig::artifacts::merge::MergeOutcome;
use twig::artifacts::objects::object_id::ObjectId;
use twig::commands::porcelain::reset::ResetMode;
use twig::errors::RepositoryError;

#[fixture]
fn repository_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

async fn open(dir: &Path) -> Repository {
    Repository::new(dir, Box::new(std::io::sink())).expect("Failed to open repository")
}

async fn init(dir: &Path) -> Repository {
    let mut repository = open(dir).await;
    repository.init().await.expect("Failed to init repository");
    repository
}

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create directory");
    }
    std::fs::write(path, content).expect("Failed to write file");
}

async fn commit_file(
    repository: &mut Repository,
    name: &str,
    content: &str,
    message: &str,
) -> ObjectId {
    write(repository.path(), name, content);
    repository
        .add(&[name.to_string()])
        .await
        .expect("Failed to add");
    repository
        .commit(Some(message), None)
        .await
        .expect("Failed to commit")
}

fn branch(name: &str) -> BranchName {
    BranchName::try_parse(name.to_string()).expect("valid branch name")
}

fn branch_tip(repository: &Repository, name: &str) -> Option<ObjectId> {
    repository
        .refs()
        .read_ref(&SymRefName::branch(&branch(name)))
        .expect("Failed to read ref")
}

/// `main` at C1 with `a.txt = "1"`, branch `f` at C2 with `a.txt = "2"`, HEAD on `main`
async fn feature_branch(dir: &Path) -> (Repository, ObjectId, ObjectId) {
    let mut repository = init(dir).await;
    repository.checkout("main", true).await.unwrap();
    let c1 = commit_file(&mut repository, "a.txt", "1", "C1").await;

    repository.branch("f", None).await.unwrap();
    repository.checkout("f", false).await.unwrap();
    let c2 = commit_file(&mut repository, "a.txt", "2", "C2").await;
    repository.checkout("main", false).await.unwrap();

    (repository, c1, c2)
}

#[rstest]
#[tokio::test]
async fn merging_an_undiverged_feature_branch_fast_forwards(repository_dir: TempDir) {
    let (mut repository, c1, c2) = feature_branch(repository_dir.path()).await;
    assert_eq!(branch_tip(&repository, "main"), Some(c1));

    let outcome = repository.merge("f", None).await.unwrap();

    assert_eq!(outcome, MergeOutcome::FastForward(c2.clone()));
    assert!(outcome.conflicts().is_empty());
    assert_eq!(branch_tip(&repository, "main"), Some(c2));
    assert_eq!(
        std::fs::read_to_string(repository_dir.path().join("a.txt")).unwrap(),
        "2"
    );
}

#[rstest]
#[tokio::test]
async fn diverged_edits_to_one_file_conflict_on_that_path(repository_dir: TempDir) {
    let (mut repository, _, c2) = feature_branch(repository_dir.path()).await;
    let c3 = commit_file(&mut repository, "a.txt", "3", "C3").await;

    let outcome = repository.merge("f", None).await.unwrap();

    assert_eq!(outcome, MergeOutcome::Conflicted(vec![PathBuf::from("a.txt")]));
    {
        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate().unwrap();

        let stages = index.conflict_stages(Path::new("a.txt"));
        assert_eq!(
            stages.keys().copied().collect::<Vec<_>>(),
            vec![Stage::Base, Stage::Ours, Stage::Theirs]
        );
    }
    let state = repository.merge_state().unwrap().expect("merge is pending");
    assert_eq!(state.incoming, c2);

    write(repository_dir.path(), "a.txt", "2 and 3");
    repository.add(&["a.txt".to_string()]).await.unwrap();
    let merge_commit = repository.commit(None, None).await.unwrap();

    let commit = repository
        .database()
        .parse_object_as_commit(&merge_commit)
        .unwrap();
    assert_eq!(commit.parents(), &[c3, c2]);
    assert_eq!(commit.message(), "Merge branch 'f'");
    assert_eq!(repository.merge_state().unwrap(), None);
}

#[rstest]
#[tokio::test]
async fn resolving_conflicts_is_required_before_committing(repository_dir: TempDir) {
    let (mut repository, _, _) = feature_branch(repository_dir.path()).await;
    commit_file(&mut repository, "a.txt", "3", "C3").await;
    repository.merge("f", None).await.unwrap();

    let error = repository.commit(Some("premature"), None).await.unwrap_err();

    assert!(matches!(
        RepositoryError::classify(&error),
        Some(RepositoryError::DirtyMerge(paths)) if paths == &vec![PathBuf::from("a.txt")]
    ));
}

#[rstest]
#[tokio::test]
async fn hard_and_soft_resets_move_the_branch_back(repository_dir: TempDir) {
    let dir = repository_dir.path();
    let mut repository = init(dir).await;
    let first = commit_file(&mut repository, "a.txt", "first\n", "First").await;
    let second = commit_file(&mut repository, "a.txt", "second\n", "Second").await;

    write(dir, "a.txt", "unstaged\n");
    repository
        .reset(Some("HEAD~1"), ResetMode::Soft)
        .await
        .unwrap();

    assert_eq!(branch_tip(&repository, "master"), Some(first.clone()));
    assert_eq!(std::fs::read_to_string(dir.join("a.txt")).unwrap(), "unstaged\n");
    {
        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate().unwrap();
        let second_tree = repository
            .database()
            .commit_tree_map(Some(&second))
            .unwrap();
        assert_eq!(index.tracked_map(), second_tree);
    }

    repository
        .reset(Some(&second.to_string()), ResetMode::Soft)
        .await
        .unwrap();
    repository
        .reset(Some("HEAD~1"), ResetMode::Hard)
        .await
        .unwrap();

    assert_eq!(branch_tip(&repository, "master"), Some(first.clone()));
    assert_eq!(std::fs::read_to_string(dir.join("a.txt")).unwrap(), "first\n");
    let status = repository.status(true).await.unwrap();
    assert!(status.is_clean());
    assert!(status.untracked_files.is_empty());
}

#[rstest]
#[tokio::test]
async fn gc_removes_a_blob_whose_stage_was_discarded(repository_dir: TempDir) {
    let dir = repository_dir.path();
    let mut repository = init(dir).await;
    let head = commit_file(&mut repository, "kept.txt", "kept\n", "Keep").await;
    repository.tag("v1", None, None).await.unwrap();

    write(dir, "scratch.txt", "scratch\n");
    repository.add(&["scratch.txt".to_string()]).await.unwrap();
    let scratch_oid = {
        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate().unwrap();
        index
            .entry_by_path(Path::new("scratch.txt"))
            .unwrap()
            .oid
            .clone()
    };
    repository
        .unstage(&["scratch.txt".to_string()])
        .await
        .unwrap();

    let summary = repository.gc().await.unwrap();

    assert_eq!(summary.removed_objects, 1);
    assert!(!repository.database().exists(&scratch_oid));
    assert!(repository.database().exists(&head));
    let kept_tree = repository.database().commit_tree_map(Some(&head)).unwrap();
    for entry in kept_tree.values() {
        assert!(repository.database().exists(&entry.oid));
    }
}

#[rstest]
#[tokio::test]
async fn mutating_operations_fail_fast_while_the_lock_is_held(repository_dir: TempDir) {
    let dir = repository_dir.path();
    let mut repository = init(dir).await;
    write(dir, "a.txt", "a\n");

    let held = repository.lock().unwrap();
    let error = repository.add(&["a.txt".to_string()]).await.unwrap_err();

    assert!(RepositoryError::is_lock_held(&error));
    assert!(held.path().exists());

    drop(held);
    repository.add(&["a.txt".to_string()]).await.unwrap();
    assert!(!dir.join(".twig").join("twig.lock").exists());
}

#[rstest]
#[tokio::test]
async fn ref_updates_are_compare_and_swap(repository_dir: TempDir) {
    let dir = repository_dir.path();
    let mut repository = init(dir).await;
    let first = commit_file(&mut repository, "a.txt", "1\n", "First").await;
    let second = commit_file(&mut repository, "a.txt", "2\n", "Second").await;
    let master = SymRefName::branch(&branch("master"));

    let error = repository
        .refs()
        .compare_and_swap(&master, Some(&first), &first)
        .unwrap_err();

    match RepositoryError::classify(&error) {
        Some(RepositoryError::RefConflict {
            name,
            expected,
            actual,
        }) => {
            assert_eq!(name, "refs/heads/master");
            assert_eq!(expected, &first.to_string());
            assert_eq!(actual, &second.to_string());
        }
        other => panic!("expected a ref conflict, got {other:?}"),
    }
    assert_eq!(branch_tip(&repository, "master"), Some(second.clone()));

    repository
        .refs()
        .compare_and_swap(&master, Some(&second), &first)
        .unwrap();
    assert_eq!(branch_tip(&repository, "master"), Some(first));
}

#[rstest]
#[tokio::test]
async fn merge_base_of_diverged_branches_is_their_fork_point(repository_dir: TempDir) {
    let (mut repository, c1, c2) = feature_branch(repository_dir.path()).await;
    let c3 = commit_file(&mut repository, "b.txt", "b", "C3").await;

    assert_eq!(repository.merge_base(&c3, &c2).unwrap(), Some(c1.clone()));
    assert!(repository.is_ancestor(&c1, &c3).unwrap());
    assert!(!repository.is_ancestor(&c2, &c3).unwrap());
}

#[rstest]
#[tokio::test]
async fn status_leaves_the_index_alone_while_another_writer_holds_the_lock(
    repository_dir: TempDir,
) {
    let dir = repository_dir.path();
    let mut repository = init(dir).await;
    commit_file(&mut repository, "a.txt", "a\n", "First").await;
    // a mixed reset leaves entries without stat data, so status has something to refresh
    repository.reset(None, ResetMode::Mixed).await.unwrap();
    let index_path = dir.join(".twig").join("index");
    let before = std::fs::read(&index_path).unwrap();

    let held = repository.lock().unwrap();
    let status = repository.status(true).await.unwrap();

    assert!(status.is_clean());
    assert_eq!(std::fs::read(&index_path).unwrap(), before);

    drop(held);
    repository.status(true).await.unwrap();
    assert_ne!(std::fs::read(&index_path).unwrap(), before);
}
